//! Owns the single logical connection to the upstream. Grounded on the
//! teacher's `client.rs` (connection setup, request dispatch) and
//! `reader.rs` (a dedicated task draining frames off the socket into a
//! queue that the dispatch side correlates by request id).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::wire::{make_frame, split_fields};
use crate::bars::{Bar, BarSize, Range};
use crate::error::{Error, Result};
use crate::upstream::{ContractRecord, Upstream};

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Vec<String>>>>>;

struct Reader {
    inner: OwnedReadHalf,
    pending: Pending,
    disconnect: CancellationToken,
}

impl Reader {
    async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.disconnect.cancelled() => {
                    tracing::debug!("reader task disconnecting");
                    break;
                }
                result = self.inner.read_u32() => {
                    let Ok(len) = result else {
                        tracing::warn!("upstream connection closed");
                        break;
                    };
                    let mut buf = vec![0_u8; len as usize];
                    if self.inner.read_exact(&mut buf).await.is_err() {
                        tracing::warn!("upstream connection closed mid-frame");
                        break;
                    }
                    let fields = split_fields(&buf);
                    let Some(req_id) = fields.first().and_then(|s| s.parse::<i64>().ok()) else {
                        continue;
                    };
                    let mut pending = self.pending.lock().await;
                    if let Some(tx) = pending.remove(&req_id) {
                        let _ = tx.send(fields[1..].to_vec());
                    }
                }
            }
        }
    }
}

/// Production [`Upstream`] implementation: one TCP connection, a reader
/// task, and request/response correlation by request id.
pub struct WireSession {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_req_id: AtomicI64,
    disconnect: CancellationToken,
    reader_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WireSession {
    pub async fn connect(host: Ipv4Addr, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let disconnect = CancellationToken::new();

        let reader = Reader {
            inner: read_half,
            pending: pending.clone(),
            disconnect: disconnect.clone(),
        };
        let reader_handle = tokio::spawn(reader.run());

        Ok(Self {
            writer: Mutex::new(write_half),
            pending,
            next_req_id: AtomicI64::new(0),
            disconnect,
            reader_handle: Mutex::new(Some(reader_handle)),
        })
    }

    fn next_id(&self) -> i64 {
        self.next_req_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, frame: Vec<u8>, req_id: i64) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(req_id, tx);

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(&frame)
                .await
                .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(30), rx).await {
            Ok(Ok(fields)) => Ok(fields),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                self.pending.lock().await.remove(&req_id);
                Err(Error::Timeout)
            }
        }
    }

    /// Cancel the reader task and close the write half, draining in-flight
    /// work.
    pub async fn shutdown(&self) {
        self.disconnect.cancel();
        if let Some(handle) = self.reader_handle.lock().await.take() {
            let _ = handle.await;
        }
        let _ = self.writer.lock().await.shutdown().await;
    }
}

fn parse_epoch_millis(s: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = s
        .parse()
        .map_err(|_| Error::Invariant(format!("malformed upstream timestamp {s}")))?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::Invariant(format!("out-of-range upstream timestamp {s}")))
}

#[async_trait]
impl Upstream for WireSession {
    async fn fetch_bars(
        &self,
        contract_id: &str,
        bar_size: BarSize,
        range: Range,
        rth: bool,
    ) -> Result<Vec<Bar>> {
        let req_id = self.next_id();
        let frame = make_frame!(
            "FETCH_BARS",
            req_id,
            contract_id,
            bar_size,
            range.start.timestamp_millis(),
            range.end.timestamp_millis(),
            rth
        );
        let fields = self.request(frame, req_id).await?;
        if fields.first().map(String::as_str) == Some("ERR") {
            return Err(classify_upstream_error(fields.get(1).map(String::as_str).unwrap_or("")));
        }
        // Each subsequent group of 6 fields is one bar: t,o,h,l,c,v.
        let mut bars = Vec::with_capacity(fields.len() / 6);
        for chunk in fields.chunks(6) {
            if chunk.len() < 6 {
                break;
            }
            bars.push(Bar {
                t: parse_epoch_millis(&chunk[0])?,
                open: chunk[1].parse().unwrap_or(f64::NAN),
                high: chunk[2].parse().unwrap_or(f64::NAN),
                low: chunk[3].parse().unwrap_or(f64::NAN),
                close: chunk[4].parse().unwrap_or(f64::NAN),
                volume: chunk[5].parse().unwrap_or(0.0),
            });
        }
        Ok(bars)
    }

    async fn enumerate_contracts(&self, root: &str) -> Result<Vec<ContractRecord>> {
        let req_id = self.next_id();
        let frame = make_frame!("ENUMERATE_CONTRACTS", req_id, root);
        let fields = self.request(frame, req_id).await?;
        if fields.first().map(String::as_str) == Some("ERR") {
            return Err(Error::UnknownRoot(root.to_owned()));
        }
        let mut records = Vec::with_capacity(fields.len() / 3);
        for chunk in fields.chunks(3) {
            if chunk.len() < 3 {
                break;
            }
            records.push(ContractRecord {
                code: chunk[0].clone(),
                listing_date: parse_epoch_millis(&chunk[1])?,
                last_trading_day: parse_epoch_millis(&chunk[2])?,
            });
        }
        Ok(records)
    }
}

fn classify_upstream_error(code: &str) -> Error {
    match code {
        "PACING" => Error::PacingViolation,
        "NO_DATA_FARM" => Error::NoDataFarm,
        _ => Error::UpstreamUnavailable(code.to_owned()),
    }
}
