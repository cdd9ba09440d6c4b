//! In-flight request deduplication: identical cache-keys collapse onto one
//! upstream call, with every other caller attached to that call's result.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key` if no call is already in flight; otherwise attach
    /// to the in-flight call and return its result once it resolves. Other
    /// callers' results still populate whatever cache sits behind `f`
    /// regardless of whether this particular caller was cancelled (the
    /// `OnceCell` keeps running to completion even if this future is
    /// dropped, since it is driven by whichever caller happened to win the
    /// race to initialize it and the `Arc` keeps it alive).
    pub async fn run<F, Fut>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = V>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell.get_or_init(f).await.clone();

        let mut inflight = self.inflight.lock().await;
        if let Some(existing) = inflight.get(&key) {
            if Arc::ptr_eq(existing, &cell) {
                inflight.remove(&key);
            }
        }

        result
    }
}
