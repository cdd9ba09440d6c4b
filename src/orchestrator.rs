//! The `pack` endpoint: fetch a base expression once, then run
//! a declared set of overlays and panels concurrently against it. A broken
//! companion reports its own `error` and never fails the whole pack.

use crate::bars::BarSize;
use crate::engine::Engine;
use crate::error::Result;
use crate::expr::{evaluate, EvalRequest};
use crate::indicators::{drawdown, rsi};
use crate::series::{EngineResult, Point};

#[derive(Debug, Clone)]
pub enum CompanionKind {
    Bollinger { period: usize, sigma: f64 },
    Sma { window: usize },
    Ema { window: usize },
    Rsi { period: usize },
    Drawdown { window: Option<usize> },
    Sharpe { window: usize },
    ZScore { window: usize, levels: Vec<f64> },
    VolumeProfile { bin_count: usize, value_area_fraction: f64 },
    /// A companion spec that failed to parse at the HTTP boundary; carried
    /// through so it still reports as a per-companion `error` rather than
    /// failing the whole pack.
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct CompanionSpec {
    pub label: String,
    pub kind: CompanionKind,
}

pub struct PackRequest {
    pub base: EvalRequest,
    pub overlays: Vec<CompanionSpec>,
    pub panels: Vec<CompanionSpec>,
}

pub struct CompanionOutcome {
    pub label: String,
    pub result: Option<EngineResult>,
    pub error: Option<String>,
}

pub struct PackResult {
    pub base: EngineResult,
    pub overlays: Vec<CompanionOutcome>,
    pub panels: Vec<CompanionOutcome>,
}

/// Run the base expression, then every overlay and panel concurrently
/// against the cached base. Overlays and panels are merged back in the
/// order they were declared,
/// even though they may finish in any order.
pub async fn run_pack(engine: &Engine, req: PackRequest) -> Result<PackResult> {
    let base = evaluate(engine, &req.base).await?;
    let base_points = base.series[0].points.clone();

    let bar_size = req.base.bar_size;
    let overlays_fut = futures::future::join_all(
        req.overlays
            .iter()
            .map(|spec| run_companion(engine, &req.base, &base_points, bar_size, spec)),
    );
    let panels_fut = futures::future::join_all(
        req.panels
            .iter()
            .map(|spec| run_companion(engine, &req.base, &base_points, bar_size, spec)),
    );
    let (overlays, panels) = futures::future::join(overlays_fut, panels_fut).await;

    Ok(PackResult { base, overlays, panels })
}

async fn run_companion(
    engine: &Engine,
    base_req: &EvalRequest,
    base_points: &[Point],
    bar_size: BarSize,
    spec: &CompanionSpec,
) -> CompanionOutcome {
    let outcome = compute_companion(engine, base_req, base_points, bar_size, &spec.kind).await;
    match outcome {
        Ok(result) => CompanionOutcome { label: spec.label.clone(), result: Some(result), error: None },
        Err(message) => CompanionOutcome { label: spec.label.clone(), result: None, error: Some(message) },
    }
}

async fn compute_companion(
    engine: &Engine,
    base_req: &EvalRequest,
    base_points: &[Point],
    bar_size: BarSize,
    kind: &CompanionKind,
) -> std::result::Result<EngineResult, String> {
    match kind {
        CompanionKind::Invalid(message) => Err(message.clone()),
        CompanionKind::Bollinger { period, sigma } => {
            if *period == 0 {
                return Err("period must be greater than zero".into());
            }
            Ok(crate::indicators::bollinger_result(base_points, *period, *sigma))
        }
        CompanionKind::Sma { window } => {
            if *window == 0 {
                return Err("window must be greater than zero".into());
            }
            Ok(crate::indicators::ma_result(base_points, "sma", *window))
        }
        CompanionKind::Ema { window } => {
            if *window == 0 {
                return Err("window must be greater than zero".into());
            }
            Ok(crate::indicators::ma_result(base_points, "ema", *window))
        }
        CompanionKind::Rsi { period } => {
            if *period == 0 {
                return Err("period must be greater than zero".into());
            }
            Ok(crate::indicators::rsi_result(base_points, *period, rsi::Bands::Classic))
        }
        CompanionKind::Drawdown { window } => {
            let mode = match window {
                Some(w) if *w > 0 => drawdown::Mode::Rolling(*w),
                Some(_) => return Err("window must be greater than zero".into()),
                None => drawdown::Mode::Point,
            };
            Ok(crate::indicators::drawdown_result(base_points, mode))
        }
        CompanionKind::Sharpe { window } => {
            if *window < 2 {
                return Err("window must be at least two".into());
            }
            Ok(crate::indicators::sharpe_result(base_points, bar_size, *window))
        }
        CompanionKind::ZScore { window, levels } => {
            if *window < 2 {
                return Err("window must be at least two".into());
            }
            Ok(crate::indicators::zscore_result(base_points, *window, levels))
        }
        CompanionKind::VolumeProfile { bin_count, value_area_fraction } => {
            if *bin_count == 0 {
                return Err("bin_count must be greater than zero".into());
            }
            if !(0.0..=1.0).contains(value_area_fraction) {
                return Err("value_area_fraction must be between 0 and 1".into());
            }
            let ast = crate::expr::parse(&base_req.expr).map_err(|e| e.to_string())?;
            let leaves = ast.collect_leaves();
            let Some(leaf) = leaves.first() else {
                return Err("base expression has no leaf instrument for a volume profile".into());
            };
            let (_, bars) = engine
                .fetch_leaf(leaf, base_req.range, bar_size, base_req.use_rth)
                .await
                .map_err(|e| e.to_string())?;
            Ok(crate::indicators::volume_profile_result(&bars, *bin_count, *value_area_fraction))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::GridMode;
    use crate::bars::Range;
    use crate::upstream::FakeUpstream;
    use chrono::{TimeZone, Utc};

    fn base_request() -> EvalRequest {
        EvalRequest {
            expr: "EQ:SPY".into(),
            range: Range::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            )
            .unwrap(),
            bar_size: BarSize::OneDay,
            use_rth: false,
            grid_mode: GridMode::Union,
            include_gaps: false,
            norm: None,
            ccy: None,
        }
    }

    #[tokio::test]
    async fn healthy_pack_populates_base_and_companions() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let req = PackRequest {
            base: base_request(),
            overlays: vec![CompanionSpec {
                label: "bb".into(),
                kind: CompanionKind::Bollinger { period: 20, sigma: 2.0 },
            }],
            panels: vec![CompanionSpec { label: "rsi".into(), kind: CompanionKind::Rsi { period: 14 } }],
        };
        let result = run_pack(&engine, req).await.unwrap();
        assert!(!result.base.series[0].points.is_empty());
        assert!(result.overlays[0].result.is_some());
        assert!(result.panels[0].result.is_some());
    }

    #[tokio::test]
    async fn broken_panel_does_not_fail_the_pack() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let req = PackRequest {
            base: base_request(),
            overlays: vec![CompanionSpec {
                label: "bb".into(),
                kind: CompanionKind::Bollinger { period: 20, sigma: 2.0 },
            }],
            panels: vec![CompanionSpec { label: "rsi".into(), kind: CompanionKind::Rsi { period: 0 } }],
        };
        let result = run_pack(&engine, req).await.unwrap();
        assert!(!result.base.series[0].points.is_empty());
        assert!(result.overlays[0].result.is_some());
        assert!(result.panels[0].error.is_some());
    }
}
