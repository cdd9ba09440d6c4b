//! One handler per endpoint, each parsing a request body,
//! delegating to the expression engine / indicator library / seasonality
//! engine / orchestrator, and projecting the result onto the chart contract.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::align::GridMode;
use crate::bars::{BarSize, DurationToken, Range};
use crate::currency::Currency;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::expr::{self, EvalRequest, Norm};
use crate::indicators::{self, drawdown, rsi};
use crate::orchestrator::{self, CompanionKind, CompanionSpec, PackRequest};
use crate::seasonality::{heatmap, years};
use crate::series::{ChartContract, ChartMeta, EngineResult, RangeMeta};

/// Fields shared by every `/expr/*` endpoint.
#[derive(Debug, Deserialize)]
pub struct BaseRequest {
    pub expr: String,
    pub duration: String,
    pub bar_size: String,
    #[serde(default)]
    pub use_rth: bool,
    #[serde(default)]
    pub grid: Option<String>,
    #[serde(default)]
    pub include_gaps: bool,
    #[serde(default)]
    pub norm: Option<f64>,
    #[serde(default)]
    pub ccy: Option<String>,
}

impl BaseRequest {
    fn range(&self) -> Result<Range> {
        let duration: DurationToken = self.duration.parse()?;
        duration.resolve(Utc::now())
    }

    fn bar_size(&self) -> Result<BarSize> {
        self.bar_size.parse()
    }

    fn grid_mode(&self) -> Result<GridMode> {
        match self.grid.as_deref() {
            None | Some("union") => Ok(GridMode::Union),
            Some("intersection") => Ok(GridMode::Intersection),
            Some(other) => Err(Error::UnsupportedParameter(format!("unknown grid mode {other}"))),
        }
    }

    fn ccy(&self) -> Result<Option<Currency>> {
        self.ccy.as_deref().map(str::parse).transpose()
    }

    fn norm(&self) -> Option<Norm> {
        self.norm.map(|k| if k == 0.0 { Norm::Percent } else { Norm::IndexTo(k) })
    }

    fn eval_request(&self) -> Result<EvalRequest> {
        Ok(EvalRequest {
            expr: self.expr.clone(),
            range: self.range()?,
            bar_size: self.bar_size()?,
            use_rth: self.use_rth,
            grid_mode: self.grid_mode()?,
            include_gaps: self.include_gaps,
            norm: self.norm(),
            ccy: self.ccy()?,
        })
    }
}

fn meta_for(req: &BaseRequest, range: Range, bar_size: BarSize) -> ChartMeta {
    ChartMeta {
        bar_size,
        use_rth: req.use_rth,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    }
}

async fn evaluate_base(engine: &Engine, req: &BaseRequest) -> Result<(EngineResult, Range, BarSize)> {
    let eval_req = req.eval_request()?;
    let range = eval_req.range;
    let bar_size = eval_req.bar_size;
    let result = expr::evaluate(engine, &eval_req).await?;
    Ok((result, range, bar_size))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn series(
    State(engine): State<Engine>,
    Json(req): Json<BaseRequest>,
) -> Result<Json<ChartContract>> {
    let (result, range, bar_size) = evaluate_base(&engine, &req).await?;
    Ok(Json(result.into_contract(req.expr.clone(), meta_for(&req, range, bar_size))))
}

pub async fn chart(
    State(engine): State<Engine>,
    Json(req): Json<BaseRequest>,
) -> Result<Json<ChartContract>> {
    series(State(engine), Json(req)).await
}

#[derive(Debug, Deserialize)]
pub struct MaRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub ma: String,
    pub window: usize,
}

pub async fn ma(State(engine): State<Engine>, Json(req): Json<MaRequest>) -> Result<Json<ChartContract>> {
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::ma_result(points, &req.ma, req.window);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct BollingerRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub period: usize,
    pub sigma: f64,
}

pub async fn bollinger(
    State(engine): State<Engine>,
    Json(req): Json<BollingerRequest>,
) -> Result<Json<ChartContract>> {
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::bollinger_result(points, req.period, req.sigma);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct RsiRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub period: usize,
    #[serde(default = "default_bands")]
    pub bands: String,
}

fn default_bands() -> String {
    "classic".to_owned()
}

pub async fn rsi(State(engine): State<Engine>, Json(req): Json<RsiRequest>) -> Result<Json<ChartContract>> {
    let bands = match req.bands.as_str() {
        "classic" => rsi::Bands::Classic,
        "none" => rsi::Bands::None,
        other => return Err(Error::UnsupportedParameter(format!("unknown rsi bands {other}"))),
    };
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::rsi_result(points, req.period, bands);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct DrawdownRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    #[serde(default = "default_drawdown_mode")]
    pub mode: String,
    #[serde(default)]
    pub rolling_window: Option<usize>,
}

fn default_drawdown_mode() -> String {
    "point".to_owned()
}

pub async fn drawdown(
    State(engine): State<Engine>,
    Json(req): Json<DrawdownRequest>,
) -> Result<Json<ChartContract>> {
    let mode = match req.mode.as_str() {
        "point" => drawdown::Mode::Point,
        "rolling" => drawdown::Mode::Rolling(req.rolling_window.ok_or_else(|| {
            Error::UnsupportedParameter("rolling drawdown requires rolling_window".into())
        })?),
        other => return Err(Error::UnsupportedParameter(format!("unknown drawdown mode {other}"))),
    };
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::drawdown_result(points, mode);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct SharpeRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub window: usize,
}

pub async fn sharpe(
    State(engine): State<Engine>,
    Json(req): Json<SharpeRequest>,
) -> Result<Json<ChartContract>> {
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::sharpe_result(points, bar_size, req.window);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct ZScoreRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub window: usize,
    #[serde(default)]
    pub levels: Vec<f64>,
}

pub async fn zscore(
    State(engine): State<Engine>,
    Json(req): Json<ZScoreRequest>,
) -> Result<Json<ChartContract>> {
    let (base_result, range, bar_size) = evaluate_base(&engine, &req.base).await?;
    let points = &base_result.series[0].points;
    let result = indicators::zscore_result(points, req.window, &req.levels);
    Ok(Json(result.into_contract(req.base.expr.clone(), meta_for(&req.base, range, bar_size))))
}

#[derive(Debug, Deserialize)]
pub struct CorrRequest {
    pub a: String,
    pub b: String,
    pub duration: String,
    pub bar_size: String,
    #[serde(default)]
    pub use_rth: bool,
    pub ret_horizon: usize,
    pub window: usize,
}

pub async fn corr(State(engine): State<Engine>, Json(req): Json<CorrRequest>) -> Result<Json<ChartContract>> {
    let duration: DurationToken = req.duration.parse()?;
    let range = duration.resolve(Utc::now())?;
    let bar_size: BarSize = req.bar_size.parse()?;
    let eval_a = EvalRequest {
        expr: req.a.clone(),
        range,
        bar_size,
        use_rth: req.use_rth,
        grid_mode: GridMode::Intersection,
        include_gaps: false,
        norm: None,
        ccy: None,
    };
    let eval_b = EvalRequest {
        expr: req.b.clone(),
        range,
        bar_size,
        use_rth: req.use_rth,
        grid_mode: GridMode::Intersection,
        include_gaps: false,
        norm: None,
        ccy: None,
    };
    let (result_a, result_b) = tokio::try_join!(expr::evaluate(&engine, &eval_a), expr::evaluate(&engine, &eval_b))?;

    // The two expressions are evaluated independently and may not share one
    // timestamp index; inner-join them on `t` before correlating.
    let b_by_t: HashMap<_, _> = result_b.series[0].points.iter().map(|p| (p.t, p.v)).collect();
    let mut a_points = Vec::new();
    let mut b_points = Vec::new();
    for p in &result_a.series[0].points {
        if let Some(&bv) = b_by_t.get(&p.t) {
            a_points.push(*p);
            b_points.push(crate::series::Point { t: p.t, v: bv });
        }
    }

    let series = indicators::correlation_result(&a_points, &b_points, req.ret_horizon, req.window);
    let meta = ChartMeta {
        bar_size,
        use_rth: req.use_rth,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    };
    Ok(Json(series.into_contract(format!("corr({},{})", req.a, req.b), meta)))
}

#[derive(Debug, Deserialize)]
pub struct SeasonalityYearsRequest {
    pub expr: String,
    pub bar_size: String,
    #[serde(default)]
    pub use_rth: bool,
    pub years: Vec<i32>,
    #[serde(default)]
    pub rebase: bool,
    #[serde(default = "default_min_points")]
    pub min_points_per_year: usize,
}

fn default_min_points() -> usize {
    30
}

pub async fn seasonality_years(
    State(engine): State<Engine>,
    Json(req): Json<SeasonalityYearsRequest>,
) -> Result<Json<ChartContract>> {
    let bar_size: BarSize = req.bar_size.parse()?;
    let Some(&first) = req.years.iter().min() else {
        return Err(Error::UnsupportedParameter("years must not be empty".into()));
    };
    let Some(&last) = req.years.iter().max() else {
        return Err(Error::UnsupportedParameter("years must not be empty".into()));
    };
    let range = Range::new(
        chrono::Utc.with_ymd_and_hms(first, 1, 1, 0, 0, 0).single().ok_or(Error::EmptyRange)?,
        chrono::Utc.with_ymd_and_hms(last + 1, 1, 1, 0, 0, 0).single().ok_or(Error::EmptyRange)?,
    )?;
    let eval_req = EvalRequest {
        expr: req.expr.clone(),
        range,
        bar_size,
        use_rth: req.use_rth,
        grid_mode: GridMode::Union,
        include_gaps: false,
        norm: None,
        ccy: None,
    };
    let base_result = expr::evaluate(&engine, &eval_req).await?;
    let result = years::years(years::YearsRequest {
        points: &base_result.series[0].points,
        years: &req.years,
        rebase_pct: req.rebase,
        min_points_per_year: req.min_points_per_year,
    });
    let meta = ChartMeta {
        bar_size,
        use_rth: req.use_rth,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    };
    Ok(Json(result.into_contract(req.expr, meta)))
}

#[derive(Debug, Deserialize)]
pub struct SeasonalityHeatmapRequest {
    pub expr: String,
    pub bar_size: String,
    #[serde(default)]
    pub use_rth: bool,
    pub bucket: String,
    pub years: Vec<i32>,
    #[serde(default = "default_min_points")]
    pub min_points_per_bucket: usize,
}

pub async fn seasonality_heatmap(
    State(engine): State<Engine>,
    Json(req): Json<SeasonalityHeatmapRequest>,
) -> Result<Json<ChartContract>> {
    let bucket = match req.bucket.as_str() {
        "month" => heatmap::Bucket::Month,
        "week" => heatmap::Bucket::IsoWeek,
        other => return Err(Error::UnsupportedParameter(format!("unknown bucket {other}"))),
    };
    let bar_size: BarSize = req.bar_size.parse()?;
    let Some(&first) = req.years.iter().min() else {
        return Err(Error::UnsupportedParameter("years must not be empty".into()));
    };
    let Some(&last) = req.years.iter().max() else {
        return Err(Error::UnsupportedParameter("years must not be empty".into()));
    };
    let range = Range::new(
        chrono::Utc.with_ymd_and_hms(first, 1, 1, 0, 0, 0).single().ok_or(Error::EmptyRange)?,
        chrono::Utc.with_ymd_and_hms(last + 1, 1, 1, 0, 0, 0).single().ok_or(Error::EmptyRange)?,
    )?;
    let eval_req = EvalRequest {
        expr: req.expr.clone(),
        range,
        bar_size,
        use_rth: req.use_rth,
        grid_mode: GridMode::Union,
        include_gaps: false,
        norm: None,
        ccy: None,
    };
    let base_result = expr::evaluate(&engine, &eval_req).await?;
    let result = heatmap::heatmap(&base_result.series[0].points, bucket, req.min_points_per_bucket);
    let meta = ChartMeta {
        bar_size,
        use_rth: req.use_rth,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    };
    Ok(Json(result.into_contract(req.expr, meta)))
}

#[derive(Debug, Deserialize)]
pub struct OhlcvRequest {
    pub symbol: String,
    pub resolution: String,
    pub range: String,
    #[serde(default = "default_true")]
    pub include_volume: bool,
    #[serde(default)]
    pub max_bars: Option<usize>,
}

fn default_true() -> bool {
    true
}

pub async fn ohlcv(State(engine): State<Engine>, Json(req): Json<OhlcvRequest>) -> Result<Json<ChartContract>> {
    let symbol: crate::symbol::Symbol = req.symbol.parse()?;
    let duration: DurationToken = req.range.parse()?;
    let range = duration.resolve(Utc::now())?;
    let bar_size: BarSize = req.resolution.parse()?;
    let (_, mut bars) = engine.fetch_leaf(&symbol, range, bar_size, false).await?;
    if let Some(max) = req.max_bars {
        if bars.len() > max {
            bars = bars.split_off(bars.len() - max);
        }
    }
    let mut points = Vec::with_capacity(bars.len());
    for bar in &bars {
        points.push(crate::series::Point { t: bar.t, v: Some(bar.close) });
    }
    let volume_points: Vec<crate::series::Point> = if req.include_volume {
        bars.iter().map(|b| crate::series::Point { t: b.t, v: Some(b.volume) }).collect()
    } else {
        Vec::new()
    };
    let mut series = vec![crate::series::Series { label: symbol.to_string(), points }];
    if req.include_volume {
        series.push(crate::series::Series { label: "volume".into(), points: volume_points });
    }
    let meta = ChartMeta {
        bar_size,
        use_rth: false,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    };
    Ok(Json(ChartContract { label: symbol.to_string(), expr: symbol.to_string(), meta, series, tables: None }))
}

#[derive(Debug, Deserialize)]
pub struct PackCompanionSpec {
    pub label: Option<String>,
    pub kind: String,
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PackHttpRequest {
    pub base: String,
    pub duration: String,
    pub bar_size: String,
    #[serde(default)]
    pub use_rth: bool,
    #[serde(default)]
    pub overlays: Vec<PackCompanionSpec>,
    #[serde(default)]
    pub panels: Vec<PackCompanionSpec>,
}

#[derive(Debug, Serialize)]
pub struct PackCompanionResponse {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ChartContract>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PackResponse {
    pub base: ChartContract,
    pub overlays: Vec<PackCompanionResponse>,
    pub panels: Vec<PackCompanionResponse>,
}

fn param_f64(spec: &PackCompanionSpec, key: &str) -> Result<f64> {
    spec.params
        .get(key)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| Error::UnsupportedParameter(format!("{} requires numeric {key}", spec.kind)))
}

fn param_usize(spec: &PackCompanionSpec, key: &str) -> Result<usize> {
    Ok(param_f64(spec, key)? as usize)
}

fn companion_kind(spec: &PackCompanionSpec) -> Result<CompanionKind> {
    Ok(match spec.kind.as_str() {
        "bollinger" => CompanionKind::Bollinger { period: param_usize(spec, "period")?, sigma: param_f64(spec, "sigma")? },
        "sma" => CompanionKind::Sma { window: param_usize(spec, "window")? },
        "ema" => CompanionKind::Ema { window: param_usize(spec, "window")? },
        "rsi" => CompanionKind::Rsi { period: param_usize(spec, "period")? },
        "drawdown" => CompanionKind::Drawdown { window: param_usize(spec, "window").ok() },
        "sharpe" => CompanionKind::Sharpe { window: param_usize(spec, "window")? },
        "zscore" => {
            let levels = spec
                .params
                .get("levels")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(serde_json::Value::as_f64).collect())
                .unwrap_or_default();
            CompanionKind::ZScore { window: param_usize(spec, "window")?, levels }
        }
        "volume" | "volume_profile" => CompanionKind::VolumeProfile {
            bin_count: param_usize(spec, "bin_count").unwrap_or(24),
            value_area_fraction: param_f64(spec, "value_area_fraction").unwrap_or(0.7),
        },
        other => return Err(Error::UnsupportedParameter(format!("unknown companion kind {other}"))),
    })
}

pub async fn pack(State(engine): State<Engine>, Json(req): Json<PackHttpRequest>) -> Result<Json<PackResponse>> {
    let duration: DurationToken = req.duration.parse()?;
    let range = duration.resolve(Utc::now())?;
    let bar_size: BarSize = req.bar_size.parse()?;

    let to_companion_spec = |spec: &PackCompanionSpec| -> CompanionSpec {
        let label = spec.label.clone().unwrap_or_else(|| spec.kind.clone());
        let kind = companion_kind(spec).unwrap_or_else(|e| CompanionKind::Invalid(e.to_string()));
        CompanionSpec { label, kind }
    };

    let pack_req = PackRequest {
        base: EvalRequest {
            expr: req.base.clone(),
            range,
            bar_size,
            use_rth: req.use_rth,
            grid_mode: GridMode::Union,
            include_gaps: false,
            norm: None,
            ccy: None,
        },
        overlays: req.overlays.iter().map(to_companion_spec).collect(),
        panels: req.panels.iter().map(to_companion_spec).collect(),
    };

    let base_meta = ChartMeta {
        bar_size,
        use_rth: req.use_rth,
        range: RangeMeta { start: range.start, end: range.end },
        adjustment: None,
        roll_offset_days: None,
        warning: None,
    };

    let result = orchestrator::run_pack(&engine, pack_req).await?;

    let project = |outcome: orchestrator::CompanionOutcome| PackCompanionResponse {
        label: outcome.label,
        result: outcome.result.map(|r| r.into_contract(req.base.clone(), base_meta_clone(&base_meta))),
        error: outcome.error,
    };

    Ok(Json(PackResponse {
        base: result.base.into_contract(req.base.clone(), base_meta_clone(&base_meta)),
        overlays: result.overlays.into_iter().map(project).collect(),
        panels: result.panels.into_iter().map(project).collect(),
    }))
}

fn base_meta_clone(meta: &ChartMeta) -> ChartMeta {
    ChartMeta {
        bar_size: meta.bar_size,
        use_rth: meta.use_rth,
        range: RangeMeta { start: meta.range.start, end: meta.range.end },
        adjustment: meta.adjustment,
        roll_offset_days: meta.roll_offset_days,
        warning: meta.warning.clone(),
    }
}
