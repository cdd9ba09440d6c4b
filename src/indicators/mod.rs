//! Technical indicator library. Each function below operates on
//! a caller-supplied base series (typically the output of
//! [`crate::expr::evaluate`]) and returns a chart-shaped [`EngineResult`].
//! Insufficient data never errors: the result carries a short or empty
//! series plus a `warning` string.

pub mod bollinger;
pub mod correlation;
pub mod drawdown;
pub mod moving_average;
pub mod rsi;
pub mod sharpe;
pub mod volume_profile;
pub mod zscore;

use crate::bars::{Bar, BarSize};
use crate::series::{EngineResult, Point, ResultKind, Series};

fn warning_if_too_short(points: &[Point], window: usize) -> Option<String> {
    if points.len() < window {
        Some(format!(
            "only {} points available, indicator window is {window}",
            points.len()
        ))
    } else {
        None
    }
}

pub fn ma_result(points: &[Point], ma: &str, window: usize) -> EngineResult {
    let series = match ma {
        "ema" => moving_average::ema(points, window),
        _ => moving_average::sma(points, window),
    };
    let label = format!("{}({window})", ma.to_uppercase());
    EngineResult {
        kind: ResultKind::Indicator,
        label: label.clone(),
        series: vec![Series { label, points: series }],
        tables: None,
        warning: warning_if_too_short(points, window),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn bollinger_result(points: &[Point], period: usize, sigma: f64) -> EngineResult {
    let bands = bollinger::bollinger(points, period, sigma);
    EngineResult {
        kind: ResultKind::Indicator,
        label: format!("Bollinger({period},{sigma})"),
        series: vec![bands.mid, bands.upper, bands.lower],
        tables: None,
        warning: warning_if_too_short(points, period),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn rsi_result(points: &[Point], period: usize, bands: rsi::Bands) -> EngineResult {
    let result = rsi::rsi(points, period, bands);
    let mut series = vec![result.rsi];
    if let Some(s) = result.overbought {
        series.push(s);
    }
    if let Some(s) = result.oversold {
        series.push(s);
    }
    EngineResult {
        kind: ResultKind::Indicator,
        label: format!("RSI({period})"),
        series,
        tables: None,
        warning: warning_if_too_short(points, period + 1),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn drawdown_result(points: &[Point], mode: drawdown::Mode) -> EngineResult {
    let series = drawdown::drawdown(points, mode);
    EngineResult {
        kind: ResultKind::Indicator,
        label: "Drawdown".into(),
        series: vec![series],
        tables: None,
        warning: None,
        back_adjusted: false,
        rolled: false,
    }
}

pub fn sharpe_result(points: &[Point], bar_size: BarSize, window: usize) -> EngineResult {
    let series = sharpe::sharpe(points, bar_size, window);
    EngineResult {
        kind: ResultKind::Indicator,
        label: format!("Sharpe({window})"),
        series: vec![series],
        tables: None,
        warning: warning_if_too_short(points, window),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn zscore_result(points: &[Point], window: usize, levels: &[f64]) -> EngineResult {
    let result = zscore::zscore(points, window, levels);
    let mut series = vec![result.zscore];
    series.extend(result.levels);
    EngineResult {
        kind: ResultKind::Indicator,
        label: format!("ZScore({window})"),
        series,
        tables: None,
        warning: warning_if_too_short(points, window),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn correlation_result(a: &[Point], b: &[Point], ret_horizon: usize, window: usize) -> EngineResult {
    let series = correlation::correlation(a, b, ret_horizon, window);
    EngineResult {
        kind: ResultKind::Indicator,
        label: format!("Corr({ret_horizon},{window})"),
        series: vec![series],
        tables: None,
        warning: warning_if_too_short(a, window + ret_horizon),
        back_adjusted: false,
        rolled: false,
    }
}

pub fn volume_profile_result(bars: &[Bar], bin_count: usize, value_area_fraction: f64) -> EngineResult {
    let Some(profile) = volume_profile::volume_profile(bars, bin_count, value_area_fraction) else {
        return EngineResult {
            kind: ResultKind::Table,
            label: "VolumeProfile".into(),
            series: vec![],
            tables: None,
            warning: Some("no bars available to build a volume profile".into()),
            back_adjusted: false,
            rolled: false,
        };
    };

    let rows: Vec<serde_json::Value> = profile
        .bin_centers
        .iter()
        .zip(profile.volumes.iter())
        .zip(profile.cumulative.iter())
        .map(|((center, volume), cumulative)| {
            serde_json::json!({ "price": center, "volume": volume, "cumulative": cumulative })
        })
        .collect();

    let mut tables = std::collections::HashMap::new();
    tables.insert("profile".to_owned(), crate::series::Table::Rows(rows));
    tables.insert(
        "value_area".to_owned(),
        crate::series::Table::Value(serde_json::json!({
            "low": profile.value_area_low,
            "high": profile.value_area_high,
        })),
    );

    EngineResult {
        kind: ResultKind::Table,
        label: "VolumeProfile".into(),
        series: vec![],
        tables: Some(tables),
        warning: None,
        back_adjusted: false,
        rolled: false,
    }
}
