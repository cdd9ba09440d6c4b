use chrono::{TimeZone, Utc};

use quantdesk::align::GridMode;
use quantdesk::bars::{BarSize, Range};
use quantdesk::engine::Engine;
use quantdesk::expr::{evaluate, EvalRequest};
use quantdesk::indicators;
use quantdesk::seasonality::{heatmap, years};
use quantdesk::series::Table;
use quantdesk::upstream::FakeUpstream;

fn eval_request() -> EvalRequest {
    EvalRequest {
        expr: "EQ:SPY".to_owned(),
        range: Range::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
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
async fn bollinger_bands_bracket_mid_by_sigma_times_stdev() {
    let engine = Engine::with_fake_upstream(FakeUpstream::new());
    let base = evaluate(&engine, &eval_request()).await.unwrap();
    let result = indicators::bollinger_result(&base.series[0].points, 20, 2.0);
    let (mid, upper, lower) = (&result.series[0], &result.series[1], &result.series[2]);
    for i in 0..mid.points.len() {
        if let (Some(m), Some(u), Some(l)) = (mid.points[i].v, upper.points[i].v, lower.points[i].v) {
            assert!((u - m - (m - l)).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn rsi_defined_values_stay_in_bounds_over_a_long_series() {
    let engine = Engine::with_fake_upstream(FakeUpstream::new());
    let base = evaluate(&engine, &eval_request()).await.unwrap();
    let result = indicators::rsi_result(&base.series[0].points, 14, indicators::rsi::Bands::Classic);
    for p in &result.series[0].points {
        if let Some(v) = p.v {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}

#[tokio::test]
async fn point_drawdown_is_never_positive_and_starts_at_zero() {
    let engine = Engine::with_fake_upstream(FakeUpstream::new());
    let base = evaluate(&engine, &eval_request()).await.unwrap();
    let result = indicators::drawdown_result(&base.series[0].points, indicators::drawdown::Mode::Point);
    let points = &result.series[0].points;
    assert_eq!(points[0].v, Some(0.0));
    assert!(points.iter().all(|p| p.v.unwrap_or(0.0) <= 1e-9));
}

#[tokio::test]
async fn seasonality_years_excludes_sparse_years_from_bands() {
    let engine = Engine::with_fake_upstream(FakeUpstream::new());
    let base = evaluate(&engine, &eval_request()).await.unwrap();
    let result = years::years(years::YearsRequest {
        points: &base.series[0].points,
        years: &[2020, 2021, 2022, 2023],
        rebase_pct: true,
        min_points_per_year: 200,
    });
    assert_eq!(result.series.len(), 4 + 4); // one curve per year plus mean/p0/p50/p100
}

#[tokio::test]
async fn seasonality_heatmap_reports_one_row_per_populated_month() {
    let engine = Engine::with_fake_upstream(FakeUpstream::new());
    let base = evaluate(&engine, &eval_request()).await.unwrap();
    let result = heatmap::heatmap(&base.series[0].points, heatmap::Bucket::Month, 5);
    let Some(Table::Rows(cells)) = result.tables.as_ref().unwrap().get("cells") else {
        panic!("expected a cells table");
    };
    assert!(!cells.is_empty());
    assert!(cells.len() <= 12 * 4);
}
