//! Builds the `axum::Router` for every endpoint, one handler function per
//! route, sharing one [`Engine`] as `axum::State`.

use axum::routing::{get, post};
use axum::Router;

use crate::engine::Engine;

use super::handlers;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/expr/series", post(handlers::series))
        .route("/expr/chart", post(handlers::chart))
        .route("/expr/ma", post(handlers::ma))
        .route("/expr/bollinger", post(handlers::bollinger))
        .route("/expr/rsi", post(handlers::rsi))
        .route("/expr/drawdown", post(handlers::drawdown))
        .route("/expr/sharpe", post(handlers::sharpe))
        .route("/expr/zscore", post(handlers::zscore))
        .route("/expr/corr", post(handlers::corr))
        .route("/expr/seasonality/years", post(handlers::seasonality_years))
        .route("/expr/seasonality/heatmap", post(handlers::seasonality_heatmap))
        .route("/data/ohlcv", post(handlers::ohlcv))
        .route("/expr/pack", post(handlers::pack))
        .with_state(engine)
}
