//! The HTTP transport: a thin `axum` adapter in front of the expression
//! engine, indicator library, seasonality engine, and orchestrator. Not a
//! design collaborator in its own right — every handler here exists only
//! to parse a request, call into the core, and project an [`EngineResult`]
//! onto the chart contract.

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::router;
