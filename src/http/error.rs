//! Maps the crate's [`Error`] taxonomy onto HTTP status codes and the two
//! JSON error shapes the contract distinguishes: `{"detail":{"error":{...}}}`
//! for 400-class client errors, `{"error":{...}}` for everything else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, ErrorKind};

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ClientErrorEnvelope {
    detail: ClientErrorDetail,
}

#[derive(Serialize)]
struct ClientErrorDetail {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match (self.kind(), &self) {
            (ErrorKind::Client, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::Resolution, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::Upstream, Error::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            (ErrorKind::Upstream, _) => StatusCode::SERVICE_UNAVAILABLE,
            (ErrorKind::Internal, _) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody { kind: self.tag(), message: self.to_string() };
        if status == StatusCode::BAD_REQUEST {
            (status, Json(ClientErrorEnvelope { detail: ClientErrorDetail { error: body } })).into_response()
        } else {
            (status, Json(ErrorEnvelope { error: body })).into_response()
        }
    }
}
