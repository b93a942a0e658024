//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from backend responses
//! - Render gateway errors as JSON `{error, detail}`
//!
//! # Design Decisions
//! - Backend bodies stream through unbuffered
//! - Backend 4xx/5xx that reach the caller are passed through untouched

use axum::body::Body;
use axum::http::Response as HttpResponse;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;
use crate::http::request::strip_hop_by_hop;

/// Prepare a backend response for the client.
pub fn from_backend(mut response: HttpResponse<Body>) -> Response {
    strip_hop_by_hop(response.headers_mut());
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.kind(),
            "detail": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
