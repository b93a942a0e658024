//! Saga results and their HTTP rendering.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Header repeating the saga status on every saga response.
pub const SAGA_STATUS_HEADER: &str = "x-saga-status";

/// How a saga run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaOutcome {
    /// Both resources exist.
    Completed {
        primary_id: Value,
        dependent_id: Option<Value>,
        dependent: Value,
    },
    /// The primary resource was not created; nothing to undo.
    NotCreated {
        /// Upstream 4xx, passed through to the caller.
        status: Option<StatusCode>,
        detail: String,
    },
    /// The primary call succeeded but its reply carried no usable
    /// identifier. The resource may exist and cannot be compensated, so the
    /// dependent step was skipped.
    Uncompensable { detail: String },
    /// The dependent step failed and the primary was deleted.
    RolledBack {
        primary_id: Value,
        status: Option<StatusCode>,
        detail: String,
    },
    /// The dependent step failed and so did the compensating delete; the
    /// primary resource is orphaned.
    CompensationFailed { primary_id: Value, detail: String },
}

impl SagaOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SagaOutcome::Completed { .. } => "completed",
            SagaOutcome::NotCreated { .. } => "not_created",
            SagaOutcome::Uncompensable { .. } => "uncompensable",
            SagaOutcome::RolledBack { .. } => "rolled_back",
            SagaOutcome::CompensationFailed { .. } => "compensation_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SagaOutcome::Completed { .. } => StatusCode::CREATED,
            SagaOutcome::NotCreated { status, .. } | SagaOutcome::RolledBack { status, .. } => {
                status
                    .filter(StatusCode::is_client_error)
                    .unwrap_or(StatusCode::BAD_GATEWAY)
            }
            SagaOutcome::Uncompensable { .. } => StatusCode::BAD_GATEWAY,
            SagaOutcome::CompensationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        let status = self.label();
        match self {
            SagaOutcome::Completed {
                primary_id,
                dependent_id,
                dependent,
            } => json!({
                "status": status,
                "detail": "primary and dependent resources created",
                "primary_id": primary_id,
                "dependent_id": dependent_id,
                "dependent": dependent,
            }),
            SagaOutcome::NotCreated { detail, .. } | SagaOutcome::Uncompensable { detail } => json!({
                "status": status,
                "detail": detail,
            }),
            SagaOutcome::RolledBack {
                primary_id, detail, ..
            }
            | SagaOutcome::CompensationFailed { primary_id, detail } => json!({
                "status": status,
                "detail": detail,
                "primary_id": primary_id,
            }),
        }
    }
}

impl IntoResponse for SagaOutcome {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.body())).into_response();
        response
            .headers_mut()
            .insert(SAGA_STATUS_HEADER, HeaderValue::from_static(self.label()));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_created = SagaOutcome::NotCreated {
            status: Some(StatusCode::UNPROCESSABLE_ENTITY),
            detail: "bad train".into(),
        };
        assert_eq!(not_created.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let rolled_back = SagaOutcome::RolledBack {
            primary_id: json!(7),
            status: Some(StatusCode::SERVICE_UNAVAILABLE),
            detail: "lobby down".into(),
        };
        assert_eq!(rolled_back.status_code(), StatusCode::BAD_GATEWAY);

        let orphaned = SagaOutcome::CompensationFailed {
            primary_id: json!(7),
            detail: "delete failed".into(),
        };
        assert_eq!(orphaned.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let unidentified = SagaOutcome::Uncompensable {
            detail: "no id".into(),
        };
        assert_eq!(unidentified.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(unidentified.body()["status"], "uncompensable");
    }

    #[test]
    fn test_response_header_and_body() {
        let outcome = SagaOutcome::RolledBack {
            primary_id: json!(7),
            status: None,
            detail: "lobby down".into(),
        };
        assert_eq!(outcome.body()["status"], "rolled_back");
        assert_eq!(outcome.body()["primary_id"], 7);

        let response = outcome.into_response();
        assert_eq!(response.headers()[SAGA_STATUS_HEADER], "rolled_back");
    }
}
