//! Classification of a single backend attempt.
//!
//! # Design Decisions
//! - Timeout and connection failure are distinct outcomes; both count as
//!   server-side failures
//! - 4xx is the caller's problem: returned as-is, never retried, never
//!   charged to the backend

use std::time::Duration;

use axum::body::Body;
use axum::http::{Response, StatusCode};

use crate::http::upstream::UpstreamError;

/// What one attempt against one backend produced.
#[derive(Debug)]
pub enum Outcome {
    /// 1xx/2xx/3xx.
    Success(Response<Body>),
    /// 4xx.
    ClientError(Response<Body>),
    /// 5xx.
    ServerError(StatusCode),
    /// No response within the per-call deadline.
    Timeout(Duration),
    /// No response at all.
    Transport(UpstreamError),
}

impl Outcome {
    /// Classify the result of a deadline-bounded call.
    pub fn classify(
        result: Result<Result<Response<Body>, UpstreamError>, tokio::time::error::Elapsed>,
        deadline: Duration,
    ) -> Self {
        match result {
            Err(_) => Outcome::Timeout(deadline),
            Ok(Err(e)) => Outcome::Transport(e),
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_server_error() {
                    Outcome::ServerError(status)
                } else if status.is_client_error() {
                    Outcome::ClientError(response)
                } else {
                    Outcome::Success(response)
                }
            }
        }
    }

    /// Outcomes that warrant another attempt and count toward the breaker.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Outcome::ServerError(_) | Outcome::Timeout(_) | Outcome::Transport(_)
        )
    }

    /// Human-readable description for logs and error details.
    pub fn describe(&self) -> String {
        match self {
            Outcome::Success(r) => format!("success ({})", r.status()),
            Outcome::ClientError(r) => format!("client error ({})", r.status()),
            Outcome::ServerError(status) => format!("server error ({})", status),
            Outcome::Timeout(d) => format!("timed out after {}ms", d.as_millis()),
            Outcome::Transport(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> Response<Body> {
        Response::builder().status(status).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_classification() {
        let d = Duration::from_millis(50);
        assert!(matches!(Outcome::classify(Ok(Ok(response(200))), d), Outcome::Success(_)));
        assert!(matches!(Outcome::classify(Ok(Ok(response(302))), d), Outcome::Success(_)));
        assert!(matches!(Outcome::classify(Ok(Ok(response(404))), d), Outcome::ClientError(_)));
        assert!(matches!(
            Outcome::classify(Ok(Ok(response(503))), d),
            Outcome::ServerError(StatusCode::SERVICE_UNAVAILABLE)
        ));
        assert!(matches!(
            Outcome::classify(Ok(Err(UpstreamError::Transport("refused".into()))), d),
            Outcome::Transport(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct() {
        let d = Duration::from_millis(50);
        let elapsed = tokio::time::timeout(d, std::future::pending::<Result<Response<Body>, UpstreamError>>()).await;
        let outcome = Outcome::classify(elapsed, d);
        assert!(matches!(outcome, Outcome::Timeout(_)));
        assert!(outcome.is_retryable());
        assert_eq!(outcome.describe(), "timed out after 50ms");
    }

    #[test]
    fn test_retryable() {
        assert!(Outcome::ServerError(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!Outcome::ClientError(response(400)).is_retryable());
        assert!(!Outcome::Success(response(201)).is_retryable());
    }
}
