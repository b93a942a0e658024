//! Saga execution.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::SagaConfig;
use crate::error::GatewayError;
use crate::http::upstream::UpstreamRequest;
use crate::observability::{metrics, LoadMonitor};
use crate::resilience::Forwarder;
use crate::saga::outcome::SagaOutcome;

/// Body of a saga request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SagaRequest {
    /// Payload for the primary create call.
    pub primary: Value,
    /// Extra fields for the dependent create call; the reference field is
    /// added by the saga.
    pub dependent: Value,
}

/// State of one saga run.
#[derive(Debug, Clone)]
pub struct SagaContext {
    pub primary_service: String,
    pub dependent_service: String,
    /// Identifier of the created primary resource, once known.
    pub primary_id: Option<Value>,
    /// Target of the compensating delete, once known.
    pub compensation_path: Option<String>,
}

/// Runs the primary/dependent creation pair.
pub struct Saga {
    forwarder: Arc<Forwarder>,
    config: SagaConfig,
    body_limit: usize,
    monitor: Option<LoadMonitor>,
}

impl Saga {
    pub fn new(forwarder: Arc<Forwarder>, config: SagaConfig, body_limit: usize) -> Self {
        Self {
            forwarder,
            config,
            body_limit,
            monitor: None,
        }
    }

    /// Count every step call against its service's load.
    pub fn with_monitor(mut self, monitor: LoadMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Run the saga. `headers` are sent with every step.
    pub async fn run(&self, request: SagaRequest, headers: HeaderMap) -> SagaOutcome {
        let mut ctx = SagaContext {
            primary_service: self.config.primary_service.clone(),
            dependent_service: self.config.dependent_service.clone(),
            primary_id: None,
            compensation_path: None,
        };

        let outcome = self.execute(&mut ctx, request, &headers).await;
        metrics::record_saga(outcome.label());
        match &outcome {
            SagaOutcome::Completed { primary_id, .. } => {
                tracing::info!(primary_id = %primary_id, "Saga completed");
            }
            SagaOutcome::NotCreated { detail, .. } => {
                tracing::warn!(service = %ctx.primary_service, detail = %detail, "Saga primary step failed");
            }
            SagaOutcome::Uncompensable { detail } => {
                tracing::error!(service = %ctx.primary_service, detail = %detail, "Saga primary step unconfirmed");
            }
            SagaOutcome::RolledBack {
                primary_id, detail, ..
            } => {
                tracing::warn!(primary_id = %primary_id, detail = %detail, "Saga rolled back");
            }
            SagaOutcome::CompensationFailed { primary_id, detail } => {
                tracing::error!(
                    primary_id = %primary_id,
                    path = ?ctx.compensation_path,
                    detail = %detail,
                    "Saga compensation failed, primary resource orphaned"
                );
            }
        }
        outcome
    }

    async fn execute(
        &self,
        ctx: &mut SagaContext,
        request: SagaRequest,
        headers: &HeaderMap,
    ) -> SagaOutcome {
        // Step 1: primary.
        let create = UpstreamRequest::new(Method::POST, self.config.primary_path.as_str())
            .with_headers(headers.clone())
            .with_json(&request.primary);
        let body = match self.call(&ctx.primary_service, &create).await {
            Ok(body) => body,
            Err(failure) => {
                return SagaOutcome::NotCreated {
                    status: failure.status,
                    detail: failure.detail,
                }
            }
        };
        let Some(primary_id) = extract_id(&body) else {
            return SagaOutcome::Uncompensable {
                detail: format!(
                    "{} accepted the create but returned no identifier; the resource may exist and cannot be rolled back",
                    ctx.primary_service
                ),
            };
        };
        let Some(segment) = id_segment(&primary_id) else {
            return SagaOutcome::Uncompensable {
                detail: format!(
                    "{} returned unusable identifier {}; the resource may exist and cannot be rolled back",
                    ctx.primary_service, primary_id
                ),
            };
        };
        ctx.primary_id = Some(primary_id.clone());
        ctx.compensation_path = Some(format!(
            "{}/{}",
            self.config.primary_path.trim_end_matches('/'),
            segment
        ));

        // Step 2: dependent, referencing the primary.
        let mut payload = match request.dependent {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.insert(self.config.reference_field.clone(), primary_id.clone());
        let create = UpstreamRequest::new(Method::POST, self.config.dependent_path.as_str())
            .with_headers(headers.clone())
            .with_json(&Value::Object(payload));

        let failure = match self.call(&ctx.dependent_service, &create).await {
            Ok(dependent) => {
                return SagaOutcome::Completed {
                    primary_id,
                    dependent_id: extract_id(&dependent),
                    dependent,
                }
            }
            Err(failure) => failure,
        };

        // Compensate.
        let path = ctx
            .compensation_path
            .clone()
            .unwrap_or_else(|| self.config.primary_path.clone());
        tracing::info!(
            service = %ctx.primary_service,
            path = %path,
            reason = %failure.detail,
            "Compensating saga primary step"
        );
        let delete = UpstreamRequest::new(Method::DELETE, path).with_headers(headers.clone());
        match self.call(&ctx.primary_service, &delete).await {
            Ok(_) => SagaOutcome::RolledBack {
                primary_id,
                status: failure.status,
                detail: failure.detail,
            },
            Err(compensation) => SagaOutcome::CompensationFailed {
                primary_id,
                detail: format!(
                    "{}; compensation failed: {}",
                    failure.detail, compensation.detail
                ),
            },
        }
    }

    /// One forwarded call; any non-2xx or orchestrator error is a failure.
    async fn call(
        &self,
        service: &str,
        request: &UpstreamRequest,
    ) -> Result<Value, StepFailure> {
        if let Some(monitor) = &self.monitor {
            monitor.record(service).await;
        }
        let response = self
            .forwarder
            .forward(service, request)
            .await
            .map_err(|e| StepFailure::from_error(service, e))?;

        let status = response.status();
        let body = self.read_json(response).await;
        if status.is_success() {
            Ok(body)
        } else {
            Err(StepFailure {
                status: Some(status),
                detail: format!("{} answered {}: {}", service, status, body),
            })
        }
    }

    async fn read_json(&self, response: Response<Body>) -> Value {
        match to_bytes(response.into_body(), self.body_limit).await {
            Ok(bytes) if bytes.is_empty() => Value::Null,
            Ok(bytes) => serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read saga step response body");
                Value::Null
            }
        }
    }
}

struct StepFailure {
    status: Option<StatusCode>,
    detail: String,
}

impl StepFailure {
    fn from_error(service: &str, e: GatewayError) -> Self {
        Self {
            status: None,
            detail: format!("{}: {}", service, e),
        }
    }
}

/// Identifier of a created resource: a bare number or string, or the `id` /
/// `_id` field of an object.
pub fn extract_id(body: &Value) -> Option<Value> {
    match body {
        Value::Number(_) => Some(body.clone()),
        Value::String(s) if !s.is_empty() => Some(body.clone()),
        Value::Object(map) => ["id", "_id"]
            .iter()
            .filter_map(|k| map.get(*k))
            .find(|v| matches!(v, Value::Number(_) | Value::String(_)))
            .cloned(),
        _ => None,
    }
}

/// The identifier as a single path segment.
fn id_segment(id: &Value) -> Option<String> {
    let raw = match id {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    if raw.is_empty() || raw.contains(['/', '?', '#']) || raw.chars().any(char::is_whitespace) {
        None
    } else {
        Some(raw)
    }
}
