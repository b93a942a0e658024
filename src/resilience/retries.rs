//! Retry and failover orchestration.
//!
//! # Responsibilities
//! - Retry the same backend while outcomes are retryable, with backoff
//! - Charge an exhausted backend to the circuit breaker and fail over
//! - Bound both the retries per backend and the distinct backends per call
//!
//! # Design Decisions
//! - The decision after each attempt is a pure function ([`next_step`]) so the
//!   bounds can be tested without I/O
//! - One breaker failure per exhausted backend, not per attempt
//! - Connection counters bracket each attempt exactly, including on drop
//! - Requests are replayed verbatim; a backend may see one more than once

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Response;

use crate::config::{RetryConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::http::upstream::{Upstream, UpstreamRequest};
use crate::load_balancer::{BackendAddress, ConnectionGuard, LoadBalancer};
use crate::registry::ServiceRegistry;
use crate::resilience::backoff::Backoff;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::outcome::Outcome;

/// Bounds for one forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts on the same backend after the first.
    pub max_retries: u32,
    /// Distinct backends tried before giving up.
    pub max_backends: usize,
    /// Deadline for each attempt.
    pub call_timeout: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_retries: retries.max_retries,
            max_backends: retries.max_backends.max(1),
            call_timeout: timeouts.proxy_timeout(),
            backoff: Backoff::new(retries.base_delay_ms, retries.max_delay_ms),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug)]
pub enum Step {
    /// Hand this response to the caller.
    Respond(Response<Body>),
    /// Try the same backend again.
    Retry { reason: String },
    /// Give up on this backend.
    Failover { reason: String },
}

/// Decide the next step after attempt number `attempt` (1-based).
pub fn next_step(outcome: Outcome, attempt: u32, max_retries: u32) -> Step {
    match outcome {
        Outcome::Success(response) | Outcome::ClientError(response) => Step::Respond(response),
        retryable => {
            let reason = retryable.describe();
            if attempt <= max_retries {
                Step::Retry { reason }
            } else {
                Step::Failover { reason }
            }
        }
    }
}

/// How one backend ended up.
enum Verdict {
    Responded(Response<Body>),
    Exhausted(String),
}

/// Drives forwarding attempts across backends.
pub struct Forwarder {
    registry: ServiceRegistry,
    balancer: LoadBalancer,
    breaker: CircuitBreaker,
    upstream: Arc<dyn Upstream>,
    policy: RetryPolicy,
}

impl Forwarder {
    pub fn new(
        registry: ServiceRegistry,
        balancer: LoadBalancer,
        breaker: CircuitBreaker,
        upstream: Arc<dyn Upstream>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            balancer,
            breaker,
            upstream,
            policy,
        }
    }

    /// Forward `request` to some backend of `service`.
    pub async fn forward(
        &self,
        service: &str,
        request: &UpstreamRequest,
    ) -> Result<Response<Body>, GatewayError> {
        let mut exhausted: Vec<BackendAddress> = Vec::new();
        let mut last_failure = String::new();

        while exhausted.len() < self.policy.max_backends {
            if let Err(e) = self.breaker.restore_expired(service).await {
                tracing::warn!(service = %service, error = %e, "Failed to restore cooled-down backends");
            }

            let backend = match self.balancer.select(service, &exhausted).await {
                Ok(backend) => backend,
                Err(e) if exhausted.is_empty() => return Err(e),
                Err(_) => break,
            };

            match self.drive(service, &backend, request).await {
                Verdict::Responded(response) => return Ok(response),
                Verdict::Exhausted(reason) => {
                    match self.breaker.record_failure(service, &backend).await {
                        Ok(CircuitState::Open) => {
                            tracing::warn!(service = %service, backend = %backend, "Backend quarantined");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(service = %service, backend = %backend, error = %e, "Failed to record backend failure");
                        }
                    }
                    tracing::info!(
                        service = %service,
                        backend = %backend,
                        reason = %reason,
                        tried = exhausted.len() + 1,
                        "Backend exhausted, failing over"
                    );
                    last_failure = format!("{}: {}", backend, reason);
                    exhausted.push(backend);
                }
            }
        }

        Err(GatewayError::BackendsExhausted {
            service: service.to_string(),
            attempted: exhausted.len(),
            last_failure,
        })
    }

    /// Retry one backend until it answers or runs out of attempts.
    async fn drive(
        &self,
        service: &str,
        backend: &BackendAddress,
        request: &UpstreamRequest,
    ) -> Verdict {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.attempt(service, backend, request.clone()).await;
            let succeeded = matches!(outcome, Outcome::Success(_));

            match next_step(outcome, attempt, self.policy.max_retries) {
                Step::Respond(response) => {
                    if succeeded {
                        if let Err(e) = self.breaker.record_success(service, backend).await {
                            tracing::warn!(service = %service, backend = %backend, error = %e, "Failed to record backend success");
                        }
                    }
                    return Verdict::Responded(response);
                }
                Step::Retry { reason } => {
                    let delay = self.policy.backoff.delay(attempt);
                    tracing::info!(
                        service = %service,
                        backend = %backend,
                        attempt,
                        delay = ?delay,
                        reason = %reason,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Step::Failover { reason } => return Verdict::Exhausted(reason),
            }
        }
    }

    /// One deadline-bounded call, bracketed by the connection counter when
    /// the balancer needs it.
    async fn attempt(
        &self,
        service: &str,
        backend: &BackendAddress,
        request: UpstreamRequest,
    ) -> Outcome {
        let guard = if self.balancer.tracks_connections() {
            match ConnectionGuard::acquire(&self.registry, service, backend).await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    tracing::warn!(service = %service, backend = %backend, error = %e, "Failed to increment connection counter");
                    None
                }
            }
        } else {
            None
        };

        let result = tokio::time::timeout(
            self.policy.call_timeout,
            self.upstream.send(backend, request),
        )
        .await;

        if let Some(guard) = guard {
            guard.release().await;
        }

        let outcome = Outcome::classify(result, self.policy.call_timeout);
        if outcome.is_retryable() {
            tracing::warn!(service = %service, backend = %backend, outcome = %outcome.describe(), "Upstream attempt failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::upstream::UpstreamError;
    use crate::load_balancer::BalancePolicy;
    use crate::registry::MemoryRegistry;
    use crate::testing::{Reply, ScriptedUpstream};
    use axum::http::{Method, StatusCode};

    fn ok(status: u16) -> Response<Body> {
        Response::builder().status(status).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_next_step_bounds() {
        let err = || Outcome::ServerError(StatusCode::BAD_GATEWAY);
        assert!(matches!(next_step(err(), 1, 2), Step::Retry { .. }));
        assert!(matches!(next_step(err(), 2, 2), Step::Retry { .. }));
        assert!(matches!(next_step(err(), 3, 2), Step::Failover { .. }));
        assert!(matches!(next_step(err(), 1, 0), Step::Failover { .. }));

        let timeout = Outcome::Timeout(Duration::from_millis(5));
        assert!(matches!(next_step(timeout, 1, 1), Step::Retry { .. }));
        let refused = Outcome::Transport(UpstreamError::Transport("refused".into()));
        assert!(matches!(next_step(refused, 2, 1), Step::Failover { .. }));
    }

    #[test]
    fn test_next_step_responds_immediately() {
        assert!(matches!(next_step(Outcome::Success(ok(200)), 1, 5), Step::Respond(_)));
        match next_step(Outcome::ClientError(ok(404)), 1, 5) {
            Step::Respond(r) => assert_eq!(r.status(), StatusCode::NOT_FOUND),
            other => panic!("expected respond, got {:?}", other),
        }
    }

    struct Harness {
        registry: ServiceRegistry,
        upstream: Arc<ScriptedUpstream>,
        forwarder: Forwarder,
    }

    async fn harness(
        policy: BalancePolicy,
        backends: &[&BackendAddress],
        max_retries: u32,
        max_backends: usize,
    ) -> Harness {
        let registry = ServiceRegistry::new(Arc::new(MemoryRegistry::new()), "t:");
        for b in backends {
            registry.register("svc", b).await.unwrap();
        }
        let upstream = Arc::new(ScriptedUpstream::new());
        let forwarder = Forwarder::new(
            registry.clone(),
            LoadBalancer::new(policy, registry.clone()),
            CircuitBreaker::new(registry.clone(), 3, Duration::from_secs(15)),
            upstream.clone(),
            RetryPolicy {
                max_retries,
                max_backends,
                call_timeout: Duration::from_millis(100),
                backoff: Backoff::none(),
            },
        );
        Harness {
            registry,
            upstream,
            forwarder,
        }
    }

    fn get() -> UpstreamRequest {
        UpstreamRequest::new(Method::GET, "/trains")
    }

    #[tokio::test]
    async fn test_no_backends_fails_fast() {
        let h = harness(BalancePolicy::RoundRobin, &[], 2, 3).await;
        let err = h.forwarder.forward("svc", &get()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ServiceUnavailable { .. }));
        assert!(h.upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retries_same_backend_then_succeeds() {
        let a = BackendAddress::new("a", 1);
        let h = harness(BalancePolicy::RoundRobin, &[&a], 2, 3).await;
        h.upstream.script(&a, [Reply::Status(503), Reply::Status(500), Reply::Status(200)]);

        let response = h.forwarder.forward("svc", &get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.upstream.calls_to(&a), 3);
        assert_eq!(h.registry.failure_count("svc", &a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_client_error_not_retried_or_counted() {
        let a = BackendAddress::new("a", 1);
        let h = harness(BalancePolicy::RoundRobin, &[&a], 2, 3).await;
        h.registry.incr_failures("svc", &a).await.unwrap();
        h.upstream.script(&a, [Reply::Status(404)]);

        let response = h.forwarder.forward("svc", &get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.upstream.calls_to(&a), 1);
        // neither incremented nor reset
        assert_eq!(h.registry.failure_count("svc", &a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failover_to_next_backend() {
        let a = BackendAddress::new("a", 1);
        let b = BackendAddress::new("b", 1);
        let h = harness(BalancePolicy::RoundRobin, &[&a, &b], 1, 3).await;
        h.upstream.script(&a, [Reply::Status(500), Reply::Refused]);

        let response = h.forwarder.forward("svc", &get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.upstream.calls_to(&a), 2);
        assert_eq!(h.upstream.calls_to(&b), 1);
        assert_eq!(h.registry.failure_count("svc", &a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_backend_bound() {
        let backends: Vec<_> = (0..4).map(|i| BackendAddress::new("b", i)).collect();
        let refs: Vec<_> = backends.iter().collect();
        let h = harness(BalancePolicy::RoundRobin, &refs, 0, 2).await;
        for b in &backends {
            h.upstream.script(b, [Reply::Status(502)]);
        }

        let err = h.forwarder.forward("svc", &get()).await.unwrap_err();
        match err {
            GatewayError::BackendsExhausted { attempted, .. } => assert_eq!(attempted, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_round_robin_quarantine_scenario() {
        let a = BackendAddress::new("a", 1);
        let b = BackendAddress::new("b", 1);
        let h = harness(BalancePolicy::RoundRobin, &[&a, &b], 0, 2).await;
        h.upstream.script(&a, [Reply::Status(500), Reply::Status(500), Reply::Status(500)]);

        for _ in 0..3 {
            let response = h.forwarder.forward("svc", &get()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(h.upstream.calls_to(&a), 3);
        assert_eq!(h.registry.lookup("svc").await.unwrap(), vec![b.clone()]);

        let before = h.upstream.calls_to(&b);
        for _ in 0..2 {
            h.forwarder.forward("svc", &get()).await.unwrap();
        }
        assert_eq!(h.upstream.calls_to(&a), 3);
        assert_eq!(h.upstream.calls_to(&b), before + 2);
    }

    #[tokio::test]
    async fn test_least_connections_balanced_back() {
        let a = BackendAddress::new("a", 1);
        let b = BackendAddress::new("b", 1);
        let h = harness(BalancePolicy::LeastConnections, &[&a, &b], 0, 2).await;
        h.registry.incr_connections("svc", &a).await.unwrap();
        h.registry.incr_connections("svc", &a).await.unwrap();

        h.forwarder.forward("svc", &get()).await.unwrap();
        assert_eq!(h.upstream.calls_to(&b), 1);
        assert_eq!(h.registry.connection_count("svc", &a).await.unwrap(), 2);
        assert_eq!(h.registry.connection_count("svc", &b).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_return_to_zero_on_failures() {
        let a = BackendAddress::new("a", 1);
        let b = BackendAddress::new("b", 1);
        let h = harness(BalancePolicy::LeastConnections, &[&a, &b], 1, 2).await;
        for _ in 0..3 {
            h.upstream.script(&a, [Reply::Hang, Reply::Status(500)]);
            h.upstream.script(&b, [Reply::Refused, Reply::Hang]);
            let _ = h.forwarder.forward("svc", &get()).await;
        }
        for backend in [&a, &b] {
            assert_eq!(h.registry.connection_count("svc", backend).await.unwrap(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_forward_releases_counter() {
        let a = BackendAddress::new("a", 1);
        let h = harness(BalancePolicy::LeastConnections, &[&a], 0, 1).await;
        h.upstream.script(&a, [Reply::Hang]);

        let request = get();
        let forward = h.forwarder.forward("svc", &request);
        // client goes away before the 100ms deadline
        let _ = tokio::time::timeout(Duration::from_millis(10), forward).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.registry.connection_count("svc", &a).await.unwrap(), 0);
    }
}
