//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to service:
//!     → retries.rs (pick backend, attempt with per-call deadline)
//!     → outcome.rs (classify: success / client error / server error / timeout)
//!     → On retryable outcome: backoff.rs delay, same backend again
//!     → On exhausted backend: circuit_breaker.rs (count, maybe quarantine)
//!     → fail over to another backend, up to the distinct-backend bound
//! ```
//!
//! # Design Decisions
//! - Every backend call has a deadline; a timeout is its own outcome
//! - Only server-side failures are retried or counted
//! - Circuit breaker state lives in the shared registry

pub mod backoff;
pub mod circuit_breaker;
pub mod outcome;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use outcome::Outcome;
pub use retries::{Forwarder, RetryPolicy};
