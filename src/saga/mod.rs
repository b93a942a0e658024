//! Two-service creation saga.
//!
//! # Data Flow
//! ```text
//! POST /saga {primary, dependent}
//!     → orchestrator.rs: create primary (Forwarder, full retry/failover)
//!         ✗ → NotCreated
//!     → create dependent with the primary id under the reference field
//!         ✓ → Completed
//!         ✗ → compensate: DELETE {primary_path}/{id} (one forward call)
//!               ✓ → RolledBack
//!               ✗ → CompensationFailed
//!     → outcome.rs: JSON body + x-saga-status header
//! ```
//!
//! # Design Decisions
//! - Every step reuses the forwarder, so the breaker and balancer see saga
//!   traffic like any other request
//! - Compensation runs once; its own failure is reported, not retried further

pub mod orchestrator;
pub mod outcome;

pub use orchestrator::{extract_id, Saga, SagaContext, SagaRequest};
pub use outcome::SagaOutcome;
