//! Patient History Events
//!
//! Clinical events (admission, discharge, treatment) drive claim status
//! changes asynchronously:
//!
//! ```text
//! create_event ─► EventDispatchService ─► JobQueue ─► Worker
//!                                                      │
//!                                                      ▼
//!                                         EventReconciliationJobs
//!                                 (conditional claim update + processed_at,
//!                                  one transaction; then cache invalidation)
//! ```
//!
//! The event's `processed_at` timestamp is the idempotency gate. Queue-level
//! deduplication by job id only narrows the window for duplicate work.

pub mod event;
pub mod jobs;
pub mod ports;
pub mod dispatch;
pub mod service;
pub mod reconcile;
pub mod worker;
pub mod error;

pub use event::{PatientHistoryEvent, EventType, NewEvent, EventQuery};
pub use jobs::{JobKind, ReconciliationPayload, JobOutcome, SkipReason, RetryPolicy};
pub use ports::{EventPort, ReconciliationPort, JobQueue, JobHandler, NewJob, JobLease, EnqueueOutcome, FailOutcome};
pub use dispatch::EventDispatchService;
pub use service::PatientHistoryService;
pub use reconcile::EventReconciliationJobs;
pub use worker::{Worker, WorkerConfig, JobRun};
pub use error::JobError;
