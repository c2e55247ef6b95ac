//! Stratus Cloud
//!
//! Convergence engine for declarative cloud resource handlers. Providers
//! build resource types out of the pieces in this crate and the orchestrator
//! drives them through a uniform create/read/update/delete contract.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Orchestrator                    │
//! │        (plan, dependency graph, state store)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │ create / read / update / delete
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stratus-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   ResourceRegistry  (schema + handlers)   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │    Poller    │  │ Retry Wrapper│            │
//! │  │ (waiter.rs)  │  │  (retry.rs)  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │   provider    │  refresh probes, handlers, API client
//! │ (e.g. aws)    │
//! └───────────────┘
//! ```

pub mod data;
pub mod error;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod waiter;

// Re-exports
pub use data::{Attributes, LogicalState, ResourceData, ResourceRecord, string_list, string_map};
pub use error::{ApiError, CloudError, ErrorKind, Operation, Result};
pub use registry::{Change, Handler, ResourceRegistry, ResourceType};
pub use retry::{RetryError, RetrySpec, classify_delete, retry, retry_delete};
pub use schema::{FieldKind, FieldSchema, ResourceSchema};
pub use waiter::{DEFAULT_POLL_INTERVAL, Observed, RefreshProbe, WaitSpec, wait_for_state};
