//! Bulk-operation engine for the Verity fabric controller.
//!
//! Per-resource create/update/delete intents buffer into per-kind batches,
//! flush as bulk HTTP requests in strict phase order (PUTs, then PATCHes,
//! then DELETEs), and resolve back to per-resource tickets that callers
//! block on. The controller serialises configuration changes behind a
//! system-wide lock, so batching and ordering are what make large applies
//! feasible.

pub mod api;
pub mod buffers;
pub mod config;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod tickets;

pub use api::{HttpVerityApi, VerityApi};
pub use config::{EngineConfig, RetryConfig};
pub use error::{ApiError, OperationError, WaitError};
pub use manager::{CacheInvalidator, Manager};
pub use tickets::TicketId;
