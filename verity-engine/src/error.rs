//! Error types for the bulk-operation engine.

use std::time::Duration;

use verity_models::{ResourceKind, Verb};

/// Failure of a single HTTP call against the controller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response. `body` keeps the raw text so the retry classifier
    /// can probe the controller's `{"payload": "..."}` envelope.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Terminal error recorded on a ticket. Clone-able so one batch failure can
/// be attached to every ticket in the extract set.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    #[error("bulk {verb} of {kind} failed: {message}")]
    BatchFailed {
        kind: ResourceKind,
        verb: Verb,
        message: String,
        status: Option<u16>,
    },

    #[error("operation aborted due to previous failure: {0}")]
    Aborted(String),

    #[error("{verb} is not supported for {kind}")]
    UnsupportedVerb { kind: ResourceKind, verb: Verb },
}

impl OperationError {
    pub fn batch_failed(kind: ResourceKind, verb: Verb, err: &ApiError) -> Self {
        OperationError::BatchFailed {
            kind,
            verb,
            message: err.to_string(),
            status: err.status(),
        }
    }
}

/// Outcome of `Manager::wait` beyond plain success.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("operation {0} not found")]
    UnknownTicket(String),

    #[error("timeout waiting for operation {ticket} after {timeout:?}")]
    Timeout { ticket: String, timeout: Duration },

    #[error(transparent)]
    Operation(#[from] OperationError),
}
