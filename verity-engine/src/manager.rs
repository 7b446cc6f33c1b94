//! The bulk-operation manager: intake facade, ticket waits, and the shared
//! state every other engine module operates on.
//!
//! One manager is created per provider/CLI configuration and lives for the
//! process. Intents buffer here until the scheduler flushes them in bulk.
//!
//! Lock order when more than one is held: buffer lock before ticket lock;
//! the response cache is a leaf. None is ever held across `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::Value;
use verity_models::{OperationStatus, ResourceKind, Verb};

use crate::api::VerityApi;
use crate::buffers::PendingBuffers;
use crate::config::EngineConfig;
use crate::error::{OperationError, WaitError};
use crate::registry::descriptor;
use crate::tickets::{TicketId, TicketTable};

/// Callback invalidating an external read cache for one kind after a flush.
pub type CacheInvalidator = Box<dyn Fn(ResourceKind) + Send + Sync>;

pub struct Manager {
    pub(crate) api: Arc<dyn VerityApi>,
    pub(crate) config: EngineConfig,
    pub(crate) buffers: Mutex<PendingBuffers>,
    pub(crate) tickets: Mutex<TicketTable>,
    /// Auto-generated-field cache: kind → (name → server-returned props).
    pub(crate) responses: RwLock<HashMap<ResourceKind, HashMap<String, Value>>>,
    /// Serialises `flush_all`: one flush at a time per manager.
    pub(crate) flush_lock: tokio::sync::Mutex<()>,
    pub(crate) invalidate_cache: Option<CacheInvalidator>,
}

impl Manager {
    pub fn new(api: Arc<dyn VerityApi>, config: EngineConfig) -> Self {
        Self {
            api,
            config,
            buffers: Mutex::new(PendingBuffers::new()),
            tickets: Mutex::new(TicketTable::new()),
            responses: RwLock::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            invalidate_cache: None,
        }
    }

    /// Registers the read-cache invalidation hook run after successful
    /// flushes.
    pub fn with_cache_invalidator(mut self, invalidate: CacheInvalidator) -> Self {
        self.invalidate_cache = Some(invalidate);
        self
    }

    /// Queues a bulk create. Non-blocking; returns the ticket to wait on.
    pub fn add_put(
        &self,
        kind: ResourceKind,
        name: &str,
        payload: Value,
        header_params: Option<HashMap<String, String>>,
    ) -> Result<TicketId, OperationError> {
        self.add_intent(kind, name, Verb::Put, Some(payload), header_params)
    }

    /// Queues a bulk update. Non-blocking; returns the ticket to wait on.
    pub fn add_patch(
        &self,
        kind: ResourceKind,
        name: &str,
        payload: Value,
        header_params: Option<HashMap<String, String>>,
    ) -> Result<TicketId, OperationError> {
        self.add_intent(kind, name, Verb::Patch, Some(payload), header_params)
    }

    /// Queues a bulk delete. Non-blocking; returns the ticket to wait on.
    pub fn add_delete(
        &self,
        kind: ResourceKind,
        name: &str,
        header_params: Option<HashMap<String, String>>,
    ) -> Result<TicketId, OperationError> {
        self.add_intent(kind, name, Verb::Delete, None, header_params)
    }

    fn add_intent(
        &self,
        kind: ResourceKind,
        name: &str,
        verb: Verb,
        payload: Option<Value>,
        header_params: Option<HashMap<String, String>>,
    ) -> Result<TicketId, OperationError> {
        let desc = descriptor(kind);
        if !desc.supports(verb) {
            return Err(OperationError::UnsupportedVerb { kind, verb });
        }
        if let Some(split_key) = desc.header_split_key {
            let has_key = header_params
                .as_ref()
                .is_some_and(|p| p.contains_key(split_key));
            if !has_key {
                tracing::warn!(
                    kind = %kind,
                    split_key,
                    "intent for header-split kind is missing its split parameter"
                );
            }
        }

        let batch_size = {
            let mut buffers = self.buffers.lock().expect("buffer lock poisoned");
            buffers.store(kind, name, verb, payload, header_params);
            buffers.pending_count(kind, verb)
        };
        if batch_size > self.config.max_batch_size {
            tracing::warn!(
                kind = %kind,
                verb = %verb,
                batch_size,
                max_batch_size = self.config.max_batch_size,
                "pending batch exceeds the advisory size cap"
            );
        }

        let ticket = self
            .tickets
            .lock()
            .expect("ticket lock poisoned")
            .create(kind, name, verb);
        tracing::debug!(
            kind = %kind,
            verb = %verb,
            resource = name,
            batch_size,
            ticket = %ticket,
            "queued bulk operation"
        );
        Ok(ticket)
    }

    /// Blocks until the ticket reaches a terminal state or `timeout` expires.
    ///
    /// Returns `Ok(())` on success, the recorded operation error on failure,
    /// and `WaitError::Timeout` when the deadline passes first. Dropping the
    /// returned future cancels the wait only: the in-flight batch keeps
    /// running and the ticket still completes, with nobody reading its
    /// signal.
    pub async fn wait(&self, ticket: &TicketId, timeout: Duration) -> Result<(), WaitError> {
        let (status, error, mut rx) = {
            let tickets = self.tickets.lock().expect("ticket lock poisoned");
            tickets
                .subscribe(ticket)
                .ok_or_else(|| WaitError::UnknownTicket(ticket.to_string()))?
        };

        if status.is_terminal() {
            return Self::terminal_result(status, error);
        }

        let wait_result =
            tokio::time::timeout(timeout, rx.wait_for(|signalled| *signalled)).await;
        match wait_result {
            Ok(_) => {
                let (status, error) = {
                    let tickets = self.tickets.lock().expect("ticket lock poisoned");
                    tickets
                        .status(ticket)
                        .ok_or_else(|| WaitError::UnknownTicket(ticket.to_string()))?
                };
                Self::terminal_result(status, error)
            }
            Err(_) => Err(WaitError::Timeout {
                ticket: ticket.to_string(),
                timeout,
            }),
        }
    }

    fn terminal_result(
        status: OperationStatus,
        error: Option<OperationError>,
    ) -> Result<(), WaitError> {
        match (status, error) {
            (OperationStatus::Failed, Some(err)) => Err(WaitError::Operation(err)),
            (OperationStatus::Failed, None) => Err(WaitError::Operation(OperationError::Aborted(
                "operation failed without a recorded error".to_string(),
            ))),
            _ => Ok(()),
        }
    }

    /// Cached server response for a resource written by the auto-gen
    /// post-fetch. Read-back paths consult this before calling the server.
    pub fn resource_response(&self, kind: ResourceKind, name: &str) -> Option<Value> {
        let cache = self.responses.read().expect("response cache poisoned");
        cache.get(&kind)?.get(name).cloned()
    }

    /// True while a kind has buffered intents or completed a batch within the
    /// recent-ops window; read paths skip the server during that period.
    pub fn has_pending_or_recent(&self, kind: ResourceKind) -> bool {
        let buffers = self.buffers.lock().expect("buffer lock poisoned");
        buffers.has_pending(kind) || buffers.recent_within(kind, self.config.recent_ops_window)
    }

    /// Number of buffered intents for one (kind, verb).
    pub fn pending_count(&self, kind: ResourceKind, verb: Verb) -> usize {
        self.buffers
            .lock()
            .expect("buffer lock poisoned")
            .pending_count(kind, verb)
    }

    /// Failure cascade entry point: every still-pending ticket goes Failed
    /// with a shared aborted error. Returns how many tickets transitioned.
    pub fn fail_all_pending(&self, cause: &str) -> usize {
        let failed = self
            .tickets
            .lock()
            .expect("ticket lock poisoned")
            .fail_all_pending(cause);
        if failed > 0 {
            tracing::warn!(failed, cause, "failed pending operations after batch error");
        }
        failed
    }
}
