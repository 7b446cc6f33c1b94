//! Ticket table: one record and one completion signal per submitted intent.
//!
//! A ticket is created at intake, transitions to a terminal state exactly
//! once (when its batch completes, when the pre-existence filter short-cuts
//! it, or when the failure cascade sweeps it), and fires its signal on that
//! transition. Terminal states are absorbing.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::watch;
use uuid::Uuid;
use verity_models::{OperationStatus, ResourceKind, Verb};

use crate::error::OperationError;

/// Opaque handle identifying one intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TicketId(String);

impl TicketId {
    fn new(kind: ResourceKind, name: &str, verb: Verb) -> Self {
        Self(format!("{kind}-{name}-{verb}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of one intent from intake to terminal transition.
pub struct OperationRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub verb: Verb,
    pub status: OperationStatus,
    pub error: Option<OperationError>,
}

/// All ticket records plus their completion signals. Guarded by the
/// manager's ticket mutex.
#[derive(Default)]
pub struct TicketTable {
    records: HashMap<TicketId, OperationRecord>,
    signals: HashMap<TicketId, watch::Sender<bool>>,
}

impl TicketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: ResourceKind, name: &str, verb: Verb) -> TicketId {
        let id = TicketId::new(kind, name, verb);
        self.records.insert(
            id.clone(),
            OperationRecord {
                kind,
                name: name.to_string(),
                verb,
                status: OperationStatus::Pending,
                error: None,
            },
        );
        let (tx, _rx) = watch::channel(false);
        self.signals.insert(id.clone(), tx);
        id
    }

    /// Current status and terminal error, plus a receiver that observes the
    /// completion signal.
    pub fn subscribe(
        &self,
        id: &TicketId,
    ) -> Option<(OperationStatus, Option<OperationError>, watch::Receiver<bool>)> {
        let record = self.records.get(id)?;
        let rx = self.signals.get(id)?.subscribe();
        Some((record.status, record.error.clone(), rx))
    }

    pub fn status(&self, id: &TicketId) -> Option<(OperationStatus, Option<OperationError>)> {
        self.records.get(id).map(|r| (r.status, r.error.clone()))
    }

    fn finish(record: &mut OperationRecord, error: Option<&OperationError>) {
        match error {
            None => record.status = OperationStatus::Succeeded,
            Some(err) => {
                record.status = OperationStatus::Failed;
                record.error = Some(err.clone());
            }
        }
    }

    /// Terminates every still-pending ticket matching (kind, verb, name) and
    /// fires its signal. `names` are original resource names. Returns how
    /// many tickets transitioned.
    pub fn complete_matching(
        &mut self,
        kind: ResourceKind,
        verb: Verb,
        names: &HashSet<String>,
        error: Option<&OperationError>,
    ) -> usize {
        let mut closed = 0;
        for (id, record) in self.records.iter_mut() {
            if record.status != OperationStatus::Pending {
                continue;
            }
            if record.kind != kind || record.verb != verb || !names.contains(&record.name) {
                continue;
            }
            Self::finish(record, error);
            if let Some(tx) = self.signals.get(id) {
                tx.send_replace(true);
            }
            closed += 1;
        }
        closed
    }

    /// Failure cascade: every still-pending ticket anywhere in the table goes
    /// Failed with a shared aborted error. Returns how many tickets
    /// transitioned.
    pub fn fail_all_pending(&mut self, cause: &str) -> usize {
        let error = OperationError::Aborted(cause.to_string());
        let mut failed = 0;
        for (id, record) in self.records.iter_mut() {
            if record.status != OperationStatus::Pending {
                continue;
            }
            Self::finish(record, Some(&error));
            if let Some(tx) = self.signals.get(id) {
                tx.send_replace(true);
            }
            failed += 1;
        }
        failed
    }
}
