//! Pending-operation buffers: per-kind PUT/PATCH maps and DELETE lists,
//! plus the side tables that keep header parameters and original names for
//! header-split kinds.
//!
//! All mutation happens under the manager's buffer lock; this module holds
//! plain data and short operations on it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use verity_models::{ResourceKind, Verb};

use crate::registry::descriptor;

/// Buffered intents for one resource kind.
#[derive(Default)]
pub struct KindBuffers {
    pub put: HashMap<String, Value>,
    pub patch: HashMap<String, Value>,
    pub delete: Vec<String>,
    recent: bool,
    recent_at: Option<Instant>,
}

impl KindBuffers {
    fn pending_count(&self, verb: Verb) -> usize {
        match verb {
            Verb::Put => self.put.len(),
            Verb::Patch => self.patch.len(),
            Verb::Delete => self.delete.len(),
        }
    }

    fn has_pending(&self) -> bool {
        !self.put.is_empty() || !self.patch.is_empty() || !self.delete.is_empty()
    }
}

/// Everything drained from one buffer in a single atomic snapshot.
pub struct Extract {
    /// Buffer key → payload. DELETE entries carry a placeholder payload.
    pub ops: HashMap<String, Value>,
    /// Buffer keys in extraction order (insertion order for DELETE).
    pub names: Vec<String>,
    /// Buffer key → header-split value, for split kinds.
    pub header_values: HashMap<String, String>,
    /// Buffer key → original resource name. Identity unless a composite key
    /// was used.
    pub original_names: HashMap<String, String>,
}

impl Extract {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// All pending buffers plus coalescing timestamps. One instance per manager,
/// guarded by the manager's buffer mutex.
#[derive(Default)]
pub struct PendingBuffers {
    kinds: HashMap<ResourceKind, KindBuffers>,
    header_params: HashMap<(ResourceKind, String), HashMap<String, String>>,
    original_names: HashMap<(ResourceKind, String), String>,
    pub last_intent_at: Option<Instant>,
    pub batch_start_at: Option<Instant>,
}

impl PendingBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer key for an intent. Header-split kinds get a composite key so
    /// the same name under distinct header values does not overwrite itself.
    pub fn store_key(
        kind: ResourceKind,
        name: &str,
        header_params: Option<&HashMap<String, String>>,
    ) -> String {
        if let Some(split_key) = descriptor(kind).header_split_key {
            if let Some(value) = header_params.and_then(|p| p.get(split_key)) {
                if !value.is_empty() {
                    return format!("{name}_{split_key}{value}");
                }
            }
        }
        name.to_string()
    }

    /// Appends one intent and bumps the coalescing timestamps. Latest wins
    /// for PUT/PATCH; DELETE appends.
    pub fn store(
        &mut self,
        kind: ResourceKind,
        name: &str,
        verb: Verb,
        payload: Option<Value>,
        header_params: Option<HashMap<String, String>>,
    ) {
        let key = Self::store_key(kind, name, header_params.as_ref());
        let buffers = self.kinds.entry(kind).or_default();

        match verb {
            Verb::Put => {
                buffers.put.insert(key.clone(), payload.unwrap_or(Value::Null));
            }
            Verb::Patch => {
                buffers.patch.insert(key.clone(), payload.unwrap_or(Value::Null));
            }
            Verb::Delete => buffers.delete.push(key.clone()),
        }

        let now = Instant::now();
        buffers.recent = true;
        buffers.recent_at = Some(now);

        if let Some(params) = header_params {
            self.header_params.insert((kind, key.clone()), params);
            if key != name {
                self.original_names.insert((kind, key), name.to_string());
            }
        }

        self.last_intent_at = Some(now);
        if self.batch_start_at.is_none() {
            self.batch_start_at = Some(now);
        }
    }

    /// Snapshots and clears one (kind, verb) buffer, draining the matching
    /// side-table entries. All-or-nothing: after this call the buffer is
    /// empty and the extract owns the whole name set.
    pub fn extract(&mut self, kind: ResourceKind, verb: Verb) -> Extract {
        let buffers = self.kinds.entry(kind).or_default();

        let (ops, names) = match verb {
            Verb::Put => {
                let ops = std::mem::take(&mut buffers.put);
                let names = ops.keys().cloned().collect();
                (ops, names)
            }
            Verb::Patch => {
                let ops = std::mem::take(&mut buffers.patch);
                let names = ops.keys().cloned().collect();
                (ops, names)
            }
            Verb::Delete => {
                let names: Vec<String> = std::mem::take(&mut buffers.delete);
                let ops = names.iter().map(|n| (n.clone(), Value::Bool(true))).collect();
                (ops, names)
            }
        };

        let split_key = descriptor(kind).header_split_key;
        let mut header_values = HashMap::new();
        let mut original_names = HashMap::new();
        for key in &names {
            let param_key = (kind, key.clone());
            if let Some(params) = self.header_params.remove(&param_key) {
                if let Some(value) = split_key.and_then(|k| params.get(k)) {
                    header_values.insert(key.clone(), value.clone());
                }
            }
            let original = self
                .original_names
                .remove(&param_key)
                .unwrap_or_else(|| key.clone());
            original_names.insert(key.clone(), original);
        }

        Extract {
            ops,
            names,
            header_values,
            original_names,
        }
    }

    pub fn pending_count(&self, kind: ResourceKind, verb: Verb) -> usize {
        self.kinds.get(&kind).map_or(0, |b| b.pending_count(verb))
    }

    pub fn has_pending(&self, kind: ResourceKind) -> bool {
        self.kinds.get(&kind).is_some_and(KindBuffers::has_pending)
    }

    pub fn total_pending(&self) -> usize {
        self.kinds
            .values()
            .map(|b| b.put.len() + b.patch.len() + b.delete.len())
            .sum()
    }

    /// Marks a kind as recently modified, extending the stale-read window.
    pub fn mark_recent(&mut self, kind: ResourceKind) {
        let buffers = self.kinds.entry(kind).or_default();
        buffers.recent = true;
        buffers.recent_at = Some(Instant::now());
    }

    pub fn recent_within(&self, kind: ResourceKind, window: Duration) -> bool {
        self.kinds.get(&kind).is_some_and(|b| {
            b.recent && b.recent_at.is_some_and(|at| at.elapsed() < window)
        })
    }

    /// Closes the coalescing window after a flush drained everything.
    pub fn reset_batch_window(&mut self) {
        self.batch_start_at = None;
    }
}
