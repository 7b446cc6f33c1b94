//! Flush scheduler: phase- and kind-ordered dispatch of the per-kind
//! pipelines, the failure cascade, and the flush-trigger policy.

use verity_models::{Diagnostics, ResourceKind, Verb};

use crate::manager::Manager;
use crate::registry::{DELETE_ORDER, PATCH_ORDER, PUT_ORDER};

impl Manager {
    /// Drains every non-empty buffer through the three-phase schedule:
    /// all PUTs (kind dependency order), then all PATCHes, then all DELETEs
    /// (reverse order). Serialised per manager; the first batch-fatal error
    /// aborts the remaining batches and fails every still-pending ticket.
    pub async fn flush_all(&self) -> Diagnostics {
        let _flush = self.flush_lock.lock().await;

        // Let a burst of intents finish arriving before draining.
        let remaining = {
            let buffers = self.buffers.lock().expect("buffer lock poisoned");
            buffers
                .last_intent_at
                .map(|at| self.config.quiescence_window.saturating_sub(at.elapsed()))
        };
        if let Some(remaining) = remaining.filter(|r| !r.is_zero()) {
            tracing::debug!(
                wait_ms = remaining.as_millis() as u64,
                "waiting to collect more operations before executing"
            );
            tokio::time::sleep(remaining).await;
        }

        let mut diagnostics = Diagnostics::new();
        let mut performed = false;

        let phases: [(Verb, &[ResourceKind]); 3] = [
            (Verb::Put, PUT_ORDER),
            (Verb::Patch, PATCH_ORDER.as_slice()),
            (Verb::Delete, DELETE_ORDER.as_slice()),
        ];

        'phases: for (verb, order) in phases {
            for &kind in order {
                if self.pending_count(kind, verb) == 0 {
                    continue;
                }
                tracing::debug!(kind = %kind, verb = %verb, "executing bulk operations");
                let diags = self.run_bulk(kind, verb).await;
                let failed = diags.has_errors();
                diagnostics.extend(diags);
                if failed {
                    self.fail_all_pending(&format!("bulk {kind} {verb} operation failed"));
                    break 'phases;
                }
                performed = true;
            }
        }

        if performed && !diagnostics.has_errors() {
            tracing::debug!(
                wait_ms = self.config.post_flush_settle.as_millis() as u64,
                "waiting for operations to propagate before cache invalidation"
            );
            tokio::time::sleep(self.config.post_flush_settle).await;

            if let Some(invalidate) = &self.invalidate_cache {
                for &kind in ResourceKind::ALL {
                    invalidate(kind);
                }
            }
        }

        self.buffers
            .lock()
            .expect("buffer lock poisoned")
            .reset_batch_window();

        diagnostics
    }

    /// Flush trigger: at least one buffer is non-empty AND the intake has
    /// been quiet for the quiescence window, or the batch has been open
    /// longer than the max batch age.
    pub fn should_flush(&self) -> bool {
        let buffers = self.buffers.lock().expect("buffer lock poisoned");
        if buffers.total_pending() == 0 {
            return false;
        }

        let quiesced = buffers
            .last_intent_at
            .is_some_and(|at| at.elapsed() >= self.config.quiescence_window);
        let aged = buffers
            .batch_start_at
            .is_some_and(|at| at.elapsed() >= self.config.max_batch_age);

        quiesced || aged
    }

    /// Flushes when anything is buffered; otherwise returns empty
    /// diagnostics without touching the scheduler.
    pub async fn execute_if_multiple(&self) -> Diagnostics {
        let total = {
            let buffers = self.buffers.lock().expect("buffer lock poisoned");
            buffers.total_pending()
        };
        if total == 0 {
            return Diagnostics::new();
        }
        tracing::debug!(total, "pending operations detected, executing in sequence");
        self.flush_all().await
    }
}
