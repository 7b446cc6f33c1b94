//! Per-kind bulk pipeline: extract → pre-existence filter → prepare →
//! execute with retry → auto-gen post-fetch, then ticket correlation.
//!
//! Header-split kinds partition the extracted set by their split value and
//! run each partition through the same stages independently.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use verity_models::{Diagnostics, ResourceKind, Verb};

use crate::error::{ApiError, OperationError};
use crate::manager::Manager;
use crate::registry::{descriptor, ResourceDescriptor};
use crate::retry::{backoff_delay, is_retriable};

fn header_query(headers: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut params: Vec<_> = headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    params.sort();
    params
}

/// `{ <json_key>: { name: props, … } }`
fn build_body(desc: &ResourceDescriptor, ops: &HashMap<String, Value>) -> Value {
    let map: serde_json::Map<String, Value> =
        ops.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut body = serde_json::Map::new();
    body.insert(desc.json_key.to_string(), Value::Object(map));
    Value::Object(body)
}

impl Manager {
    /// Drains and executes one (kind, verb) buffer. Returns the batch
    /// diagnostics; an error entry means the batch is fatal and the caller
    /// should cascade.
    pub(crate) async fn run_bulk(&self, kind: ResourceKind, verb: Verb) -> Diagnostics {
        let extract = self
            .buffers
            .lock()
            .expect("buffer lock poisoned")
            .extract(kind, verb);
        if extract.is_empty() {
            return Diagnostics::new();
        }

        let desc = descriptor(kind);
        let mut diags = Diagnostics::new();

        if let Some(split_key) = desc.header_split_key {
            // Partition by split value, restoring original resource names.
            // BTreeMap keeps partition dispatch order stable.
            let mut groups: BTreeMap<String, HashMap<String, Value>> = BTreeMap::new();
            for key in &extract.names {
                let value = extract.header_values.get(key).cloned().unwrap_or_default();
                let original = extract
                    .original_names
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                let payload = extract.ops.get(key).cloned().unwrap_or(Value::Null);
                groups.entry(value).or_default().insert(original, payload);
            }

            for (value, ops) in groups {
                let mut headers = HashMap::new();
                if !value.is_empty() {
                    headers.insert(split_key.to_string(), value);
                }
                diags.extend(self.run_batch(desc, verb, ops, headers).await);
            }
        } else {
            diags.extend(self.run_batch(desc, verb, extract.ops, HashMap::new()).await);
        }

        diags
    }

    async fn run_batch(
        &self,
        desc: &'static ResourceDescriptor,
        verb: Verb,
        mut ops: HashMap<String, Value>,
        headers: HashMap<String, String>,
    ) -> Diagnostics {
        let kind = desc.kind;
        let mut diags = Diagnostics::new();
        let header_params = header_query(&headers);

        if verb == Verb::Put {
            match self.fetch_existing(desc, &headers).await {
                Ok(existing) => {
                    let pre_existing: HashSet<String> = ops
                        .keys()
                        .filter(|name| existing.get(name.as_str()).is_some())
                        .cloned()
                        .collect();
                    if !pre_existing.is_empty() {
                        for name in &pre_existing {
                            tracing::info!(
                                kind = %kind,
                                resource = %name,
                                "skipping creation, resource already exists"
                            );
                        }
                        self.tickets
                            .lock()
                            .expect("ticket lock poisoned")
                            .complete_matching(kind, Verb::Put, &pre_existing, None);
                        ops.retain(|name, _| !pre_existing.contains(name));
                    }
                }
                Err(err) => {
                    // Fail open: a broken pre-flight GET must not block creates.
                    tracing::warn!(
                        kind = %kind,
                        error = %err,
                        "pre-existence check failed, proceeding with all resources"
                    );
                }
            }

            if ops.is_empty() {
                tracing::info!(kind = %kind, "all resources already exist, skipping bulk PUT");
                self.buffers
                    .lock()
                    .expect("buffer lock poisoned")
                    .mark_recent(kind);
                return diags;
            }
        }

        let names: Vec<String> = ops.keys().cloned().collect();
        tracing::debug!(
            kind = %kind,
            verb = %verb,
            count = names.len(),
            "executing bulk operation"
        );

        match verb {
            Verb::Put | Verb::Patch => {
                let body = build_body(desc, &ops);
                let result = self
                    .execute_with_retry(desc, verb, Some(&body), &header_params)
                    .await;
                let name_set: HashSet<String> = names.into_iter().collect();

                match result {
                    Ok(()) => {
                        self.tickets
                            .lock()
                            .expect("ticket lock poisoned")
                            .complete_matching(kind, verb, &name_set, None);

                        if verb == Verb::Put && desc.has_autogen {
                            if let Err(err) = self.fetch_autogen(desc, &headers).await {
                                // PUTs landed; only the read-back cache is stale.
                                diags.add_warning(
                                    format!("Auto-generated field fetch failed for {kind}"),
                                    err.to_string(),
                                );
                            }
                        }

                        self.buffers
                            .lock()
                            .expect("buffer lock poisoned")
                            .mark_recent(kind);
                    }
                    Err(err) => {
                        let op_err = OperationError::batch_failed(kind, verb, &err);
                        self.tickets
                            .lock()
                            .expect("ticket lock poisoned")
                            .complete_matching(kind, verb, &name_set, Some(&op_err));
                        diags.add_error(
                            format!("Failed to execute bulk {kind} {verb} operation"),
                            err.to_string(),
                        );
                    }
                }
            }
            Verb::Delete => {
                let Some(delete_param) = desc.delete_param else {
                    diags.add_error(
                        format!("Failed to execute bulk {kind} DELETE operation"),
                        format!("{kind} does not support DELETE"),
                    );
                    return diags;
                };

                let chunk_count = names.len().div_ceil(self.config.max_delete_batch);
                if chunk_count > 1 {
                    tracing::info!(
                        kind = %kind,
                        total = names.len(),
                        chunks = chunk_count,
                        "splitting bulk DELETE to stay under URL length limits"
                    );
                }

                let mut failed = false;
                for (index, chunk) in names.chunks(self.config.max_delete_batch).enumerate() {
                    let mut params = header_params.clone();
                    params.extend(chunk.iter().map(|n| (delete_param.to_string(), n.clone())));

                    let result = self.execute_with_retry(desc, verb, None, &params).await;
                    let chunk_set: HashSet<String> = chunk.iter().cloned().collect();

                    match result {
                        Ok(()) => {
                            self.tickets
                                .lock()
                                .expect("ticket lock poisoned")
                                .complete_matching(kind, Verb::Delete, &chunk_set, None);
                        }
                        Err(err) => {
                            let op_err = OperationError::batch_failed(kind, verb, &err);
                            self.tickets
                                .lock()
                                .expect("ticket lock poisoned")
                                .complete_matching(kind, Verb::Delete, &chunk_set, Some(&op_err));
                            diags.add_error(
                                format!("Failed to execute bulk {kind} DELETE operation"),
                                err.to_string(),
                            );
                            failed = true;
                            break;
                        }
                    }

                    if index + 1 < chunk_count {
                        tokio::time::sleep(self.config.delete_chunk_pause).await;
                    }
                }

                if !failed {
                    self.buffers
                        .lock()
                        .expect("buffer lock poisoned")
                        .mark_recent(kind);
                }
            }
        }

        diags
    }

    /// Collection GET for the pre-existence filter, header-scoped for split
    /// kinds.
    async fn fetch_existing(
        &self,
        desc: &'static ResourceDescriptor,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ApiError> {
        let params = header_query(headers);
        let raw = tokio::time::timeout(
            self.config.operation_timeout,
            self.api.get(desc.endpoint, &params),
        )
        .await
        .map_err(|_| ApiError::Timeout {
            endpoint: desc.endpoint.to_string(),
            timeout: self.config.operation_timeout,
        })??;
        Ok(desc.extract_collection(&raw, headers))
    }

    /// One bulk request with bounded attempts. Each attempt runs under its
    /// own operation deadline; only classifier-approved errors are retried.
    async fn execute_with_retry(
        &self,
        desc: &'static ResourceDescriptor,
        verb: Verb,
        body: Option<&Value>,
        params: &[(String, String)],
    ) -> Result<(), ApiError> {
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;
        loop {
            let call = async {
                match (verb, body) {
                    (Verb::Put, Some(body)) => self.api.put(desc.endpoint, body, params).await,
                    (Verb::Patch, Some(body)) => self.api.patch(desc.endpoint, body, params).await,
                    _ => self.api.delete(desc.endpoint, params).await,
                }
            };

            let err = match tokio::time::timeout(self.config.operation_timeout, call).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => err,
                Err(_) => ApiError::Timeout {
                    endpoint: desc.endpoint.to_string(),
                    timeout: self.config.operation_timeout,
                },
            };

            attempt += 1;
            if !is_retriable(&err) || attempt >= retry.max_retries {
                return Err(err);
            }

            let delay = backoff_delay(attempt - 1, retry);
            tracing::debug!(
                kind = %desc.kind,
                verb = %verb,
                attempt,
                max_retries = retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "bulk operation failed with retriable error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Post-PUT fetch for kinds whose fields the controller assigns. Waits a
    /// settle delay, re-reads the collection, and caches each object under
    /// its returned key and any echoed `name` alias.
    async fn fetch_autogen(
        &self,
        desc: &'static ResourceDescriptor,
        headers: &HashMap<String, String>,
    ) -> Result<(), ApiError> {
        tracing::debug!(
            kind = %desc.kind,
            delay_ms = self.config.autogen_fetch_delay.as_millis() as u64,
            "waiting for auto-generated values before fetching"
        );
        tokio::time::sleep(self.config.autogen_fetch_delay).await;

        let collection = self.fetch_existing(desc, headers).await?;
        let Value::Object(objects) = collection else {
            return Ok(());
        };

        let mut cache = self.responses.write().expect("response cache poisoned");
        let kind_cache = cache.entry(desc.kind).or_default();
        let count = objects.len();
        for (name, props) in objects {
            if let Some(alias) = props.get("name").and_then(Value::as_str) {
                if alias != name {
                    kind_cache.insert(alias.to_string(), props.clone());
                }
            }
            kind_cache.insert(name, props);
        }
        tracing::debug!(kind = %desc.kind, count, "stored auto-generated field responses");
        Ok(())
    }
}
