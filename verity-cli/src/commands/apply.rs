use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use verity_engine::{EngineConfig, HttpVerityApi, Manager, TicketId, VerityApi};
use verity_models::{ApplyPlan, PlanEntry, Verb};

use crate::config::Config;

struct QueuedEntry {
    entry: PlanEntry,
    ticket: Result<TicketId, verity_engine::OperationError>,
}

pub async fn run(plan_path: PathBuf, wait_secs: u64) -> Result<()> {
    let config = Config::load()?;

    let contents = std::fs::read_to_string(&plan_path)
        .with_context(|| format!("Failed to read plan file {}", plan_path.display()))?;
    let plan: ApplyPlan = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse plan file {}", plan_path.display()))?;

    let mut api = HttpVerityApi::new(&config.base_url);
    if let Some(token) = &config.token {
        api = api.with_token(token);
    }
    let manager = Manager::new(Arc::new(api) as Arc<dyn VerityApi>, EngineConfig::default());

    let started = Utc::now();
    tracing::info!(
        entries = plan.entries.len(),
        plan = %plan_path.display(),
        "queueing bulk operations"
    );

    let queued: Vec<QueuedEntry> = plan
        .entries
        .into_iter()
        .map(|entry| {
            let ticket = match entry.verb {
                Verb::Put => manager.add_put(
                    entry.kind,
                    &entry.name,
                    entry.payload.clone().unwrap_or(serde_json::Value::Null),
                    entry.header_params.clone(),
                ),
                Verb::Patch => manager.add_patch(
                    entry.kind,
                    &entry.name,
                    entry.payload.clone().unwrap_or(serde_json::Value::Null),
                    entry.header_params.clone(),
                ),
                Verb::Delete => {
                    manager.add_delete(entry.kind, &entry.name, entry.header_params.clone())
                }
            };
            QueuedEntry { entry, ticket }
        })
        .collect();

    let diagnostics = manager.flush_all().await;

    let wait_timeout = Duration::from_secs(wait_secs);
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for queued in &queued {
        let label = format!(
            "{} {}/{}",
            queued.entry.verb, queued.entry.kind, queued.entry.name
        );
        match &queued.ticket {
            Ok(ticket) => match manager.wait(ticket, wait_timeout).await {
                Ok(()) => {
                    println!("✓ {label}");
                    succeeded += 1;
                }
                Err(err) => {
                    println!("✗ {label}: {err}");
                    failed += 1;
                }
            },
            Err(err) => {
                println!("✗ {label}: {err}");
                failed += 1;
            }
        }
    }

    if !diagnostics.is_empty() {
        println!();
        for diag in diagnostics.iter() {
            println!("[{:?}] {}: {}", diag.severity, diag.summary, diag.detail);
        }
    }

    let elapsed = (Utc::now() - started).num_milliseconds();
    println!();
    println!(
        "{} succeeded, {} failed in {}ms",
        succeeded, failed, elapsed
    );

    if failed > 0 || diagnostics.has_errors() {
        anyhow::bail!("apply completed with {} failure(s)", failed);
    }
    Ok(())
}
