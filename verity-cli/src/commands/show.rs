use std::collections::HashMap;

use anyhow::{Context, Result};
use verity_engine::{registry, HttpVerityApi, VerityApi};
use verity_models::ResourceKind;

use crate::config::Config;

pub async fn run(kind: String, ip_version: Option<String>) -> Result<()> {
    let config = Config::load()?;

    let kind: ResourceKind = kind
        .parse()
        .with_context(|| "run `verity kinds` to list known resource kinds")?;
    let desc = registry::descriptor(kind);

    let mut params = Vec::new();
    if let Some(split_key) = desc.header_split_key {
        let version = ip_version
            .with_context(|| format!("{kind} requires --ip-version ({split_key})"))?;
        params.push((split_key.to_string(), version));
    }

    let mut api = HttpVerityApi::new(&config.base_url);
    if let Some(token) = &config.token {
        api = api.with_token(token);
    }

    let raw = api
        .get(desc.endpoint, &params)
        .await
        .with_context(|| format!("Failed to fetch {kind} collection"))?;

    let headers: HashMap<String, String> = params.iter().cloned().collect();
    let collection = desc.extract_collection(&raw, &headers);
    println!("{}", serde_json::to_string_pretty(&collection)?);

    Ok(())
}
