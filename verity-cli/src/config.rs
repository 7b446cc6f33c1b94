use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            base_url: std::env::var("VERITY_BASE_URL")
                .context("VERITY_BASE_URL must be set")?,
            token: std::env::var("VERITY_TOKEN").ok(),
        })
    }
}
