//! HTTP boundary of the engine: the `VerityApi` trait the pipelines call,
//! and its `reqwest` implementation against a live controller.
//!
//! The engine never constructs HTTP requests itself; it hands the registry's
//! endpoint data to this trait. Tests substitute a recording mock.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

/// Query parameters attached to a bulk call: header-split values
/// (e.g. `ip_version`) and DELETE name lists.
pub type Params = [(String, String)];

/// Bulk collection operations against the controller.
#[async_trait]
pub trait VerityApi: Send + Sync {
    /// GET a collection. Returns the decoded JSON body.
    async fn get(&self, endpoint: &str, params: &Params) -> Result<Value, ApiError>;

    /// Bulk-create resources. `body` is `{ <json_key>: { name: props, … } }`.
    async fn put(&self, endpoint: &str, body: &Value, params: &Params) -> Result<(), ApiError>;

    /// Bulk-update resources. Same body shape as PUT.
    async fn patch(&self, endpoint: &str, body: &Value, params: &Params) -> Result<(), ApiError>;

    /// Bulk-delete resources. Names travel as repeated query parameters.
    async fn delete(&self, endpoint: &str, params: &Params) -> Result<(), ApiError>;
}

/// `reqwest`-backed client for a Verity controller.
pub struct HttpVerityApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpVerityApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, endpoint: &str, params: &Params) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.client.request(method, url).query(params);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn check(endpoint: &str, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Http {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VerityApi for HttpVerityApi {
    async fn get(&self, endpoint: &str, params: &Params) -> Result<Value, ApiError> {
        let resp = self
            .request(reqwest::Method::GET, endpoint, params)
            .send()
            .await?;
        let resp = Self::check(endpoint, resp).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn put(&self, endpoint: &str, body: &Value, params: &Params) -> Result<(), ApiError> {
        let resp = self
            .request(reqwest::Method::PUT, endpoint, params)
            .json(body)
            .send()
            .await?;
        Self::check(endpoint, resp).await.map(|_| ())
    }

    async fn patch(&self, endpoint: &str, body: &Value, params: &Params) -> Result<(), ApiError> {
        let resp = self
            .request(reqwest::Method::PATCH, endpoint, params)
            .json(body)
            .send()
            .await?;
        Self::check(endpoint, resp).await.map(|_| ())
    }

    async fn delete(&self, endpoint: &str, params: &Params) -> Result<(), ApiError> {
        let resp = self
            .request(reqwest::Method::DELETE, endpoint, params)
            .send()
            .await?;
        Self::check(endpoint, resp).await.map(|_| ())
    }
}
