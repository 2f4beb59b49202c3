use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    pub key: String,
    pub winner: String,
}

/// Rename one route inside a stored fragment.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenameRouteRequest {
    /// Fragment path as reported in diagnostics.
    pub source: String,
    /// Current location spec (`/api/`, `= /health`) or normalized key.
    pub from: String,
    /// New location pattern.
    pub to: String,
}

/// A response from the admin API: status code plus JSON body.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct ComposerClient {
    client: Client,
    base_url: String,
}

impl ComposerClient {
    /// `base_url` includes the admin base path, e.g.
    /// `http://127.0.0.1:8090/devproxy/api`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn status(&self) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        self.get("/status").await
    }

    pub async fn conflicts(&self) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        self.get("/overrides/conflicts").await
    }

    pub async fn diagnostics(&self) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        self.get("/diagnostics").await
    }

    pub async fn config(&self) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        self.get("/config").await
    }

    pub async fn reload(&self) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(format!("{}/reload", self.base_url))
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Install (or replace) the fragment for app `name`.
    pub async fn install_app(&self, name: &str, fragment: &str) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(format!("{}/apps/{}", self.base_url, name))
            .body(fragment.to_string())
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn resolve_conflict(&self, req: ResolveConflictRequest) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(format!("{}/resolve-conflict", self.base_url))
            .json(&req)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn rename_route(&self, req: RenameRouteRequest) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(format!("{}/rename-route", self.base_url))
            .json(&req)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn get(&self, path: &str) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode(resp: reqwest::Response) -> Result<ApiResponse, Box<dyn std::error::Error>> {
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(ApiResponse { status, body })
    }
}
