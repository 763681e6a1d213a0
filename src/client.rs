//! Typed HTTP client for the stoker daemon admin API.

use anyhow::{bail, Context, Result};
use reqwest::Client;

use crate::api::rest::DaemonHealth;
use crate::domain::data_source::DataSource;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9440";

pub struct StokerClient {
    base_url: String,
    http: Client,
}

impl StokerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.get("/health").await
    }

    pub async fn sources(&self) -> Result<Vec<DataSource>> {
        self.get("/api/v1/datasources").await
    }

    pub async fn source(&self, id: &str) -> Result<DataSource> {
        self.get(&format!("/api/v1/datasources/{id}")).await
    }

    pub async fn source_status(&self) -> Result<serde_json::Value> {
        self.get("/api/v1/datasources/status").await
    }

    pub async fn save_source(&self, source: &DataSource) -> Result<()> {
        let url = format!("{}/api/v1/datasources", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(source)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        Self::ensure_success(&url, resp).await
    }

    pub async fn delete_source(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/v1/datasources/{id}", self.base_url);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;
        Self::ensure_success(&url, resp).await
    }

    pub async fn reload_all(&self) -> Result<()> {
        self.post_empty("/api/v1/datasources/reload").await
    }

    pub async fn reload_source(&self, id: &str) -> Result<()> {
        self.post_empty(&format!("/api/v1/datasources/{id}/reload")).await
    }

    pub async fn fetch_node(&self, node_id: &str) -> Result<()> {
        self.post_empty(&format!("/api/v1/nodes/{node_id}/fetch")).await
    }

    pub async fn fetch_node_for(&self, node_id: &str, source_id: &str) -> Result<()> {
        self.post_empty(&format!("/api/v1/nodes/{node_id}/fetch/{source_id}"))
            .await
    }

    // ── Internal helpers ───────────────────────────────────

    async fn ensure_success(url: &str, resp: reqwest::Response) -> Result<()> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if body.is_empty() {
            bail!("{} returned {}", url, status);
        }
        bail!("{} returned {}: {}", url, status, body)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        Self::ensure_success(&url, resp).await
    }
}
