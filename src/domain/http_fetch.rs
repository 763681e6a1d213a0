//! Outbound HTTP for data sources — one request, classified outcome.
//!
//! 404 is a first-class outcome, not an error: the missing-node policy
//! decides what it means. There are no retries; a fan-out visits each node
//! exactly once per run.

use std::time::Duration;

use super::data_source::HttpMethod;
use super::error::NodeQueryError;

/// Classified result of one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 2xx, raw response text.
    Success(String),
    /// 404.
    NotFound,
    /// Any other status.
    HttpError { code: u16, body: String },
    /// Connect failure, TLS failure, timeout.
    TransportError(String),
}

/// Issues requests for one fan-out. Built once per run so every node query
/// shares the same connection pool and timeout settings.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// `request_timeout` applies as both connect and read timeout. It is a
    /// required argument on purpose: a fetcher without a deadline would hang
    /// a fan-out slot for as long as the upstream cares to stall.
    pub fn new(check_ssl: bool, request_timeout: Duration) -> Result<Self, NodeQueryError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .danger_accept_invalid_certs(!check_ssl)
            .build()
            .map_err(|e| NodeQueryError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Send one request. GET carries `params` as the query string, POST as a
    /// form-encoded body.
    pub async fn fetch(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        params: &[(String, String)],
    ) -> FetchOutcome {
        let mut request = match method {
            HttpMethod::Get => self.client.get(url).query(params),
            HttpMethod::Post => self.client.post(url).form(params),
        };
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::TransportError(e.to_string()),
        };

        let status = response.status();
        if status.as_u16() == 404 {
            return FetchOutcome::NotFound;
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return FetchOutcome::TransportError(format!("reading response body: {e}")),
        };

        if status.is_success() {
            FetchOutcome::Success(body)
        } else {
            FetchOutcome::HttpError {
                code: status.as_u16(),
                body,
            }
        }
    }
}
