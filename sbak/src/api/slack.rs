use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::time::Duration;

use crate::error::ApiError;

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Invokes a Web API method and returns the decoded `ok: true` envelope.
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ApiError>;
}

pub struct SlackClient {
    client: Client,
    base_url: String,
}

impl SlackClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://slack.com/api";

    pub fn new(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Slack token contains characters not allowed in a header")?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Seconds from a `Retry-After` header; `None` when absent or not an integer.
pub fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                method: method.to_string(),
                source,
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                method: method.to_string(),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                method: method.to_string(),
                status,
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Transport {
                method: method.to_string(),
                source,
            })?;

        let body: Value = serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
            method: method.to_string(),
            source,
        })?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(ApiError::Slack {
                method: method.to_string(),
                error,
            });
        }

        Ok(body)
    }
}
