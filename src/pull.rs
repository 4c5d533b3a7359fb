use crate::error::AcquireError;
use crate::json_path::extract_number;
use crate::telemetry::{parse_timestamp, PowerUnit, RawReading};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait PullSource: Send + Sync {
    async fn poll(&self, url: &Url, path: &str) -> Result<RawReading, AcquireError>;
}

/// Polls a project's third-party JSON endpoint.
#[derive(Clone)]
pub struct HttpPullPoller {
    client: Client,
}

impl HttpPullPoller {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn build_client(timeout: Duration, user_agent: &str) -> anyhow::Result<Client> {
        Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("failed to build live data HTTP client")
    }
}

#[async_trait]
impl PullSource for HttpPullPoller {
    async fn poll(&self, url: &Url, path: &str) -> Result<RawReading, AcquireError> {
        let acquired_at = Utc::now();
        let document = fetch_json(&self.client, url.as_str())
            .await
            .map_err(|err| AcquireError::pull_failed(format!("{url}: {err:#}")))?;
        reading_from_document(&document, path, acquired_at)
    }
}

pub fn parse_pull_url(raw: &str) -> Result<Url, AcquireError> {
    let url = Url::parse(raw.trim())
        .map_err(|err| AcquireError::config_invalid(format!("pull url {raw:?}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AcquireError::config_invalid(format!(
            "pull url {raw:?} must use http or https"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AcquireError::config_invalid(format!(
            "pull url {raw:?} has no host"
        )));
    }
    Ok(url)
}

pub(crate) async fn fetch_json(client: &Client, url: &str) -> anyhow::Result<JsonValue> {
    let response = client.get(url).send().await.context("request failed")?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {status}");
    }
    let mut body = response
        .bytes()
        .await
        .context("failed to read response body")?
        .to_vec();
    let document: JsonValue =
        simd_json::serde::from_slice(&mut body).context("response body is not valid JSON")?;
    Ok(document)
}

/// Builds a reading from a pull payload: the value at `path`, the top-level
/// `unit` (kW when absent) and `timestamp` (acquisition time when absent).
pub fn reading_from_document(
    document: &JsonValue,
    path: &str,
    acquired_at: DateTime<Utc>,
) -> Result<RawReading, AcquireError> {
    let value = extract_number(document, path).ok_or_else(|| {
        AcquireError::pull_failed(format!("no numeric value at path {path:?}"))
    })?;

    let unit = match document.get("unit") {
        None | Some(JsonValue::Null) => PowerUnit::Kw,
        Some(JsonValue::String(raw)) if raw.trim().is_empty() => PowerUnit::Kw,
        Some(JsonValue::String(raw)) => PowerUnit::parse(raw)
            .ok_or_else(|| AcquireError::pull_failed(format!("unsupported unit {raw:?}")))?,
        Some(other) => {
            return Err(AcquireError::pull_failed(format!(
                "unit is not a string: {other}"
            )))
        }
    };

    let timestamp = document
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or(acquired_at);

    Ok(RawReading {
        value,
        unit,
        timestamp,
        metadata: None,
    })
}
