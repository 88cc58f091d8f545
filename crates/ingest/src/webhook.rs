//! Multipart upload to an analysis webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use pipeline::{DocumentIngestor, IngestError};

/// Upper bound on one upload; report analysis is slower than a chat turn.
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Uploads documents to a webhook and returns its analysis text.
#[derive(Debug, Clone)]
pub struct WebhookIngestor {
    client: Client,
    url: String,
}

impl WebhookIngestor {
    /// Creates an ingestor posting to `url`.
    ///
    /// # Errors
    ///
    /// [`IngestError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl DocumentIngestor for WebhookIngestor {
    #[instrument(skip(self, bytes), fields(url = %self.url, size = bytes.len()))]
    async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<String, IngestError> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to upload document");
                IngestError::Transport { message: e.to_string() }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Ingestion webhook returned error");
            return Err(IngestError::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| IngestError::Transport { message: e.to_string() })?;

        let analysis = match serde_json::from_str::<Value>(&body) {
            Ok(value) => extract_analysis(&value),
            Err(_) => {
                debug!("Webhook answered with non-JSON text; using it verbatim");
                body
            }
        };
        if analysis.trim().is_empty() {
            warn!("Ingestion webhook returned nothing usable");
            return Err(IngestError::EmptyResponse);
        }
        Ok(analysis)
    }
}

/// Pulls the analysis text out of a webhook response.
pub fn extract_analysis(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) if items.len() == 1 => extract_analysis(&items[0]),
        Value::Object(map) => ["output", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
