//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use pipeline::{Completion, CompletionProvider, CompletionRequest, ModelId, ProviderError};

/// OpenRouter's API root.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Upper bound on one completion call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

// Error bodies are logged and surfaced to users; keep them short.
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for a [`ChatCompletionsProvider`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Name used in logs and credential errors.
    pub name: String,
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Bearer token. `None` makes every call fail with missing credentials.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Sent as `HTTP-Referer` (OpenRouter attribution).
    pub referer: Option<String>,
    /// Sent as `X-Title` (OpenRouter attribution).
    pub app_title: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            name: "openrouter".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            referer: None,
            app_title: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Completion provider over `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    settings: ChatSettings,
    endpoint: String,
}

impl ChatCompletionsProvider {
    /// Creates a provider.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Transport`] if the HTTP client cannot be built.
    pub fn new(settings: ChatSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        let endpoint = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));
        debug!(provider = %settings.name, endpoint = %endpoint, "Creating chat completions provider");
        Ok(Self {
            client,
            settings,
            endpoint,
        })
    }

    fn classify(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                after: self.settings.timeout,
            }
        } else {
            ProviderError::Transport { message: e.to_string() }
        }
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    #[instrument(skip(self, request), fields(provider = %self.settings.name, model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredentials {
                provider: self.settings.name.clone(),
            })?;

        let body = ChatRequest {
            model: request.model.as_str(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        let mut builder = self.client.post(&self.endpoint).bearer_auth(api_key).json(&body);
        if let Some(referer) = &self.settings.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.settings.app_title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = ?e, "Failed to send completion request");
            self.classify(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Provider returned error");
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| ProviderError::Malformed {
            message: format!("Failed to parse response: {e}"),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed {
                message: "response has no message content".to_string(),
            })?;

        let model = parsed
            .model
            .and_then(ModelId::new)
            .unwrap_or_else(|| request.model.clone());
        debug!(answered_by = %model, chars = content.len(), "Received completion");
        Ok(Completion { text: content, model })
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}
