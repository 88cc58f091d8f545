//! `eter.toml` configuration: file loading, defaults and environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use pipeline::{BrandIdentity, ModelId, StageCatalog, StageId, TenantId};
use stages::FailurePolicy;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".eter/config.toml";

const DEFAULT_TENANT: &str = "default";

/// Root of `eter.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Tenant whose runs are read and written.
    pub tenant: Option<String>,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub telemetry: TelemetryConfig,
    /// Brand voice appended to every stage prompt.
    pub brand: Option<BrandIdentity>,
}

/// `[provider]`: the chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Model tried once when a stage's preferred model fails.
    pub fallback_model: Option<ModelId>,
    pub referer: Option<String>,
    pub app_title: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openrouter".to_string(),
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: llm::DEFAULT_TIMEOUT.as_secs(),
            fallback_model: None,
            referer: None,
            app_title: Some("ETER".to_string()),
        }
    }
}

/// `[pipeline]`: failure policy and per-stage model overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    /// Stage name (legacy names accepted) to model id.
    pub models: BTreeMap<String, ModelId>,
}

/// `[store]`: where run files live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".eter/runs"),
        }
    }
}

/// `[ingest]`: the document analysis webhook.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: ingest::DEFAULT_INGEST_TIMEOUT.as_secs(),
        }
    }
}

/// `[telemetry]`: log filter, format and optional OTLP export.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "warn,stages=info".to_string(),
            json: false,
            otlp_endpoint: None,
            service_name: "eter".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
    /// read if present and built-in defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Parses one TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Applies `ETER_TENANT`, `ETER_STORE_DIR` and `ETER_FAILURE_POLICY`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(tenant) = lookup("ETER_TENANT") {
            self.tenant = Some(tenant);
        }
        if let Some(dir) = lookup("ETER_STORE_DIR") {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup("ETER_FAILURE_POLICY") {
            self.pipeline.failure_policy = policy
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid ETER_FAILURE_POLICY")?;
        }
        Ok(self)
    }

    /// Tenant id, preferring `flag` over configuration.
    pub fn tenant(&self, flag: Option<&str>) -> Result<TenantId> {
        let raw = flag.or(self.tenant.as_deref()).unwrap_or(DEFAULT_TENANT);
        TenantId::new(raw).with_context(|| format!("Invalid tenant id '{raw}'"))
    }

    /// Default stage catalog with the configured model overrides.
    pub fn catalog(&self) -> Result<StageCatalog> {
        let mut catalog = StageCatalog::default();
        for (name, model) in &self.pipeline.models {
            let stage: StageId = name
                .parse()
                .with_context(|| format!("Invalid [pipeline.models] entry '{name}'"))?;
            catalog = catalog.with_model(stage, model.clone());
        }
        Ok(catalog)
    }

    /// Provider timeout.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}
