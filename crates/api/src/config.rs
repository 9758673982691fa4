use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vision::GenerationSettings;

/// Names a JSON file with settings; environment variables override it.
pub const CONFIG_PATH_VAR: &str = "ANALYZE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gcp: GcpConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project_id: String,
    pub location: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub base_url: String,
    /// Read objects from this directory instead of the bucket.
    pub local_root: Option<PathBuf>,
    pub spec_catalog_key: String,
    pub context_prefix: String,
    pub image_field: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "us-central1".to_string(),
            access_token: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            base_url: "https://storage.googleapis.com".to_string(),
            local_root: None,
            spec_catalog_key: catalog::SPEC_CATALOG_KEY.to_string(),
            context_prefix: catalog::context::CONTEXT_PREFIX.to_string(),
            image_field: catalog::image::IMAGE_FIELD.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.5-flash".to_string(),
            base_url: None,
            request_timeout_secs: 60,
            generation: GenerationSettings::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set to a non-empty value")]
    Missing(&'static str),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl AppConfig {
    /// Defaults, then the optional config file, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GCP_PROJECT_ID") {
            self.gcp.project_id = v;
        }
        if let Some(v) = get("GCP_LOCATION") {
            self.gcp.location = v;
        }
        if let Some(v) = get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.gcp.access_token = Some(v);
        }
        if let Some(v) = get("GCS_BUCKET_NAME") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("ANALYZE_LOCAL_STORE") {
            self.storage.local_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("VERTEX_MODEL") {
            self.model.name = v;
        }
        if let Some(v) = get("ANALYZE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gcp.project_id.trim().is_empty() {
            return Err(ConfigError::Missing("GCP_PROJECT_ID"));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("GCS_BUCKET_NAME"));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model.request_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.request_timeout_secs)
    }
}
