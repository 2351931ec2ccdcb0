use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
    /// Create the tables on startup when missing.
    #[serde(default)]
    pub ensure_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub http_bind_addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_batch_records")]
    pub max_batch_records: usize,
}

/// What to do with a CSV row whose `Date & Time` is not `HH:MM:SS DD/MM/YYYY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvTimestampPolicy {
    /// Stamp the row with the processing time.
    #[default]
    FallbackToNow,
    /// Reject the upload, naming the row.
    RejectRow,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsvConfig {
    #[serde(default)]
    pub timestamp_policy: CsvTimestampPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_batch_records() -> usize {
    5_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("INGESTION_CONFIG").unwrap_or_else(|_| "ingestion-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}
