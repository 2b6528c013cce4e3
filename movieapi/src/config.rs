//! Configuration management
//!
//! Values come from an optional `movieapi.toml` and `MOVIEAPI_*` environment
//! variables (`MOVIEAPI_TABLE__NAME`, `MOVIEAPI_STREAMS__BATCH_SIZE`, ...).
//! Command-line flags override them.

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub streams: StreamsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_table_name")]
    pub name: String,

    /// Remote DynamoDB endpoint; the in-process store is used when unset
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: default_table_name(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamsConfig {
    /// Most change records projected per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_table_name() -> String {
    "movie-api-table".to_string()
}

fn default_batch_size() -> usize {
    10
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("movieapi").required(false))
            .add_source(config::Environment::with_prefix("MOVIEAPI").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.table.name, "movie-api-table");
        assert!(config.table.endpoint.is_none());
        assert_eq!(config.streams.batch_size, 10);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = config::Config::builder()
            .set_override("table.endpoint", "http://localhost:8000")
            .unwrap()
            .set_override("streams.batch_size", 100)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<Config>()
            .unwrap();

        assert_eq!(config.table.name, "movie-api-table");
        assert_eq!(config.table.endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.streams.batch_size, 100);
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
