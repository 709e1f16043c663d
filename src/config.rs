use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::protocol::MAX_BATCH_RECORDS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("missing required setting `{0}` (pass a flag or add it to the config file)")]
    Missing(&'static str),

    #[error("invalid setting: {0}")]
    Invalid(&'static str),
}

/// Resolved client configuration: config-file defaults overridden per flag.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub agency: u8,
    pub server_addr: String,
    pub loop_period: Duration,
    pub batch_max: usize,
    pub data_file: PathBuf,
}

/// On-disk shape of the optional JSON config file. Every setting is optional
/// here; completeness is checked only after CLI flags are merged in.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    agency: Option<u8>,
    server_addr: Option<String>,
    loop_period_ms: Option<u64>,
    batch_max: Option<usize>,
    data_file: Option<PathBuf>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ClientConfig {
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let agency = cli
            .agency
            .or(file.agency)
            .ok_or(ConfigError::Missing("agency"))?;
        let server_addr = cli
            .server_addr
            .or(file.server_addr)
            .ok_or(ConfigError::Missing("server_addr"))?;
        let loop_period_ms = cli
            .loop_period_ms
            .or(file.loop_period_ms)
            .ok_or(ConfigError::Missing("loop_period_ms"))?;
        let mut batch_max = cli
            .batch_max
            .or(file.batch_max)
            .ok_or(ConfigError::Missing("batch_max"))?;
        let data_file = cli
            .data_file
            .or(file.data_file)
            .ok_or(ConfigError::Missing("data_file"))?;

        if batch_max == 0 {
            return Err(ConfigError::Invalid("batch_max must be at least 1"));
        }
        if batch_max > MAX_BATCH_RECORDS {
            tracing::warn!(
                action = "resolve_config",
                result = "clamp",
                batch_max,
                "batch_max exceeds the one-byte count field, using 255"
            );
            batch_max = MAX_BATCH_RECORDS;
        }

        Ok(Self {
            agency,
            server_addr,
            loop_period: Duration::from_millis(loop_period_ms),
            batch_max,
            data_file,
        })
    }
}
