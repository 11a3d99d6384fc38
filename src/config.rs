//! Environment-based configuration loading.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

pub use config::ConfigError;

/// Deserialize any `Deserialize` type straight from environment variables.
pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        c.try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()?;
        c.try_deserialize()
    }
}

/// Settings for the submission path and worker, loaded with
/// [`EnvConfig::from_env`] (or a prefixed variant) by the host process.
///
/// The `sender_email` is the fixed sending identity every record is written
/// under; submissions do not carry the caller's identity.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Fixed sender identity for all submitted emails.
    pub sender_email: String,

    /// Root directory for the filesystem blob store.
    #[serde(default = "default_blob_root")]
    pub blob_root: String,

    /// Scratch directory for worker-side attachment downloads.
    pub scratch_dir: Option<String>,

    /// Maximum jobs a worker processes in parallel.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Worker poll interval in milliseconds when the queue is idle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_blob_root() -> String {
    "attachments".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}
