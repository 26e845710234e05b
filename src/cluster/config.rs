//! Cluster-side configuration: Redis, queue names, and control-plane paths.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::pipeline::config::{parse_env_value, ConfigError};

/// Configuration shared by the dispatcher, workers, and webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Name of the structure job queue.
    pub queue_name: String,
    /// Redis set holding disabled worker names.
    pub disabled_workers_key: String,
    /// Inventory file written by `inventory` and read by the webhook.
    pub inventory_path: PathBuf,
    /// Playbook run on high disk usage alerts.
    pub cleanup_playbook: PathBuf,
    /// Advisory lock file serializing alert processing.
    pub lock_file: PathBuf,
    /// Address the webhook listens on.
    pub webhook_bind: SocketAddr,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            queue_name: "structures".to_string(),
            disabled_workers_key: "disabled_workers".to_string(),
            inventory_path: PathBuf::from("../ansible/inventories/inventory.json"),
            cleanup_playbook: PathBuf::from("../ansible/playbooks/cleanup_disk_space.yml"),
            lock_file: std::env::temp_dir().join("domain-forge-webhook.lock"),
            webhook_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl ClusterConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379/0)
    /// - `QUEUE_NAME`: job queue name (default: structures)
    /// - `DISABLED_WORKERS_KEY`: Redis set of disabled workers (default: disabled_workers)
    /// - `INVENTORY_PATH`: inventory JSON file
    /// - `CLEANUP_PLAYBOOK`: disk cleanup playbook
    /// - `WEBHOOK_LOCK_FILE`: lock file for alert processing
    /// - `WEBHOOK_BIND`: listen address (default: 0.0.0.0:8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }

        if let Ok(val) = std::env::var("QUEUE_NAME") {
            config.queue_name = val;
        }

        if let Ok(val) = std::env::var("DISABLED_WORKERS_KEY") {
            config.disabled_workers_key = val;
        }

        if let Ok(val) = std::env::var("INVENTORY_PATH") {
            config.inventory_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CLEANUP_PLAYBOOK") {
            config.cleanup_playbook = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WEBHOOK_LOCK_FILE") {
            config.lock_file = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("WEBHOOK_BIND") {
            config.webhook_bind = parse_env_value(&val, "WEBHOOK_BIND")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::ValidationFailed(format!(
                "redis_url must start with redis:// or rediss://, got '{}'",
                self.redis_url
            )));
        }

        if self.queue_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.disabled_workers_key.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "disabled_workers_key cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
