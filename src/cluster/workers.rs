//! Registry of disabled workers.
//!
//! Workers whose node name is in the registry stop taking new jobs until they
//! are enabled again. The production registry is a Redis set
//! (`disabled_workers`); alert handling adds and removes names from it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RegistryError;

/// Change applied to a worker's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Disable,
    Enable,
}

impl FromStr for WorkerAction {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(WorkerAction::Disable),
            "enable" => Ok(WorkerAction::Enable),
            other => Err(RegistryError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for WorkerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerAction::Disable => write!(f, "disable"),
            WorkerAction::Enable => write!(f, "enable"),
        }
    }
}

/// Storage for the set of disabled worker names.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Adds `name` to the disabled set.
    async fn disable(&self, name: &str) -> Result<(), RegistryError>;

    /// Removes `name` from the disabled set.
    async fn enable(&self, name: &str) -> Result<(), RegistryError>;

    /// Returns whether `name` is currently disabled.
    async fn is_disabled(&self, name: &str) -> Result<bool, RegistryError>;

    /// Lists disabled workers, sorted.
    async fn disabled(&self) -> Result<Vec<String>, RegistryError>;

    /// Applies `action` to `name`.
    async fn apply(&self, name: &str, action: WorkerAction) -> Result<(), RegistryError> {
        match action {
            WorkerAction::Disable => self.disable(name).await?,
            WorkerAction::Enable => self.enable(name).await?,
        }
        info!(worker = name, action = %action, "Worker state updated");
        Ok(())
    }
}

/// Disabled-worker registry backed by a Redis set.
#[derive(Clone)]
pub struct RedisWorkerRegistry {
    redis: ConnectionManager,
    key: String,
}

impl RedisWorkerRegistry {
    /// Connects to Redis.
    pub async fn connect(redis_url: &str, key: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RegistryError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| RegistryError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, key))
    }

    /// Creates a registry from an existing connection.
    pub fn from_connection(redis: ConnectionManager, key: &str) -> Self {
        Self {
            redis,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl WorkerRegistry for RedisWorkerRegistry {
    async fn disable(&self, name: &str) -> Result<(), RegistryError> {
        let mut conn = self.redis.clone();
        conn.sadd::<_, _, ()>(&self.key, name).await?;
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<(), RegistryError> {
        let mut conn = self.redis.clone();
        conn.srem::<_, _, ()>(&self.key, name).await?;
        Ok(())
    }

    async fn is_disabled(&self, name: &str) -> Result<bool, RegistryError> {
        let mut conn = self.redis.clone();
        let member: bool = conn.sismember(&self.key, name).await?;
        Ok(member)
    }

    async fn disabled(&self) -> Result<Vec<String>, RegistryError> {
        let mut conn = self.redis.clone();
        let mut names: Vec<String> = conn.smembers(&self.key).await?;
        names.sort();
        Ok(names)
    }
}

/// In-process registry, for single-node runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWorkerRegistry {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRegistry for MemoryWorkerRegistry {
    async fn disable(&self, name: &str) -> Result<(), RegistryError> {
        self.names.lock().await.insert(name.to_string());
        Ok(())
    }

    async fn enable(&self, name: &str) -> Result<(), RegistryError> {
        self.names.lock().await.remove(name);
        Ok(())
    }

    async fn is_disabled(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.names.lock().await.contains(name))
    }

    async fn disabled(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.names.lock().await.iter().cloned().collect())
    }
}
