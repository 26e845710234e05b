//! Alert handling: maps alerts onto cluster actions.
//!
//! | Alert           | Status   | Action                          |
//! |-----------------|----------|---------------------------------|
//! | `HighDiskUsage` | firing   | run the disk cleanup playbook   |
//! | `HighCPULoad`   | firing   | disable the worker              |
//! | `HighCPULoad`   | resolved | enable the worker               |
//!
//! Anything else is ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::lock::FileLock;
use super::payload::{Alert, AlertStatus, WebhookPayload, HIGH_CPU_LOAD, HIGH_DISK_USAGE};
use crate::cluster::{Inventory, WorkerAction, WorkerRegistry};
use crate::error::AlertError;

/// Side effects triggered by alerts.
#[async_trait]
pub trait AlertActions: Send + Sync {
    /// Frees disk space across the cluster.
    async fn cleanup_disk(&self) -> Result<(), AlertError>;

    /// Stops `worker` from taking new jobs.
    async fn disable_worker(&self, worker: &str) -> Result<(), AlertError>;

    /// Lets `worker` take jobs again.
    async fn enable_worker(&self, worker: &str) -> Result<(), AlertError>;
}

/// Production actions: `ansible-playbook` for cleanup and the disabled-worker
/// registry for CPU alerts.
pub struct ClusterActions {
    inventory_path: PathBuf,
    cleanup_playbook: PathBuf,
    registry: Arc<dyn WorkerRegistry>,
}

impl ClusterActions {
    pub fn new(
        inventory_path: impl Into<PathBuf>,
        cleanup_playbook: impl Into<PathBuf>,
        registry: Arc<dyn WorkerRegistry>,
    ) -> Self {
        Self {
            inventory_path: inventory_path.into(),
            cleanup_playbook: cleanup_playbook.into(),
            registry,
        }
    }
}

#[async_trait]
impl AlertActions for ClusterActions {
    async fn cleanup_disk(&self) -> Result<(), AlertError> {
        info!(playbook = %self.cleanup_playbook.display(), "Running disk cleanup playbook");

        let status = Command::new("ansible-playbook")
            .arg("-i")
            .arg(&self.inventory_path)
            .arg(&self.cleanup_playbook)
            .status()
            .await
            .map_err(|source| AlertError::Spawn {
                program: "ansible-playbook".to_string(),
                source,
            })?;

        if !status.success() {
            return Err(AlertError::PlaybookFailed {
                playbook: self.cleanup_playbook.clone(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    async fn disable_worker(&self, worker: &str) -> Result<(), AlertError> {
        self.registry.apply(worker, WorkerAction::Disable).await?;
        Ok(())
    }

    async fn enable_worker(&self, worker: &str) -> Result<(), AlertError> {
        self.registry.apply(worker, WorkerAction::Enable).await?;
        Ok(())
    }
}

/// Counts from handling one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleSummary {
    /// Alerts whose action succeeded.
    pub handled: usize,
    /// Alerts with no associated action.
    pub ignored: usize,
    /// Alerts whose action returned an error.
    pub failed: usize,
}

enum InventorySource {
    None,
    Fixed(Inventory),
    File(PathBuf),
}

/// Applies alert actions, one request at a time.
pub struct AlertDispatcher {
    actions: Arc<dyn AlertActions>,
    inventory: InventorySource,
    lock_file: Option<PathBuf>,
    serial: Mutex<()>,
}

impl AlertDispatcher {
    pub fn new(actions: Arc<dyn AlertActions>) -> Self {
        Self {
            actions,
            inventory: InventorySource::None,
            lock_file: None,
            serial: Mutex::new(()),
        }
    }

    /// Resolves instance addresses to worker names with a fixed inventory.
    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = InventorySource::Fixed(inventory);
        self
    }

    /// Resolves instance addresses with the inventory file at `path`,
    /// re-read for every request.
    pub fn with_inventory_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = InventorySource::File(path.into());
        self
    }

    /// Holds an advisory lock on `path` while a request is processed.
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Handles every alert in `payload`.
    ///
    /// Action failures are logged and counted; later alerts are still
    /// processed.
    pub async fn handle(&self, payload: &WebhookPayload) -> HandleSummary {
        let _serial = self.serial.lock().await;
        let _lock = match &self.lock_file {
            Some(path) => match FileLock::acquire_async(path).await {
                Ok(lock) => Some(lock),
                Err(e) => {
                    warn!(error = %e, "Processing alerts without file lock");
                    None
                }
            },
            None => None,
        };

        let inventory = self.load_inventory();
        let mut summary = HandleSummary::default();

        for alert in &payload.alerts {
            match self.handle_alert(alert, inventory.as_ref()).await {
                Ok(true) => summary.handled += 1,
                Ok(false) => summary.ignored += 1,
                Err(e) => {
                    error!(
                        alert = alert.name().unwrap_or("<none>"),
                        instance = alert.instance(),
                        error = %e,
                        "Alert action failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            alerts = payload.alerts.len(),
            handled = summary.handled,
            ignored = summary.ignored,
            failed = summary.failed,
            "Alerts processed"
        );
        summary
    }

    /// Returns whether an action ran.
    async fn handle_alert(
        &self,
        alert: &Alert,
        inventory: Option<&Inventory>,
    ) -> Result<bool, AlertError> {
        match (alert.name(), alert.status) {
            (Some(HIGH_DISK_USAGE), AlertStatus::Firing) => {
                self.actions.cleanup_disk().await?;
            }
            (Some(HIGH_CPU_LOAD), AlertStatus::Firing) => {
                let worker = worker_name(alert.instance(), inventory);
                self.actions.disable_worker(&worker).await?;
            }
            (Some(HIGH_CPU_LOAD), AlertStatus::Resolved) => {
                let worker = worker_name(alert.instance(), inventory);
                self.actions.enable_worker(&worker).await?;
            }
            (name, status) => {
                debug!(alert = ?name, status = ?status, "Ignoring alert");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn load_inventory(&self) -> Option<Inventory> {
        match &self.inventory {
            InventorySource::None => None,
            InventorySource::Fixed(inventory) => Some(inventory.clone()),
            InventorySource::File(path) => load_inventory_file(path),
        }
    }
}

fn load_inventory_file(path: &Path) -> Option<Inventory> {
    match Inventory::load(path) {
        Ok(inventory) => Some(inventory),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Inventory unavailable, using instance names as-is");
            None
        }
    }
}

/// Worker name for an alert's `instance` label.
///
/// A trailing `:port` is removed; the remaining host is mapped to its
/// inventory name when the inventory knows it.
pub fn worker_name(instance: &str, inventory: Option<&Inventory>) -> String {
    let host = strip_port(instance);
    inventory
        .and_then(|inv| inv.worker_name_for(host))
        .unwrap_or(host)
        .to_string()
}

fn strip_port(instance: &str) -> &str {
    match instance.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty() && !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => instance,
    }
}
