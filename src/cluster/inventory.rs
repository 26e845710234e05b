//! Ansible inventory generation from Terraform outputs.
//!
//! Two shapes are produced:
//!
//! - a grouped static inventory (`all.children`, `mgmtnode`, `workers`,
//!   `storagegroup`) written to disk and read back by the alert webhook
//! - the dynamic-inventory JSON returned by `--list`

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::InventoryError;

/// Terraform output key holding the management node IPs.
pub const MGMT_OUTPUT: &str = "mgmt_vm_ips";
/// Terraform output key holding the worker node IPs.
pub const WORKER_OUTPUT: &str = "worker_vm_ips";
/// Terraform output key holding the storage node IPs.
pub const STORAGE_OUTPUT: &str = "storage_vm_ips";
/// Older single-group key some deployments use for worker IPs.
const LEGACY_WORKER_OUTPUT: &str = "vm_ips";

const MGMT_GROUP: &str = "mgmtnode";
const WORKER_GROUP: &str = "workers";
const STORAGE_GROUP: &str = "storagegroup";

/// IP addresses of the cluster's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNodes {
    pub mgmt: String,
    pub workers: Vec<String>,
    /// May be empty; the grouped inventory requires at least one.
    pub storage: Vec<String>,
}

impl ClusterNodes {
    /// Builds node lists from explicit IPs.
    pub fn new(
        mgmt: Option<String>,
        workers: Vec<String>,
        storage: Vec<String>,
    ) -> Result<Self, InventoryError> {
        let mgmt = mgmt
            .filter(|ip| !ip.is_empty())
            .ok_or(InventoryError::MissingNodes("management node IP"))?;
        if workers.is_empty() {
            return Err(InventoryError::MissingNodes("worker node IPs"));
        }
        Ok(Self {
            mgmt,
            workers,
            storage,
        })
    }

    /// Reads node lists from parsed `terraform output -json`.
    ///
    /// Each key maps to `{"value": [ip, ...]}`; values that are not lists of
    /// strings are ignored.
    pub fn from_terraform_outputs(outputs: &Value) -> Result<Self, InventoryError> {
        let mgmt = output_ips(outputs, MGMT_OUTPUT).into_iter().next();
        let mut workers = output_ips(outputs, WORKER_OUTPUT);
        if workers.is_empty() {
            workers = output_ips(outputs, LEGACY_WORKER_OUTPUT);
        }
        let storage = output_ips(outputs, STORAGE_OUTPUT);
        Self::new(mgmt, workers, storage)
    }

    /// Runs `terraform output -json` in `dir` and reads the node lists.
    pub async fn from_terraform(dir: Option<&Path>) -> Result<Self, InventoryError> {
        let outputs = terraform_outputs(dir).await?;
        Self::from_terraform_outputs(&outputs)
    }
}

fn output_ips(outputs: &Value, key: &str) -> Vec<String> {
    outputs
        .get(key)
        .and_then(|o| o.get("value"))
        .and_then(Value::as_array)
        .map(|ips| {
            ips.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Runs `terraform output -json` and parses its stdout.
pub async fn terraform_outputs(dir: Option<&Path>) -> Result<Value, InventoryError> {
    let mut cmd = Command::new("terraform");
    cmd.args(["output", "-json"]);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    debug!(dir = ?dir, "Running terraform output");

    let output = cmd
        .output()
        .await
        .map_err(|e| InventoryError::TerraformFailed(e.to_string()))?;

    if !output.status.success() {
        return Err(InventoryError::TerraformFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    serde_json::from_slice(&output.stdout).map_err(InventoryError::InvalidOutputs)
}

/// Connection variables for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVars {
    pub ansible_host: String,
}

/// An inventory group and its hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub hosts: BTreeMap<String, HostVars>,
}

/// The `all` group listing child groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllGroup {
    pub children: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Grouped static inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub all: AllGroup,
    pub mgmtnode: HostGroup,
    pub workers: HostGroup,
    pub storagegroup: HostGroup,
}

impl Inventory {
    /// Builds the grouped inventory. Workers are named `worker1..N`.
    pub fn grouped(nodes: &ClusterNodes) -> Result<Self, InventoryError> {
        let storage = nodes
            .storage
            .first()
            .ok_or(InventoryError::MissingNodes("storage node IPs"))?;

        let children = [MGMT_GROUP, WORKER_GROUP, STORAGE_GROUP]
            .into_iter()
            .map(|g| (g.to_string(), BTreeMap::new()))
            .collect();

        let workers = nodes
            .workers
            .iter()
            .enumerate()
            .map(|(i, ip)| (format!("worker{}", i + 1), host(ip)))
            .collect();

        Ok(Self {
            all: AllGroup { children },
            mgmtnode: HostGroup {
                hosts: BTreeMap::from([("host".to_string(), host(&nodes.mgmt))]),
            },
            workers: HostGroup { hosts: workers },
            storagegroup: HostGroup {
                hosts: BTreeMap::from([("storage".to_string(), host(storage))]),
            },
        })
    }

    /// Reads an inventory file.
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the inventory as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), InventoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_pretty_json()?)?;
        info!(path = %path.display(), workers = self.workers.hosts.len(), "Inventory written");
        Ok(())
    }

    pub fn to_pretty_json(&self) -> Result<String, InventoryError> {
        to_pretty_json(self)
    }

    /// Returns whether `name` is one of the inventory's worker hosts.
    pub fn has_worker(&self, name: &str) -> bool {
        self.workers.hosts.contains_key(name)
    }

    /// Returns the worker host name whose address is `ip`.
    pub fn worker_name_for(&self, ip: &str) -> Option<&str> {
        self.workers
            .hosts
            .iter()
            .find(|(_, vars)| vars.ansible_host == ip)
            .map(|(name, _)| name.as_str())
    }
}

fn host(ip: &str) -> HostVars {
    HostVars {
        ansible_host: ip.to_string(),
    }
}

/// Per-host variables in a dynamic inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicHostVars {
    pub ip: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicMeta {
    pub hostvars: BTreeMap<String, DynamicHostVars>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicChildren {
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGroup {
    pub hosts: Vec<String>,
}

/// Inventory in the shape Ansible expects from a dynamic inventory `--list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicInventory {
    #[serde(rename = "_meta")]
    pub meta: DynamicMeta,
    pub all: DynamicChildren,
    pub workers: DynamicGroup,
    pub mgmtnode: DynamicGroup,
}

impl DynamicInventory {
    pub fn from_nodes(nodes: &ClusterNodes) -> Self {
        let hostvars = std::iter::once(&nodes.mgmt)
            .chain(nodes.workers.iter())
            .map(|ip| {
                (
                    ip.clone(),
                    DynamicHostVars {
                        ip: vec![ip.clone()],
                    },
                )
            })
            .collect();

        Self {
            meta: DynamicMeta { hostvars },
            all: DynamicChildren {
                children: vec![MGMT_GROUP.to_string(), WORKER_GROUP.to_string()],
            },
            workers: DynamicGroup {
                hosts: nodes.workers.clone(),
            },
            mgmtnode: DynamicGroup {
                hosts: vec![nodes.mgmt.clone()],
            },
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, InventoryError> {
        to_pretty_json(self)
    }
}

/// Serializes with four-space indentation.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, InventoryError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| {
        InventoryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Response for a dynamic inventory `--host` query; host variables are
/// carried in `_meta` instead.
pub fn host_vars_response() -> &'static str {
    "{}"
}
