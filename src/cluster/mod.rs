//! Cluster control plane: configuration, node inventory, and the set of
//! disabled workers.

pub mod config;
pub mod inventory;
pub mod workers;

pub use config::ClusterConfig;
pub use inventory::{ClusterNodes, DynamicInventory, Inventory};
pub use workers::{MemoryWorkerRegistry, RedisWorkerRegistry, WorkerAction, WorkerRegistry};

/// Host name of this machine, used as the worker's node name.
///
/// Falls back to `HOSTNAME` and then `localhost` when the system call fails.
pub fn local_node_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc == 0 {
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let name = String::from_utf8_lossy(&buf[..len]).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
