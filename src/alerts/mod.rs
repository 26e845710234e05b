//! Alertmanager webhook control loop.
//!
//! Disk usage alerts trigger a cleanup playbook; CPU load alerts disable a
//! worker while firing and enable it again once resolved.

pub mod handler;
pub mod lock;
pub mod payload;
pub mod server;

pub use handler::{worker_name, AlertActions, AlertDispatcher, ClusterActions, HandleSummary};
pub use lock::FileLock;
pub use payload::{Alert, AlertStatus, WebhookPayload};
pub use server::{build_router, serve, WEBHOOK_PATH};
