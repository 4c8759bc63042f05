//! Orchestrator and adapter error types.

use thiserror::Error;

use vcluster_core::ConfigError;

/// Failures reported by a [`CloudAdapter`](crate::CloudAdapter).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("login to {address} failed: {reason}")]
    Login { address: String, reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("datacenter not found: {0}")]
    DatacenterNotFound(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("fetching resources failed: {0}")]
    Fetch(String),

    #[error("provisioning {vm} failed: {reason}")]
    Provision { vm: String, reason: String },

    #[error("vm not found: {0}")]
    VmNotFound(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors that end a cluster run as failed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("connection failed: {0}")]
    Connection(AdapterError),

    #[error("resource fetch failed: {0}")]
    Fetch(AdapterError),

    #[error("deploy failed for {failed} vm(s): {last}")]
    Deploy { failed: usize, last: String },

    #[error("run aborted")]
    Aborted,

    #[error("invalid cluster spec: {0}")]
    InvalidSpec(#[from] ConfigError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
