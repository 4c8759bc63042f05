//! vcluster-core — shared types for the vcluster placement engine.
//!
//! Holds everything the planner and the orchestrator agree on:
//!
//! - **`types`** — desired VM groups and the resource snapshot read from
//!   the virtualization layer
//! - **`config`** — provider and cluster TOML files
//! - **`naming`** — the reversible `{cluster}-{group}-{index}` VM name
//! - **`pattern`** — wildcard datastore patterns
//! - **`network`** — IPv4 address pools handed out to placed VMs

pub mod config;
pub mod error;
pub mod naming;
pub mod network;
pub mod pattern;
pub mod types;

pub use config::{AdapterConfig, ClusterSpec, GroupSpec, ProviderConfig, ProviderCluster};
pub use error::{ConfigError, ConfigResult};
pub use naming::{VmName, vm_name};
pub use network::{IpPool, NetworkSpec};
pub use pattern::{DatastorePatterns, wildcard_to_regex};
pub use types::*;
