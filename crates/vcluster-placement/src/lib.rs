//! vcluster placement — maps VM group requirements onto infrastructure.
//!
//! The planner works on a single resource snapshot per pass. Capacity it
//! hands out is tracked as *unaccounted* reservations on the snapshot's
//! pools, hosts and datastores, so later groups in the same pass see the
//! earlier ones. Nothing here talks to the infrastructure.
//!
//! # Components
//!
//! - **`rotation`** — Cyclic candidate rotation with permanent eviction
//! - **`inventory`** — Planning view of pools, hosts and datastores
//! - **`planner`** — Per-group placement (pool → host → datastores)

pub mod inventory;
pub mod planner;
pub mod rotation;

pub use inventory::{DatastoreId, DatastoreState, HostId, HostState, Inventory, PoolId, PoolState};
pub use planner::{
    DiskPlacement, GroupPlacement, GroupPlacementPlanner, PlannerConfig, Shortfall, VmPlacement,
};
pub use rotation::{Rotation, Verdict};
