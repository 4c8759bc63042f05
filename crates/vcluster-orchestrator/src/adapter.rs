//! Interface to the virtualization layer.

use vcluster_core::{ExistingVm, ResourceSnapshot};
use vcluster_placement::VmPlacement;

use crate::error::AdapterResult;

/// Everything the orchestrator needs from the virtualization layer.
///
/// Calls are blocking; timeouts are the implementation's business. The
/// orchestrator logs out exactly once for every successful login.
pub trait CloudAdapter: Send {
    fn login(&mut self, address: &str, user: &str, password: &str) -> AdapterResult<()>;

    fn logout(&mut self);

    /// Resource snapshot of `datacenter`, including the layout of the
    /// template the cluster's VMs are cloned from.
    fn fetch_datacenter(&mut self, datacenter: &str, template_id: &str) -> AdapterResult<ResourceSnapshot>;

    /// Clone and configure one planned VM.
    fn provision(&mut self, vm: &VmPlacement) -> AdapterResult<()>;

    fn destroy(&mut self, vm: &ExistingVm) -> AdapterResult<()>;
}
