//! The `Source` trait: the seam between the core engine and a per-hypervisor
//! adapter (§1 "Out of scope"; §4.6).

use async_trait::async_trait;

use virtwho_report::{Guest, Hypervisor};

use crate::error::VirtError;

/// One configured hypervisor/local adapter. Implementations are expected to
/// raise [`VirtError`] on any recoverable per-cycle failure (bad network,
/// bad credentials, malformed response) rather than panic; the scheduler
/// retries after the configured interval (§4.6).
#[async_trait]
pub trait Source: Send {
    /// `true` for a remote hypervisor manager (`get_host_guest_mapping`),
    /// `false` for a local/bare-metal adapter (`list_domains`).
    fn is_hypervisor(&self) -> bool;

    /// Runs once before the first cycle (adapter connection setup).
    async fn prepare(&mut self) -> Result<(), VirtError> {
        Ok(())
    }

    /// Releases adapter resources. Called when the worker stops.
    async fn cleanup(&mut self) {}

    /// Hypervisor mode: the full host/guest association for every host this
    /// adapter's credentials can see.
    async fn get_host_guest_mapping(&mut self) -> Result<Vec<Hypervisor>, VirtError> {
        unimplemented!("adapter is_hypervisor() == true but get_host_guest_mapping is unimplemented")
    }

    /// Local mode: the guests running on the machine virt-who runs on.
    async fn list_domains(&mut self) -> Result<Vec<Guest>, VirtError> {
        unimplemented!("adapter is_hypervisor() == false but list_domains is unimplemented")
    }

    /// Local mode's own hypervisor id (used to tag `GuestList` reports).
    fn local_hypervisor_id(&self) -> String {
        "local".to_string()
    }
}
