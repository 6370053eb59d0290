//! Guest/hypervisor report data model and canonical hashing.
//!
//! This crate has no knowledge of the datastore, the filter engine, or the
//! wire protocol of any particular destination — it only models the shape of
//! what a source produces and how two reports are compared for equality.

mod guest;
mod hypervisor;
mod report;

pub use guest::{Guest, GuestState};
pub use hypervisor::Hypervisor;
pub use report::{Report, ReportState, StatusInfo};
