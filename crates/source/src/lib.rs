//! Source workers: poll one hypervisor/local adapter on an interval and
//! publish reports into the shared datastore (§4.6).

mod error;
mod fake;
mod source;
mod worker;

pub use error::VirtError;
pub use fake::FakeSource;
pub use source::Source;
pub use worker::SourceWorker;
