//! `DestinationClient`: the seam between the core engine and a per-destination
//! wire protocol adapter (§1 "Out of scope"; §4.7, §4.9 "Design notes").
//!
//! Destination clients are not shared across destination workers -- each
//! worker owns its own client instance (§5 "Shared resources").

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use virtwho_report::{Report, StatusInfo};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("destination request failed: {0}")]
    Request(String),

    #[error("destination rejected the submission permanently: {0}")]
    Fatal(String),
}

/// Outcome of a single `hypervisor_checkin`/`send_guest_list` call (§4.7
/// "Submission protocol").
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 2xx with a synchronous result: the destination already applied the
    /// update, nothing further to poll.
    Synchronous,
    /// 2xx with an async job handle: the caller must poll
    /// `check_job_state` on subsequent cycles.
    Async { job_id: String },
}

/// Outcome of a `check_job_state` poll (§4.7 "state machine per pending
/// submission").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Finished,
    Failed,
    Canceled,
}

/// One destination endpoint's wire protocol, abstracted from the core
/// engine. Implementations talk to subscription-manager/Satellite over
/// whatever transport that destination uses; the core only ever sees these
/// three calls plus a correlation id it supplies for tracing (§7).
#[async_trait]
pub trait DestinationClient: Send {
    /// Submits a `GuestList` report. Satellite-5 destinations don't
    /// implement this at all -- the worker never calls it for that variant
    /// (§4.7 "Satellite-5 variant").
    async fn send_guest_list(&self, report: &Report, correlation_id: &str) -> Result<SubmitOutcome, ClientError>;

    /// Submits a (possibly merged) `HostGuestAssociation` report.
    async fn hypervisor_checkin(&self, report: &Report, correlation_id: &str) -> Result<SubmitOutcome, ClientError>;

    /// Polls the state of a previously returned async job id.
    async fn check_job_state(&self, job_id: &str, correlation_id: &str) -> Result<JobState, ClientError>;

    /// Status-mode heartbeat (§4.7 "Status destination"). Most destination
    /// clients have no heartbeat RPC of their own; the default simply
    /// succeeds so the worker's status-file bookkeeping runs independent of
    /// whether a destination has anything to notify.
    async fn heartbeat(&self, _status: &StatusInfo, _correlation_id: &str) -> Result<(), ClientError> {
        Ok(())
    }
}
