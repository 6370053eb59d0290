//! Destination-side worker: the counterpart to `virtwho-source`. Owns one or
//! more source configs' worth of reports pulled from the shared datastore,
//! batches/dedups/submits them through a [`client::DestinationClient`], and
//! polls any asynchronous jobs the destination hands back (§4.7).

mod client;
mod http_client;
mod satellite5_client;
mod status;
mod worker;

pub use client::{ClientError, DestinationClient, JobState, SubmitOutcome};
pub use http_client::{RhsmHttpClient, RhsmHttpConfig};
pub use satellite5_client::{assemble_plan, Satellite5Config, Satellite5HttpClient};
pub use status::{DestinationStatus, SourceStatus, StatusFile};
pub use worker::{Batching, DestinationWorker, DEFAULT_RATE_LIMIT_BACKOFF, MINIMUM_JOB_POLL_INTERVAL};
