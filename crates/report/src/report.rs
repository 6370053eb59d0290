use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::guest::Guest;
use crate::hypervisor::Hypervisor;

/// State of a report as it travels through the datastore and the
/// destination's submission/job-polling state machine (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportState {
    Created,
    Processing,
    Finished,
    Failed,
    Canceled,
}

impl ReportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReportState::Finished | ReportState::Failed | ReportState::Canceled
        )
    }
}

/// A typed message produced by a source worker and consumed by a destination
/// worker through the datastore. Modeled as a tagged variant (not an
/// inheritance tree) so the destination worker dispatches on report kind with
/// a plain `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// A flat list of guests tied to the machine virt-who runs on.
    GuestList {
        config: String,
        hypervisor_id: String,
        guests: Vec<Guest>,
        state: ReportState,
    },
    /// Host/guest association report from a remote hypervisor manager.
    HostGuestAssociation {
        config: String,
        hypervisors: Vec<Hypervisor>,
        state: ReportState,
        job_id: Option<String>,
    },
    /// Heartbeat/credential-check probe. Fields are filled in transit by the
    /// source (retrieval counters) and the destination (send counters).
    Status {
        config: String,
        info: StatusInfo,
        state: ReportState,
    },
    /// Signals a failed collection cycle for `config`.
    Error { config: String, message: String },
}

/// Liveness/credential-check information gathered in status mode.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusInfo {
    pub source_errors: Vec<String>,
    pub destination_errors: Vec<String>,
    pub hypervisors: usize,
    pub guests: usize,
}

impl Report {
    pub fn config(&self) -> &str {
        match self {
            Report::GuestList { config, .. } => config,
            Report::HostGuestAssociation { config, .. } => config,
            Report::Status { config, .. } => config,
            Report::Error { config, .. } => config,
        }
    }

    pub fn state(&self) -> Option<ReportState> {
        match self {
            Report::GuestList { state, .. } => Some(*state),
            Report::HostGuestAssociation { state, .. } => Some(*state),
            Report::Status { state, .. } => Some(*state),
            Report::Error { .. } => None,
        }
    }

    pub fn set_state(&mut self, new_state: ReportState) {
        match self {
            Report::GuestList { state, .. } => *state = new_state,
            Report::HostGuestAssociation { state, .. } => *state = new_state,
            Report::Status { state, .. } => *state = new_state,
            Report::Error { .. } => {}
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Report::HostGuestAssociation { job_id, .. } => job_id.as_deref(),
            _ => None,
        }
    }

    pub fn set_job_id(&mut self, job_id: Option<String>) {
        if let Report::HostGuestAssociation { job_id: slot, .. } = self {
            *slot = job_id;
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Report::Error { .. })
    }

    /// Returns the number of hypervisors carried by a `HostGuestAssociation`,
    /// or `None` for other report kinds. Used to detect the "zero hypervisor"
    /// edge case that resets a destination's last-sent hash (§4.7, §8.4).
    pub fn hypervisor_count(&self) -> Option<usize> {
        match self {
            Report::HostGuestAssociation { hypervisors, .. } => Some(hypervisors.len()),
            _ => None,
        }
    }

    /// Produces a new report restricted to the hypervisors accepted by
    /// `matches`. Non-association reports are returned unchanged. Filtering
    /// happens here, at read time, never at construction — the caller (the
    /// destination worker) owns the filter configuration and supplies the
    /// predicate (§4.2).
    pub fn filtered(&self, matches: impl Fn(&str) -> bool) -> Report {
        match self {
            Report::HostGuestAssociation {
                config,
                hypervisors,
                ..
            } => Report::HostGuestAssociation {
                config: config.clone(),
                hypervisors: hypervisors
                    .iter()
                    .filter(|h| matches(h.hypervisor_id()))
                    .cloned()
                    .collect(),
                state: ReportState::Created,
                job_id: None,
            },
            other => other.clone(),
        }
    }

    /// Canonical JSON value used for hashing: sorted keys, hypervisor/guest
    /// arrays sorted by id. Not the same as the wire payload (which nests
    /// reports differently per destination protocol); see `destination`
    /// crate for wire encoding.
    fn canonical_value(&self) -> Value {
        match self {
            Report::GuestList { guests, .. } => {
                let mut sorted: Vec<&Guest> = guests.iter().collect();
                sorted.sort_by(|a, b| a.uuid().cmp(b.uuid()));
                Value::Array(sorted.iter().map(|g| g.to_value()).collect())
            }
            Report::HostGuestAssociation { hypervisors, .. } => {
                let mut sorted: Vec<&Hypervisor> = hypervisors.iter().collect();
                sorted.sort_by(|a, b| a.hypervisor_id().cmp(b.hypervisor_id()));
                json!({ "hypervisors": sorted.iter().map(|h| h.to_value()).collect::<Vec<_>>() })
            }
            Report::Status { info, .. } => serde_json::to_value(info).unwrap_or(Value::Null),
            Report::Error { message, .. } => json!({ "error": message }),
        }
    }

    /// Hex digest of the canonical JSON serialization of this report's
    /// content. Stable across runs/processes; used to elide duplicate
    /// submissions (§4.2, §8 invariant).
    pub fn hash(&self) -> String {
        let bytes = serde_json::to_vec(&self.canonical_value()).expect("canonical value to_vec");
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }
}
