//! Status-mode persistence: the JSON schema from §6 that survives process
//! restarts so a status destination can report "last successful retrieve" /
//! "last successful send" even across virt-who invocations.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// `{sources: {name: {...}}, destinations: {name: {...}}}` (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusFile {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceStatus>,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    pub last_successful_retrieve: Option<String>,
    pub hypervisors: usize,
    pub guests: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DestinationStatus {
    pub last_successful_send: Option<String>,
    pub last_job_id: Option<String>,
}

impl StatusFile {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    /// Writes to a sibling temp file then renames it into place, so a crash
    /// mid-write never leaves a truncated/corrupt status file behind.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let contents = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)
    }

    /// Merges a prior run's persisted status for `destination_name` into an
    /// outgoing status report, carrying forward the last known send/job-id
    /// when this cycle hasn't produced fresher values yet (§4.7 "Status
    /// destination").
    pub fn merge_destination(&self, destination_name: &str, send_timestamp: Option<&str>, job_id: Option<&str>) -> DestinationStatus {
        let mut status = self.destinations.get(destination_name).cloned().unwrap_or_default();
        if let Some(ts) = send_timestamp {
            status.last_successful_send = Some(ts.to_string());
        }
        if let Some(job) = job_id {
            status.last_job_id = Some(job.to_string());
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut status = StatusFile::default();
        status.sources.insert(
            "esx-1".to_string(),
            SourceStatus { last_successful_retrieve: Some("2026-01-01T00:00:00Z".to_string()), hypervisors: 2, guests: 5 },
        );
        let json = serde_json::to_string(&status).unwrap();
        let parsed: StatusFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn load_of_missing_file_is_default() {
        let status = StatusFile::load(Path::new("/nonexistent/virtwho-status.json"));
        assert_eq!(status, StatusFile::default());
    }

    #[test]
    fn merge_carries_forward_unset_fields() {
        let mut status = StatusFile::default();
        status.destinations.insert(
            "sam-1".to_string(),
            DestinationStatus { last_successful_send: Some("old".to_string()), last_job_id: Some("job-1".to_string()) },
        );
        let merged = status.merge_destination("sam-1", None, Some("job-2"));
        assert_eq!(merged.last_successful_send, Some("old".to_string()));
        assert_eq!(merged.last_job_id, Some("job-2".to_string()));
    }
}
