//! Shared in-memory store that decouples source workers from destination
//! workers (§4.3). Each source owns exactly one slot, keyed by its config
//! name; each destination worker polls the slots of the sources assigned to
//! it. There is no blocking `get` -- a destination that finds nothing simply
//! waits for its next interval tick.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use virtwho_report::Report;

/// A single named slot. `put` always deep-copies the report in; `take`/`peek`
/// always deep-copy it back out, so callers on either side of the store can
/// never observe or mutate each other's state through shared references.
#[derive(Default)]
struct Inner {
    slots: HashMap<String, Report>,
}

/// Cloneable handle to the shared store. Internally reference-counted, so a
/// clone is cheap and all clones see the same state.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<Mutex<Inner>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Stores (overwriting any previous value) the report produced by the
    /// source named `config`.
    pub fn put(&self, config: &str, report: Report) {
        let mut guard = self.inner.lock();
        guard.slots.insert(config.to_string(), report);
    }

    /// Returns a deep copy of the current report for `config`, if any has
    /// been published yet. Never blocks.
    pub fn peek(&self, config: &str) -> Option<Report> {
        let guard = self.inner.lock();
        guard.slots.get(config).cloned()
    }

    /// Removes and returns the report for `config`, if present. Used by a
    /// destination worker once it has accepted a report for processing, so a
    /// slow destination doesn't resend a report to a faster sibling
    /// destination that already consumed it -- each destination worker keeps
    /// its own last-sent hash instead (§4.7) and `peek` is what's normally
    /// used; `take` exists for destinations that want single-consumer
    /// semantics (e.g. tests).
    pub fn take(&self, config: &str) -> Option<Report> {
        let mut guard = self.inner.lock();
        guard.slots.remove(config)
    }

    /// Names of all sources that have ever published into the store.
    pub fn configs(&self) -> Vec<String> {
        let guard = self.inner.lock();
        guard.slots.keys().cloned().collect()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtwho_report::{Guest, GuestState, Hypervisor, ReportState};

    fn sample(config: &str) -> Report {
        Report::HostGuestAssociation {
            config: config.to_string(),
            hypervisors: vec![Hypervisor::new(
                "hv-1",
                vec![Guest::new("g1", "esx", GuestState::Running)],
            )],
            state: ReportState::Created,
            job_id: None,
        }
    }

    #[test]
    fn put_then_peek_round_trips() {
        let store = DataStore::new();
        store.put("esx-1", sample("esx-1"));
        let got = store.peek("esx-1").expect("report present");
        assert_eq!(got.config(), "esx-1");
    }

    #[test]
    fn peek_on_empty_slot_is_none() {
        let store = DataStore::new();
        assert!(store.peek("missing").is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let store = DataStore::new();
        store.put("esx-1", sample("esx-1"));
        assert!(store.peek("esx-1").is_some());
        assert!(store.peek("esx-1").is_some());
    }

    #[test]
    fn take_consumes_the_slot() {
        let store = DataStore::new();
        store.put("esx-1", sample("esx-1"));
        assert!(store.take("esx-1").is_some());
        assert!(store.peek("esx-1").is_none());
    }

    #[test]
    fn clones_share_state() {
        let store = DataStore::new();
        let other = store.clone();
        other.put("esx-1", sample("esx-1"));
        assert!(store.peek("esx-1").is_some());
    }

    #[test]
    fn configs_lists_all_published_sources() {
        let store = DataStore::new();
        store.put("esx-1", sample("esx-1"));
        store.put("esx-2", sample("esx-2"));
        let mut names = store.configs();
        names.sort();
        assert_eq!(names, vec!["esx-1".to_string(), "esx-2".to_string()]);
    }
}
