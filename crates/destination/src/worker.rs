//! `DestinationWorker`: batches, dedups, submits, and polls async jobs for
//! one distinct delivery endpoint (§4.7). Grounded on
//! `original_source/manager/managerprocess.py` and
//! `original_source/virtwho/manager/subscriptionmanager/subscriptionmanager.py`
//! for the submit/job-poll lifecycle.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use virtwho_datastore::DataStore;
use virtwho_filter::Filter;
use virtwho_report::{Report, ReportState, StatusInfo};
use virtwho_scheduler::IntervalWorker;

use crate::client::{ClientError, DestinationClient, JobState, SubmitOutcome};
use crate::status::StatusFile;

/// How a destination accepts reports from more than one owned source
/// (§4.7 "Batching", "Satellite-5 variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batching {
    /// `HostGuestAssociation` reports from every owned source are merged
    /// into one combined report and submitted with a single call per
    /// cycle.
    Combined,
    /// One `hypervisor_checkin` call per source report; `GuestList`
    /// reports are never accepted (Satellite-5).
    PerSource,
}

/// Spacing floor for async job polling; doubles after each poll (§4.7).
pub const MINIMUM_JOB_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Fallback sleep when a 429 carries no `Retry-After` (§4.7).
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

struct PendingEntry {
    job_id: String,
    hash: String,
    next_poll_at: Instant,
    poll_spacing: Duration,
}

/// One distinct destination's worker state: the sources it owns, their
/// filters, dedup/job-poll bookkeeping, and the client it submits through.
pub struct DestinationWorker<C: DestinationClient> {
    name: String,
    client: C,
    batching: Batching,
    source_keys: Vec<String>,
    filters: HashMap<String, Filter>,
    datastore: DataStore,
    interval: Duration,
    oneshot: bool,
    correlation_id: String,

    did_initial_collection: bool,
    last_sent_hash: HashMap<String, String>,
    pending: HashMap<String, PendingEntry>,
    dropped_guest_list_sources: std::collections::HashSet<String>,
    cycle_candidates: Vec<(String, Report)>,

    status_mode: bool,
    status_file_path: Option<std::path::PathBuf>,
}

impl<C: DestinationClient> DestinationWorker<C> {
    pub fn new(
        name: impl Into<String>,
        client: C,
        batching: Batching,
        source_keys: Vec<String>,
        filters: HashMap<String, Filter>,
        datastore: DataStore,
        interval: Duration,
        oneshot: bool,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            batching,
            source_keys,
            filters,
            datastore,
            interval,
            oneshot,
            correlation_id: Uuid::new_v4().to_string(),
            did_initial_collection: false,
            last_sent_hash: HashMap::new(),
            pending: HashMap::new(),
            dropped_guest_list_sources: std::collections::HashSet::new(),
            cycle_candidates: Vec::new(),
            status_mode: false,
            status_file_path: None,
        }
    }

    pub fn with_status_mode(mut self, path: std::path::PathBuf) -> Self {
        self.status_mode = true;
        self.status_file_path = Some(path);
        self
    }

    fn filtered(&self, source: &str, report: Report) -> Report {
        match self.filters.get(source) {
            Some(filter) => report.filtered(|id| filter.matches(id)),
            None => report,
        }
    }

    /// Bounded wait for the first meaningful batch (§4.7 "Initial data
    /// collection"): polls every owned source for up to one interval,
    /// sleeping 1s between polls. Duplicates are not elided here.
    async fn initial_collect(&mut self) {
        let deadline = Instant::now() + self.interval;
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        loop {
            for source in self.source_keys.clone() {
                if seen.contains(&source) {
                    continue;
                }
                if let Some(report) = self.datastore.peek(&source) {
                    if !report.is_error() {
                        if matches!(report, Report::GuestList { .. }) && self.batching == Batching::PerSource {
                            warn!(source = %source, "Satellite-5 destinations cannot accept GuestList reports, dropping source permanently");
                            self.dropped_guest_list_sources.insert(source.clone());
                        } else if !self.dropped_guest_list_sources.contains(&source) {
                            let report = self.filtered(&source, report);
                            self.cycle_candidates.push((source.clone(), report));
                        }
                    }
                    seen.insert(source);
                }
            }
            if seen.len() == self.source_keys.len() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.did_initial_collection = true;
    }

    /// Steady-state per-source collection (§4.7 "Steady-state data
    /// collection"). Returns `Err` only when an owned source's `Error`
    /// report must abort the worker (oneshot mode).
    fn steady_state_collect(&mut self) -> Result<(), String> {
        for source in self.source_keys.clone() {
            if self.pending.contains_key(&source) {
                // A prior submission for this source hasn't reached a
                // terminal state yet; no new report may be submitted.
                continue;
            }
            let Some(raw) = self.datastore.peek(&source) else {
                continue;
            };
            if raw.is_error() {
                if self.oneshot {
                    return Err(format!("source {source} reported a collection error"));
                }
                warn!(source = %source, "source reported a collection error, skipping this cycle");
                continue;
            }
            if matches!(raw, Report::GuestList { .. }) && self.batching == Batching::PerSource {
                warn!(source = %source, "Satellite-5 destinations cannot accept GuestList reports, dropping source permanently");
                self.dropped_guest_list_sources.insert(source.clone());
                continue;
            }
            if self.dropped_guest_list_sources.contains(&source) {
                continue;
            }

            let report = self.filtered(&source, raw);
            if let Some(count) = report.hypervisor_count() {
                if count == 0 {
                    if self.last_sent_hash.remove(&source).is_some() {
                        info!(source = %source, "source reported zero hypervisors, resetting last-sent hash");
                    }
                    continue;
                }
            }
            if let Some(last) = self.last_sent_hash.get(&source) {
                if *last == report.hash() {
                    continue;
                }
            }
            self.cycle_candidates.push((source, report));
        }
        Ok(())
    }

    /// Polls every non-terminal pending submission whose poll spacing has
    /// elapsed (§4.7 "Asynchronous job polling").
    async fn poll_pending(&mut self) {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, entry)| Instant::now() >= entry.next_poll_at)
            .map(|(source, _)| source.clone())
            .collect();

        // Group by job id so a combined submission shared by several
        // sources is only polled once per cycle.
        let mut by_job: HashMap<String, Vec<String>> = HashMap::new();
        for source in due {
            let job_id = self.pending[&source].job_id.clone();
            by_job.entry(job_id).or_default().push(source);
        }

        for (job_id, sources) in by_job {
            match self.client.check_job_state(&job_id, &self.correlation_id).await {
                Ok(JobState::Finished) => {
                    for source in sources {
                        if let Some(entry) = self.pending.remove(&source) {
                            self.last_sent_hash.insert(source, entry.hash);
                        }
                    }
                }
                Ok(JobState::Failed) | Ok(JobState::Canceled) => {
                    for source in sources {
                        self.pending.remove(&source);
                    }
                }
                Ok(JobState::Running) => {
                    for source in sources {
                        if let Some(entry) = self.pending.get_mut(&source) {
                            entry.next_poll_at = Instant::now() + entry.poll_spacing;
                            entry.poll_spacing *= 2;
                        }
                    }
                }
                Err(ClientError::RateLimited { retry_after }) => {
                    let backoff = retry_after.unwrap_or(2 * MINIMUM_JOB_POLL_INTERVAL);
                    tokio::time::sleep(backoff).await;
                    for source in sources {
                        if let Some(entry) = self.pending.get_mut(&source) {
                            entry.next_poll_at = Instant::now();
                        }
                    }
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "job poll failed, will retry next cycle");
                }
            }
        }
    }

    /// Sleeps the rate-limit backoff and reports whether the caller should
    /// retry: continuous mode always retries, oneshot mode gives up after
    /// one rate-limit response (§4.7 "Submission protocol").
    async fn rate_limit_backoff(&self, retry_after: Option<Duration>) -> bool {
        if self.oneshot {
            return false;
        }
        let backoff = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
        warn!(backoff_secs = backoff.as_secs(), "destination rate limited, backing off");
        tokio::time::sleep(backoff).await;
        true
    }

    async fn submit_cycle(&mut self) -> Result<(), String> {
        if self.cycle_candidates.is_empty() {
            return Ok(());
        }
        let candidates = std::mem::take(&mut self.cycle_candidates);

        let (guest_lists, associations): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|(_, r)| matches!(r, Report::GuestList { .. }));

        for (source, report) in guest_lists {
            let result = loop {
                match self.client.send_guest_list(&report, &self.correlation_id).await {
                    Err(ClientError::RateLimited { retry_after }) => {
                        if !self.rate_limit_backoff(retry_after).await {
                            break Err(ClientError::RateLimited { retry_after });
                        }
                    }
                    other => break other,
                }
            };
            self.apply_submit_result(source, report, result, "send_guest_list").await;
        }

        match self.batching {
            Batching::Combined => self.submit_combined(associations).await?,
            Batching::PerSource => self.submit_per_source(associations).await?,
        }

        Ok(())
    }

    async fn submit_combined(&mut self, associations: Vec<(String, Report)>) -> Result<(), String> {
        if associations.is_empty() {
            return Ok(());
        }
        let mut merged_hypervisors = Vec::new();
        let mut hashes: HashMap<String, String> = HashMap::new();
        for (source, report) in &associations {
            if let Report::HostGuestAssociation { hypervisors, .. } = report {
                merged_hypervisors.extend(hypervisors.iter().cloned());
            }
            hashes.insert(source.clone(), report.hash());
        }
        let combined = Report::HostGuestAssociation {
            config: self.name.clone(),
            hypervisors: merged_hypervisors,
            state: ReportState::Created,
            job_id: None,
        };

        info!(
            destination = %self.name,
            sources = associations.len(),
            hypervisors = combined.hypervisor_count().unwrap_or(0),
            "submitting batched hypervisor checkin"
        );

        let result = loop {
            match self.client.hypervisor_checkin(&combined, &self.correlation_id).await {
                Err(ClientError::RateLimited { retry_after }) => {
                    if !self.rate_limit_backoff(retry_after).await {
                        break Err(ClientError::RateLimited { retry_after });
                    }
                }
                other => break other,
            }
        };

        match result {
            Ok(SubmitOutcome::Synchronous) => {
                for (source, hash) in hashes {
                    self.last_sent_hash.insert(source, hash);
                }
            }
            Ok(SubmitOutcome::Async { job_id }) => {
                for (source, hash) in hashes {
                    self.pending.insert(
                        source,
                        PendingEntry { job_id: job_id.clone(), hash, next_poll_at: Instant::now() + MINIMUM_JOB_POLL_INTERVAL, poll_spacing: MINIMUM_JOB_POLL_INTERVAL },
                    );
                }
            }
            Err(ClientError::Fatal(msg)) => {
                warn!(destination = %self.name, error = %msg, "destination rejected submission permanently");
                if self.oneshot {
                    return Err(msg);
                }
            }
            Err(e) => {
                warn!(destination = %self.name, error = %e, "batched submission failed, discarding this cycle's batch");
                if self.oneshot {
                    return Err(e.to_string());
                }
            }
        }
        Ok(())
    }

    /// One `hypervisor_checkin` call per owned source report, never a
    /// merged call across sources (§4.7 "Satellite-5 variant"). Within a
    /// source's report §6 calls for one XML-RPC call per hypervisor, so a
    /// source whose adapter discovered several hosts (e.g. a vCenter
    /// fronting many ESX hosts) still gets one call per host, not one call
    /// carrying all of them -- the Satellite-5 client only ever accepts a
    /// single hypervisor per call.
    async fn submit_per_source(&mut self, associations: Vec<(String, Report)>) -> Result<(), String> {
        for (source, report) in associations {
            let hash = report.hash();
            let hypervisors = match &report {
                Report::HostGuestAssociation { hypervisors, .. } => hypervisors.clone(),
                _ => Vec::new(),
            };

            let mut last_job_id = None;
            let mut failed = false;
            for hypervisor in &hypervisors {
                let single = Report::HostGuestAssociation {
                    config: report.config().to_string(),
                    hypervisors: vec![hypervisor.clone()],
                    state: ReportState::Created,
                    job_id: None,
                };
                let result = loop {
                    match self.client.hypervisor_checkin(&single, &self.correlation_id).await {
                        Err(ClientError::RateLimited { retry_after }) => {
                            if !self.rate_limit_backoff(retry_after).await {
                                break Err(ClientError::RateLimited { retry_after });
                            }
                        }
                        other => break other,
                    }
                };
                match result {
                    Ok(SubmitOutcome::Synchronous) => {}
                    Ok(SubmitOutcome::Async { job_id }) => last_job_id = Some(job_id),
                    Err(ClientError::Fatal(msg)) => {
                        warn!(source = %source, error = %msg, "destination rejected submission permanently");
                        if self.oneshot {
                            return Err(msg);
                        }
                        failed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(source = %source, error = %e, "per-source submission failed, discarding this report");
                        if self.oneshot {
                            return Err(e.to_string());
                        }
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                continue;
            }
            match last_job_id {
                Some(job_id) => {
                    self.pending.insert(
                        source,
                        PendingEntry { job_id, hash, next_poll_at: Instant::now() + MINIMUM_JOB_POLL_INTERVAL, poll_spacing: MINIMUM_JOB_POLL_INTERVAL },
                    );
                }
                None => {
                    self.last_sent_hash.insert(source, hash);
                }
            }
        }
        Ok(())
    }

    async fn apply_submit_result(&mut self, source: String, report: Report, result: Result<SubmitOutcome, ClientError>, call: &str) {
        match result {
            Ok(SubmitOutcome::Synchronous) => {
                self.last_sent_hash.insert(source, report.hash());
            }
            Ok(SubmitOutcome::Async { job_id }) => {
                self.pending.insert(
                    source,
                    PendingEntry {
                        job_id,
                        hash: report.hash(),
                        next_poll_at: Instant::now() + MINIMUM_JOB_POLL_INTERVAL,
                        poll_spacing: MINIMUM_JOB_POLL_INTERVAL,
                    },
                );
            }
            Err(e) => {
                warn!(source = %source, call, error = %e, "submission failed");
            }
        }
    }

    async fn run_status_cycle(&mut self) {
        let Some(path) = self.status_file_path.clone() else { return };
        let mut status_file = StatusFile::load(&path);
        let mut aggregate = StatusInfo::default();
        for source in self.source_keys.clone() {
            if let Some(Report::Status { info, .. }) = self.datastore.peek(&source) {
                aggregate.hypervisors += info.hypervisors;
                aggregate.guests += info.guests;
                aggregate.source_errors.extend(info.source_errors);
                status_file.sources.insert(
                    source.clone(),
                    crate::status::SourceStatus { last_successful_retrieve: Some(now_timestamp()), hypervisors: info.hypervisors, guests: info.guests },
                );
            }
        }
        if let Err(e) = self.client.heartbeat(&aggregate, &self.correlation_id).await {
            warn!(destination = %self.name, error = %e, "status heartbeat failed");
            aggregate.destination_errors.push(e.to_string());
        }
        let merged = status_file.merge_destination(&self.name, Some(&now_timestamp()), None);
        status_file.destinations.insert(self.name.clone(), merged);
        if let Err(e) = status_file.save(&path) {
            warn!(destination = %self.name, error = %e, "could not persist status file");
        }
    }
}

fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl<C: DestinationClient + Send + Sync> IntervalWorker for DestinationWorker<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn oneshot(&self) -> bool {
        self.oneshot
    }

    async fn get_data(&mut self) -> Result<(), String> {
        if self.status_mode {
            return Ok(());
        }
        if !self.did_initial_collection {
            self.initial_collect().await;
            Ok(())
        } else {
            self.steady_state_collect()
        }
    }

    async fn send_data(&mut self) -> Result<(), String> {
        if self.status_mode {
            self.run_status_cycle().await;
            return Ok(());
        }
        self.poll_pending().await;
        self.submit_cycle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use virtwho_report::{Guest, GuestState, Hypervisor};
    use virtwho_scheduler::TerminateFlag;

    #[derive(Clone, Default)]
    struct RecordingClient {
        checkins: Arc<Mutex<Vec<Report>>>,
        job_states: Arc<Mutex<Vec<JobState>>>,
        next_job_id: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl DestinationClient for RecordingClient {
        async fn send_guest_list(&self, _report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
            Ok(SubmitOutcome::Synchronous)
        }

        async fn hypervisor_checkin(&self, report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
            self.checkins.lock().unwrap().push(report.clone());
            if let Some(job_id) = self.next_job_id.lock().unwrap().clone() {
                Ok(SubmitOutcome::Async { job_id })
            } else {
                Ok(SubmitOutcome::Synchronous)
            }
        }

        async fn check_job_state(&self, _job_id: &str, _correlation_id: &str) -> Result<JobState, ClientError> {
            let mut states = self.job_states.lock().unwrap();
            if states.is_empty() {
                Ok(JobState::Finished)
            } else {
                Ok(states.remove(0))
            }
        }
    }

    fn association(config: &str, hypervisors: Vec<Hypervisor>) -> Report {
        Report::HostGuestAssociation { config: config.to_string(), hypervisors, state: ReportState::Created, job_id: None }
    }

    #[tokio::test]
    async fn duplicate_suppression_scenario() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        let hv = || vec![Hypervisor::new("hv-1", vec![Guest::new("g1", "esx", GuestState::Running)])];
        datastore.put("s1", association("s1", hv()));
        datastore.put("s2", association("s2", hv()));

        let mut worker = DestinationWorker::new(
            "dest-1",
            client.clone(),
            Batching::Combined,
            vec!["s1".to_string(), "s2".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        );

        worker.get_data().await.unwrap();
        worker.send_data().await.unwrap();
        assert_eq!(client.checkins.lock().unwrap().len(), 1);
        assert_eq!(worker.last_sent_hash.len(), 2);

        // second cycle: identical content, steady-state path, no submission
        worker.did_initial_collection = true;
        worker.get_data().await.unwrap();
        assert!(worker.cycle_candidates.is_empty());
    }

    #[tokio::test]
    async fn zero_hypervisor_reset_clears_last_sent_hash() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put("s1", association("s1", vec![Hypervisor::new("hv-1", vec![])]));

        let mut worker = DestinationWorker::new(
            "dest-1",
            client.clone(),
            Batching::Combined,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            false,
        );
        worker.did_initial_collection = true;
        worker.last_sent_hash.insert("s1".to_string(), "stale-hash".to_string());

        datastore.put("s1", association("s1", vec![]));
        worker.get_data().await.unwrap();
        assert!(!worker.last_sent_hash.contains_key("s1"));
        assert!(worker.cycle_candidates.is_empty());
    }

    #[tokio::test]
    async fn async_job_blocks_resubmission_until_terminal() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        *client.next_job_id.lock().unwrap() = Some("job-1".to_string());
        client.job_states.lock().unwrap().push(JobState::Running);
        client.job_states.lock().unwrap().push(JobState::Finished);

        datastore.put("s1", association("s1", vec![Hypervisor::new("hv-1", vec![Guest::new("g1", "esx", GuestState::Running)])]));

        let mut worker = DestinationWorker::new(
            "dest-1",
            client.clone(),
            Batching::Combined,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            false,
        );
        worker.did_initial_collection = true;
        worker.get_data().await.unwrap();
        worker.send_data().await.unwrap();
        assert!(worker.pending.contains_key("s1"));

        // new report arrives but source is blocked on pending job
        datastore.put("s1", association("s1", vec![Hypervisor::new("hv-1", vec![Guest::new("g2", "esx", GuestState::Running)])]));
        worker.get_data().await.unwrap();
        assert!(worker.cycle_candidates.is_empty());

        // first poll still reports the job running
        worker.pending.get_mut("s1").unwrap().next_poll_at = Instant::now();
        worker.send_data().await.unwrap();
        assert!(worker.pending.contains_key("s1"));

        // second poll reports the job finished
        worker.pending.get_mut("s1").unwrap().next_poll_at = Instant::now();
        worker.send_data().await.unwrap();
        assert!(!worker.pending.contains_key("s1"));
        assert!(worker.last_sent_hash.contains_key("s1"));
    }

    #[tokio::test]
    async fn per_source_batching_issues_one_call_per_hypervisor() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put(
            "s1",
            association(
                "s1",
                vec![
                    Hypervisor::new("hv-1", vec![Guest::new("g1", "esx", GuestState::Running)]),
                    Hypervisor::new("hv-2", vec![Guest::new("g2", "esx", GuestState::Running)]),
                ],
            ),
        );

        let mut worker = DestinationWorker::new(
            "sat5",
            client.clone(),
            Batching::PerSource,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        );
        worker.get_data().await.unwrap();
        worker.send_data().await.unwrap();

        let checkins = client.checkins.lock().unwrap();
        assert_eq!(checkins.len(), 2);
        for report in checkins.iter() {
            assert_eq!(report.hypervisor_count(), Some(1));
        }
        assert!(worker.last_sent_hash.contains_key("s1"));
    }

    #[tokio::test]
    async fn satellite5_drops_source_permanently_on_guest_list() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put(
            "s1",
            Report::GuestList { config: "s1".to_string(), hypervisor_id: "local".to_string(), guests: vec![], state: ReportState::Created },
        );

        let mut worker = DestinationWorker::new(
            "sat5",
            client.clone(),
            Batching::PerSource,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            false,
        );
        worker.did_initial_collection = true;
        worker.get_data().await.unwrap();
        assert!(worker.dropped_guest_list_sources.contains("s1"));

        datastore.put("s1", association("s1", vec![Hypervisor::new("hv-1", vec![])]));
        worker.get_data().await.unwrap();
        assert!(worker.cycle_candidates.is_empty());
    }

    #[tokio::test]
    async fn satellite5_drops_source_permanently_on_guest_list_during_initial_collection() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put(
            "s1",
            Report::GuestList { config: "s1".to_string(), hypervisor_id: "local".to_string(), guests: vec![], state: ReportState::Created },
        );

        let mut worker = DestinationWorker::new(
            "sat5",
            client.clone(),
            Batching::PerSource,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        );
        // first-ever cycle, so get_data takes the initial_collect path, not steady_state_collect
        worker.get_data().await.unwrap();
        assert!(worker.dropped_guest_list_sources.contains("s1"));
        assert!(worker.cycle_candidates.is_empty());
        worker.send_data().await.unwrap();
        assert!(client.checkins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oneshot_aborts_on_own_source_error() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put("s1", Report::Error { config: "s1".to_string(), message: "boom".to_string() });

        let mut worker = DestinationWorker::new(
            "dest-1",
            client,
            Batching::Combined,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore,
            Duration::from_millis(10),
            true,
        );
        worker.did_initial_collection = true;
        let err = worker.get_data().await.unwrap_err();
        assert!(err.contains("s1"));
    }

    #[tokio::test]
    async fn runs_through_scheduler_and_terminates() {
        let datastore = DataStore::new();
        let client = RecordingClient::default();
        datastore.put("s1", association("s1", vec![Hypervisor::new("hv-1", vec![])]));
        let worker = DestinationWorker::new(
            "dest-1",
            client,
            Batching::Combined,
            vec!["s1".to_string()],
            HashMap::new(),
            datastore,
            Duration::from_millis(5),
            true,
        );
        virtwho_scheduler::run(worker, TerminateFlag::new(), TerminateFlag::new()).await;
    }
}
