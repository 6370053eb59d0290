//! Drives a `SourceWorker<FakeSource>` and a `DestinationWorker` against the
//! same datastore, the way the launcher wires real sources and destinations
//! together, and checks the report that comes out the other end.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use virtwho_datastore::DataStore;
use virtwho_destination::{Batching, ClientError, DestinationClient, DestinationWorker, JobState, SubmitOutcome};
use virtwho_report::Report;
use virtwho_scheduler::TerminateFlag;
use virtwho_source::{FakeSource, SourceWorker};

#[derive(Clone, Default)]
struct RecordingClient {
    checkins: Arc<Mutex<Vec<Report>>>,
}

#[async_trait]
impl DestinationClient for RecordingClient {
    async fn send_guest_list(&self, _report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        Ok(SubmitOutcome::Synchronous)
    }

    async fn hypervisor_checkin(&self, report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        self.checkins.lock().unwrap().push(report.clone());
        Ok(SubmitOutcome::Synchronous)
    }

    async fn check_job_state(&self, _job_id: &str, _correlation_id: &str) -> Result<JobState, ClientError> {
        Ok(JobState::Finished)
    }
}

#[tokio::test]
async fn fake_source_report_reaches_destination_client() {
    let mut fixture = tempfile::NamedTempFile::new().unwrap();
    fixture
        .write_all(
            br#"{"is_hypervisor": true, "hypervisors": [
                {"hypervisor_id": "hv-1", "guests": [{"uuid": "g1", "virt_type": "esx"}]}
            ]}"#,
        )
        .unwrap();

    let datastore = DataStore::new();

    let source_worker = SourceWorker::new(
        "fake-1",
        FakeSource::new(fixture.path()),
        datastore.clone(),
        Duration::from_millis(10),
        true,
    );
    virtwho_scheduler::run(source_worker, TerminateFlag::new(), TerminateFlag::new()).await;

    let client = RecordingClient::default();
    let destination_worker = DestinationWorker::new(
        "dest-1",
        client.clone(),
        Batching::Combined,
        vec!["fake-1".to_string()],
        HashMap::new(),
        datastore.clone(),
        Duration::from_millis(10),
        true,
    );
    virtwho_scheduler::run(destination_worker, TerminateFlag::new(), TerminateFlag::new()).await;

    let checkins = client.checkins.lock().unwrap();
    assert_eq!(checkins.len(), 1);
    match &checkins[0] {
        Report::HostGuestAssociation { hypervisors, .. } => {
            assert_eq!(hypervisors.len(), 1);
            assert_eq!(hypervisors[0].guests().len(), 1);
        }
        other => panic!("expected HostGuestAssociation, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_flag_stops_a_running_worker_early() {
    let mut fixture = tempfile::NamedTempFile::new().unwrap();
    fixture
        .write_all(br#"{"is_hypervisor": true, "hypervisors": []}"#)
        .unwrap();

    let datastore = DataStore::new();
    let external = TerminateFlag::new();
    let source_worker = SourceWorker::new(
        "fake-1",
        FakeSource::new(fixture.path()),
        datastore.clone(),
        Duration::from_secs(3600),
        false,
    );

    let external_for_task = external.clone();
    let handle = tokio::spawn(virtwho_scheduler::run(source_worker, TerminateFlag::new(), external_for_task));

    tokio::time::sleep(Duration::from_millis(50)).await;
    external.set().await;
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop promptly once the external flag is set")
        .unwrap();

    assert!(datastore.peek("fake-1").is_some());
}
