//! Drives one [`Source`] through the scheduler's interval loop, publishing
//! its reports into the datastore (§4.6).

use std::time::Duration;

use async_trait::async_trait;

use virtwho_datastore::DataStore;
use virtwho_report::{Report, ReportState, StatusInfo};
use virtwho_scheduler::IntervalWorker;

use crate::source::Source;

/// One source worker: one configured section, one adapter instance, polled
/// on `interval` and published into `datastore` under `config_name`.
pub struct SourceWorker<S: Source> {
    config_name: String,
    source: S,
    datastore: DataStore,
    interval: Duration,
    oneshot: bool,
    status_mode: bool,
    local_hypervisor_id: String,
    pending: Option<Report>,
}

impl<S: Source> SourceWorker<S> {
    pub fn new(config_name: impl Into<String>, source: S, datastore: DataStore, interval: Duration, oneshot: bool) -> Self {
        Self {
            config_name: config_name.into(),
            source,
            datastore,
            interval,
            oneshot,
            status_mode: false,
            local_hypervisor_id: "local".to_string(),
            pending: None,
        }
    }

    /// Runs in status mode: each cycle writes a `Status` report (liveness
    /// probe) instead of a `HostGuestAssociation`/`GuestList` (§4.6).
    pub fn with_status_mode(mut self, status_mode: bool) -> Self {
        self.status_mode = status_mode;
        self
    }
}

#[async_trait]
impl<S: Source> IntervalWorker for SourceWorker<S> {
    fn name(&self) -> &str {
        &self.config_name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn oneshot(&self) -> bool {
        self.oneshot
    }

    async fn prepare(&mut self) -> Result<(), String> {
        self.local_hypervisor_id = self.source.local_hypervisor_id();
        self.source.prepare().await.map_err(|e| e.to_string())
    }

    async fn get_data(&mut self) -> Result<(), String> {
        if self.status_mode {
            let (hypervisors, guests, errors) = if self.source.is_hypervisor() {
                match self.source.get_host_guest_mapping().await {
                    Ok(hvs) => {
                        let guests: usize = hvs.iter().map(|h| h.guests().len()).sum();
                        (hvs.len(), guests, Vec::new())
                    }
                    Err(e) => (0, 0, vec![e.to_string()]),
                }
            } else {
                match self.source.list_domains().await {
                    Ok(guests) => (0, guests.len(), Vec::new()),
                    Err(e) => (0, 0, vec![e.to_string()]),
                }
            };
            self.pending = Some(Report::Status {
                config: self.config_name.clone(),
                info: StatusInfo {
                    source_errors: errors,
                    destination_errors: Vec::new(),
                    hypervisors,
                    guests,
                },
                state: ReportState::Created,
            });
            return Ok(());
        }

        if self.source.is_hypervisor() {
            let hypervisors = self.source.get_host_guest_mapping().await.map_err(|e| e.to_string())?;
            self.pending = Some(Report::HostGuestAssociation {
                config: self.config_name.clone(),
                hypervisors,
                state: ReportState::Created,
                job_id: None,
            });
        } else {
            let guests = self.source.list_domains().await.map_err(|e| e.to_string())?;
            self.pending = Some(Report::GuestList {
                config: self.config_name.clone(),
                hypervisor_id: self.local_hypervisor_id.clone(),
                guests,
                state: ReportState::Created,
            });
        }
        Ok(())
    }

    async fn send_data(&mut self) -> Result<(), String> {
        if let Some(report) = self.pending.take() {
            self.datastore.put(&self.config_name, report);
        }
        Ok(())
    }

    async fn on_cycle_error(&mut self, err: &str) {
        self.datastore.put(
            &self.config_name,
            Report::Error {
                config: self.config_name.clone(),
                message: err.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeSource;
    use virtwho_scheduler::TerminateFlag;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn oneshot_worker_publishes_one_report() {
        let file = write_fixture(
            r#"{"is_hypervisor": true, "hypervisors": [{"hypervisor_id": "hv-1", "guests": []}]}"#,
        );
        let datastore = DataStore::new();
        let worker = SourceWorker::new(
            "esx-1",
            FakeSource::new(file.path()),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        );
        virtwho_scheduler::run(worker, TerminateFlag::new(), TerminateFlag::new()).await;

        let report = datastore.peek("esx-1").expect("report published");
        assert_eq!(report.hypervisor_count(), Some(1));
    }

    #[tokio::test]
    async fn missing_fixture_publishes_error_report() {
        let datastore = DataStore::new();
        let worker = SourceWorker::new(
            "esx-1",
            FakeSource::new("/nonexistent/fixture.json"),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        );
        virtwho_scheduler::run(worker, TerminateFlag::new(), TerminateFlag::new()).await;

        let report = datastore.peek("esx-1").expect("report published");
        assert!(report.is_error());
    }

    #[tokio::test]
    async fn status_mode_publishes_status_report() {
        let file = write_fixture(
            r#"{"is_hypervisor": true, "hypervisors": [{"hypervisor_id": "hv-1", "guests": [{"uuid": "g1", "virt_type": "esx"}]}]}"#,
        );
        let datastore = DataStore::new();
        let worker = SourceWorker::new(
            "esx-1",
            FakeSource::new(file.path()),
            datastore.clone(),
            Duration::from_millis(10),
            true,
        )
        .with_status_mode(true);
        virtwho_scheduler::run(worker, TerminateFlag::new(), TerminateFlag::new()).await;

        let report = datastore.peek("esx-1").expect("report published");
        match report {
            Report::Status { info, .. } => {
                assert_eq!(info.hypervisors, 1);
                assert_eq!(info.guests, 1);
            }
            other => panic!("expected Status report, got {other:?}"),
        }
    }
}
