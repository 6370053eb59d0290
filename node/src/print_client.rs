//! `PrintClient`: a `DestinationClient` that writes the report it would have
//! submitted to stdout instead of making a network call, backing `--print`
//! (§6 "CLI surface": `--print`).

use async_trait::async_trait;
use serde_json::json;

use virtwho_destination::{ClientError, DestinationClient, JobState, SubmitOutcome};
use virtwho_report::{Report, StatusInfo};

#[derive(Default)]
pub struct PrintClient;

fn print_report(kind: &str, report: &Report) {
    let body = match report {
        Report::HostGuestAssociation { hypervisors, .. } => {
            json!({ "hypervisors": hypervisors.iter().map(|h| h.to_value()).collect::<Vec<_>>() })
        }
        Report::GuestList { guests, .. } => json!(guests.iter().map(|g| g.to_value()).collect::<Vec<_>>()),
        Report::Status { info, .. } => serde_json::to_value(info).unwrap_or(json!({})),
        Report::Error { message, .. } => json!({ "error": message }),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "config": report.config(), "kind": kind, "body": body })).unwrap()
    );
}

#[async_trait]
impl DestinationClient for PrintClient {
    async fn send_guest_list(&self, report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        print_report("guest_list", report);
        Ok(SubmitOutcome::Synchronous)
    }

    async fn hypervisor_checkin(&self, report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        print_report("hypervisor_checkin", report);
        Ok(SubmitOutcome::Synchronous)
    }

    async fn check_job_state(&self, _job_id: &str, _correlation_id: &str) -> Result<JobState, ClientError> {
        Ok(JobState::Finished)
    }

    async fn heartbeat(&self, status: &StatusInfo, _correlation_id: &str) -> Result<(), ClientError> {
        println!("{}", serde_json::to_string_pretty(status).unwrap());
        Ok(())
    }
}
