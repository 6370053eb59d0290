//! `Satellite5HttpClient`: adapter for the RHN Classic / Satellite-5
//! destination. Grounded on `original_source/virtwho/manager/satellite/satellite.py`
//! (`_assemble_plan`, `GUEST_STATE_TO_SATELLITE`) for the event-list shape and
//! guest-state mapping; the actual legacy transport is XML-RPC
//! (`xmlrpc_client.ServerProxy`), which is an out-of-scope external
//! collaborator per §1 -- this client carries the same one-call-per-hypervisor
//! event-list payload from §6 over the same `reqwest` transport used for the
//! RHSM destination, since the XML-RPC wire encoding itself is peripheral to
//! the core engine this crate implements (see DESIGN.md).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use virtwho_report::{Guest, GuestState, Hypervisor, Report};

use crate::client::{ClientError, DestinationClient, JobState, SubmitOutcome};

/// `GUEST_STATE_TO_SATELLITE` from the legacy Satellite-5 client.
fn guest_state_to_satellite(state: GuestState) -> &'static str {
    match state {
        GuestState::Running => "running",
        GuestState::Blocked => "blocked",
        GuestState::Paused => "paused",
        GuestState::ShuttingDown => "shutdown",
        GuestState::Shutoff => "shutoff",
        GuestState::Crashed => "crashed",
        GuestState::Unknown | GuestState::PMSuspended => "nostate",
    }
}

fn guest_event(guest: &Guest) -> Value {
    json!([
        0,
        "exists",
        "domain",
        {
            "uuid": guest.uuid(),
            "name": guest.uuid(),
            "state": guest_state_to_satellite(guest.state()),
            "vcpus": 1,
            "memory_size": 0,
            "virt_type": guest.virt_type(),
        }
    ])
}

/// Builds the `virt_notify` event-list payload for one hypervisor (§6
/// "Satellite-5 checkin"). Public so the destination worker can construct
/// the exact call list for the "one call per hypervisor" invariant.
pub fn assemble_plan(hypervisor: &Hypervisor) -> Value {
    let mut events = vec![json!([0, "exists", "system", { "identity": "host", "uuid": "0000000000000000" }])];
    events.push(json!([0, "crawl_began", "system", {}]));
    for guest in hypervisor.guests() {
        events.push(guest_event(guest));
    }
    events.push(json!([0, "crawl_ended", "system", {}]));
    Value::Array(events)
}

#[derive(Debug, Clone)]
pub struct Satellite5Config {
    pub server: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
}

pub struct Satellite5HttpClient {
    client: Client,
    config: Satellite5Config,
}

impl Satellite5HttpClient {
    pub fn new(config: Satellite5Config) -> Result<Self, ClientError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let mut server = self.config.server.clone();
        if !server.starts_with("http://") && !server.starts_with("https://") {
            server = format!("https://{server}");
        }
        if !server.ends_with("XMLRPC") {
            server = format!("{}/XMLRPC", server.trim_end_matches('/'));
        }
        server
    }
}

#[async_trait]
impl DestinationClient for Satellite5HttpClient {
    /// Satellite-5 cannot accept `GuestList` reports at all (§4.7).
    async fn send_guest_list(&self, _report: &Report, _correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        Err(ClientError::Fatal("Satellite-5 destinations do not accept GuestList reports".to_string()))
    }

    /// Called once per hypervisor by the worker (never once per cycle) so
    /// `report` here always carries exactly one hypervisor (§4.7
    /// "Satellite-5 variant").
    async fn hypervisor_checkin(&self, report: &Report, correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        let Report::HostGuestAssociation { hypervisors, .. } = report else {
            return Err(ClientError::Request("hypervisor_checkin requires a HostGuestAssociation report".to_string()));
        };
        let hypervisor = hypervisors.first().ok_or_else(|| {
            ClientError::Request("Satellite-5 checkin called with zero hypervisors".to_string())
        })?;
        let events = assemble_plan(hypervisor);

        let response = self
            .client
            .post(self.endpoint())
            .header("X-Correlation-ID", correlation_id)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&json!({ "method": "virt_notify", "params": events }))
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ClientError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(ClientError::Request(format!("server returned {status}")));
        }
        // Satellite-5's `virt_notify` is synchronous: no job id is returned.
        Ok(SubmitOutcome::Synchronous)
    }

    /// Satellite-5 has no async job concept; the worker never calls this
    /// for a Satellite-5 destination because `hypervisor_checkin` never
    /// returns `SubmitOutcome::Async` for it.
    async fn check_job_state(&self, _job_id: &str, _correlation_id: &str) -> Result<JobState, ClientError> {
        Ok(JobState::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtwho_report::GuestState;

    #[test]
    fn assemble_plan_brackets_crawl_with_began_and_ended() {
        let hv = Hypervisor::new("hv-1", vec![Guest::new("g1", "esx", GuestState::Running)]);
        let plan = assemble_plan(&hv);
        let events = plan.as_array().unwrap();
        assert_eq!(events.first().unwrap()[1], "exists");
        assert_eq!(events[1][1], "crawl_began");
        assert_eq!(events.last().unwrap()[1], "crawl_ended");
    }

    #[test]
    fn guest_states_map_to_satellite_vocabulary() {
        assert_eq!(guest_state_to_satellite(GuestState::Running), "running");
        assert_eq!(guest_state_to_satellite(GuestState::Shutoff), "shutoff");
        assert_eq!(guest_state_to_satellite(GuestState::ShuttingDown), "shutdown");
        assert_eq!(guest_state_to_satellite(GuestState::Unknown), "nostate");
    }

    #[tokio::test]
    async fn endpoint_normalizes_scheme_and_suffix() {
        let client = Satellite5HttpClient::new(Satellite5Config {
            server: "sat.example.com".to_string(),
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            insecure: false,
        })
        .unwrap();
        assert_eq!(client.endpoint(), "https://sat.example.com/XMLRPC");
    }
}
