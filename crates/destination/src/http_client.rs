//! `RhsmHttpClient`: a REST adapter for the subscription-manager/Satellite-6
//! destination, speaking the canonical wire formats from §6. Grounded on
//! `original_source/virtwho/manager/subscriptionmanager/subscriptionmanager.py`
//! (`hypervisorCheckIn`, `sendVirtGuests`, `check_report_state`,
//! `STATE_MAPPING`), using the teacher's `reqwest` stack (`crates/rpc_client`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use virtwho_report::Report;

use crate::client::{ClientError, DestinationClient, JobState, SubmitOutcome};

/// `STATE_MAPPING` from the legacy subscription-manager client: the server's
/// job-state strings map onto our three-way `JobState`.
fn map_job_state(raw: &str) -> JobState {
    match raw {
        "FINISHED" => JobState::Finished,
        "CANCELED" => JobState::Canceled,
        "FAILED" => JobState::Failed,
        "RUNNING" | "WAITING" | "CREATED" => JobState::Running,
        _ => JobState::Failed,
    }
}

/// Connection options for one Satellite-6/SAM consumer.
#[derive(Debug, Clone)]
pub struct RhsmHttpConfig {
    pub base_url: String,
    pub owner: String,
    pub env: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
}

pub struct RhsmHttpClient {
    client: Client,
    config: RhsmHttpConfig,
}

impl RhsmHttpClient {
    pub fn new(config: RhsmHttpConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str, correlation_id: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut req = self.client.request(method, url).header("X-Correlation-ID", correlation_id);
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            req = req.basic_auth(user, Some(pass));
        }
        req
    }

    async fn submit(&self, path: &str, body: Value, correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        let response = self
            .request(reqwest::Method::POST, path, correlation_id)
            .json(&body)
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
        if status == StatusCode::GONE {
            return Err(ClientError::Fatal("consumer no longer exists".to_string()));
        }
        if !status.is_success() {
            return Err(ClientError::Request(format!("server returned {status}")));
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);
        match payload.get("id").and_then(|v| v.as_str()) {
            Some(job_id) => Ok(SubmitOutcome::Async { job_id: job_id.to_string() }),
            None => Ok(SubmitOutcome::Synchronous),
        }
    }
}

#[async_trait]
impl DestinationClient for RhsmHttpClient {
    async fn send_guest_list(&self, report: &Report, correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        let Report::GuestList { guests, .. } = report else {
            return Err(ClientError::Request("send_guest_list requires a GuestList report".to_string()));
        };
        let mut sorted: Vec<_> = guests.iter().collect();
        sorted.sort_by(|a, b| a.uuid().cmp(b.uuid()));
        let body = json!(sorted.iter().map(|g| g.to_value()).collect::<Vec<_>>());
        self.submit("/guests", body, correlation_id).await
    }

    async fn hypervisor_checkin(&self, report: &Report, correlation_id: &str) -> Result<SubmitOutcome, ClientError> {
        let Report::HostGuestAssociation { hypervisors, .. } = report else {
            return Err(ClientError::Request("hypervisor_checkin requires a HostGuestAssociation report".to_string()));
        };
        let mut sorted: Vec<_> = hypervisors.iter().collect();
        sorted.sort_by(|a, b| a.hypervisor_id().cmp(b.hypervisor_id()));
        let body = json!({ "hypervisors": sorted.iter().map(|h| h.to_value()).collect::<Vec<_>>() });
        let path = format!("/owners/{}/environments/{}/hypervisors", self.config.owner, self.config.env);
        self.submit(&path, body, correlation_id).await
    }

    async fn check_job_state(&self, job_id: &str, correlation_id: &str) -> Result<JobState, ClientError> {
        let path = format!("/jobs/{job_id}");
        let response = self
            .request(reqwest::Method::GET, &path, correlation_id)
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

        let payload: Value = response.json().await.map_err(|e| ClientError::Request(e.to_string()))?;
        let raw_state = payload.get("state").and_then(|v| v.as_str()).unwrap_or("FAILED");
        Ok(map_job_state(raw_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> RhsmHttpConfig {
        RhsmHttpConfig {
            base_url,
            owner: "acme".to_string(),
            env: "prod".to_string(),
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            insecure: false,
        }
    }

    #[tokio::test]
    async fn async_checkin_returns_job_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/owners/acme/environments/prod/hypervisors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-42" })))
            .mount(&server)
            .await;

        let client = RhsmHttpClient::new(config(server.uri())).unwrap();
        let report = Report::HostGuestAssociation {
            config: "esx-1".to_string(),
            hypervisors: vec![],
            state: virtwho_report::ReportState::Created,
            job_id: None,
        };
        let outcome = client.hypervisor_checkin(&report, "corr-1").await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Async { job_id } if job_id == "job-42"));
    }

    #[tokio::test]
    async fn rate_limit_surfaces_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/owners/acme/environments/prod/hypervisors"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "62"))
            .mount(&server)
            .await;

        let client = RhsmHttpClient::new(config(server.uri())).unwrap();
        let report = Report::HostGuestAssociation {
            config: "esx-1".to_string(),
            hypervisors: vec![],
            state: virtwho_report::ReportState::Created,
            job_id: None,
        };
        let err = client.hypervisor_checkin(&report, "corr-1").await.unwrap_err();
        match err {
            ClientError::RateLimited { retry_after } => assert_eq!(retry_after, Some(Duration::from_secs(62))),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn job_poll_maps_server_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs/job-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "FINISHED" })))
            .mount(&server)
            .await;

        let client = RhsmHttpClient::new(config(server.uri())).unwrap();
        let state = client.check_job_state("job-42", "corr-1").await.unwrap();
        assert_eq!(state, JobState::Finished);
    }
}
