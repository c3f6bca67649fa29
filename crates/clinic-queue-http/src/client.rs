//! Blocking HTTP implementation of the queueing service.

use std::time::Duration;

use clinic_queue_core::config::ClientConfig;
use clinic_queue_core::lifecycle::{QueueStage, TransitionRequest};
use clinic_queue_core::models::QueueSnapshot;
use clinic_queue_core::service::{QueueService, ServiceError, ServiceResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

/// Longest error body surfaced to the user.
const MAX_DETAIL_LEN: usize = 200;

/// Queueing service reached over HTTP with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpQueueService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpQueueService {
    /// Create a client for a service root.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    /// Create a client from configuration, resolving the token.
    pub fn from_config(config: &ClientConfig) -> ServiceResult<Self> {
        Self::new(config.base_url.clone(), config.resolve_token(), config.request_timeout())
    }

    /// Absolute URL for a path relative to the service root.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and read the body, mapping non-2xx statuses to errors.
    fn execute(&self, builder: RequestBuilder) -> ServiceResult<String> {
        let response: Response = self.authorized(builder).send().map_err(transport)?;
        let status = response.status();
        let body = response.text().map_err(transport)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status.as_u16(), &body))
        }
    }
}

impl QueueService for HttpQueueService {
    fn fetch_snapshot(&self, queue: QueueStage) -> ServiceResult<QueueSnapshot> {
        let url = self.url(&queue.snapshot_path());
        debug!(%url, "fetching queue snapshot");

        let body = self.execute(self.client.get(&url))?;
        Ok(QueueSnapshot::from_json(&body, queue.ticket_stage())?)
    }

    fn send_transition(&self, request: &TransitionRequest) -> ServiceResult<()> {
        let url = self.url(request.path());
        debug!(%url, patient_id = %request.patient_id, action = request.action.as_str(), "posting transition");

        self.execute(self.client.post(&url).json(&request.body()))?;
        Ok(())
    }
}

/// Map a non-2xx status and its body to a service error.
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let message = error_detail(body);
    match status {
        401 | 403 => ServiceError::Unauthorized { status, message },
        400..=499 => ServiceError::Rejected { status, message },
        _ => ServiceError::Unavailable { status, message },
    }
}

/// Common error body shapes: `{"detail": ...}`, `{"error": ...}`, `{"message": ...}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "message")]
    detail: String,
}

fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.detail;
    }

    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn transport(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Transport(format!("request timed out: {}", e))
    } else {
        ServiceError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://clinic.example.org/api/", "queueing/registration_queueing/"),
            "https://clinic.example.org/api/queueing/registration_queueing/"
        );
        assert_eq!(
            join_url("http://localhost:8000", "/patient/update-status/"),
            "http://localhost:8000/patient/update-status/"
        );
    }

    #[test]
    fn test_service_url_for_queue() {
        let service = HttpQueueService::new("http://localhost:8000/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            service.url(&QueueStage::Assessment.snapshot_path()),
            "http://localhost:8000/queueing/assessment_queueing/"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(409, r#"{"detail": "Patient is not the current queue"}"#),
            ServiceError::Rejected {
                status: 409,
                message: "Patient is not the current queue".into()
            }
        );
        assert_eq!(
            classify_status(401, r#"{"error": "token expired"}"#),
            ServiceError::Unauthorized {
                status: 401,
                message: "token expired".into()
            }
        );
        assert!(matches!(
            classify_status(502, "<html>Bad Gateway</html>"),
            ServiceError::Unavailable { status: 502, .. }
        ));
    }

    #[test]
    fn test_error_detail_truncates_long_bodies() {
        let body = "x".repeat(500);
        let detail = error_detail(&body);
        assert_eq!(detail.len(), MAX_DETAIL_LEN + 3);
        assert!(detail.ends_with("..."));
        assert_eq!(error_detail("  short  "), "short");
    }

    #[test]
    fn test_from_config_resolves_token() {
        let mut config = ClientConfig::new("http://localhost:8000/");
        config.token = Some("abc".into());
        let service = HttpQueueService::from_config(&config).unwrap();
        assert_eq!(service.token.as_deref(), Some("abc"));
    }
}
