//! Clinic Queue Core Library
//!
//! Client-side queue board for a multi-role clinic: turns polled queue
//! snapshots into display slots and drives ticket transitions.
//!
//! # Architecture
//!
//! ```text
//!   Queueing Service (authoritative for order and stage)
//!          │  GET queueing/{stage}_queueing/
//!          ▼
//!   Polling Controller ── last-issued request wins, stale responses dropped
//!          │
//!          ▼
//!   Reconciler ── priority lane [current, next1, next2]
//!          │      regular lane  [current, next1, next2]
//!          ▼
//!      Queue Board ──► labels ("#11", "N/A") ──► host view
//!          │
//!   Staff action (accept / cancel / edit)
//!          │
//!          ▼
//!   Lifecycle check ──► POST patient/update-status/ ──► re-fetch
//! ```
//!
//! # Core Principle
//!
//! **The service owns the queue.** Nothing here sorts tickets, promotes a
//! waiting ticket into an empty slot, or changes a ticket's stage locally.
//!
//! # Modules
//!
//! - [`models`]: Domain types (QueueTicket, QueueSnapshot, Stage, etc.)
//! - [`reconciler`]: Snapshot → lane views and queue board
//! - [`lifecycle`]: Ticket stage machine and transition requests
//! - [`poller`]: Sans-IO polling controller with retry policy
//! - [`service`]: Queueing service trait and blocking driver
//! - [`config`]: TOML client configuration

pub mod config;
pub mod lifecycle;
pub mod models;
pub mod poller;
pub mod reconciler;
pub mod service;

// Re-export commonly used types
pub use config::ClientConfig;
pub use lifecycle::{plan_transition, Action, QueueStage, TicketEdit, TransitionRequest};
pub use models::{PriorityClass, QueueSnapshot, QueueTicket, SlotPosition, Stage};
pub use poller::{Completion, FetchError, PollingController, RetryPolicy};
pub use reconciler::{reconcile, LaneView, QueueBoard, Slot};
pub use service::{QueueClient, QueueService, ServiceError, TransitionOutcome};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};
use std::time::Duration;

use poller::FetchToken;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicQueueError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transition not allowed: {0}")]
    TransitionNotAllowed(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<lifecycle::LifecycleError> for ClinicQueueError {
    fn from(e: lifecycle::LifecycleError) -> Self {
        ClinicQueueError::TransitionNotAllowed(e.to_string())
    }
}

impl From<config::ConfigError> for ClinicQueueError {
    fn from(e: config::ConfigError) -> Self {
        ClinicQueueError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicQueueError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicQueueError::Internal(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Create a monitor for one queue view.
#[uniffi::export]
pub fn open_queue_monitor(
    stage: String,
    poll_interval_ms: u64,
    max_retries: u32,
) -> Result<Arc<QueueMonitor>, ClinicQueueError> {
    let queue: QueueStage = stage.parse().map_err(ClinicQueueError::InvalidInput)?;
    if poll_interval_ms == 0 {
        return Err(ClinicQueueError::InvalidInput("poll interval must be greater than 0".into()));
    }

    let retry = RetryPolicy {
        max_retries,
        ..RetryPolicy::default()
    };
    let controller = PollingController::new(queue, Duration::from_millis(poll_interval_ms), retry);
    Ok(Arc::new(QueueMonitor {
        controller: Arc::new(Mutex::new(controller)),
    }))
}

/// Create a monitor from a TOML config file.
#[uniffi::export]
pub fn open_queue_monitor_from_config(path: String) -> Result<Arc<QueueMonitor>, ClinicQueueError> {
    let config = ClientConfig::load(&path)?;
    Ok(Arc::new(QueueMonitor {
        controller: Arc::new(Mutex::new(config.controller())),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Polling controller for a host view. The host performs the HTTP requests
/// and reports results back with the sequence number it was given.
#[derive(uniffi::Object)]
pub struct QueueMonitor {
    controller: Arc<Mutex<PollingController>>,
}

#[uniffi::export]
impl QueueMonitor {
    // =========================================================================
    // Fetch Lifecycle
    // =========================================================================

    /// Mount the view. Returns the sequence number of the initial fetch.
    pub fn mount(&self) -> Result<u64, ClinicQueueError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.mount().seq())
    }

    /// Start another fetch. `None` once unmounted.
    pub fn begin_fetch(&self) -> Result<Option<u64>, ClinicQueueError> {
        let mut controller = self.controller.lock()?;
        Ok(controller.begin_fetch().map(|token| token.seq()))
    }

    /// Report a response body for fetch `seq`.
    pub fn complete_fetch(&self, seq: u64, body_json: String) -> Result<FfiCompletion, ClinicQueueError> {
        let mut controller = self.controller.lock()?;
        let token = FetchToken::for_view(controller.view_id(), seq);
        let result = QueueSnapshot::from_json(&body_json, controller.queue().ticket_stage())
            .map_err(FetchError::from);
        Ok(controller.complete(token, result).into())
    }

    /// Report a failed fetch `seq` (network error, 5xx, 401).
    pub fn fail_fetch(
        &self,
        seq: u64,
        message: String,
        unauthorized: bool,
    ) -> Result<FfiCompletion, ClinicQueueError> {
        let mut controller = self.controller.lock()?;
        let token = FetchToken::for_view(controller.view_id(), seq);
        let error = if unauthorized {
            FetchError::Unauthorized(message)
        } else {
            FetchError::Unavailable(message)
        };
        Ok(controller.complete(token, Err(error)).into())
    }

    /// Tear down the view; in-flight results will be discarded.
    pub fn unmount(&self) -> Result<(), ClinicQueueError> {
        let mut controller = self.controller.lock()?;
        controller.unmount();
        Ok(())
    }

    // =========================================================================
    // Display State
    // =========================================================================

    pub fn priority_labels(&self) -> Result<Vec<String>, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(controller.board().labels(PriorityClass::Priority).to_vec())
    }

    pub fn regular_labels(&self) -> Result<Vec<String>, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(controller.board().labels(PriorityClass::Regular).to_vec())
    }

    /// Current slot occupants, for staff action buttons.
    pub fn current_tickets(&self) -> Result<Vec<FfiTicket>, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(PriorityClass::ALL
            .into_iter()
            .filter_map(|class| controller.board().current(class).cloned())
            .map(FfiTicket::from)
            .collect())
    }

    /// Error indicator text, if the last fetch failed.
    pub fn error_message(&self) -> Result<Option<String>, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(controller.view().error.as_ref().map(|e| e.to_string()))
    }

    pub fn is_loading(&self) -> Result<bool, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(controller.view().loading)
    }

    /// Milliseconds until the next fetch should start; `None` means stop.
    pub fn next_poll_delay_ms(&self) -> Result<Option<u64>, ClinicQueueError> {
        let controller = self.controller.lock()?;
        Ok(controller
            .next_poll_delay()
            .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Validate an accept for the host to send.
    pub fn plan_accept(&self, patient_id: String) -> Result<FfiTransitionRequest, ClinicQueueError> {
        self.plan(&patient_id, Action::Accept)
    }

    /// Validate a cancel for the host to send.
    pub fn plan_cancel(&self, patient_id: String) -> Result<FfiTransitionRequest, ClinicQueueError> {
        self.plan(&patient_id, Action::Cancel)
    }

    /// Validate a metadata edit for the host to send.
    pub fn plan_edit(
        &self,
        patient_id: String,
        edit: FfiTicketEdit,
    ) -> Result<FfiTransitionRequest, ClinicQueueError> {
        self.plan(&patient_id, Action::Edit(edit.into()))
    }
}

impl QueueMonitor {
    fn plan(&self, patient_id: &str, action: Action) -> Result<FfiTransitionRequest, ClinicQueueError> {
        let controller = self.controller.lock()?;
        let request = plan_transition(controller.board(), patient_id, action)?;
        Ok(request.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe fetch completion.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum FfiCompletion {
    Applied,
    Failed { retry_in_ms: Option<u64> },
    Stale,
    Discarded,
}

impl From<Completion> for FfiCompletion {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Applied => FfiCompletion::Applied,
            Completion::Failed { retry_in } => FfiCompletion::Failed {
                retry_in_ms: retry_in.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            },
            Completion::Stale => FfiCompletion::Stale,
            Completion::Discarded => FfiCompletion::Discarded,
        }
    }
}

/// FFI-safe ticket.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTicket {
    pub patient_id: String,
    pub queue_number: u32,
    pub label: String,
    pub priority_class: String,
    pub stage: String,
    pub complaint: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub phone: Option<String>,
}

impl From<QueueTicket> for FfiTicket {
    fn from(ticket: QueueTicket) -> Self {
        Self {
            label: ticket.label(),
            patient_id: ticket.patient_id,
            queue_number: ticket.queue_number.get(),
            priority_class: ticket.priority_class.as_str().to_string(),
            stage: ticket.stage.as_str().to_string(),
            complaint: ticket.complaint,
            name: ticket.demographics.name,
            age: ticket.demographics.age,
            phone: ticket.demographics.phone,
        }
    }
}

/// FFI-safe ticket edit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTicketEdit {
    pub complaint: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub phone: Option<String>,
}

impl From<FfiTicketEdit> for TicketEdit {
    fn from(edit: FfiTicketEdit) -> Self {
        TicketEdit {
            complaint: edit.complaint,
            name: edit.name,
            age: edit.age,
            phone: edit.phone,
        }
    }
}

/// FFI-safe transition request, ready to POST.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTransitionRequest {
    pub path: String,
    pub body_json: String,
    pub from_status: String,
    pub target_status: String,
}

impl From<TransitionRequest> for FfiTransitionRequest {
    fn from(request: TransitionRequest) -> Self {
        Self {
            path: request.path().to_string(),
            body_json: request.body().to_string(),
            from_status: request.from.as_str().to_string(),
            target_status: request.to.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "priority_current": {"patient_id": "P1", "queue_number": 3},
        "priority_next1": null,
        "priority_next2": null,
        "regular_current": {"patient_id": "P9", "queue_number": 11},
        "regular_next1": {"patient_id": "P2", "queue_number": 12},
        "regular_next2": null
    }"#;

    #[test]
    fn test_monitor_round() {
        let monitor = open_queue_monitor("registration".into(), 5000, 3).unwrap();
        let seq = monitor.mount().unwrap();

        assert!(monitor.is_loading().unwrap());
        assert_eq!(monitor.complete_fetch(seq, BODY.into()).unwrap(), FfiCompletion::Applied);
        assert_eq!(monitor.priority_labels().unwrap(), vec!["#3", "N/A", "N/A"]);
        assert_eq!(monitor.regular_labels().unwrap(), vec!["#11", "#12", "N/A"]);
        assert_eq!(monitor.current_tickets().unwrap().len(), 2);
        assert_eq!(monitor.next_poll_delay_ms().unwrap(), Some(5000));
    }

    #[test]
    fn test_monitor_stale_and_failure() {
        let monitor = open_queue_monitor("assessment".into(), 1000, 2).unwrap();
        let first = monitor.mount().unwrap();
        let second = monitor.begin_fetch().unwrap().unwrap();

        assert_eq!(monitor.complete_fetch(first, BODY.into()).unwrap(), FfiCompletion::Stale);
        assert_eq!(
            monitor.fail_fetch(second, "connection reset".into(), false).unwrap(),
            FfiCompletion::Failed { retry_in_ms: Some(500) }
        );
        assert!(monitor.error_message().unwrap().unwrap().contains("connection reset"));
        assert_eq!(monitor.priority_labels().unwrap(), vec!["N/A", "N/A", "N/A"]);
    }

    #[test]
    fn test_monitor_malformed_body_keeps_board() {
        let monitor = open_queue_monitor("treatment".into(), 1000, 3).unwrap();
        let seq = monitor.mount().unwrap();
        monitor.complete_fetch(seq, BODY.into()).unwrap();

        let seq = monitor.begin_fetch().unwrap().unwrap();
        let completion = monitor.complete_fetch(seq, "<html>502</html>".into()).unwrap();
        assert!(matches!(completion, FfiCompletion::Failed { .. }));
        assert_eq!(monitor.regular_labels().unwrap(), vec!["#11", "#12", "N/A"]);
    }

    #[test]
    fn test_monitor_plan_accept() {
        let monitor = open_queue_monitor("registration".into(), 1000, 3).unwrap();
        let seq = monitor.mount().unwrap();
        monitor.complete_fetch(seq, BODY.into()).unwrap();

        let request = monitor.plan_accept("P9".into()).unwrap();
        assert_eq!(request.path, "patient/update-status/");
        assert_eq!(request.target_status, "awaiting_assessment");

        assert!(matches!(
            monitor.plan_accept("P2".into()),
            Err(ClinicQueueError::TransitionNotAllowed(_))
        ));
    }

    #[test]
    fn test_open_rejects_bad_input() {
        assert!(matches!(
            open_queue_monitor("pharmacy".into(), 1000, 3),
            Err(ClinicQueueError::InvalidInput(_))
        ));
        assert!(matches!(
            open_queue_monitor("registration".into(), 0, 3),
            Err(ClinicQueueError::InvalidInput(_))
        ));
    }
}
