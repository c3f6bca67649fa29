//! Queueing service seam and a blocking driver.
//!
//! [`QueueService`] is the external collaborator: it owns queue order and
//! ticket stage. [`QueueClient`] ties one service to one
//! [`PollingController`] for hosts that can block on requests (CLI tools,
//! background workers). Event-loop hosts drive the controller directly.

use std::cell::RefCell;
use std::collections::VecDeque;

use thiserror::Error;
use tracing::{info, warn};

use crate::lifecycle::{plan_transition, Action, LifecycleError, QueueStage, TicketEdit, TransitionRequest};
use crate::models::{QueueSnapshot, SnapshotError, Stage};
use crate::poller::{Completion, FetchError, FetchToken, PollView, PollingController};

/// Errors returned by a queueing service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Not authorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Could not decode response: {0}")]
    Decode(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<SnapshotError> for ServiceError {
    fn from(e: SnapshotError) -> Self {
        ServiceError::Decode(e.to_string())
    }
}

impl From<ServiceError> for FetchError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Unauthorized { message, .. } => FetchError::Unauthorized(message),
            ServiceError::Decode(message) => FetchError::Malformed(message),
            other => FetchError::Unavailable(other.to_string()),
        }
    }
}

/// The external queueing service.
pub trait QueueService {
    /// Fetch the current snapshot of a queue.
    fn fetch_snapshot(&self, queue: QueueStage) -> ServiceResult<QueueSnapshot>;

    /// Ask the service to perform a transition.
    fn send_transition(&self, request: &TransitionRequest) -> ServiceResult<()>;
}

impl<S: QueueService + ?Sized> QueueService for &S {
    fn fetch_snapshot(&self, queue: QueueStage) -> ServiceResult<QueueSnapshot> {
        (**self).fetch_snapshot(queue)
    }

    fn send_transition(&self, request: &TransitionRequest) -> ServiceResult<()> {
        (**self).send_transition(request)
    }
}

/// Result of a transition request the service answered.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Service accepted; the board will show it after the re-fetch
    Confirmed { to: Stage },
    /// Service refused or could not be reached; shown to the user as-is
    Rejected { message: String },
}

/// Blocking driver: one service, one controller.
pub struct QueueClient<S: QueueService> {
    service: S,
    controller: PollingController,
}

impl<S: QueueService> QueueClient<S> {
    pub fn new(service: S, controller: PollingController) -> Self {
        Self { service, controller }
    }

    /// Mount the view and perform the initial fetch.
    pub fn mount(&mut self) -> Completion {
        let token = self.controller.mount();
        self.fetch(token)
    }

    /// Fetch a fresh snapshot.
    pub fn refresh(&mut self) -> Completion {
        match self.controller.begin_fetch() {
            Some(token) => self.fetch(token),
            None => Completion::Discarded,
        }
    }

    fn fetch(&mut self, token: FetchToken) -> Completion {
        let result = self
            .service
            .fetch_snapshot(self.controller.queue())
            .map_err(FetchError::from);
        self.controller.complete(token, result)
    }

    /// Validate and send a transition, then re-fetch.
    ///
    /// A local precondition failure returns `Err` without sending anything,
    /// but still re-fetches: the refusal was judged against a board that may
    /// be out of date. The displayed board is only ever changed by a fetched
    /// snapshot.
    pub fn request(&mut self, patient_id: &str, action: Action) -> Result<TransitionOutcome, LifecycleError> {
        let request = match plan_transition(self.controller.board(), patient_id, action) {
            Ok(request) => request,
            Err(e) => {
                warn!(patient_id, error = %e, "queue transition refused locally");
                self.refresh();
                return Err(e);
            }
        };
        info!(
            patient_id = %request.patient_id,
            action = request.action.as_str(),
            from = %request.from,
            to = %request.to,
            "sending queue transition"
        );

        let outcome = match self.service.send_transition(&request) {
            Ok(()) => TransitionOutcome::Confirmed { to: request.to },
            Err(e) => {
                warn!(patient_id = %request.patient_id, error = %e, "queue transition refused");
                TransitionOutcome::Rejected {
                    message: rejection_message(&request, &e),
                }
            }
        };

        self.refresh();
        Ok(outcome)
    }

    pub fn accept(&mut self, patient_id: &str) -> Result<TransitionOutcome, LifecycleError> {
        self.request(patient_id, Action::Accept)
    }

    pub fn cancel(&mut self, patient_id: &str) -> Result<TransitionOutcome, LifecycleError> {
        self.request(patient_id, Action::Cancel)
    }

    pub fn edit(&mut self, patient_id: &str, edit: TicketEdit) -> Result<TransitionOutcome, LifecycleError> {
        self.request(patient_id, Action::Edit(edit))
    }

    pub fn unmount(&mut self) {
        self.controller.unmount();
    }

    pub fn view(&self) -> &PollView {
        self.controller.view()
    }

    pub fn controller(&self) -> &PollingController {
        &self.controller
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

fn rejection_message(request: &TransitionRequest, error: &ServiceError) -> String {
    let reason = match error {
        ServiceError::Rejected { message, .. } if !message.trim().is_empty() => message.trim().to_string(),
        ServiceError::Rejected { .. } => match request.action {
            Action::Accept => "ticket no longer current".to_string(),
            _ => "ticket changed on the server".to_string(),
        },
        other => other.to_string(),
    };
    format!("Could not {} patient {}: {}", request.action.as_str(), request.patient_id, reason)
}

/// Scripted in-memory service for tests and demos.
///
/// Responses are served in the order they were queued. Sent transitions are
/// recorded.
#[derive(Debug, Default)]
pub struct MockQueueService {
    snapshots: RefCell<VecDeque<ServiceResult<QueueSnapshot>>>,
    transitions: RefCell<VecDeque<ServiceResult<()>>>,
    sent: RefCell<Vec<TransitionRequest>>,
}

impl MockQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next fetch.
    pub fn push_snapshot(&self, response: ServiceResult<QueueSnapshot>) -> &Self {
        self.snapshots.borrow_mut().push_back(response);
        self
    }

    /// Queue a response for the next transition.
    pub fn push_transition(&self, response: ServiceResult<()>) -> &Self {
        self.transitions.borrow_mut().push_back(response);
        self
    }

    /// Transitions sent so far.
    pub fn sent(&self) -> Vec<TransitionRequest> {
        self.sent.borrow().clone()
    }
}

impl QueueService for MockQueueService {
    fn fetch_snapshot(&self, _queue: QueueStage) -> ServiceResult<QueueSnapshot> {
        self.snapshots.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(ServiceError::Transport("no scripted snapshot".into()))
        })
    }

    fn send_transition(&self, request: &TransitionRequest) -> ServiceResult<()> {
        self.sent.borrow_mut().push(request.clone());
        self.transitions.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriorityClass, QueueTicket, SlotPosition};
    use crate::poller::RetryPolicy;
    use std::num::NonZeroU32;
    use std::time::Duration;

    fn snapshot() -> QueueSnapshot {
        QueueSnapshot::default()
            .with_slot(
                PriorityClass::Regular,
                SlotPosition::Current,
                QueueTicket::new("P9", NonZeroU32::new(11).unwrap(), PriorityClass::Regular, Stage::Registered),
            )
            .with_slot(
                PriorityClass::Regular,
                SlotPosition::Next1,
                QueueTicket::new("P2", NonZeroU32::new(12).unwrap(), PriorityClass::Regular, Stage::Registered),
            )
    }

    fn client(service: &MockQueueService) -> QueueClient<&MockQueueService> {
        let controller =
            PollingController::new(QueueStage::Registration, Duration::from_secs(5), RetryPolicy::default());
        QueueClient::new(service, controller)
    }

    #[test]
    fn test_accept_confirmed_then_refetch() {
        let service = MockQueueService::new();
        service.push_snapshot(Ok(snapshot()));
        service.push_snapshot(Ok(QueueSnapshot::default()));

        let mut client = client(&service);
        assert_eq!(client.mount(), Completion::Applied);

        let outcome = client.accept("P9").unwrap();
        assert_eq!(outcome, TransitionOutcome::Confirmed { to: Stage::AwaitingAssessment });
        assert_eq!(service.sent().len(), 1);
        assert!(client.view().board.is_empty());
    }

    #[test]
    fn test_rejection_message_fallback() {
        let service = MockQueueService::new();
        service.push_snapshot(Ok(snapshot()));
        service.push_snapshot(Ok(snapshot()));
        service.push_transition(Err(ServiceError::Rejected {
            status: 409,
            message: String::new(),
        }));

        let mut client = client(&service);
        client.mount();

        let outcome = client.accept("P9").unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                message: "Could not accept patient P9: ticket no longer current".into()
            }
        );
    }

    #[test]
    fn test_fetch_error_mapping() {
        let unauthorized = ServiceError::Unauthorized {
            status: 401,
            message: "token expired".into(),
        };
        assert_eq!(FetchError::from(unauthorized), FetchError::Unauthorized("token expired".into()));
        assert!(matches!(
            FetchError::from(ServiceError::Transport("reset".into())),
            FetchError::Unavailable(_)
        ));
        assert!(matches!(
            FetchError::from(ServiceError::Decode("bad".into())),
            FetchError::Malformed(_)
        ));
    }
}
