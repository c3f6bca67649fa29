//! Transition requests sent to the queueing service.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::{SlotPosition, Stage};
use crate::reconciler::QueueBoard;

use super::{Action, LifecycleError, LifecycleResult};

/// Path for accept and cancel requests.
pub const UPDATE_STATUS_PATH: &str = "patient/update-status/";

/// Path for metadata edits.
pub const UPDATE_TICKET_PATH: &str = "patient/update/";

/// Metadata amendments. Unset fields are left untouched by the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl TicketEdit {
    pub fn is_empty(&self) -> bool {
        self.complaint.is_none() && self.name.is_none() && self.age.is_none() && self.phone.is_none()
    }
}

/// A validated request, not yet sent.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub patient_id: String,
    pub action: Action,
    /// Stage shown on the board when the request was planned
    pub from: Stage,
    /// Stage the service should move the ticket to
    pub to: Stage,
}

impl TransitionRequest {
    /// Path relative to the service base URL.
    pub fn path(&self) -> &'static str {
        match self.action {
            Action::Accept | Action::Cancel => UPDATE_STATUS_PATH,
            Action::Edit(_) => UPDATE_TICKET_PATH,
        }
    }

    /// JSON request body.
    pub fn body(&self) -> Value {
        match &self.action {
            Action::Accept | Action::Cancel => json!({
                "patient_id": self.patient_id,
                "action": self.action.as_str(),
                "status": self.to.as_str(),
            }),
            Action::Edit(edit) => {
                let mut body = Map::new();
                body.insert("patient_id".into(), Value::String(self.patient_id.clone()));
                if let Ok(Value::Object(fields)) = serde_json::to_value(edit) {
                    body.extend(fields);
                }
                Value::Object(body)
            }
        }
    }
}

/// Validate `action` for `patient_id` against the displayed board.
///
/// Accept is only offered for the ticket being served in its lane. Cancel and
/// Edit work on any ticket on the board. The board is never modified; the
/// caller sends the request and re-polls.
pub fn plan_transition(
    board: &QueueBoard,
    patient_id: &str,
    action: Action,
) -> LifecycleResult<TransitionRequest> {
    let (_, position, ticket) = board
        .locate(patient_id)
        .ok_or_else(|| LifecycleError::NotOnBoard(patient_id.to_string()))?;

    if action == Action::Accept && position != SlotPosition::Current {
        return Err(LifecycleError::NotCurrentOccupant {
            patient_id: patient_id.to_string(),
            position,
        });
    }

    let to = ticket.stage.apply(&action)?;
    Ok(TransitionRequest {
        patient_id: ticket.patient_id.clone(),
        action,
        from: ticket.stage,
        to,
    })
}
