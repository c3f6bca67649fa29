//! Ticket lifecycle state machine.
//!
//! ```text
//! Registered ──accept──► AwaitingAssessment ──accept──► AwaitingTreatment ──accept──► Completed
//!     │                         │                              │
//!     └────────cancel───────────┴────────────cancel────────────┴──────────────► Cancelled
//! ```
//!
//! The queueing service performs every transition. This module only decides
//! whether a request is worth sending and what it should say; local ticket
//! state is never changed until the next snapshot confirms it.

mod queue_stage;
mod transition;

pub use queue_stage::*;
pub use transition::*;

use thiserror::Error;

use crate::models::{SlotPosition, Stage};

/// Lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Ticket is already {0}; no further actions are allowed")]
    Terminal(Stage),

    #[error("Could not accept patient {patient_id}: ticket is no longer current (now in {position:?})")]
    NotCurrentOccupant {
        patient_id: String,
        position: SlotPosition,
    },

    #[error("Patient {0} is not on the queue board")]
    NotOnBoard(String),

    #[error("Edit does not change any field")]
    EmptyEdit,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A staff action on a ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Move the ticket to the next stage
    Accept,
    /// Withdraw the ticket
    Cancel,
    /// Amend ticket metadata without changing stage
    Edit(TicketEdit),
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Cancel => "cancel",
            Action::Edit(_) => "edit",
        }
    }
}

impl Stage {
    /// Stage a ticket would reach if the service accepts `action`.
    pub fn apply(self, action: &Action) -> LifecycleResult<Stage> {
        if self.is_terminal() {
            return Err(LifecycleError::Terminal(self));
        }

        match action {
            Action::Accept => Ok(match self {
                Stage::Registered => Stage::AwaitingAssessment,
                Stage::AwaitingAssessment => Stage::AwaitingTreatment,
                Stage::AwaitingTreatment => Stage::Completed,
                Stage::Completed | Stage::Cancelled => return Err(LifecycleError::Terminal(self)),
            }),
            Action::Cancel => Ok(Stage::Cancelled),
            Action::Edit(edit) if edit.is_empty() => Err(LifecycleError::EmptyEdit),
            Action::Edit(_) => Ok(self),
        }
    }

    /// Stage reached by accepting, if any.
    pub fn next(self) -> Option<Stage> {
        self.apply(&Action::Accept).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit() -> Action {
        Action::Edit(TicketEdit {
            complaint: Some("cough".into()),
            ..TicketEdit::default()
        })
    }

    #[test]
    fn test_accept_walks_canonical_path() {
        let mut stage = Stage::Registered;
        let mut path = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            path.push(stage);
        }

        assert_eq!(
            path,
            vec![
                Stage::Registered,
                Stage::AwaitingAssessment,
                Stage::AwaitingTreatment,
                Stage::Completed,
            ]
        );
    }

    #[test]
    fn test_cancel_from_any_active_stage() {
        for stage in [Stage::Registered, Stage::AwaitingAssessment, Stage::AwaitingTreatment] {
            assert_eq!(stage.apply(&Action::Cancel), Ok(Stage::Cancelled));
        }
    }

    #[test]
    fn test_edit_keeps_stage() {
        assert_eq!(Stage::AwaitingAssessment.apply(&edit()), Ok(Stage::AwaitingAssessment));
        assert_eq!(
            Stage::Registered.apply(&Action::Edit(TicketEdit::default())),
            Err(LifecycleError::EmptyEdit)
        );
    }

    #[test]
    fn test_terminal_stages_reject_everything() {
        for stage in [Stage::Completed, Stage::Cancelled] {
            for action in [Action::Accept, Action::Cancel, edit()] {
                assert_eq!(stage.apply(&action), Err(LifecycleError::Terminal(stage)));
            }
        }
    }
}
