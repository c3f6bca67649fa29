//! Queue ticket models.

use std::fmt;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lane a ticket is queued in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Priority lane (elderly, pregnant, PWD, emergencies)
    Priority,
    /// Regular lane
    Regular,
}

impl PriorityClass {
    /// Both lanes, in display order.
    pub const ALL: [PriorityClass; 2] = [PriorityClass::Priority, PriorityClass::Regular];

    /// Wire name of the lane (also the snapshot field prefix).
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Priority => "priority",
            PriorityClass::Regular => "regular",
        }
    }

    /// Parse a lane name, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "priority" | "prio" | "p" => Some(PriorityClass::Priority),
            "regular" | "reg" | "r" => Some(PriorityClass::Regular),
            _ => None,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a ticket is in its trip through the clinic.
///
/// Transitions live in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting at registration
    Registered,
    /// Registered, waiting for preliminary assessment
    AwaitingAssessment,
    /// Assessed, waiting for the clinician
    AwaitingTreatment,
    /// Seen by the clinician
    Completed,
    /// Withdrawn by staff
    Cancelled,
}

impl Stage {
    /// Wire name used in status update requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Registered => "registered",
            Stage::AwaitingAssessment => "awaiting_assessment",
            Stage::AwaitingTreatment => "awaiting_treatment",
            Stage::Completed => "completed",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Parse a status string as sent by the queueing service.
    ///
    /// Queue-relative words such as `waiting` name no stage on their own and
    /// parse to `None`; see [`Stage::is_queue_relative`].
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "registered" | "registration" => Some(Stage::Registered),
            "awaiting_assessment" | "assessment" | "preliminary_assessment" => {
                Some(Stage::AwaitingAssessment)
            }
            "awaiting_treatment" | "treatment" => Some(Stage::AwaitingTreatment),
            "completed" | "complete" | "done" => Some(Stage::Completed),
            "cancelled" | "canceled" => Some(Stage::Cancelled),
            _ => None,
        }
    }

    /// Status words that mean "waiting in whichever queue this came from".
    pub fn is_queue_relative(value: &str) -> bool {
        matches!(normalize(value).as_str(), "waiting" | "queueing" | "queued" | "in_queue")
    }

    /// Completed and Cancelled accept no further actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Cancelled)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase().replace(['-', ' '], "_")
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-only patient details attached to a ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Demographics {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub phone: Option<String>,
}

/// A single patient's place in a clinic-stage queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueTicket {
    /// Opaque patient identifier
    pub patient_id: String,
    /// Service-assigned number, unique per lane and service date
    pub queue_number: NonZeroU32,
    /// Lane; never changes for a ticket
    pub priority_class: PriorityClass,
    /// Current stage, owned by the queueing service
    pub stage: Stage,
    /// Chief complaint
    pub complaint: Option<String>,
    /// Creation time (display and tie-breaks only)
    pub created_at: Option<DateTime<Utc>>,
    /// Name, age, phone
    pub demographics: Demographics,
}

impl QueueTicket {
    /// Create a ticket with required fields.
    pub fn new(
        patient_id: impl Into<String>,
        queue_number: NonZeroU32,
        priority_class: PriorityClass,
        stage: Stage,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            queue_number,
            priority_class,
            stage,
            complaint: None,
            created_at: None,
            demographics: Demographics::default(),
        }
    }

    /// Display label, `#` followed by the queue number.
    pub fn label(&self) -> String {
        format!("#{}", self.queue_number)
    }

    /// Whether the ticket is still moving through the clinic.
    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }
}
