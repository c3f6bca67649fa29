//! The clinic queues a controller can watch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Stage;

/// One of the clinic's stage queues.
///
/// Deserializes through [`FromStr`], so config files take the same names as
/// the command line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum QueueStage {
    /// Front desk
    #[default]
    Registration,
    /// Preliminary assessment (vitals, triage)
    Assessment,
    /// Clinician
    Treatment,
}

impl QueueStage {
    pub const ALL: [QueueStage; 3] = [QueueStage::Registration, QueueStage::Assessment, QueueStage::Treatment];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStage::Registration => "registration",
            QueueStage::Assessment => "assessment",
            QueueStage::Treatment => "treatment",
        }
    }

    /// Ticket stage of everyone waiting in this queue.
    pub fn ticket_stage(&self) -> Stage {
        match self {
            QueueStage::Registration => Stage::Registered,
            QueueStage::Assessment => Stage::AwaitingAssessment,
            QueueStage::Treatment => Stage::AwaitingTreatment,
        }
    }

    /// Snapshot path relative to the service base URL.
    pub fn snapshot_path(&self) -> String {
        format!("queueing/{}_queueing/", self.as_str())
    }
}

impl fmt::Display for QueueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "registration" | "register" => Ok(QueueStage::Registration),
            "assessment" | "preliminary_assessment" | "triage" => Ok(QueueStage::Assessment),
            "treatment" | "consultation" => Ok(QueueStage::Treatment),
            other => Err(format!(
                "unknown queue stage '{}' (expected registration, assessment or treatment)",
                other
            )),
        }
    }
}

impl TryFrom<String> for QueueStage {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
