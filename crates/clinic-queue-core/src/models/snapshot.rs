//! Queue snapshot as polled from the queueing service.
//!
//! Decoding is total over slot contents: a slot that is missing, `null`, or
//! not a usable ticket becomes empty instead of failing the whole snapshot.
//! Only a body that is not a JSON object is an error.

use std::num::NonZeroU32;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::ticket::{Demographics, PriorityClass, QueueTicket, Stage};

/// Snapshot decoding errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Position within a lane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlotPosition {
    /// Being served now
    Current,
    /// Up next
    Next1,
    /// After next
    Next2,
}

impl SlotPosition {
    /// Positions in display order.
    pub const ALL: [SlotPosition; 3] = [SlotPosition::Current, SlotPosition::Next1, SlotPosition::Next2];

    /// Index into a lane triple.
    pub fn index(&self) -> usize {
        match self {
            SlotPosition::Current => 0,
            SlotPosition::Next1 => 1,
            SlotPosition::Next2 => 2,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            SlotPosition::Current => "current",
            SlotPosition::Next1 => "next1",
            SlotPosition::Next2 => "next2",
        }
    }
}

/// Snapshot field name for a lane slot, e.g. `priority_next1`.
pub fn slot_field_name(class: PriorityClass, position: SlotPosition) -> String {
    format!("{}_{}", class.as_str(), position.suffix())
}

/// One polled, point-in-time view of both lanes.
///
/// Replaced wholesale on every successful fetch; never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueSnapshot {
    pub priority_current: Option<QueueTicket>,
    pub priority_next1: Option<QueueTicket>,
    pub priority_next2: Option<QueueTicket>,
    pub regular_current: Option<QueueTicket>,
    pub regular_next1: Option<QueueTicket>,
    pub regular_next2: Option<QueueTicket>,
}

impl QueueSnapshot {
    /// Decode a response body.
    ///
    /// `default_stage` is used for tickets with no status or a queue-relative
    /// one such as `waiting`; it is the stage served by the queue the
    /// snapshot was fetched from.
    pub fn from_json(body: &str, default_stage: Stage) -> SnapshotResult<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(&value, default_stage)
    }

    /// Decode an already-parsed response body.
    pub fn from_value(value: &Value, default_stage: Stage) -> SnapshotResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| SnapshotError::NotAnObject(json_kind(value)))?;

        let mut snapshot = Self::default();
        for class in PriorityClass::ALL {
            for position in SlotPosition::ALL {
                let field = slot_field_name(class, position);
                let ticket = object
                    .get(&field)
                    .and_then(|raw| decode_slot(&field, raw, class, default_stage));
                snapshot.set_slot(class, position, ticket);
            }
        }
        Ok(snapshot)
    }

    /// Ticket in a slot, if any.
    pub fn slot(&self, class: PriorityClass, position: SlotPosition) -> Option<&QueueTicket> {
        match (class, position) {
            (PriorityClass::Priority, SlotPosition::Current) => self.priority_current.as_ref(),
            (PriorityClass::Priority, SlotPosition::Next1) => self.priority_next1.as_ref(),
            (PriorityClass::Priority, SlotPosition::Next2) => self.priority_next2.as_ref(),
            (PriorityClass::Regular, SlotPosition::Current) => self.regular_current.as_ref(),
            (PriorityClass::Regular, SlotPosition::Next1) => self.regular_next1.as_ref(),
            (PriorityClass::Regular, SlotPosition::Next2) => self.regular_next2.as_ref(),
        }
    }

    /// Replace a slot.
    pub fn set_slot(
        &mut self,
        class: PriorityClass,
        position: SlotPosition,
        ticket: Option<QueueTicket>,
    ) {
        let slot = match (class, position) {
            (PriorityClass::Priority, SlotPosition::Current) => &mut self.priority_current,
            (PriorityClass::Priority, SlotPosition::Next1) => &mut self.priority_next1,
            (PriorityClass::Priority, SlotPosition::Next2) => &mut self.priority_next2,
            (PriorityClass::Regular, SlotPosition::Current) => &mut self.regular_current,
            (PriorityClass::Regular, SlotPosition::Next1) => &mut self.regular_next1,
            (PriorityClass::Regular, SlotPosition::Next2) => &mut self.regular_next2,
        };
        *slot = ticket;
    }

    /// Builder form of [`set_slot`](Self::set_slot).
    pub fn with_slot(
        mut self,
        class: PriorityClass,
        position: SlotPosition,
        ticket: QueueTicket,
    ) -> Self {
        self.set_slot(class, position, Some(ticket));
        self
    }

    /// All occupied slots in field order.
    pub fn occupied(&self) -> impl Iterator<Item = (PriorityClass, SlotPosition, &QueueTicket)> + '_ {
        PriorityClass::ALL.into_iter().flat_map(move |class| {
            SlotPosition::ALL
                .into_iter()
                .filter_map(move |position| self.slot(class, position).map(|t| (class, position, t)))
        })
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.occupied().next().is_none()
    }
}

/// Ticket object as sent by the service. Every field is optional here;
/// required ones are checked in [`WireTicket::into_ticket`].
#[derive(Debug, Deserialize)]
struct WireTicket {
    #[serde(default)]
    patient_id: Option<Value>,
    #[serde(default)]
    queue_number: Option<Value>,
    #[serde(default, alias = "priority_class")]
    priority: Option<Value>,
    #[serde(default, alias = "stage")]
    status: Option<Value>,
    #[serde(default)]
    complaint: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    age: Option<Value>,
    #[serde(default)]
    phone: Option<Value>,
}

impl WireTicket {
    fn into_ticket(self, lane: PriorityClass, default_stage: Stage) -> Result<QueueTicket, &'static str> {
        let patient_id = text(self.patient_id.as_ref()).ok_or("missing patient_id")?;
        let queue_number = positive_number(self.queue_number.as_ref()).ok_or("missing or non-positive queue_number")?;

        if let Some(declared) = self.priority.as_ref().and_then(priority_class) {
            if declared != lane {
                warn!(%patient_id, %declared, %lane, "ticket lane disagrees with its slot, using slot lane");
            }
        }

        let stage = match text(self.status.as_ref()) {
            Some(status) if Stage::is_queue_relative(&status) => default_stage,
            Some(status) => Stage::parse(&status).ok_or("unknown status")?,
            None => default_stage,
        };

        Ok(QueueTicket {
            patient_id,
            queue_number,
            priority_class: lane,
            stage,
            complaint: text(self.complaint.as_ref()),
            created_at: text(self.created_at.as_ref()).and_then(|raw| timestamp(&raw)),
            demographics: Demographics {
                name: text(self.name.as_ref()),
                age: positive_number(self.age.as_ref()).map(NonZeroU32::get),
                phone: text(self.phone.as_ref()),
            },
        })
    }
}

fn decode_slot(field: &str, raw: &Value, lane: PriorityClass, default_stage: Stage) -> Option<QueueTicket> {
    if raw.is_null() {
        return None;
    }
    if !raw.is_object() {
        warn!(field, kind = json_kind(raw), "queue slot is not a ticket object, treating as empty");
        return None;
    }

    let wire = match WireTicket::deserialize(raw) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(field, error = %e, "could not decode queue slot, treating as empty");
            return None;
        }
    };

    match wire.into_ticket(lane, default_stage) {
        Ok(ticket) => Some(ticket),
        Err(reason) => {
            warn!(field, reason, "malformed ticket in queue slot, treating as empty");
            None
        }
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn positive_number(value: Option<&Value>) -> Option<NonZeroU32> {
    let raw = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    NonZeroU32::new(u32::try_from(raw).ok()?)
}

fn priority_class(value: &Value) -> Option<PriorityClass> {
    match value {
        Value::String(s) => PriorityClass::parse(s),
        Value::Bool(true) => Some(PriorityClass::Priority),
        Value::Bool(false) => Some(PriorityClass::Regular),
        _ => None,
    }
}

fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Naive timestamps from the service are UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
