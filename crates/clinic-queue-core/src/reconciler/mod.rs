//! Snapshot reconciliation into display slots.
//!
//! Pipeline: Polled Snapshot → Per-Lane Reconciliation → Board Sanitation → Labels
//!
//! Reconciliation is strictly positional. The queueing service owns ordering,
//! so nothing here sorts, and an empty slot is never back-filled from a later
//! one: "nobody is being served" and "nobody is waiting" are different states.

mod board;

pub use board::*;

use serde::{Deserialize, Serialize};

use crate::models::{PriorityClass, QueueSnapshot, QueueTicket, SlotPosition};

/// Label shown for an empty slot.
pub const ABSENT_LABEL: &str = "N/A";

/// A display slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Slot {
    /// Ticket shown in this slot
    Occupied(QueueTicket),
    /// Nobody in this slot
    #[default]
    Absent,
}

impl Slot {
    /// `#<queue number>` for an occupied slot, `N/A` otherwise.
    pub fn label(&self) -> String {
        match self {
            Slot::Occupied(ticket) => ticket.label(),
            Slot::Absent => ABSENT_LABEL.to_string(),
        }
    }

    pub fn ticket(&self) -> Option<&QueueTicket> {
        match self {
            Slot::Occupied(ticket) => Some(ticket),
            Slot::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }
}

impl From<Option<QueueTicket>> for Slot {
    fn from(ticket: Option<QueueTicket>) -> Self {
        ticket.map_or(Slot::Absent, Slot::Occupied)
    }
}

/// The `[current, next1, next2]` triple for one lane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaneView {
    pub current: Slot,
    pub next1: Slot,
    pub next2: Slot,
}

impl LaneView {
    /// Slot at a position.
    pub fn get(&self, position: SlotPosition) -> &Slot {
        match position {
            SlotPosition::Current => &self.current,
            SlotPosition::Next1 => &self.next1,
            SlotPosition::Next2 => &self.next2,
        }
    }

    fn get_mut(&mut self, position: SlotPosition) -> &mut Slot {
        match position {
            SlotPosition::Current => &mut self.current,
            SlotPosition::Next1 => &mut self.next1,
            SlotPosition::Next2 => &mut self.next2,
        }
    }

    /// Slots in display order.
    pub fn slots(&self) -> [&Slot; 3] {
        [&self.current, &self.next1, &self.next2]
    }

    /// Labels in display order.
    pub fn labels(&self) -> [String; 3] {
        [self.current.label(), self.next1.label(), self.next2.label()]
    }

    /// Position of a patient in this lane.
    pub fn position_of(&self, patient_id: &str) -> Option<SlotPosition> {
        SlotPosition::ALL.into_iter().find(|position| {
            self.get(*position)
                .ticket()
                .is_some_and(|ticket| ticket.patient_id == patient_id)
        })
    }
}

/// Extract one lane from a snapshot.
///
/// Total over its input: every snapshot field is optional and each maps to
/// exactly one output slot.
pub fn reconcile(snapshot: &QueueSnapshot, class: PriorityClass) -> LaneView {
    let slot = |position| Slot::from(snapshot.slot(class, position).cloned());
    LaneView {
        current: slot(SlotPosition::Current),
        next1: slot(SlotPosition::Next1),
        next2: slot(SlotPosition::Next2),
    }
}
