//! Both lanes of a queue, ready for display.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{PriorityClass, QueueSnapshot, QueueTicket, SlotPosition};

use super::{reconcile, LaneView, Slot};

/// Something wrong with a fetched snapshot that the board rendered around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SnapshotAnomaly {
    /// The same patient occupies more than one slot. Every such slot is
    /// shown as empty.
    DuplicatePatient {
        patient_id: String,
        slots: Vec<(PriorityClass, SlotPosition)>,
    },
    /// Different patients share a queue number within one lane. Both stay
    /// on the board since each is a real, actionable ticket.
    DuplicateQueueNumber {
        class: PriorityClass,
        queue_number: NonZeroU32,
        slots: Vec<SlotPosition>,
    },
}

/// Display-ready view of one queue: a lane view per priority class.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueBoard {
    priority: LaneView,
    regular: LaneView,
    anomalies: Vec<SnapshotAnomaly>,
}

impl QueueBoard {
    /// Reconcile both lanes of a snapshot.
    ///
    /// A patient may hold at most one active ticket, so a snapshot showing the
    /// same patient twice is inconsistent. Rather than guess which slot is
    /// right, all of that patient's slots render as `N/A`.
    pub fn from_snapshot(snapshot: &QueueSnapshot) -> Self {
        let mut board = Self {
            priority: reconcile(snapshot, PriorityClass::Priority),
            regular: reconcile(snapshot, PriorityClass::Regular),
            anomalies: Vec::new(),
        };

        let mut seen: Vec<(&str, Vec<(PriorityClass, SlotPosition)>)> = Vec::new();
        for (class, position, ticket) in snapshot.occupied() {
            match seen.iter_mut().find(|(id, _)| *id == ticket.patient_id) {
                Some((_, slots)) => slots.push((class, position)),
                None => seen.push((ticket.patient_id.as_str(), vec![(class, position)])),
            }
        }

        for (patient_id, slots) in seen.into_iter().filter(|(_, slots)| slots.len() > 1) {
            warn!(patient_id, occurrences = slots.len(), "patient appears in several queue slots");
            for (class, position) in &slots {
                *board.lane_mut(*class).get_mut(*position) = Slot::Absent;
            }
            board.anomalies.push(SnapshotAnomaly::DuplicatePatient {
                patient_id: patient_id.to_string(),
                slots,
            });
        }

        for class in PriorityClass::ALL {
            board.check_queue_numbers(class);
        }

        board
    }

    fn check_queue_numbers(&mut self, class: PriorityClass) {
        let mut seen: Vec<(NonZeroU32, Vec<SlotPosition>)> = Vec::new();
        let lane = self.lane(class);
        for position in SlotPosition::ALL {
            if let Some(ticket) = lane.get(position).ticket() {
                match seen.iter_mut().find(|(number, _)| *number == ticket.queue_number) {
                    Some((_, slots)) => slots.push(position),
                    None => seen.push((ticket.queue_number, vec![position])),
                }
            }
        }

        for (queue_number, slots) in seen.into_iter().filter(|(_, slots)| slots.len() > 1) {
            warn!(%class, %queue_number, "queue number shared by several patients in one lane");
            self.anomalies.push(SnapshotAnomaly::DuplicateQueueNumber {
                class,
                queue_number,
                slots,
            });
        }
    }

    /// Lane view for a priority class.
    pub fn lane(&self, class: PriorityClass) -> &LaneView {
        match class {
            PriorityClass::Priority => &self.priority,
            PriorityClass::Regular => &self.regular,
        }
    }

    fn lane_mut(&mut self, class: PriorityClass) -> &mut LaneView {
        match class {
            PriorityClass::Priority => &mut self.priority,
            PriorityClass::Regular => &mut self.regular,
        }
    }

    /// `[current, next1, next2]` labels for a lane.
    pub fn labels(&self, class: PriorityClass) -> [String; 3] {
        self.lane(class).labels()
    }

    /// Ticket being served in a lane.
    pub fn current(&self, class: PriorityClass) -> Option<&QueueTicket> {
        self.lane(class).current.ticket()
    }

    /// Find a patient anywhere on the board.
    pub fn locate(&self, patient_id: &str) -> Option<(PriorityClass, SlotPosition, &QueueTicket)> {
        PriorityClass::ALL.into_iter().find_map(|class| {
            let lane = self.lane(class);
            let position = lane.position_of(patient_id)?;
            lane.get(position).ticket().map(|ticket| (class, position, ticket))
        })
    }

    /// Inconsistencies found while building the board.
    pub fn anomalies(&self) -> &[SnapshotAnomaly] {
        &self.anomalies
    }

    /// True when every slot is empty.
    pub fn is_empty(&self) -> bool {
        PriorityClass::ALL
            .into_iter()
            .all(|class| self.lane(class).slots().iter().all(|slot| slot.is_absent()))
    }
}
