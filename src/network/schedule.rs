//! Schedule data types: the declarative plan of requests and diagnostic
//! actions a [`crate::schedule::ScheduleExecutor`] walks through.
//!
//! These types only describe *what* a schedule contains; the stateful
//! walking logic (cycle counters, wait durations) lives in [`crate::schedule`].

use std::sync::Arc;

use crate::network::request::Request;

/// A single action a schedule can perform each slot.
#[derive(Debug, Clone)]
pub enum EntryKind {
    Wakeup,
    Idle,
    Shutdown,
    OpStatus(u8),
    PowerStatus(u8),
    SerialNumber(u8),
    SoftwareVersion(u8),
    Request(Arc<Request>),
}

/// A [`EntryKind`] with its priority-aging bookkeeping.
#[derive(Debug, Clone)]
pub struct PriorityEntry {
    pub entry: EntryKind,
    pub cycle: u32,
    pub max_age: u32,
}

/// Whether a schedule's inter-frame delay is the same every slot or scaled
/// to the frame just sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slots {
    Variable,
    Fixed,
}

/// Priority-aging counter seeding: all zero, or half of each entry's cycle
/// (so a freshly-enabled schedule doesn't burst every entry in its first
/// `max(cycle)` slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Zero,
    Adjusted,
}

/// A named, cyclic plan of bus traffic.
#[derive(Debug, Clone)]
pub enum Schedule {
    FixedOrder {
        name: String,
        entries: Vec<EntryKind>,
        slots: Slots,
        reserve_slots: bool,
        delay: std::time::Duration,
    },
    PriorityAging {
        name: String,
        entries: Vec<PriorityEntry>,
        slots: Slots,
        phase: Phase,
        reserve_slots: bool,
        delay: std::time::Duration,
    },
}

impl Schedule {
    pub fn name(&self) -> &str {
        match self {
            Schedule::FixedOrder { name, .. } => name,
            Schedule::PriorityAging { name, .. } => name,
        }
    }
}
