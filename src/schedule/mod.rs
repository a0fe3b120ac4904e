//! Schedule executors: the stateful walk over a [`crate::network::Schedule`]'s
//! entries. `FixedOrderExecutor` and `PriorityAgingExecutor` both implement
//! [`ScheduleExecutor`]; the master's schedule thread loops
//! `if let Some(e) = next() { e.perform(handle) } executor.wait()`.

use std::time::Duration;

use crate::master::MasterHandle;
use crate::network::{EntryKind, Phase, PriorityEntry, Schedule, Slots};

impl EntryKind {
    /// Fires the corresponding master API without waiting for completion —
    /// a schedule-driven call never blocks its own thread on a response.
    pub fn perform(&self, master: &dyn MasterHandle) {
        match self {
            EntryKind::Wakeup => master.wakeup(),
            EntryKind::Idle => master.idle(),
            EntryKind::Shutdown => master.shutdown(),
            EntryKind::OpStatus(addr) => master.get_operation_status(*addr),
            EntryKind::PowerStatus(addr) => master.get_power_status(*addr),
            EntryKind::SerialNumber(addr) => master.get_serial_number(*addr),
            EntryKind::SoftwareVersion(addr) => master.get_software_version(*addr),
            EntryKind::Request(request) => master.request_by_id(request.id),
        }
    }
}

/// Produces the next schedule entry to send and paces the inter-frame delay.
pub trait ScheduleExecutor: Send {
    fn next(&mut self) -> Option<EntryKind>;
    fn wait(&self);
}

/// Longest frame on the wire at 8N1 framing and the configured baud rate:
/// sync + 2 header bytes + size + 8 payload bytes + checksum = 13 bytes,
/// 10 bits per byte including start/stop bits.
fn max_frame_time(baudrate: u32) -> Duration {
    if baudrate == 0 {
        return Duration::ZERO;
    }
    let bits = 13u64 * 10;
    Duration::from_secs_f64(bits as f64 / baudrate as f64)
}

/// Walks `entries` in order, wrapping at the end.
pub struct FixedOrderExecutor {
    entries: Vec<EntryKind>,
    index: usize,
    slots: Slots,
    delay: Duration,
    baudrate: u32,
}

impl FixedOrderExecutor {
    pub fn new(schedule: &Schedule, baudrate: u32) -> Self {
        let Schedule::FixedOrder { entries, slots, delay, .. } = schedule else {
            panic!("FixedOrderExecutor given a non-fixed-order schedule");
        };
        Self { entries: entries.clone(), index: 0, slots: *slots, delay: *delay, baudrate }
    }
}

impl ScheduleExecutor for FixedOrderExecutor {
    fn next(&mut self) -> Option<EntryKind> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries[self.index].clone();
        self.index = (self.index + 1) % self.entries.len();
        Some(entry)
    }

    fn wait(&self) {
        match self.slots {
            Slots::Variable => std::thread::sleep(self.delay),
            Slots::Fixed => std::thread::sleep(max_frame_time(self.baudrate) + self.delay),
        }
    }
}

/// Walks entries in priority order with starvation prevention via per-entry
/// aging counters: see [`PriorityAgingExecutor::next`].
pub struct PriorityAgingExecutor {
    entries: Vec<PriorityEntry>,
    counters: Vec<u32>,
    slots: Slots,
    delay: Duration,
    baudrate: u32,
}

impl PriorityAgingExecutor {
    pub fn new(schedule: &Schedule, baudrate: u32) -> Self {
        let Schedule::PriorityAging { entries, slots, phase, delay, .. } = schedule else {
            panic!("PriorityAgingExecutor given a non-priority-aging schedule");
        };
        let counters = match phase {
            Phase::Zero => vec![0; entries.len()],
            Phase::Adjusted => entries.iter().map(|e| e.cycle / 2).collect(),
        };
        Self { entries: entries.clone(), counters, slots: *slots, delay: *delay, baudrate }
    }
}

impl ScheduleExecutor for PriorityAgingExecutor {
    fn next(&mut self) -> Option<EntryKind> {
        for counter in &mut self.counters {
            *counter += 1;
        }

        for i in 0..self.entries.len() {
            if self.counters[i] >= self.entries[i].max_age {
                self.counters[i] = 0;
                return Some(self.entries[i].entry.clone());
            }
        }

        for i in 0..self.entries.len() {
            if self.counters[i] >= self.entries[i].cycle {
                self.counters[i] = 0;
                return Some(self.entries[i].entry.clone());
            }
        }

        None
    }

    fn wait(&self) {
        match self.slots {
            Slots::Variable => std::thread::sleep(self.delay),
            Slots::Fixed => std::thread::sleep(max_frame_time(self.baudrate) + self.delay),
        }
    }
}

/// Builds the executor matching a schedule's variant.
pub fn create_executor(schedule: &Schedule, baudrate: u32) -> Box<dyn ScheduleExecutor> {
    match schedule {
        Schedule::FixedOrder { .. } => Box::new(FixedOrderExecutor::new(schedule, baudrate)),
        Schedule::PriorityAging { .. } => Box::new(PriorityAgingExecutor::new(schedule, baudrate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Request;
    use std::sync::Arc;

    fn entry_id(entry: &EntryKind) -> &'static str {
        match entry {
            EntryKind::Request(r) if r.name == "e1" => "e1",
            EntryKind::Request(r) if r.name == "e2" => "e2",
            _ => "?",
        }
    }

    fn request(name: &str) -> Arc<Request> {
        Arc::new(Request::new(name, 0x100, 0, vec![]).unwrap())
    }

    #[test]
    fn fixed_order_wraps_mod_len() {
        let schedule = Schedule::FixedOrder {
            name: "s".into(),
            entries: vec![EntryKind::Wakeup, EntryKind::Idle, EntryKind::Shutdown],
            slots: Slots::Variable,
            reserve_slots: true,
            delay: Duration::ZERO,
        };
        let mut exec = FixedOrderExecutor::new(&schedule, 19200);
        let seq: Vec<_> = (0..7)
            .map(|_| match exec.next().unwrap() {
                EntryKind::Wakeup => 0,
                EntryKind::Idle => 1,
                EntryKind::Shutdown => 2,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seq, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    // Scenario E: entries [{e1, cycle=2, max_age=10}, {e2, cycle=3, max_age=10}],
    // phase zero, produces null, e1, e2, e1, null, e1, e2, e1, ...
    #[test]
    fn scenario_e_priority_aging_sequence() {
        let schedule = Schedule::PriorityAging {
            name: "s".into(),
            entries: vec![
                PriorityEntry { entry: EntryKind::Request(request("e1")), cycle: 2, max_age: 10 },
                PriorityEntry { entry: EntryKind::Request(request("e2")), cycle: 3, max_age: 10 },
            ],
            slots: Slots::Variable,
            phase: Phase::Zero,
            reserve_slots: true,
            delay: Duration::ZERO,
        };
        let mut exec = PriorityAgingExecutor::new(&schedule, 19200);
        let expected = ["null", "e1", "e2", "e1", "null", "e1", "e2", "e1"];
        for want in expected {
            let got = exec.next();
            match (want, got) {
                ("null", None) => {}
                (name, Some(entry)) => assert_eq!(entry_id(&entry), name),
                (name, None) => panic!("expected {name} but got null"),
            }
        }
    }

    #[test]
    fn priority_aging_eventually_returns_every_entry() {
        let schedule = Schedule::PriorityAging {
            name: "s".into(),
            entries: vec![
                PriorityEntry { entry: EntryKind::Request(request("e1")), cycle: 5, max_age: 50 },
                PriorityEntry { entry: EntryKind::Request(request("e2")), cycle: 97, max_age: 100 },
            ],
            slots: Slots::Variable,
            phase: Phase::Zero,
            reserve_slots: true,
            delay: Duration::ZERO,
        };
        let mut exec = PriorityAgingExecutor::new(&schedule, 19200);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            if let Some(entry) = exec.next() {
                seen.insert(entry_id(&entry));
            }
        }
        assert!(seen.contains("e1"));
        assert!(seen.contains("e2"));
    }
}
