//! Domain events and the notification sink contract.
//!
//! Events describe what the simulation did; the sink decides what the
//! player sees. Delivery is fire-and-forget: `notify` returns nothing and
//! must never raise back into the simulation.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::trackers::cycle::{CycleEndReason, CyclePhase};
use crate::trackers::pregnancy::PregnancyStage;

/// Identifies one simulated subject across the directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SubjectId(pub u64);

/// Everything a reproductive system can report to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReproEvent {
    TrackerAdded { id: String },
    TrackerRemoved { id: String },
    PhaseChanged { from: CyclePhase, to: CyclePhase },
    /// A natural loop back to follicular; `count` is total completed cycles.
    CycleCompleted { count: u64 },
    /// The cycle stopped early (canceled or superseded by pregnancy).
    CycleEnded { reason: CycleEndReason },
    OvulationSkipped,
    OvaReleased { count: u32 },
    OvumFertilized,
    OvumExpired,
    Implanted,
    PregnancyStarted { due_tick: u64 },
    TrimesterChanged { stage: PregnancyStage },
    Birth,
    SpermDeposited { count: f64 },
    EffectAdded { id: String },
    EffectRemoved { id: String },
    HandlerAdded { id: String },
    HandlerRemoved { id: String },
    Nausea,
    RecoveryComplete,
}

/// Receives user-visible events. Implementations must not panic.
pub trait NotificationSink {
    fn notify(&self, subject: SubjectId, event: &ReproEvent);
}

/// Discards everything.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _subject: SubjectId, _event: &ReproEvent) {}
}

/// Collects events in memory; used by tests and the simtest harness.
#[derive(Default)]
pub struct MemorySink {
    events: RefCell<Vec<(SubjectId, ReproEvent)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(SubjectId, ReproEvent)> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Count events matching a predicate.
    pub fn count_where<F: Fn(&ReproEvent) -> bool>(&self, pred: F) -> usize {
        self.events.borrow().iter().filter(|(_, e)| pred(e)).count()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, subject: SubjectId, event: &ReproEvent) {
        self.events.borrow_mut().push((subject, event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.notify(SubjectId(1), &ReproEvent::OvumFertilized);
        sink.notify(SubjectId(1), &ReproEvent::Implanted);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, ReproEvent::OvumFertilized);
        assert_eq!(events[1].1, ReproEvent::Implanted);
    }

    #[test]
    fn count_where_filters() {
        let sink = MemorySink::new();
        sink.notify(SubjectId(1), &ReproEvent::Nausea);
        sink.notify(SubjectId(1), &ReproEvent::Birth);
        sink.notify(SubjectId(1), &ReproEvent::Nausea);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::Nausea)),
            2
        );
    }
}
