//! Pregnancy tracker.
//!
//! Created when a fertilized ovum implants. Gestation length is drawn once
//! in `on_added` (the due date is computed there, without re-entering
//! simulate) and counts down under the pregnancy-category speed, which may
//! differ from the cycle category. Trimester boundaries and the final
//! birth are exact tick events. Birth removes the tracker and hands off to
//! the postpartum recovery handler, which later restarts the cycle.

use std::any::Any;

use serde::{Deserialize, Serialize};

use reprosim_logic::constants::trackers;

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{
    base_ticks_for, scaled_advance, HostKind, PendingOp, SimContext, SystemView, Tracker,
};
use crate::trackers::handlers::{MorningSicknessHandler, PostpartumRecoveryHandler};

/// Trimester of an ongoing pregnancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PregnancyStage {
    First,
    Second,
    Third,
}

impl PregnancyStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PregnancyStage::First => "first",
            PregnancyStage::Second => "second",
            PregnancyStage::Third => "third",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "first" => Some(PregnancyStage::First),
            "second" => Some(PregnancyStage::Second),
            "third" => Some(PregnancyStage::Third),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PregnancyTracker {
    gestation_total: u64,
    gestation_left: u64,
    stage: PregnancyStage,
    carry: f64,
}

impl Default for PregnancyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PregnancyTracker {
    pub fn new() -> Self {
        Self {
            gestation_total: 0,
            gestation_left: 0,
            stage: PregnancyStage::First,
            carry: 0.0,
        }
    }

    pub fn stage(&self) -> PregnancyStage {
        self.stage
    }

    pub fn gestation_left(&self) -> u64 {
        self.gestation_left
    }

    pub fn gestation_total(&self) -> u64 {
        self.gestation_total
    }

    /// Internal ticks remaining until the current stage's boundary.
    fn ticks_to_boundary(&self) -> u64 {
        let threshold_left = match self.stage {
            // Second trimester starts after a third of gestation has passed.
            PregnancyStage::First => self.gestation_total - self.gestation_total / 3,
            PregnancyStage::Second => self.gestation_total / 3,
            PregnancyStage::Third => 0,
        };
        self.gestation_left.saturating_sub(threshold_left)
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        let stage_str = state.str_or("stage", PregnancyStage::First.as_str())?;
        Ok(Self {
            gestation_total: state.u64_or("gestation_total", 0)?,
            gestation_left: state.u64_or("gestation_left", 0)?,
            stage: PregnancyStage::from_str(&stage_str).ok_or(PersistError::BadField {
                key: "stage".to_string(),
                expected: "pregnancy stage",
            })?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Tracker for PregnancyTracker {
    fn id(&self) -> &'static str {
        trackers::PREGNANCY
    }

    fn observe(&self, view: &mut SystemView) {
        view.is_pregnant = true;
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        _view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        if self.gestation_total == 0 {
            return None;
        }
        let boundary = self.ticks_to_boundary();
        let internal = if boundary > 0 {
            boundary
        } else {
            self.gestation_left
        };
        Some(base_ticks_for(internal, settings.pregnancy_speed()))
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        _sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        if self.gestation_total == 0 {
            return Ok(());
        }
        let mut advance = scaled_advance(ticks, ctx.settings.pregnancy_speed(), &mut self.carry);
        while advance > 0 && self.gestation_left > 0 {
            let boundary = self.ticks_to_boundary();
            let step = if boundary > 0 {
                advance.min(boundary)
            } else {
                advance.min(self.gestation_left)
            };
            self.gestation_left -= step;
            advance -= step;
            if self.gestation_left == 0 {
                ctx.notify(ReproEvent::Birth);
                ctx.queue(PendingOp::AddHosted(
                    HostKind::Handlers,
                    Box::new(PostpartumRecoveryHandler::new()),
                ));
                ctx.queue(PendingOp::RemoveTracker(trackers::PREGNANCY));
                return Ok(());
            }
            if self.ticks_to_boundary() == 0 {
                let next = match self.stage {
                    PregnancyStage::First => PregnancyStage::Second,
                    PregnancyStage::Second | PregnancyStage::Third => PregnancyStage::Third,
                };
                if next != self.stage {
                    self.stage = next;
                    ctx.notify(ReproEvent::TrimesterChanged { stage: next });
                }
            }
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        if self.gestation_total != 0 {
            return;
        }
        let total = ctx
            .draw("pregnancy.gestation")
            .normal_ticks(&ctx.guides.pregnancy.gestation)
            .max(1);
        self.gestation_total = total;
        self.gestation_left = total;
        ctx.notify(ReproEvent::PregnancyStarted {
            due_tick: ctx.now + total,
        });
        ctx.queue(PendingOp::AddHosted(
            HostKind::Handlers,
            Box::new(MorningSicknessHandler::new()),
        ));
    }

    fn should_save(&self) -> bool {
        self.gestation_total != 0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.gestation_total != 0 {
            state.put_u64("gestation_total", self.gestation_total);
            state.put_u64("gestation_left", self.gestation_left);
        }
        if self.stage != PregnancyStage::First {
            state.put_str("stage", self.stage.as_str());
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        state
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_roundtrip() {
        for stage in [
            PregnancyStage::First,
            PregnancyStage::Second,
            PregnancyStage::Third,
        ] {
            assert_eq!(PregnancyStage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(PregnancyStage::from_str("fourth"), None);
    }

    #[test]
    fn fresh_tracker_not_saved() {
        assert!(!PregnancyTracker::new().should_save());
    }

    #[test]
    fn boundary_math() {
        let t = PregnancyTracker {
            gestation_total: 300,
            gestation_left: 300,
            stage: PregnancyStage::First,
            carry: 0.0,
        };
        // First→second boundary after 100 ticks (left reaches 200).
        assert_eq!(t.ticks_to_boundary(), 100);
        let t = PregnancyTracker {
            gestation_total: 300,
            gestation_left: 150,
            stage: PregnancyStage::Second,
            carry: 0.0,
        };
        // Second→third boundary when left reaches 100.
        assert_eq!(t.ticks_to_boundary(), 50);
        let t = PregnancyTracker {
            gestation_total: 300,
            gestation_left: 40,
            stage: PregnancyStage::Third,
            carry: 0.0,
        };
        assert_eq!(t.ticks_to_boundary(), 40);
    }

    #[test]
    fn save_load_roundtrip() {
        let t = PregnancyTracker {
            gestation_total: 388800,
            gestation_left: 200000,
            stage: PregnancyStage::Second,
            carry: 0.25,
        };
        let loaded = PregnancyTracker::load(&t.save_state()).unwrap();
        assert_eq!(loaded.gestation_total(), 388800);
        assert_eq!(loaded.gestation_left(), 200000);
        assert_eq!(loaded.stage(), PregnancyStage::Second);
    }
}
