//! Handlers hosted inside the handlers container.
//!
//! Handlers are scheduled behaviors layered on top of the primary
//! trackers: morning sickness fires periodic notifications while a
//! pregnancy runs, and postpartum recovery counts down after birth before
//! restarting the cycle.

use reprosim_logic::constants::handlers;

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{
    base_ticks_for, scaled_advance, HostKind, Hosted, PendingOp, SimContext, SystemView,
};
use crate::trackers::cycle::CycleTracker;

/// Periodic nausea notifications while pregnant; removes itself when the
/// pregnancy is gone.
#[derive(Debug, Default)]
pub struct MorningSicknessHandler {
    next_in: u64,
    internal_clock: u64,
    carry: f64,
}

impl MorningSicknessHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        Ok(Self {
            next_in: state.u64_or("next_in", 0)?,
            internal_clock: state.u64_or("internal_clock", 0)?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Hosted for MorningSicknessHandler {
    fn id(&self) -> &'static str {
        handlers::MORNING_SICKNESS
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        if !view.is_pregnant || self.next_in == 0 {
            return None;
        }
        Some(base_ticks_for(self.next_in, settings.pregnancy_speed()))
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        _sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        if !ctx.view.is_pregnant {
            ctx.queue(PendingOp::RemoveHosted(
                HostKind::Handlers,
                handlers::MORNING_SICKNESS,
            ));
            return Ok(());
        }
        let mut advance = scaled_advance(ticks, ctx.settings.pregnancy_speed(), &mut self.carry);
        while advance > 0 && self.next_in > 0 {
            let step = advance.min(self.next_in);
            self.next_in -= step;
            self.internal_clock += step;
            advance -= step;
            if self.next_in == 0 {
                ctx.notify(ReproEvent::Nausea);
                self.next_in = ctx
                    .draw_at(self.internal_clock, "handlers.nausea")
                    .normal_ticks(&ctx.guides.pregnancy.nausea_interval)
                    .max(1);
            }
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        if self.next_in == 0 {
            self.internal_clock = ctx.now;
            self.next_in = ctx
                .draw("handlers.nausea")
                .normal_ticks(&ctx.guides.pregnancy.nausea_interval)
                .max(1);
        }
    }

    fn should_save(&self) -> bool {
        self.next_in != 0 || self.internal_clock != 0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.next_in != 0 {
            state.put_u64("next_in", self.next_in);
        }
        if self.internal_clock != 0 {
            state.put_u64("internal_clock", self.internal_clock);
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        state
    }
}

/// Postpartum countdown; on expiry restarts the cycle tracker and removes
/// itself.
#[derive(Debug, Default)]
pub struct PostpartumRecoveryHandler {
    remaining: u64,
    carry: f64,
}

impl PostpartumRecoveryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        Ok(Self {
            remaining: state.u64_or("remaining", 0)?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Hosted for PostpartumRecoveryHandler {
    fn id(&self) -> &'static str {
        handlers::POSTPARTUM_RECOVERY
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        _view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }
        Some(base_ticks_for(self.remaining, settings.cycle_speed()))
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        _sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        let advance = scaled_advance(ticks, ctx.settings.cycle_speed(), &mut self.carry);
        if advance == 0 {
            return Ok(());
        }
        self.remaining = self.remaining.saturating_sub(advance);
        if self.remaining == 0 {
            ctx.notify(ReproEvent::RecoveryComplete);
            ctx.queue(PendingOp::AddTracker(Box::new(CycleTracker::new())));
            ctx.queue(PendingOp::RemoveHosted(
                HostKind::Handlers,
                handlers::POSTPARTUM_RECOVERY,
            ));
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        if self.remaining == 0 {
            self.remaining = ctx
                .draw("handlers.recovery")
                .normal_ticks(&ctx.guides.pregnancy.recovery)
                .max(1);
        }
    }

    fn should_save(&self) -> bool {
        self.remaining != 0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.remaining != 0 {
            state.put_u64("remaining", self.remaining);
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handlers_not_saved() {
        assert!(!MorningSicknessHandler::new().should_save());
        assert!(!PostpartumRecoveryHandler::new().should_save());
    }

    #[test]
    fn recovery_roundtrip() {
        let h = PostpartumRecoveryHandler {
            remaining: 40320,
            carry: 0.0,
        };
        assert!(h.should_save());
        let loaded = PostpartumRecoveryHandler::load(&h.save_state()).unwrap();
        assert_eq!(loaded.remaining(), 40320);
    }

    #[test]
    fn sickness_roundtrip() {
        let h = MorningSicknessHandler {
            next_in: 720,
            internal_clock: 5000,
            carry: 0.0,
        };
        let loaded = MorningSicknessHandler::load(&h.save_state()).unwrap();
        assert_eq!(loaded.next_in, 720);
        assert_eq!(loaded.internal_clock, 5000);
    }
}
