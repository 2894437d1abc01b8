//! Chemical effects hosted inside the effects container.
//!
//! Effects are added when something is consumed (pill, medication) and
//! remove themselves when they wear off. They influence the rest of the
//! system only through the view: the pill sets ovulation suppression, the
//! fertility boost scales the fertilization chance.

use reprosim_logic::constants::effects;

use crate::error::{PersistError, TrackerError};
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{
    base_ticks_for, scaled_advance, HostKind, Hosted, PendingOp, SimContext, SystemView,
};

/// Contraceptive pill: suppresses ovulation while active.
#[derive(Debug, Default)]
pub struct PillEffect {
    remaining: u64,
    carry: f64,
}

impl PillEffect {
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

impl Hosted for PillEffect {
    fn id(&self) -> &'static str {
        effects::PILL
    }

    fn observe(&self, view: &mut SystemView) {
        if self.remaining > 0 {
            view.ovulation_suppressed = true;
        }
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
        self.remaining = self.remaining.saturating_sub(advance);
        if self.remaining == 0 {
            ctx.queue(PendingOp::RemoveHosted(HostKind::Effects, effects::PILL));
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        if self.remaining == 0 {
            self.remaining = ctx
                .draw("effects.pill")
                .normal_ticks(&ctx.guides.effects.pill_duration)
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

/// Fertility medication: scales the fertilization chance while active.
#[derive(Debug)]
pub struct FertilityBoostEffect {
    remaining: u64,
    multiplier: f64,
    carry: f64,
}

impl FertilityBoostEffect {
    pub fn new(multiplier: f64) -> Self {
        Self {
            remaining: 0,
            multiplier,
            carry: 0.0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn load(state: &StateMap, default_multiplier: f64) -> Result<Self, PersistError> {
        Ok(Self {
            remaining: state.u64_or("remaining", 0)?,
            multiplier: state.f64_or("multiplier", default_multiplier)?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Hosted for FertilityBoostEffect {
    fn id(&self) -> &'static str {
        effects::FERTILITY_BOOST
    }

    fn observe(&self, view: &mut SystemView) {
        if self.remaining > 0 {
            view.fertility_multiplier *= self.multiplier;
        }
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
        self.remaining = self.remaining.saturating_sub(advance);
        if self.remaining == 0 {
            ctx.queue(PendingOp::RemoveHosted(
                HostKind::Effects,
                effects::FERTILITY_BOOST,
            ));
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        if self.remaining == 0 {
            self.remaining = ctx
                .draw("effects.boost")
                .normal_ticks(&ctx.guides.effects.boost_duration)
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
            state.put_f64("multiplier", self.multiplier);
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
    fn pill_suppresses_only_while_active() {
        let mut view = SystemView::default();
        let pill = PillEffect {
            remaining: 100,
            carry: 0.0,
        };
        pill.observe(&mut view);
        assert!(view.ovulation_suppressed);

        let mut view = SystemView::default();
        let spent = PillEffect::default();
        spent.observe(&mut view);
        assert!(!view.ovulation_suppressed);
    }

    #[test]
    fn boost_multiplies_fertility() {
        let mut view = SystemView::default();
        let boost = FertilityBoostEffect {
            remaining: 50,
            multiplier: 1.5,
            carry: 0.0,
        };
        boost.observe(&mut view);
        assert!((view.fertility_multiplier - 1.5).abs() < 1e-12);
    }

    #[test]
    fn pill_roundtrip() {
        let pill = PillEffect {
            remaining: 720,
            carry: 0.0,
        };
        assert!(pill.should_save());
        let loaded = PillEffect::load(&pill.save_state()).unwrap();
        assert_eq!(loaded.remaining(), 720);
    }

    #[test]
    fn boost_roundtrip_keeps_multiplier() {
        let boost = FertilityBoostEffect {
            remaining: 100,
            multiplier: 2.0,
            carry: 0.0,
        };
        let loaded = FertilityBoostEffect::load(&boost.save_state(), 1.5).unwrap();
        assert_eq!(loaded.remaining(), 100);
        assert_eq!(loaded.multiplier, 2.0);
    }

    #[test]
    fn spent_effects_not_saved() {
        assert!(!PillEffect::default().should_save());
        assert!(!FertilityBoostEffect::new(1.5).should_save());
    }
}
