//! Ovum tracker — live ova, fertilization competition, implantation.
//!
//! Each released ovum gets an independently drawn lifetime; an ovum whose
//! lifetime elapses unfertilized is removed. While competing sperm are
//! present, every ovum rolls a fertilization opportunity once per check
//! interval; the per-opportunity chance is the Hill curve anchored at the
//! guide's equal-chance count, scaled by any active fertility effects.
//! A fertilized ovum stops aging and implants after a drawn delay, which
//! queues the pregnancy tracker.

use std::any::Any;

use reprosim_logic::constants::time::FERTILIZATION_CHECK_INTERVAL;
use reprosim_logic::constants::trackers;
use reprosim_logic::curve::fertilization_chance;

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{
    base_ticks_for, scaled_advance, PendingOp, SimContext, SystemView, Tracker,
};
use crate::trackers::pregnancy::PregnancyTracker;

#[derive(Debug, Clone)]
struct Ovum {
    /// Stable per-ovum draw index (total released before this one).
    id: u64,
    lifetime_left: u64,
    next_check_in: u64,
    fertilized: bool,
    implant_in: u64,
}

#[derive(Debug, Default)]
pub struct OvumTracker {
    ova: Vec<Ovum>,
    /// Total ova ever released by this tracker; indexes per-ovum draws.
    released: u64,
    internal_clock: u64,
    carry: f64,
}

impl OvumTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live ova (viable or awaiting implantation).
    pub fn live_count(&self) -> usize {
        self.ova.len()
    }

    pub fn fertilized_count(&self) -> usize {
        self.ova.iter().filter(|o| o.fertilized).count()
    }

    /// Add `count` freshly released ova with independently drawn lifetimes.
    pub(crate) fn release(&mut self, count: u32, ctx: &mut SimContext<'_>) {
        for _ in 0..count {
            let id = self.released;
            let lifetime = ctx
                .draw("ova.lifetime")
                .index(id)
                .normal_ticks(&ctx.guides.ovum.lifetime)
                .max(1);
            self.ova.push(Ovum {
                id,
                lifetime_left: lifetime,
                next_check_in: FERTILIZATION_CHECK_INTERVAL,
                fertilized: false,
                implant_in: 0,
            });
            self.released += 1;
        }
        ctx.notify(ReproEvent::OvaReleased { count });
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        let count = state.u64_or("count", 0)?;
        let mut ova = Vec::with_capacity(count as usize);
        for i in 0..count {
            let prefix = format!("ovum.{}.", i);
            let sub = state.sub_map(&prefix);
            ova.push(Ovum {
                id: sub.u64_or("id", 0)?,
                lifetime_left: sub.u64_or("lifetime_left", 0)?,
                next_check_in: sub.u64_or("next_check_in", FERTILIZATION_CHECK_INTERVAL)?,
                fertilized: sub.bool_or("fertilized", false)?,
                implant_in: sub.u64_or("implant_in", 0)?,
            });
        }
        Ok(Self {
            ova,
            released: state.u64_or("released", 0)?,
            internal_clock: state.u64_or("internal_clock", 0)?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Tracker for OvumTracker {
    fn id(&self) -> &'static str {
        trackers::OVA
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        let mut earliest: Option<u64> = None;
        for ovum in &self.ova {
            let next = if ovum.fertilized {
                ovum.implant_in
            } else if view.sperm_count > 0.0 {
                ovum.lifetime_left.min(ovum.next_check_in)
            } else {
                ovum.lifetime_left
            };
            earliest = Some(earliest.map_or(next, |e| e.min(next)));
        }
        earliest.map(|internal| base_ticks_for(internal, settings.cycle_speed()))
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
        let start_clock = self.internal_clock;
        let sperm_present = ctx.view.sperm_count > 0.0;
        let chance = if sperm_present {
            let guide = &ctx.guides.ovum;
            let base = match &guide.fertilization_curve {
                Some(curve) => curve.sample(ctx.view.sperm_count.log10()),
                None => fertilization_chance(
                    ctx.view.sperm_count,
                    guide.equal_chance_count,
                    guide.steepness,
                ),
            };
            (base * ctx.view.fertility_multiplier).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut survivors = Vec::with_capacity(self.ova.len());
        for mut ovum in self.ova.drain(..) {
            let mut rem = advance;
            let mut alive = true;
            while rem > 0 {
                if ovum.fertilized {
                    let step = rem.min(ovum.implant_in);
                    ovum.implant_in -= step;
                    rem -= step;
                    if ovum.implant_in == 0 {
                        ctx.notify(ReproEvent::Implanted);
                        ctx.queue(PendingOp::AddTracker(Box::new(PregnancyTracker::new())));
                        alive = false;
                        break;
                    }
                } else {
                    let mut step = rem.min(ovum.lifetime_left);
                    if sperm_present {
                        step = step.min(ovum.next_check_in);
                    }
                    ovum.lifetime_left -= step;
                    if sperm_present {
                        ovum.next_check_in -= step;
                    }
                    rem -= step;
                    if ovum.lifetime_left == 0 {
                        ctx.notify(ReproEvent::OvumExpired);
                        alive = false;
                        break;
                    }
                    if sperm_present && ovum.next_check_in == 0 {
                        let tick = start_clock + (advance - rem);
                        if ctx.draw_at(tick, "ova.fertilize").index(ovum.id).chance(chance) {
                            ovum.fertilized = true;
                            ovum.implant_in = ctx
                                .draw_at(tick, "ova.implantation")
                                .index(ovum.id)
                                .normal_ticks(&ctx.guides.ovum.implantation_delay)
                                .max(1);
                            ctx.notify(ReproEvent::OvumFertilized);
                        } else {
                            ovum.next_check_in = FERTILIZATION_CHECK_INTERVAL;
                        }
                    }
                }
            }
            if alive {
                survivors.push(ovum);
            }
        }
        self.ova = survivors;
        self.internal_clock += advance;
        Ok(())
    }

    fn should_save(&self) -> bool {
        !self.ova.is_empty() || self.released != 0 || self.internal_clock != 0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.released != 0 {
            state.put_u64("released", self.released);
        }
        if self.internal_clock != 0 {
            state.put_u64("internal_clock", self.internal_clock);
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        if !self.ova.is_empty() {
            state.put_u64("count", self.ova.len() as u64);
            for (i, ovum) in self.ova.iter().enumerate() {
                let prefix = format!("ovum.{}.", i);
                let mut sub = StateMap::new();
                sub.put_u64("id", ovum.id);
                sub.put_u64("lifetime_left", ovum.lifetime_left);
                sub.put_u64("next_check_in", ovum.next_check_in);
                if ovum.fertilized {
                    sub.put_bool("fertilized", true);
                    sub.put_u64("implant_in", ovum.implant_in);
                }
                state.merge_prefixed(&prefix, &sub);
            }
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
    fn fresh_tracker_not_saved() {
        let t = OvumTracker::new();
        assert_eq!(t.live_count(), 0);
        assert!(!t.should_save());
    }

    #[test]
    fn save_load_roundtrip_with_ova() {
        let mut t = OvumTracker::new();
        t.ova.push(Ovum {
            id: 0,
            lifetime_left: 500,
            next_check_in: 30,
            fertilized: false,
            implant_in: 0,
        });
        t.ova.push(Ovum {
            id: 1,
            lifetime_left: 900,
            next_check_in: 60,
            fertilized: true,
            implant_in: 4000,
        });
        t.released = 2;
        let loaded = OvumTracker::load(&t.save_state()).unwrap();
        assert_eq!(loaded.live_count(), 2);
        assert_eq!(loaded.fertilized_count(), 1);
        assert_eq!(loaded.released, 2);
        assert_eq!(loaded.ova[0].lifetime_left, 500);
        assert_eq!(loaded.ova[1].implant_in, 4000);
    }

    #[test]
    fn load_defaults_when_empty() {
        let loaded = OvumTracker::load(&StateMap::new()).unwrap();
        assert_eq!(loaded.live_count(), 0);
        assert_eq!(loaded.released, 0);
    }
}
