//! Sperm trackers — deposited batches and the production reserve.
//!
//! `SpermTracker` holds externally deposited batches, each with its own
//! drawn lifetime; expired batches are dropped. The live total feeds the
//! fertilization competition through the system view.
//!
//! `SpermProductionTracker` is the male-side reserve: it replenishes
//! toward the guide capacity at the guide rate, and deposits withdraw
//! from it.

use std::any::Any;

use reprosim_logic::constants::trackers;
use reprosim_logic::guide::SpermProductionGuide;

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{base_ticks_for, scaled_advance, SimContext, SystemView, Tracker};

#[derive(Debug, Clone)]
struct SpermBatch {
    count: f64,
    lifetime_left: u64,
}

#[derive(Debug, Default)]
pub struct SpermTracker {
    batches: Vec<SpermBatch>,
    /// Total batches ever deposited; indexes per-batch lifetime draws.
    deposited: u64,
    carry: f64,
}

impl SpermTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Total live sperm across batches.
    pub fn total_count(&self) -> f64 {
        self.batches.iter().map(|b| b.count).sum()
    }

    pub(crate) fn deposit(&mut self, count: f64, ctx: &mut SimContext<'_>) {
        if count <= 0.0 {
            return;
        }
        let lifetime = ctx
            .draw("sperm.lifetime")
            .index(self.deposited)
            .normal_ticks(&ctx.guides.sperm.lifetime)
            .max(1);
        self.batches.push(SpermBatch {
            count,
            lifetime_left: lifetime,
        });
        self.deposited += 1;
        ctx.notify(ReproEvent::SpermDeposited { count });
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        let count = state.u64_or("count", 0)?;
        let mut batches = Vec::with_capacity(count as usize);
        for i in 0..count {
            let sub = state.sub_map(&format!("batch.{}.", i));
            batches.push(SpermBatch {
                count: sub.f64_or("count", 0.0)?,
                lifetime_left: sub.u64_or("lifetime_left", 0)?,
            });
        }
        Ok(Self {
            batches,
            deposited: state.u64_or("deposited", 0)?,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Tracker for SpermTracker {
    fn id(&self) -> &'static str {
        trackers::SPERM
    }

    fn observe(&self, view: &mut SystemView) {
        view.sperm_count += self.total_count();
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        _view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        self.batches
            .iter()
            .map(|b| b.lifetime_left)
            .min()
            .map(|internal| base_ticks_for(internal, settings.cycle_speed()))
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
        for batch in &mut self.batches {
            batch.lifetime_left = batch.lifetime_left.saturating_sub(advance);
        }
        self.batches.retain(|b| b.lifetime_left > 0);
        Ok(())
    }

    fn should_save(&self) -> bool {
        !self.batches.is_empty() || self.deposited != 0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.deposited != 0 {
            state.put_u64("deposited", self.deposited);
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        if !self.batches.is_empty() {
            state.put_u64("count", self.batches.len() as u64);
            for (i, batch) in self.batches.iter().enumerate() {
                let mut sub = StateMap::new();
                sub.put_f64("count", batch.count);
                sub.put_u64("lifetime_left", batch.lifetime_left);
                state.merge_prefixed(&format!("batch.{}.", i), &sub);
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

/// Male-side sperm reserve, replenishing toward capacity.
#[derive(Debug)]
pub struct SpermProductionTracker {
    reserve: f64,
    capacity: f64,
    regen_per_tick: f64,
    carry: f64,
}

impl SpermProductionTracker {
    /// A fresh reserve starts full.
    pub fn new(guide: &SpermProductionGuide) -> Self {
        Self {
            reserve: guide.capacity,
            capacity: guide.capacity,
            regen_per_tick: guide.regen_per_tick,
            carry: 0.0,
        }
    }

    pub fn reserve(&self) -> f64 {
        self.reserve
    }

    pub fn is_full(&self) -> bool {
        self.reserve >= self.capacity
    }

    /// Take up to `amount` from the reserve; returns what was taken.
    pub fn withdraw(&mut self, amount: f64) -> f64 {
        let taken = amount.max(0.0).min(self.reserve);
        self.reserve -= taken;
        taken
    }

    pub(crate) fn load(
        state: &StateMap,
        guide: &SpermProductionGuide,
    ) -> Result<Self, PersistError> {
        Ok(Self {
            reserve: state.f64_or("reserve", guide.capacity)?,
            capacity: guide.capacity,
            regen_per_tick: guide.regen_per_tick,
            carry: state.f64_or("carry", 0.0)?,
        })
    }
}

impl Tracker for SpermProductionTracker {
    fn id(&self) -> &'static str {
        trackers::SPERM_PRODUCTION
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        _view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        if self.is_full() || self.regen_per_tick <= 0.0 {
            return None;
        }
        let internal = ((self.capacity - self.reserve) / self.regen_per_tick).ceil() as u64;
        Some(base_ticks_for(internal, settings.cycle_speed()))
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        _sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        let advance = scaled_advance(ticks, ctx.settings.cycle_speed(), &mut self.carry);
        if advance == 0 || self.is_full() {
            return Ok(());
        }
        self.reserve = (self.reserve + advance as f64 * self.regen_per_tick).min(self.capacity);
        Ok(())
    }

    fn should_save(&self) -> bool {
        self.reserve < self.capacity
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.reserve < self.capacity {
            state.put_f64("reserve", self.reserve);
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
