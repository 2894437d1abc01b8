//! The tracker contract shared by every simulable unit.
//!
//! Trackers (and the effects/handlers hosted inside container trackers)
//! follow a two-phase protocol per sub-step:
//!
//! 1. **Plan** — report the earliest tick at which the tracker must be
//!    revisited, so the system can bound the sub-step and land event
//!    boundaries exactly on a tick. Planning never mutates state and may be
//!    called repeatedly; with unchanged state it must return the same
//!    answer.
//! 2. **Simulate** — advance internal state by the granted ticks, scaled by
//!    the tracker category's speed multiplier.
//!
//! Structural changes requested during simulation (add/remove trackers,
//! effects, handlers) go through [`PendingOp`] and are applied by the
//! system strictly between sub-steps, never while the collection is being
//! iterated.

use std::any::Any;
use std::collections::VecDeque;

use reprosim_logic::guide::GuideSet;
use reprosim_logic::rng::Draw;

use crate::error::TrackerError;
use crate::events::{NotificationSink, ReproEvent, SubjectId};
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;

/// Which container a hosted child belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Effects,
    Handlers,
}

/// A structural change requested from inside a simulate call or hook,
/// applied between sub-steps.
pub enum PendingOp {
    AddTracker(Box<dyn Tracker>),
    RemoveTracker(&'static str),
    AddHosted(HostKind, Box<dyn Hosted>),
    RemoveHosted(HostKind, &'static str),
    /// Route newly released ova to the ovum tracker (created on demand).
    ReleaseOva(u32),
}

/// Cross-tracker state snapshot, collected from every tracker before each
/// sub-step. Trackers read siblings through this view instead of holding
/// references to them.
#[derive(Debug, Clone)]
pub struct SystemView {
    /// Total live sperm count across deposited batches.
    pub sperm_count: f64,
    /// True while a contraceptive effect is active.
    pub ovulation_suppressed: bool,
    /// Fertilization-chance multiplier from active medication effects.
    pub fertility_multiplier: f64,
    /// True while a pregnancy tracker is present.
    pub is_pregnant: bool,
}

impl Default for SystemView {
    fn default() -> Self {
        Self {
            sperm_count: 0.0,
            ovulation_suppressed: false,
            fertility_multiplier: 1.0,
            is_pregnant: false,
        }
    }
}

/// Everything a tracker may touch during simulate and lifecycle hooks.
///
/// Holds no reference to the tracker table itself, so the system can hand
/// it out while iterating trackers mutably.
pub struct SimContext<'a> {
    pub subject: SubjectId,
    pub seed: u64,
    /// Absolute reproductive tick at the start of the current sub-step.
    pub now: u64,
    pub guides: &'a GuideSet,
    pub settings: &'a Settings,
    pub view: SystemView,
    pending: &'a mut VecDeque<PendingOp>,
    sink: &'a dyn NotificationSink,
}

impl<'a> SimContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subject: SubjectId,
        seed: u64,
        now: u64,
        guides: &'a GuideSet,
        settings: &'a Settings,
        view: SystemView,
        pending: &'a mut VecDeque<PendingOp>,
        sink: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            subject,
            seed,
            now,
            guides,
            settings,
            view,
            pending,
            sink,
        }
    }

    /// Queue a structural change for application between sub-steps.
    pub fn queue(&mut self, op: PendingOp) {
        self.pending.push_back(op);
    }

    /// Fire-and-forget notification to the sink.
    pub fn notify(&self, event: ReproEvent) {
        self.sink.notify(self.subject, &event);
    }

    /// A draw keyed at the current sub-step start.
    pub fn draw(&self, label: &str) -> Draw {
        Draw::new(self.seed, self.now, label)
    }

    /// A draw keyed at an explicit absolute tick (e.g. a transition tick
    /// inside the granted span).
    pub fn draw_at(&self, tick: u64, label: &str) -> Draw {
        Draw::new(self.seed, tick, label)
    }
}

/// A stateful, simulable unit owned by a reproductive system.
pub trait Tracker {
    /// Stable type identifier; keys the tracker table and saved state.
    fn id(&self) -> &'static str;

    /// Contribute to the cross-tracker view for the next sub-step.
    fn observe(&self, _view: &mut SystemView) {}

    /// Earliest tick (in base reproductive ticks, relative to the span
    /// start) at which this tracker must be revisited, or `None` when it
    /// has nothing to schedule within the span.
    fn plan_simulation(
        &self,
        sim: &Simulation,
        view: &SystemView,
        settings: &Settings,
    ) -> Option<u64>;

    /// Advance by `ticks` base reproductive ticks (category multiplier
    /// applied internally). `ticks` is always positive.
    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError>;

    fn on_adding(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_added(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_removing(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_removed(&mut self, _ctx: &mut SimContext<'_>) {}

    /// True iff any persisted field differs from the type's defaults.
    /// Trackers that return false are not written to the save.
    fn should_save(&self) -> bool;

    /// Export persisted fields. Defaults are omitted; on load, a missing
    /// key means "use the default".
    fn save_state(&self) -> StateMap;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A secondary simulable behavior hosted inside an effect or handler
/// container tracker. Same two-phase contract as [`Tracker`].
pub trait Hosted {
    fn id(&self) -> &'static str;

    fn observe(&self, _view: &mut SystemView) {}

    fn plan_simulation(
        &self,
        sim: &Simulation,
        view: &SystemView,
        settings: &Settings,
    ) -> Option<u64>;

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError>;

    fn on_adding(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_added(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_removing(&mut self, _ctx: &mut SimContext<'_>) {}
    fn on_removed(&mut self, _ctx: &mut SimContext<'_>) {}

    fn should_save(&self) -> bool;
    fn save_state(&self) -> StateMap;
}

/// Convert granted base ticks into whole internal ticks at `speed`,
/// carrying the fractional remainder between calls so no time is lost.
pub fn scaled_advance(ticks: u64, speed: f64, carry: &mut f64) -> u64 {
    let total = ticks as f64 * speed + *carry;
    let whole = total.floor();
    *carry = total - whole;
    whole as u64
}

/// Base ticks needed to cover `internal_left` internal ticks at `speed`.
/// Always at least 1 so a pending boundary is never starved.
pub fn base_ticks_for(internal_left: u64, speed: f64) -> u64 {
    if internal_left == 0 {
        return 1;
    }
    ((internal_left as f64 / speed).ceil() as u64).max(1)
}
