//! Menstrual cycle tracker.
//!
//! State machine `Follicular → Ovulation → Luteal → Menstruation → (loop)`.
//! Each phase duration is drawn once on phase entry from the guide's normal
//! distribution. Leaving ovulation releases ova (count from the guide's
//! weighted table, routed to the ovum tracker). While contraceptive
//! suppression is active the ovulation phase is skipped entirely.
//!
//! The cycle terminates early with reason `Canceled` (external request) or
//! `Pregnancy` (a pregnancy tracker appeared in the view); the natural loop
//! reports `Finished` through `CycleCompleted` events and keeps running.

use std::any::Any;

use serde::{Deserialize, Serialize};

use reprosim_logic::constants::trackers;
use reprosim_logic::guide::{CycleGuide, NormalParam};

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{
    base_ticks_for, scaled_advance, PendingOp, SimContext, SystemView, Tracker,
};

/// Phases of the menstrual cycle, in loop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Follicular,
    Ovulation,
    Luteal,
    Menstruation,
}

impl CyclePhase {
    pub fn next(self) -> Self {
        match self {
            CyclePhase::Follicular => CyclePhase::Ovulation,
            CyclePhase::Ovulation => CyclePhase::Luteal,
            CyclePhase::Luteal => CyclePhase::Menstruation,
            CyclePhase::Menstruation => CyclePhase::Follicular,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Follicular => "follicular",
            CyclePhase::Ovulation => "ovulation",
            CyclePhase::Luteal => "luteal",
            CyclePhase::Menstruation => "menstruation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "follicular" => Some(CyclePhase::Follicular),
            "ovulation" => Some(CyclePhase::Ovulation),
            "luteal" => Some(CyclePhase::Luteal),
            "menstruation" => Some(CyclePhase::Menstruation),
            _ => None,
        }
    }

    fn duration_param(self, guide: &CycleGuide) -> &NormalParam {
        match self {
            CyclePhase::Follicular => &guide.follicular,
            CyclePhase::Ovulation => &guide.ovulation,
            CyclePhase::Luteal => &guide.luteal,
            CyclePhase::Menstruation => &guide.menstruation,
        }
    }

    fn draw_label(self) -> &'static str {
        match self {
            CyclePhase::Follicular => "cycle.follicular",
            CyclePhase::Ovulation => "cycle.ovulation",
            CyclePhase::Luteal => "cycle.luteal",
            CyclePhase::Menstruation => "cycle.menstruation",
        }
    }
}

/// Why a cycle stopped. `Unset` is the explicit "still running" state —
/// listeners never see an absent reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleEndReason {
    Unset,
    Finished,
    Canceled,
    Pregnancy,
}

impl CycleEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleEndReason::Unset => "unset",
            CycleEndReason::Finished => "finished",
            CycleEndReason::Canceled => "canceled",
            CycleEndReason::Pregnancy => "pregnancy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unset" => Some(CycleEndReason::Unset),
            "finished" => Some(CycleEndReason::Finished),
            "canceled" => Some(CycleEndReason::Canceled),
            "pregnancy" => Some(CycleEndReason::Pregnancy),
            _ => None,
        }
    }
}

pub struct CycleTracker {
    phase: CyclePhase,
    /// Internal ticks left in the current phase; drawn on phase entry.
    phase_left: u64,
    /// Absolute internal tick count; keys phase-entry draws.
    internal_clock: u64,
    carry: f64,
    cycles_completed: u64,
    end_reason: CycleEndReason,
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleTracker {
    pub fn new() -> Self {
        Self {
            phase: CyclePhase::Follicular,
            phase_left: 0,
            internal_clock: 0,
            carry: 0.0,
            cycles_completed: 0,
            end_reason: CycleEndReason::Unset,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn phase_ticks_left(&self) -> u64 {
        self.phase_left
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn end_reason(&self) -> CycleEndReason {
        self.end_reason
    }

    pub fn is_ended(&self) -> bool {
        self.end_reason != CycleEndReason::Unset
    }

    /// Stop the cycle and queue removal of this tracker.
    pub(crate) fn end(&mut self, reason: CycleEndReason, ctx: &mut SimContext<'_>) {
        if self.is_ended() {
            return;
        }
        self.end_reason = reason;
        ctx.notify(ReproEvent::CycleEnded { reason });
        ctx.queue(PendingOp::RemoveTracker(trackers::CYCLE));
    }

    fn draw_phase_duration(&self, ctx: &SimContext<'_>, phase: CyclePhase) -> u64 {
        // Clamped to one tick so a degenerate guide cannot produce a
        // zero-length phase loop.
        ctx.draw_at(self.internal_clock, phase.draw_label())
            .normal_ticks(phase.duration_param(&ctx.guides.cycle))
            .max(1)
    }

    /// Move to the next phase, firing transition side effects.
    fn transition(&mut self, ctx: &mut SimContext<'_>) -> Result<(), TrackerError> {
        let from = self.phase;
        let mut to = from.next();
        match from {
            CyclePhase::Follicular if ctx.view.ovulation_suppressed => {
                // Suppressed: no ovulation phase, no release.
                to = CyclePhase::Luteal;
                ctx.notify(ReproEvent::OvulationSkipped);
            }
            CyclePhase::Ovulation => {
                let count = ctx
                    .draw_at(self.internal_clock, "cycle.ova_release")
                    .weighted(&ctx.guides.cycle.ova_release)
                    .ok_or(TrackerError::EmptyTable("cycle.ova_release"))?;
                if count > 0 {
                    ctx.queue(PendingOp::ReleaseOva(count));
                }
            }
            CyclePhase::Menstruation => {
                self.cycles_completed += 1;
                ctx.notify(ReproEvent::CycleCompleted {
                    count: self.cycles_completed,
                });
            }
            _ => {}
        }
        self.phase = to;
        self.phase_left = self.draw_phase_duration(ctx, to);
        ctx.notify(ReproEvent::PhaseChanged { from, to });
        Ok(())
    }

    pub(crate) fn load(state: &StateMap) -> Result<Self, PersistError> {
        let phase_str = state.str_or("phase", CyclePhase::Follicular.as_str())?;
        let reason_str = state.str_or("end_reason", CycleEndReason::Unset.as_str())?;
        Ok(Self {
            phase: CyclePhase::from_str(&phase_str).ok_or(PersistError::BadField {
                key: "phase".to_string(),
                expected: "cycle phase",
            })?,
            phase_left: state.u64_or("phase_left", 0)?,
            internal_clock: state.u64_or("internal_clock", 0)?,
            carry: state.f64_or("carry", 0.0)?,
            cycles_completed: state.u64_or("cycles_completed", 0)?,
            end_reason: CycleEndReason::from_str(&reason_str).ok_or(PersistError::BadField {
                key: "end_reason".to_string(),
                expected: "cycle end reason",
            })?,
        })
    }
}

impl Tracker for CycleTracker {
    fn id(&self) -> &'static str {
        trackers::CYCLE
    }

    fn plan_simulation(
        &self,
        _sim: &Simulation,
        _view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        if self.is_ended() {
            return None;
        }
        Some(base_ticks_for(self.phase_left, settings.cycle_speed()))
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        _sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        if self.is_ended() {
            return Ok(());
        }
        if ctx.view.is_pregnant {
            self.end(CycleEndReason::Pregnancy, ctx);
            return Ok(());
        }
        let mut advance = scaled_advance(ticks, ctx.settings.cycle_speed(), &mut self.carry);
        while advance > 0 {
            if advance < self.phase_left {
                self.phase_left -= advance;
                self.internal_clock += advance;
                break;
            }
            advance -= self.phase_left;
            self.internal_clock += self.phase_left;
            self.transition(ctx)?;
        }
        Ok(())
    }

    fn on_added(&mut self, ctx: &mut SimContext<'_>) {
        // A freshly constructed cycle anchors its draw clock at the add
        // tick and draws its first follicular duration; a loaded one
        // arrives with state already live. The anchor keeps draw keys
        // distinct across cycles re-added after each pregnancy.
        if self.phase_left == 0 && !self.is_ended() {
            self.internal_clock = ctx.now;
            self.phase_left = self.draw_phase_duration(ctx, self.phase);
        }
    }

    fn should_save(&self) -> bool {
        self.phase != CyclePhase::Follicular
            || self.phase_left != 0
            || self.internal_clock != 0
            || self.cycles_completed != 0
            || self.end_reason != CycleEndReason::Unset
            || self.carry != 0.0
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.phase != CyclePhase::Follicular {
            state.put_str("phase", self.phase.as_str());
        }
        if self.phase_left != 0 {
            state.put_u64("phase_left", self.phase_left);
        }
        if self.internal_clock != 0 {
            state.put_u64("internal_clock", self.internal_clock);
        }
        if self.carry != 0.0 {
            state.put_f64("carry", self.carry);
        }
        if self.cycles_completed != 0 {
            state.put_u64("cycles_completed", self.cycles_completed);
        }
        if self.end_reason != CycleEndReason::Unset {
            state.put_str("end_reason", self.end_reason.as_str());
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
