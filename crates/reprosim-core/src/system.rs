//! The reproductive system aggregate.
//!
//! Owns the tracker set for one subject and orchestrates the two-phase
//! plan→simulate protocol. An update converts elapsed external time into
//! reproductive ticks, then advances in sub-steps: every live tracker is
//! planned against the remaining span, the sub-step is bounded by the
//! earliest requested tick, every tracker simulates exactly that far, and
//! only then are queued structural changes applied. Event boundaries
//! (ovulation start, implantation, birth) therefore always land exactly on
//! a tick — a long lazy catch-up can never jump over one.
//!
//! Tracker failures during simulate are caught at the dispatch boundary
//! and logged; sibling trackers are unaffected and the update completes.

use std::collections::{BTreeMap, VecDeque};

use reprosim_logic::constants::trackers;
use reprosim_logic::guide::{GuideSet, Sex, SubjectProfile};

use crate::error::SystemError;
use crate::events::{NotificationSink, ReproEvent, SubjectId};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{HostKind, Hosted, PendingOp, SimContext, SystemView, Tracker};
use crate::trackers::cycle::{CycleEndReason, CycleTracker};
use crate::trackers::effects::{FertilityBoostEffect, PillEffect};
use crate::trackers::host::HostContainer;
use crate::trackers::ovum::OvumTracker;
use crate::trackers::sperm::{SpermProductionTracker, SpermTracker};

pub struct ReproductiveSystem {
    subject: SubjectId,
    profile: SubjectProfile,
    guides: GuideSet,
    seed: u64,
    /// Absolute reproductive ticks simulated so far.
    clock: u64,
    /// External clock stamp of the last completed update.
    last_update: u64,
    /// Fractional reproductive minutes carried between updates.
    carry: f64,
    trackers: BTreeMap<&'static str, Box<dyn Tracker>>,
    pending: VecDeque<PendingOp>,
}

impl ReproductiveSystem {
    /// Create a system for a subject, resolving its guides through the
    /// registry and installing the baseline trackers for its profile.
    pub fn new(
        subject: SubjectId,
        profile: SubjectProfile,
        registry: &Registry,
        seed: u64,
        created_at_external: u64,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) -> Self {
        let mut system = Self::bare(subject, profile, registry, seed);
        system.last_update = created_at_external;
        system.ensure_baseline(settings, sink);
        system
    }

    /// A system with no trackers; used by restore.
    pub(crate) fn bare(
        subject: SubjectId,
        profile: SubjectProfile,
        registry: &Registry,
        seed: u64,
    ) -> Self {
        let guides = registry.guides_for(&profile).clone();
        Self {
            subject,
            profile,
            guides,
            seed,
            clock: 0,
            last_update: 0,
            carry: 0.0,
            trackers: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn profile(&self) -> &SubjectProfile {
        &self.profile
    }

    pub fn guides(&self) -> &GuideSet {
        &self.guides
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub(crate) fn conversion_carry(&self) -> f64 {
        self.carry
    }

    pub(crate) fn set_clock_state(&mut self, clock: u64, last_update: u64, carry: f64) {
        self.clock = clock;
        self.last_update = last_update;
        self.carry = carry;
    }

    /// Look up a tracker. Absent is a normal state, not an error.
    pub fn tracker(&self, id: &str) -> Option<&dyn Tracker> {
        self.trackers.get(id).map(|t| t.as_ref())
    }

    /// Look up and downcast a tracker to its concrete type.
    pub fn tracker_as<T: 'static>(&self, id: &str) -> Option<&T> {
        self.trackers
            .get(id)
            .and_then(|t| t.as_any().downcast_ref::<T>())
    }

    /// Mutable variant of [`Self::tracker_as`].
    pub fn tracker_as_mut<T: 'static>(&mut self, id: &str) -> Option<&mut T> {
        self.trackers
            .get_mut(id)
            .and_then(|t| t.as_any_mut().downcast_mut::<T>())
    }

    pub fn tracker_ids(&self) -> Vec<&'static str> {
        self.trackers.keys().copied().collect()
    }

    pub(crate) fn trackers_iter(&self) -> impl Iterator<Item = &dyn Tracker> {
        self.trackers.values().map(|t| t.as_ref())
    }

    /// Insert a restored tracker without running lifecycle hooks.
    pub(crate) fn insert_restored(&mut self, tracker: Box<dyn Tracker>) {
        self.trackers.insert(tracker.id(), tracker);
    }

    /// Install the baseline trackers for the subject's profile: a cycle for
    /// females, a sperm-production reserve for males. No-op for trackers
    /// already present.
    pub(crate) fn ensure_baseline(&mut self, settings: &Settings, sink: &dyn NotificationSink) {
        match self.profile.sex {
            Sex::Female => {
                if !self.trackers.contains_key(trackers::CYCLE) {
                    let _ = self.insert_tracker(Box::new(CycleTracker::new()), settings, sink);
                }
            }
            Sex::Male => {
                if !self.trackers.contains_key(trackers::SPERM_PRODUCTION) {
                    let tracker = SpermProductionTracker::new(&self.guides.sperm_production);
                    let _ = self.insert_tracker(Box::new(tracker), settings, sink);
                }
            }
        }
        self.apply_pending(settings, sink);
    }

    /// Add a tracker. Fails on a duplicate identifier, leaving the original
    /// instance untouched.
    pub fn add_tracker(
        &mut self,
        tracker: Box<dyn Tracker>,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) -> Result<(), SystemError> {
        self.insert_tracker(tracker, settings, sink)?;
        self.apply_pending(settings, sink);
        Ok(())
    }

    /// Remove a tracker. No-op when absent.
    pub fn remove_tracker(&mut self, id: &str, settings: &Settings, sink: &dyn NotificationSink) {
        self.remove_tracker_inner(id, settings, sink);
        self.apply_pending(settings, sink);
    }

    /// Advance by elapsed external ticks. Zero elapsed is a no-op; the
    /// unsigned argument makes "negative elapsed" unrepresentable.
    ///
    /// Returns the number of reproductive ticks simulated.
    pub fn update(
        &mut self,
        elapsed_external: u64,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) -> u64 {
        self.last_update = self.last_update.saturating_add(elapsed_external);
        if elapsed_external == 0 {
            return 0;
        }
        let scaled = elapsed_external as f64 * settings.external_tick_minutes() + self.carry;
        let mut remaining = scaled.floor() as u64;
        self.carry = scaled - remaining as f64;
        let total = remaining;

        while remaining > 0 {
            let view = self.collect_view();
            let sim = Simulation::new(self.clock, remaining, self.seed);

            // Plan every live tracker against the same candidate span, then
            // bound the sub-step by the earliest request.
            let mut step = remaining;
            for tracker in self.trackers.values() {
                if let Some(requested) = tracker.plan_simulation(&sim, &view, settings) {
                    step = step.min(requested.clamp(1, remaining));
                }
            }

            {
                let mut ctx = SimContext::new(
                    self.subject,
                    self.seed,
                    self.clock,
                    &self.guides,
                    settings,
                    view,
                    &mut self.pending,
                    sink,
                );
                for tracker in self.trackers.values_mut() {
                    if let Err(e) = tracker.simulate(&mut ctx, &sim, step) {
                        log::warn!(
                            "subject {:?}: tracker '{}' failed to simulate: {}",
                            ctx.subject,
                            tracker.id(),
                            e
                        );
                    }
                }
            }

            self.clock += step;
            remaining -= step;
            // Structural changes land strictly between sub-steps.
            self.apply_pending(settings, sink);
        }
        total
    }

    /// Catch up to an absolute external clock reading. A reading earlier
    /// than the last update is clamped to a no-op.
    pub fn update_to(
        &mut self,
        now_external: u64,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) -> u64 {
        let elapsed = now_external.saturating_sub(self.last_update);
        self.update(elapsed, settings, sink)
    }

    /// Deposit a sperm batch (e.g. from a partner's withdrawn reserve).
    pub fn deposit_sperm(&mut self, count: f64, settings: &Settings, sink: &dyn NotificationSink) {
        if count <= 0.0 {
            return;
        }
        if !self.trackers.contains_key(trackers::SPERM) {
            let _ = self.insert_tracker(Box::new(SpermTracker::new()), settings, sink);
        }
        let view = self.collect_view();
        {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view,
                &mut self.pending,
                sink,
            );
            if let Some(t) = self.trackers.get_mut(trackers::SPERM) {
                if let Some(sperm) = t.as_any_mut().downcast_mut::<SpermTracker>() {
                    sperm.deposit(count, &mut ctx);
                }
            }
        }
        self.apply_pending(settings, sink);
    }

    /// Consume a contraceptive pill: adds the pill effect.
    pub fn consume_contraceptive(&mut self, settings: &Settings, sink: &dyn NotificationSink) {
        self.pending.push_back(PendingOp::AddHosted(
            HostKind::Effects,
            Box::new(PillEffect::new()),
        ));
        self.apply_pending(settings, sink);
    }

    /// Take fertility medication: adds the boost effect.
    pub fn take_fertility_medication(&mut self, settings: &Settings, sink: &dyn NotificationSink) {
        let effect = FertilityBoostEffect::new(self.guides.effects.boost_multiplier);
        self.pending
            .push_back(PendingOp::AddHosted(HostKind::Effects, Box::new(effect)));
        self.apply_pending(settings, sink);
    }

    /// Externally stop the cycle (reason `Canceled` for an outside request).
    pub fn end_cycle(
        &mut self,
        reason: CycleEndReason,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) {
        let view = self.collect_view();
        {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view,
                &mut self.pending,
                sink,
            );
            if let Some(t) = self.trackers.get_mut(trackers::CYCLE) {
                if let Some(cycle) = t.as_any_mut().downcast_mut::<CycleTracker>() {
                    cycle.end(reason, &mut ctx);
                }
            }
        }
        self.apply_pending(settings, sink);
    }

    fn collect_view(&self) -> SystemView {
        let mut view = SystemView::default();
        for tracker in self.trackers.values() {
            tracker.observe(&mut view);
        }
        view
    }

    fn insert_tracker(
        &mut self,
        mut tracker: Box<dyn Tracker>,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) -> Result<(), SystemError> {
        let id = tracker.id();
        if self.trackers.contains_key(id) {
            return Err(SystemError::DuplicateTracker(id));
        }
        let view = self.collect_view();
        {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view.clone(),
                &mut self.pending,
                sink,
            );
            tracker.on_adding(&mut ctx);
        }
        self.trackers.insert(id, tracker);
        {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view,
                &mut self.pending,
                sink,
            );
            if let Some(t) = self.trackers.get_mut(id) {
                t.on_added(&mut ctx);
            }
        }
        sink.notify(
            self.subject,
            &ReproEvent::TrackerAdded { id: id.to_string() },
        );
        Ok(())
    }

    fn remove_tracker_inner(&mut self, id: &str, settings: &Settings, sink: &dyn NotificationSink) {
        if !self.trackers.contains_key(id) {
            return;
        }
        let view = self.collect_view();
        {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view.clone(),
                &mut self.pending,
                sink,
            );
            if let Some(t) = self.trackers.get_mut(id) {
                t.on_removing(&mut ctx);
            }
        }
        if let Some(mut tracker) = self.trackers.remove(id) {
            let mut ctx = SimContext::new(
                self.subject,
                self.seed,
                self.clock,
                &self.guides,
                settings,
                view,
                &mut self.pending,
                sink,
            );
            tracker.on_removed(&mut ctx);
            sink.notify(
                self.subject,
                &ReproEvent::TrackerRemoved { id: id.to_string() },
            );
        }
    }

    /// Drain queued structural changes. Hooks may queue further ops; the
    /// loop runs until the queue is empty.
    fn apply_pending(&mut self, settings: &Settings, sink: &dyn NotificationSink) {
        while let Some(op) = self.pending.pop_front() {
            match op {
                PendingOp::AddTracker(tracker) => {
                    let id = tracker.id();
                    if let Err(e) = self.insert_tracker(tracker, settings, sink) {
                        log::warn!(
                            "subject {:?}: deferred add of tracker '{}' rejected: {}",
                            self.subject,
                            id,
                            e
                        );
                    }
                }
                PendingOp::RemoveTracker(id) => self.remove_tracker_inner(id, settings, sink),
                PendingOp::AddHosted(kind, child) => {
                    self.route_add_hosted(kind, child, settings, sink);
                }
                PendingOp::RemoveHosted(kind, id) => {
                    self.route_remove_hosted(kind, id, settings, sink);
                }
                PendingOp::ReleaseOva(count) => self.route_release_ova(count, settings, sink),
            }
        }
    }

    fn route_add_hosted(
        &mut self,
        kind: HostKind,
        child: Box<dyn Hosted>,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) {
        let container_id = kind.tracker_id();
        if !self.trackers.contains_key(container_id) {
            let _ = self.insert_tracker(Box::new(HostContainer::new(kind)), settings, sink);
        }
        let view = self.collect_view();
        let mut ctx = SimContext::new(
            self.subject,
            self.seed,
            self.clock,
            &self.guides,
            settings,
            view,
            &mut self.pending,
            sink,
        );
        if let Some(t) = self.trackers.get_mut(container_id) {
            if let Some(container) = t.as_any_mut().downcast_mut::<HostContainer>() {
                container.add_child(child, &mut ctx);
            }
        }
    }

    fn route_remove_hosted(
        &mut self,
        kind: HostKind,
        id: &'static str,
        settings: &Settings,
        sink: &dyn NotificationSink,
    ) {
        let container_id = kind.tracker_id();
        if !self.trackers.contains_key(container_id) {
            return;
        }
        let view = self.collect_view();
        let mut ctx = SimContext::new(
            self.subject,
            self.seed,
            self.clock,
            &self.guides,
            settings,
            view,
            &mut self.pending,
            sink,
        );
        if let Some(t) = self.trackers.get_mut(container_id) {
            if let Some(container) = t.as_any_mut().downcast_mut::<HostContainer>() {
                container.remove_child(id, &mut ctx);
            }
        }
    }

    fn route_release_ova(&mut self, count: u32, settings: &Settings, sink: &dyn NotificationSink) {
        if !self.trackers.contains_key(trackers::OVA) {
            let _ = self.insert_tracker(Box::new(OvumTracker::new()), settings, sink);
        }
        let view = self.collect_view();
        let mut ctx = SimContext::new(
            self.subject,
            self.seed,
            self.clock,
            &self.guides,
            settings,
            view,
            &mut self.pending,
            sink,
        );
        if let Some(t) = self.trackers.get_mut(trackers::OVA) {
            if let Some(ova) = t.as_any_mut().downcast_mut::<OvumTracker>() {
                ova.release(count, &mut ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    use reprosim_logic::constants::{effects, handlers};
    use reprosim_logic::guide::{NormalParam, WeightedTable};

    use crate::error::TrackerError;
    use crate::events::{MemorySink, NullSink};
    use crate::persist;
    use crate::trackers::cycle::CyclePhase;

    fn exact(mean: f64) -> NormalParam {
        NormalParam::new(mean, 0.0)
    }

    /// Guides with zero variance so every boundary lands on a known tick.
    fn exact_guides() -> GuideSet {
        let mut g = GuideSet::default();
        g.cycle.follicular = exact(20160.0);
        g.cycle.ovulation = exact(1440.0);
        g.cycle.luteal = exact(17280.0);
        g.cycle.menstruation = exact(5760.0);
        g.cycle.ova_release = WeightedTable::new(vec![(1, 1.0)]);
        g.ovum.lifetime = exact(1080.0);
        g.ovum.implantation_delay = exact(100.0);
        g.sperm.lifetime = exact(100_000.0);
        g.pregnancy.gestation = exact(1000.0);
        g.pregnancy.nausea_interval = exact(300.0);
        g.pregnancy.recovery = exact(500.0);
        g.effects.pill_duration = exact(10_000.0);
        g
    }

    /// Short-cycle variant for fertilization scenarios: ovulation ends at
    /// tick 15 and a single ovum is released.
    fn short_cycle_guides() -> GuideSet {
        let mut g = exact_guides();
        g.cycle.follicular = exact(10.0);
        g.cycle.ovulation = exact(5.0);
        g.cycle.luteal = exact(50_000.0);
        g.ovum.lifetime = exact(1000.0);
        // Any competing sperm at all makes fertilization certain.
        g.ovum.equal_chance_count = 1.0e-30;
        g
    }

    fn female_system(guides: GuideSet, seed: u64) -> (ReproductiveSystem, Settings) {
        let registry = Registry::standard_with_guides(guides);
        let settings = Settings::default();
        let system = ReproductiveSystem::new(
            SubjectId(1),
            SubjectProfile::adult_female("human"),
            &registry,
            seed,
            0,
            &settings,
            &NullSink,
        );
        (system, settings)
    }

    #[test]
    fn female_baseline_has_cycle() {
        let (system, _) = female_system(exact_guides(), 42);
        assert!(system.tracker(trackers::CYCLE).is_some());
        assert!(system.tracker(trackers::PREGNANCY).is_none());
        // The freshly added cycle drew its follicular duration in on_added.
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase_ticks_left(), 20160);
    }

    #[test]
    fn male_baseline_has_production_reserve() {
        let registry = Registry::standard();
        let settings = Settings::default();
        let system = ReproductiveSystem::new(
            SubjectId(2),
            SubjectProfile::adult_male("human"),
            &registry,
            7,
            0,
            &settings,
            &NullSink,
        );
        assert!(system.tracker(trackers::SPERM_PRODUCTION).is_some());
        assert!(system.tracker(trackers::CYCLE).is_none());
        let reserve = system
            .tracker_as::<SpermProductionTracker>(trackers::SPERM_PRODUCTION)
            .unwrap();
        assert!(reserve.is_full());
    }

    #[test]
    fn add_get_remove_visibility() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let sink = MemorySink::new();
        assert!(system.tracker(trackers::OVA).is_none());
        system
            .add_tracker(Box::new(OvumTracker::new()), &settings, &sink)
            .unwrap();
        assert!(system.tracker(trackers::OVA).is_some());
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::TrackerAdded { id } if id == "ova")),
            1
        );
        system.remove_tracker(trackers::OVA, &settings, &sink);
        assert!(system.tracker(trackers::OVA).is_none());
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::TrackerRemoved { id } if id == "ova")),
            1
        );
        // Removing again is a no-op, not an error.
        system.remove_tracker(trackers::OVA, &settings, &sink);
    }

    #[test]
    fn duplicate_add_fails_and_leaves_original() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let before = system
            .tracker_as::<CycleTracker>(trackers::CYCLE)
            .unwrap()
            .phase_ticks_left();
        let err = system
            .add_tracker(Box::new(CycleTracker::new()), &settings, &NullSink)
            .unwrap_err();
        assert!(matches!(err, SystemError::DuplicateTracker("cycle")));
        let after = system
            .tracker_as::<CycleTracker>(trackers::CYCLE)
            .unwrap()
            .phase_ticks_left();
        assert_eq!(before, after);
    }

    #[test]
    fn zero_elapsed_is_noop() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let before = persist::snapshot(&system);
        assert_eq!(system.update(0, &settings, &NullSink), 0);
        let mut after = persist::snapshot(&system);
        after.last_update = before.last_update;
        assert_eq!(before, after);
    }

    #[test]
    fn follicular_boundary_lands_exactly() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let sink = MemorySink::new();
        system.update(20160, &settings, &sink);
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase(), CyclePhase::Ovulation);
        assert_eq!(cycle.phase_ticks_left(), 1440);
        assert_eq!(
            sink.count_where(|e| matches!(
                e,
                ReproEvent::PhaseChanged {
                    from: CyclePhase::Follicular,
                    to: CyclePhase::Ovulation
                }
            )),
            1
        );
    }

    #[test]
    fn long_jump_does_not_skip_boundary() {
        // One oversized update must still land the transition exactly on
        // tick 20160 and then advance 100 ticks into ovulation.
        let (mut system, settings) = female_system(exact_guides(), 42);
        system.update(20260, &settings, &NullSink);
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase(), CyclePhase::Ovulation);
        assert_eq!(cycle.phase_ticks_left(), 1340);
    }

    #[test]
    fn simulation_is_additive() {
        let (mut split, settings) = female_system(GuideSet::default(), 99);
        let (mut whole, _) = female_system(GuideSet::default(), 99);
        split.update(5000, &settings, &NullSink);
        split.update(7000, &settings, &NullSink);
        whole.update(12000, &settings, &NullSink);
        assert_eq!(persist::snapshot(&split), persist::snapshot(&whole));
    }

    #[test]
    fn same_seed_same_outcome() {
        let (mut a, settings) = female_system(GuideSet::default(), 1234);
        let (mut b, _) = female_system(GuideSet::default(), 1234);
        a.update(30_000, &settings, &NullSink);
        b.update(30_000, &settings, &NullSink);
        assert_eq!(persist::snapshot(&a), persist::snapshot(&b));
    }

    #[test]
    fn planning_is_idempotent() {
        let (system, settings) = female_system(exact_guides(), 42);
        let cycle = system.tracker(trackers::CYCLE).unwrap();
        let sim = Simulation::new(0, 100_000, system.seed());
        let view = SystemView::default();
        let first = cycle.plan_simulation(&sim, &view, &settings);
        let second = cycle.plan_simulation(&sim, &view, &settings);
        assert_eq!(first, second);
        assert_eq!(first, Some(20160));
    }

    #[test]
    fn ovum_expires_after_lifetime() {
        let (mut system, settings) = female_system(short_cycle_guides(), 42);
        let sink = MemorySink::new();
        // Cycle: follicular 10, ovulation 5 — release lands at tick 15.
        system.update(15, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::OvaReleased { count: 1 })),
            1
        );
        let ova = system.tracker_as::<OvumTracker>(trackers::OVA).unwrap();
        assert_eq!(ova.live_count(), 1);
        // Lifetime 1000, no sperm: one more tick than the lifetime kills it.
        system.update(1001, &settings, &sink);
        let ova = system.tracker_as::<OvumTracker>(trackers::OVA).unwrap();
        assert_eq!(ova.live_count(), 0);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::OvumExpired)), 1);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::OvumFertilized)), 0);
    }

    #[test]
    fn fertilization_through_birth() {
        let (mut system, settings) = female_system(short_cycle_guides(), 42);
        let sink = MemorySink::new();
        system.deposit_sperm(1.0e30, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::SpermDeposited { .. })),
            1
        );
        // Timeline: release at 15, fertilization check at 75 (certain),
        // implantation at 175, birth at 1175, recovery until 1675.
        system.update(1500, &settings, &sink);

        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::OvumFertilized)), 1);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::Implanted)), 1);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::PregnancyStarted { .. })),
            1
        );
        assert_eq!(
            sink.count_where(|e| matches!(
                e,
                ReproEvent::CycleEnded {
                    reason: CycleEndReason::Pregnancy
                }
            )),
            1
        );
        // Two trimester boundaries, three nausea episodes (300/600/900
        // into a 1000-tick gestation), one birth.
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::TrimesterChanged { .. })),
            2
        );
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::Nausea)), 3);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::Birth)), 1);

        // Pregnancy and cycle are gone; postpartum recovery is running.
        assert!(system.tracker(trackers::PREGNANCY).is_none());
        assert!(system.tracker(trackers::CYCLE).is_none());
        let host = system
            .tracker_as::<HostContainer>(trackers::HANDLERS)
            .unwrap();
        assert!(host.has(handlers::POSTPARTUM_RECOVERY));

        // Recovery completes at 1675 and the cycle restarts.
        system.update(200, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::RecoveryComplete)),
            1
        );
        assert!(system.tracker(trackers::CYCLE).is_some());
    }

    #[test]
    fn explicit_fertilization_curve_overrides_hill() {
        let mut guides = short_cycle_guides();
        // The Hill curve would give a vanishing chance at this midpoint; an
        // explicit guide curve pinned at 1.0 wins.
        guides.ovum.equal_chance_count = 1.0e30;
        guides.ovum.fertilization_curve =
            Some(reprosim_logic::curve::Curve::new(vec![(0.0, 1.0)]));
        let (mut system, settings) = female_system(guides, 42);
        let sink = MemorySink::new();
        system.deposit_sperm(10.0, &settings, &sink);
        system.update(200, &settings, &sink);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::OvumFertilized)), 1);
    }

    #[test]
    fn contraceptive_skips_ovulation() {
        let (mut system, settings) = female_system(short_cycle_guides(), 42);
        let sink = MemorySink::new();
        system.consume_contraceptive(&settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::EffectAdded { id } if id == "pill")),
            1
        );
        system.update(30, &settings, &sink);
        assert_eq!(sink.count_where(|e| matches!(e, ReproEvent::OvulationSkipped)), 1);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::OvaReleased { .. })),
            0
        );
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase(), CyclePhase::Luteal);
    }

    #[test]
    fn pill_wears_off() {
        let mut guides = exact_guides();
        guides.effects.pill_duration = exact(100.0);
        let (mut system, settings) = female_system(guides, 42);
        let sink = MemorySink::new();
        system.consume_contraceptive(&settings, &sink);
        system.update(150, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::EffectRemoved { id } if id == "pill")),
            1
        );
        let host = system
            .tracker_as::<HostContainer>(trackers::EFFECTS)
            .unwrap();
        assert!(!host.has(effects::PILL));
    }

    #[test]
    fn fertility_medication_boosts_then_wears_off() {
        let mut guides = short_cycle_guides();
        guides.effects.boost_duration = exact(50.0);
        let (mut system, settings) = female_system(guides, 42);
        let sink = MemorySink::new();
        system.take_fertility_medication(&settings, &sink);
        assert_eq!(
            sink.count_where(
                |e| matches!(e, ReproEvent::EffectAdded { id } if id == "fertility_boost")
            ),
            1
        );
        system.update(100, &settings, &sink);
        assert_eq!(
            sink.count_where(
                |e| matches!(e, ReproEvent::EffectRemoved { id } if id == "fertility_boost")
            ),
            1
        );
    }

    #[test]
    fn cancel_ends_and_removes_cycle() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let sink = MemorySink::new();
        system.end_cycle(CycleEndReason::Canceled, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(
                e,
                ReproEvent::CycleEnded {
                    reason: CycleEndReason::Canceled
                }
            )),
            1
        );
        assert!(system.tracker(trackers::CYCLE).is_none());
    }

    #[test]
    fn natural_loop_reports_finished_cycles() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        let sink = MemorySink::new();
        // One full cycle: 20160 + 1440 + 17280 + 5760 = 44640.
        system.update(44640, &settings, &sink);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::CycleCompleted { count: 1 })),
            1
        );
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase(), CyclePhase::Follicular);
        assert_eq!(cycle.cycles_completed(), 1);
        assert!(!cycle.is_ended());
    }

    struct FlakyTracker;

    impl Tracker for FlakyTracker {
        fn id(&self) -> &'static str {
            "flaky"
        }
        fn plan_simulation(
            &self,
            _sim: &Simulation,
            _view: &SystemView,
            _settings: &Settings,
        ) -> Option<u64> {
            None
        }
        fn simulate(
            &mut self,
            _ctx: &mut SimContext<'_>,
            _sim: &Simulation,
            _ticks: u64,
        ) -> Result<(), TrackerError> {
            Err(TrackerError::EmptyTable("flaky.table"))
        }
        fn should_save(&self) -> bool {
            false
        }
        fn save_state(&self) -> crate::persist::StateMap {
            crate::persist::StateMap::new()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn failing_tracker_does_not_break_siblings() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        system
            .add_tracker(Box::new(FlakyTracker), &settings, &NullSink)
            .unwrap();
        system.update(20160, &settings, &NullSink);
        // The cycle still advanced to its boundary despite the failure.
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase(), CyclePhase::Ovulation);
        // The failing tracker is still registered (no retry, no eviction).
        assert!(system.tracker("flaky").is_some());
    }

    #[test]
    fn snapshot_restore_roundtrip_continues_identically() {
        let registry = Registry::standard_with_guides(GuideSet::default());
        let settings = Settings::default();
        let mut original = ReproductiveSystem::new(
            SubjectId(5),
            SubjectProfile::adult_female("human"),
            &registry,
            77,
            0,
            &settings,
            &NullSink,
        );
        original.update(12_345, &settings, &NullSink);

        let save = persist::snapshot(&original);
        let mut restored = persist::restore(save, &registry, &settings, &NullSink).unwrap();
        assert_eq!(persist::snapshot(&original), persist::snapshot(&restored));

        original.update(5000, &settings, &NullSink);
        restored.update(5000, &settings, &NullSink);
        assert_eq!(persist::snapshot(&original), persist::snapshot(&restored));
    }

    #[test]
    fn save_load_bytes_roundtrip() {
        let registry = Registry::standard();
        let settings = Settings::default();
        let mut system = ReproductiveSystem::new(
            SubjectId(6),
            SubjectProfile::adult_female("human"),
            &registry,
            3,
            0,
            &settings,
            &NullSink,
        );
        system.update(9999, &settings, &NullSink);
        let mut bytes = Vec::new();
        persist::save_to(&mut bytes, &system).unwrap();
        let loaded =
            persist::load_from(bytes.as_slice(), &registry, &settings, &NullSink).unwrap();
        assert_eq!(persist::snapshot(&system), persist::snapshot(&loaded));

        let json = persist::snapshot_json(&system).unwrap();
        assert!(json.contains("\"cycle\""));
    }

    #[test]
    fn restore_rejects_unknown_tracker() {
        let registry = Registry::standard();
        let settings = Settings::default();
        let system = ReproductiveSystem::new(
            SubjectId(7),
            SubjectProfile::adult_female("human"),
            &registry,
            3,
            0,
            &settings,
            &NullSink,
        );
        let mut save = persist::snapshot(&system);
        save.trackers.push(persist::TrackerSave {
            id: "chronometer".to_string(),
            state: crate::persist::StateMap::new(),
        });
        let Err(err) = persist::restore(save, &registry, &settings, &NullSink) else {
            panic!("expected restore to fail");
        };
        assert!(matches!(err, crate::error::PersistError::UnknownTracker(_)));
    }

    #[test]
    fn restore_rejects_version_mismatch() {
        let registry = Registry::standard();
        let settings = Settings::default();
        let system = ReproductiveSystem::new(
            SubjectId(8),
            SubjectProfile::adult_female("human"),
            &registry,
            3,
            0,
            &settings,
            &NullSink,
        );
        let mut save = persist::snapshot(&system);
        save.version = 999;
        let Err(err) = persist::restore(save, &registry, &settings, &NullSink) else {
            panic!("expected restore to fail");
        };
        assert!(matches!(
            err,
            crate::error::PersistError::VersionMismatch { .. }
        ));
    }

    #[test]
    fn update_to_is_monotonic() {
        let (mut system, settings) = female_system(exact_guides(), 42);
        assert_eq!(system.update_to(100, &settings, &NullSink), 100);
        assert_eq!(system.last_update(), 100);
        // A stale clock reading is clamped to a no-op.
        assert_eq!(system.update_to(50, &settings, &NullSink), 0);
        assert_eq!(system.last_update(), 100);
    }

    #[test]
    fn external_tick_conversion_scales_updates() {
        let mut settings = Settings::default();
        settings.set_external_tick_minutes(2.0).unwrap();
        let (mut system, _) = female_system(exact_guides(), 42);
        // 100 external ticks at 2 minutes each = 200 reproductive ticks.
        assert_eq!(system.update(100, &settings, &NullSink), 200);
        let cycle = system.tracker_as::<CycleTracker>(trackers::CYCLE).unwrap();
        assert_eq!(cycle.phase_ticks_left(), 20160 - 200);
    }

    #[test]
    fn fractional_conversion_carries_remainder() {
        let mut settings = Settings::default();
        settings.set_external_tick_minutes(0.5).unwrap();
        let (mut system, _) = female_system(exact_guides(), 42);
        assert_eq!(system.update(3, &settings, &NullSink), 1);
        // 0.5 carried; the next 3 external ticks yield 2 whole minutes.
        assert_eq!(system.update(3, &settings, &NullSink), 2);
    }

    #[test]
    fn recovery_handler_remaining_visible_through_container() {
        let (mut system, settings) = female_system(short_cycle_guides(), 42);
        system.deposit_sperm(1.0e30, &settings, &NullSink);
        system.update(1200, &settings, &NullSink);
        // Birth happened at 1175; recovery (500) is counting down.
        let host = system
            .tracker_as::<HostContainer>(trackers::HANDLERS)
            .unwrap();
        let child = host.child(handlers::POSTPARTUM_RECOVERY).unwrap();
        assert!(child.should_save());
        let state = child.save_state();
        assert_eq!(state.u64_or("remaining", 0).unwrap(), 475);
    }
}
