//! Subject directory and update scheduling.
//!
//! Maps subjects to their reproductive systems and decides which are
//! "actively" ticking each frame versus lazily caught up on next access.
//! An unobserved subject simply accumulates external time; the full
//! sub-stepping update runs once, atomically, when the subject is next
//! queried — producing exactly the state an actively ticked subject would
//! have reached.

use std::collections::HashMap;

use reprosim_logic::constants::trackers;
use reprosim_logic::guide::SubjectProfile;

use crate::events::{NotificationSink, SubjectId};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::system::ReproductiveSystem;
use crate::trackers::sperm::SpermProductionTracker;

struct Entry {
    system: ReproductiveSystem,
    active: bool,
}

/// Owns every reproductive system, the registry, and the settings.
pub struct Directory {
    registry: Registry,
    settings: Settings,
    base_seed: u64,
    systems: HashMap<SubjectId, Entry>,
}

/// Derive a stable per-subject seed from the directory seed.
fn subject_seed(base_seed: u64, subject: SubjectId) -> u64 {
    let mut z = base_seed ^ subject.0.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl Directory {
    pub fn new(registry: Registry, settings: Settings, base_seed: u64) -> Self {
        Self {
            registry,
            settings,
            base_seed,
            systems: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Adjust settings at runtime (e.g. reproductive speed sliders).
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn contains(&self, subject: SubjectId) -> bool {
        self.systems.contains_key(&subject)
    }

    /// Create the system for a subject on first access; subsequent calls
    /// return the existing one untouched.
    pub fn register(
        &mut self,
        subject: SubjectId,
        profile: SubjectProfile,
        now_external: u64,
        sink: &dyn NotificationSink,
    ) -> &mut ReproductiveSystem {
        let entry = self.systems.entry(subject).or_insert_with(|| {
            let seed = subject_seed(self.base_seed, subject);
            let system = ReproductiveSystem::new(
                subject,
                profile,
                &self.registry,
                seed,
                now_external,
                &self.settings,
                sink,
            );
            Entry {
                system,
                active: false,
            }
        });
        &mut entry.system
    }

    /// Permanently remove a subject's system.
    pub fn remove(&mut self, subject: SubjectId) -> bool {
        self.systems.remove(&subject).is_some()
    }

    /// Mark a subject as actively simulated (updated every `tick` call)
    /// or passive (caught up lazily on access).
    pub fn set_active(&mut self, subject: SubjectId, active: bool) {
        if let Some(entry) = self.systems.get_mut(&subject) {
            entry.active = active;
        }
    }

    pub fn active_count(&self) -> usize {
        self.systems.values().filter(|e| e.active).count()
    }

    /// Frame driver: advance every active system to the current external
    /// clock reading.
    pub fn tick(&mut self, now_external: u64, sink: &dyn NotificationSink) {
        for entry in self.systems.values_mut() {
            if entry.active {
                entry.system.update_to(now_external, &self.settings, sink);
            }
        }
    }

    /// Read-only peek without catching up.
    pub fn peek(&self, subject: SubjectId) -> Option<&ReproductiveSystem> {
        self.systems.get(&subject).map(|e| &e.system)
    }

    /// Access a subject's system, first running the full catch-up for any
    /// externally elapsed time.
    pub fn catch_up(
        &mut self,
        subject: SubjectId,
        now_external: u64,
        sink: &dyn NotificationSink,
    ) -> Option<&mut ReproductiveSystem> {
        let entry = self.systems.get_mut(&subject)?;
        entry.system.update_to(now_external, &self.settings, sink);
        Some(&mut entry.system)
    }

    /// Withdraw from the source subject's sperm reserve and deposit into
    /// the target's system. Both are caught up first. Returns the amount
    /// transferred.
    pub fn inseminate(
        &mut self,
        source: SubjectId,
        target: SubjectId,
        amount: f64,
        now_external: u64,
        sink: &dyn NotificationSink,
    ) -> f64 {
        if !self.systems.contains_key(&target) {
            return 0.0;
        }
        let taken = match self.systems.get_mut(&source) {
            Some(entry) => {
                entry.system.update_to(now_external, &self.settings, sink);
                entry
                    .system
                    .tracker_as_mut::<SpermProductionTracker>(trackers::SPERM_PRODUCTION)
                    .map_or(0.0, |reserve| reserve.withdraw(amount))
            }
            None => return 0.0,
        };
        if taken <= 0.0 {
            return 0.0;
        }
        if let Some(entry) = self.systems.get_mut(&target) {
            entry.system.update_to(now_external, &self.settings, sink);
            entry.system.deposit_sperm(taken, &self.settings, sink);
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemorySink, NullSink, ReproEvent};
    use crate::persist;
    use crate::trackers::sperm::SpermTracker;

    fn directory() -> Directory {
        Directory::new(Registry::standard(), Settings::default(), 0xfeed)
    }

    fn female(id: u64) -> (SubjectId, SubjectProfile) {
        (SubjectId(id), SubjectProfile::adult_female("human"))
    }

    #[test]
    fn register_creates_once() {
        let mut dir = directory();
        let (id, profile) = female(1);
        dir.register(id, profile.clone(), 0, &NullSink);
        assert_eq!(dir.len(), 1);
        let clock = dir.peek(id).unwrap().clock();
        dir.register(id, profile, 500, &NullSink);
        assert_eq!(dir.len(), 1);
        // Second register did not reset or advance the existing system.
        assert_eq!(dir.peek(id).unwrap().clock(), clock);
    }

    #[test]
    fn remove_destroys_system() {
        let mut dir = directory();
        let (id, profile) = female(2);
        dir.register(id, profile, 0, &NullSink);
        assert!(dir.remove(id));
        assert!(!dir.contains(id));
        assert!(!dir.remove(id));
    }

    #[test]
    fn per_subject_seeds_are_stable_and_distinct() {
        assert_eq!(subject_seed(7, SubjectId(1)), subject_seed(7, SubjectId(1)));
        assert_ne!(subject_seed(7, SubjectId(1)), subject_seed(7, SubjectId(2)));
        assert_ne!(subject_seed(7, SubjectId(1)), subject_seed(8, SubjectId(1)));
    }

    #[test]
    fn lazy_catch_up_matches_active_ticking() {
        // Same subject in two directories: one ticked actively every frame,
        // one caught up in a single bulk update. States must be identical.
        let mut active_dir = directory();
        let mut lazy_dir = directory();
        let (id, profile) = female(3);
        active_dir.register(id, profile.clone(), 0, &NullSink);
        active_dir.set_active(id, true);
        lazy_dir.register(id, profile, 0, &NullSink);

        for now in (0..=50_000).step_by(100) {
            active_dir.tick(now, &NullSink);
        }
        let lazy = lazy_dir.catch_up(id, 50_000, &NullSink).unwrap();
        let active = active_dir.peek(id).unwrap();
        assert_eq!(persist::snapshot(active), persist::snapshot(lazy));
    }

    #[test]
    fn passive_subject_not_ticked() {
        let mut dir = directory();
        let (id, profile) = female(4);
        dir.register(id, profile, 0, &NullSink);
        dir.tick(10_000, &NullSink);
        assert_eq!(dir.peek(id).unwrap().clock(), 0);
        dir.catch_up(id, 10_000, &NullSink);
        assert_eq!(dir.peek(id).unwrap().clock(), 10_000);
    }

    #[test]
    fn inseminate_transfers_between_subjects() {
        let mut dir = directory();
        let (her, her_profile) = female(5);
        let him = SubjectId(6);
        dir.register(her, her_profile, 0, &NullSink);
        dir.register(him, SubjectProfile::adult_male("human"), 0, &NullSink);

        let sink = MemorySink::new();
        let amount = 1.0e8;
        let transferred = dir.inseminate(him, her, amount, 0, &sink);
        assert_eq!(transferred, amount);
        assert_eq!(
            sink.count_where(|e| matches!(e, ReproEvent::SpermDeposited { .. })),
            1
        );

        let his = dir.peek(him).unwrap();
        let reserve = his
            .tracker_as::<SpermProductionTracker>(trackers::SPERM_PRODUCTION)
            .unwrap();
        assert!(!reserve.is_full());

        let hers = dir.peek(her).unwrap();
        let sperm = hers.tracker_as::<SpermTracker>(trackers::SPERM).unwrap();
        assert_eq!(sperm.total_count(), amount);
    }

    #[test]
    fn inseminate_missing_subject_is_noop() {
        let mut dir = directory();
        let him = SubjectId(7);
        dir.register(him, SubjectProfile::adult_male("human"), 0, &NullSink);
        assert_eq!(dir.inseminate(him, SubjectId(99), 1.0e8, 0, &NullSink), 0.0);
        // Nothing was withdrawn.
        let reserve = dir
            .peek(him)
            .unwrap()
            .tracker_as::<SpermProductionTracker>(trackers::SPERM_PRODUCTION)
            .unwrap();
        assert!(reserve.is_full());
    }

    #[test]
    fn reserve_replenishes_after_withdrawal() {
        let mut dir = directory();
        let (her, her_profile) = female(8);
        let him = SubjectId(9);
        dir.register(her, her_profile, 0, &NullSink);
        dir.register(him, SubjectProfile::adult_male("human"), 0, &NullSink);
        dir.inseminate(him, her, 1.0e8, 0, &NullSink);

        // Default guide rebuilds the full reserve in three days.
        let days_4 = 4 * reprosim_logic::constants::time::MINUTES_PER_DAY;
        dir.catch_up(him, days_4, &NullSink);
        let reserve = dir
            .peek(him)
            .unwrap()
            .tracker_as::<SpermProductionTracker>(trackers::SPERM_PRODUCTION)
            .unwrap();
        assert!(reserve.is_full());
    }

    #[test]
    fn runtime_speed_change_applies_to_next_update() {
        let mut dir = directory();
        let (id, profile) = female(10);
        dir.register(id, profile, 0, &NullSink);
        dir.catch_up(id, 100, &NullSink);
        assert_eq!(dir.peek(id).unwrap().clock(), 100);
        dir.settings_mut().set_external_tick_minutes(3.0).unwrap();
        dir.catch_up(id, 200, &NullSink);
        // The second 100 external ticks counted triple.
        assert_eq!(dir.peek(id).unwrap().clock(), 400);
    }
}
