//! Explicit registries for guides, trackers, effects, and handlers.
//!
//! There is no ambient process-wide state: a [`Registry`] is constructed
//! (usually via [`Registry::standard`]), owned by the directory, and passed
//! by reference wherever resolution is needed. Tests build isolated
//! registries with whatever groups and defaults they want.
//!
//! Guide resolution scans groups first-match-wins in registration order. A
//! matcher that fails is logged and treated as non-matching — the scan
//! never aborts. The process-wide default guide set always resolves, so
//! `guides_for` cannot fail.

use reprosim_logic::constants::{effects, handlers, trackers};
use reprosim_logic::guide::{GuideSet, SubjectProfile};

use crate::error::{MatcherError, PersistError};
use crate::persist::StateMap;
use crate::tracker::{HostKind, Hosted, Tracker};
use crate::trackers::cycle::CycleTracker;
use crate::trackers::effects::{FertilityBoostEffect, PillEffect};
use crate::trackers::handlers::{MorningSicknessHandler, PostpartumRecoveryHandler};
use crate::trackers::host::HostContainer;
use crate::trackers::ovum::OvumTracker;
use crate::trackers::pregnancy::PregnancyTracker;
use crate::trackers::sperm::{SpermProductionTracker, SpermTracker};

/// Pure predicate over subject attributes.
pub type MatcherFn = fn(&SubjectProfile) -> Result<bool, MatcherError>;

/// A named guide override with its matching predicate.
pub struct GuideGroup {
    pub name: String,
    pub matcher: MatcherFn,
    pub guides: GuideSet,
}

type TrackerLoadFn =
    fn(&StateMap, &GuideSet, &Registry) -> Result<Box<dyn Tracker>, PersistError>;
type HostedLoadFn = fn(&StateMap, &GuideSet) -> Result<Box<dyn Hosted>, PersistError>;

struct TrackerEntry {
    id: &'static str,
    load: TrackerLoadFn,
}

struct HostedEntry {
    id: &'static str,
    kind: HostKind,
    load: HostedLoadFn,
}

pub struct Registry {
    groups: Vec<GuideGroup>,
    default_guides: GuideSet,
    trackers: Vec<TrackerEntry>,
    hosted: Vec<HostedEntry>,
}

impl Registry {
    /// An empty registry with the given process-wide default guides.
    pub fn new(default_guides: GuideSet) -> Self {
        Self {
            groups: Vec::new(),
            default_guides,
            trackers: Vec::new(),
            hosted: Vec::new(),
        }
    }

    /// The full standard registry: every tracker, effect, and handler
    /// variant, with default guides and no groups.
    pub fn standard() -> Self {
        Self::standard_with_guides(GuideSet::default())
    }

    /// The standard registry with custom process-wide default guides.
    pub fn standard_with_guides(default_guides: GuideSet) -> Self {
        let mut registry = Self::new(default_guides);

        registry.register_tracker(trackers::CYCLE, |state, _, _| {
            Ok(Box::new(CycleTracker::load(state)?))
        });
        registry.register_tracker(trackers::OVA, |state, _, _| {
            Ok(Box::new(OvumTracker::load(state)?))
        });
        registry.register_tracker(trackers::SPERM, |state, _, _| {
            Ok(Box::new(SpermTracker::load(state)?))
        });
        registry.register_tracker(trackers::SPERM_PRODUCTION, |state, guides, _| {
            Ok(Box::new(SpermProductionTracker::load(
                state,
                &guides.sperm_production,
            )?))
        });
        registry.register_tracker(trackers::PREGNANCY, |state, _, _| {
            Ok(Box::new(PregnancyTracker::load(state)?))
        });
        registry.register_tracker(trackers::EFFECTS, |state, guides, registry| {
            Ok(Box::new(HostContainer::load(
                HostKind::Effects,
                state,
                guides,
                registry,
            )?))
        });
        registry.register_tracker(trackers::HANDLERS, |state, guides, registry| {
            Ok(Box::new(HostContainer::load(
                HostKind::Handlers,
                state,
                guides,
                registry,
            )?))
        });

        registry.register_hosted(effects::PILL, HostKind::Effects, |state, _| {
            Ok(Box::new(PillEffect::load(state)?))
        });
        registry.register_hosted(effects::FERTILITY_BOOST, HostKind::Effects, |state, guides| {
            Ok(Box::new(FertilityBoostEffect::load(
                state,
                guides.effects.boost_multiplier,
            )?))
        });
        registry.register_hosted(handlers::MORNING_SICKNESS, HostKind::Handlers, |state, _| {
            Ok(Box::new(MorningSicknessHandler::load(state)?))
        });
        registry.register_hosted(
            handlers::POSTPARTUM_RECOVERY,
            HostKind::Handlers,
            |state, _| Ok(Box::new(PostpartumRecoveryHandler::load(state)?)),
        );

        registry
    }

    pub fn register_group(&mut self, name: &str, matcher: MatcherFn, guides: GuideSet) {
        self.groups.push(GuideGroup {
            name: name.to_string(),
            matcher,
            guides,
        });
    }

    pub fn register_tracker(&mut self, id: &'static str, load: TrackerLoadFn) {
        self.trackers.push(TrackerEntry { id, load });
    }

    pub fn register_hosted(&mut self, id: &'static str, kind: HostKind, load: HostedLoadFn) {
        self.hosted.push(HostedEntry { id, kind, load });
    }

    /// First-match-wins scan in registration order. A failing matcher is
    /// logged and treated as non-matching.
    pub fn find_guide_group(&self, profile: &SubjectProfile) -> Option<&GuideGroup> {
        for group in &self.groups {
            match (group.matcher)(profile) {
                Ok(true) => return Some(group),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("guide group '{}' matcher failed: {}", group.name, e);
                }
            }
        }
        None
    }

    /// The matched group's guides, or the process-wide default. Never fails.
    pub fn guides_for(&self, profile: &SubjectProfile) -> &GuideSet {
        self.find_guide_group(profile)
            .map_or(&self.default_guides, |g| &g.guides)
    }

    pub fn default_guides(&self) -> &GuideSet {
        &self.default_guides
    }

    pub fn tracker_registered(&self, id: &str) -> bool {
        self.trackers.iter().any(|e| e.id == id)
    }

    /// Rebuild a tracker from saved state. An unregistered identifier is a
    /// configuration error, distinct from an absent tracker.
    pub fn load_tracker(
        &self,
        id: &str,
        state: &StateMap,
        guides: &GuideSet,
    ) -> Result<Box<dyn Tracker>, PersistError> {
        let entry = self
            .trackers
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| PersistError::UnknownTracker(id.to_string()))?;
        (entry.load)(state, guides, self)
    }

    /// Rebuild a hosted child from saved state.
    pub fn load_hosted(
        &self,
        kind: HostKind,
        id: &str,
        state: &StateMap,
        guides: &GuideSet,
    ) -> Result<Box<dyn Hosted>, PersistError> {
        let entry = self
            .hosted
            .iter()
            .find(|e| e.id == id && e.kind == kind)
            .ok_or_else(|| PersistError::UnknownHosted(id.to_string()))?;
        (entry.load)(state, guides)
    }
}
