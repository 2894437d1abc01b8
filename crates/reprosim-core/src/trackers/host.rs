//! Container trackers hosting effects and handlers.
//!
//! A container is a thin registry mapping identifier → live child,
//! delegating the two-phase protocol to each child and aggregating the
//! minimum requested tick. Child add/remove honors the same hook contract
//! the system applies to trackers; requests arrive through the pending
//! queue and are routed here by the system between sub-steps.

use std::any::Any;
use std::collections::BTreeMap;

use reprosim_logic::constants::trackers;

use crate::error::{PersistError, TrackerError};
use crate::events::ReproEvent;
use crate::persist::StateMap;
use crate::registry::Registry;
use crate::settings::Settings;
use crate::simulation::Simulation;
use crate::tracker::{HostKind, Hosted, SimContext, SystemView, Tracker};

impl HostKind {
    pub fn tracker_id(self) -> &'static str {
        match self {
            HostKind::Effects => trackers::EFFECTS,
            HostKind::Handlers => trackers::HANDLERS,
        }
    }

    fn added_event(self, id: &str) -> ReproEvent {
        match self {
            HostKind::Effects => ReproEvent::EffectAdded { id: id.to_string() },
            HostKind::Handlers => ReproEvent::HandlerAdded { id: id.to_string() },
        }
    }

    fn removed_event(self, id: &str) -> ReproEvent {
        match self {
            HostKind::Effects => ReproEvent::EffectRemoved { id: id.to_string() },
            HostKind::Handlers => ReproEvent::HandlerRemoved { id: id.to_string() },
        }
    }
}

pub struct HostContainer {
    kind: HostKind,
    children: BTreeMap<&'static str, Box<dyn Hosted>>,
}

impl HostContainer {
    pub fn new(kind: HostKind) -> Self {
        Self {
            kind,
            children: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> HostKind {
        self.kind
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has(&self, id: &str) -> bool {
        self.children.contains_key(id)
    }

    pub fn child(&self, id: &str) -> Option<&dyn Hosted> {
        self.children.get(id).map(|c| c.as_ref())
    }

    /// Insert a child, running its add hooks. A duplicate identifier is a
    /// deferred-request conflict: logged and dropped, the original child
    /// unchanged.
    pub(crate) fn add_child(&mut self, mut child: Box<dyn Hosted>, ctx: &mut SimContext<'_>) {
        let id = child.id();
        if self.children.contains_key(id) {
            log::warn!(
                "subject {:?}: {} '{}' already present, dropping duplicate add",
                ctx.subject,
                container_noun(self.kind),
                id
            );
            return;
        }
        child.on_adding(ctx);
        self.children.insert(id, child);
        if let Some(c) = self.children.get_mut(id) {
            c.on_added(ctx);
        }
        ctx.notify(self.kind.added_event(id));
    }

    /// Remove a child, running its remove hooks. No-op when absent.
    pub(crate) fn remove_child(&mut self, id: &str, ctx: &mut SimContext<'_>) {
        if let Some(c) = self.children.get_mut(id) {
            c.on_removing(ctx);
        } else {
            return;
        }
        if let Some(mut child) = self.children.remove(id) {
            child.on_removed(ctx);
            ctx.notify(self.kind.removed_event(id));
        }
    }

    pub(crate) fn load(
        kind: HostKind,
        state: &StateMap,
        guides: &reprosim_logic::guide::GuideSet,
        registry: &Registry,
    ) -> Result<Self, PersistError> {
        let mut container = Self::new(kind);
        let listed = state.str_or("children", "")?;
        for id in listed.split(',').filter(|s| !s.is_empty()) {
            let sub = state.sub_map(&format!("{}.", id));
            let child = registry.load_hosted(kind, id, &sub, guides)?;
            container.children.insert(child.id(), child);
        }
        Ok(container)
    }
}

fn container_noun(kind: HostKind) -> &'static str {
    match kind {
        HostKind::Effects => "effect",
        HostKind::Handlers => "handler",
    }
}

impl Tracker for HostContainer {
    fn id(&self) -> &'static str {
        self.kind.tracker_id()
    }

    fn observe(&self, view: &mut SystemView) {
        for child in self.children.values() {
            child.observe(view);
        }
    }

    fn plan_simulation(
        &self,
        sim: &Simulation,
        view: &SystemView,
        settings: &Settings,
    ) -> Option<u64> {
        self.children
            .values()
            .filter_map(|c| c.plan_simulation(sim, view, settings))
            .min()
    }

    fn simulate(
        &mut self,
        ctx: &mut SimContext<'_>,
        sim: &Simulation,
        ticks: u64,
    ) -> Result<(), TrackerError> {
        for child in self.children.values_mut() {
            if let Err(e) = child.simulate(ctx, sim, ticks) {
                log::warn!(
                    "subject {:?}: {} '{}' failed to simulate: {}",
                    ctx.subject,
                    container_noun(self.kind),
                    child.id(),
                    e
                );
            }
        }
        Ok(())
    }

    fn should_save(&self) -> bool {
        !self.children.is_empty()
    }

    fn save_state(&self) -> StateMap {
        let mut state = StateMap::new();
        if self.children.is_empty() {
            return state;
        }
        let ids: Vec<&str> = self.children.keys().copied().collect();
        state.put_str("children", &ids.join(","));
        for (id, child) in &self.children {
            state.merge_prefixed(&format!("{}.", id), &child.save_state());
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
