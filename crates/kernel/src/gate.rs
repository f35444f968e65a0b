//! Mode gate: turns dependent subsystem groups on and off by rewind mode.
//!
//! # Invariants
//! - A group's run predicate is a pure function of [`RewindMode`].
//! - The enabled flag is toggled only when the predicate's answer changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mode::RewindMode;

/// A group of consumer systems that share one run condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubsystemGroup {
    Environment,
    Spatial,
    Gameplay,
    CameraInput,
    HandInput,
    Presentation,
    /// A collaborator-defined group.
    Custom(u16),
}

/// Run predicate for a subsystem group.
pub type RunPredicate = fn(RewindMode) -> bool;

/// Runs while authoring or re-simulating, never while replaying.
pub fn runs_outside_playback(mode: RewindMode) -> bool {
    matches!(mode, RewindMode::Record | RewindMode::CatchUp)
}

/// Runs while authoring or replaying, never while re-simulating.
pub fn runs_outside_catch_up(mode: RewindMode) -> bool {
    matches!(mode, RewindMode::Record | RewindMode::Playback)
}

/// A change of a group's enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTransition {
    pub group: SubsystemGroup,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Guard {
    predicate: RunPredicate,
    enabled: bool,
}

/// Set of guards, one per registered group.
#[derive(Debug, Clone)]
pub struct ModeGate {
    guards: BTreeMap<SubsystemGroup, Guard>,
    mode: RewindMode,
}

impl ModeGate {
    /// An empty gate in record mode.
    pub fn new() -> Self {
        Self {
            guards: BTreeMap::new(),
            mode: RewindMode::Record,
        }
    }

    /// The standard groups: environment, spatial, gameplay and both input
    /// groups pause during playback; presentation pauses during catch-up.
    pub fn with_defaults() -> Self {
        let mut gate = Self::new();
        for group in [
            SubsystemGroup::Environment,
            SubsystemGroup::Spatial,
            SubsystemGroup::Gameplay,
            SubsystemGroup::CameraInput,
            SubsystemGroup::HandInput,
        ] {
            gate.register(group, runs_outside_playback);
        }
        gate.register(SubsystemGroup::Presentation, runs_outside_catch_up);
        gate
    }

    /// Register or replace a group's predicate. The flag starts at the
    /// predicate's answer for the gate's current mode.
    pub fn register(&mut self, group: SubsystemGroup, predicate: RunPredicate) {
        let enabled = predicate(self.mode);
        self.guards.insert(group, Guard { predicate, enabled });
    }

    pub fn unregister(&mut self, group: SubsystemGroup) -> bool {
        self.guards.remove(&group).is_some()
    }

    /// Whether a group may run. Unregistered groups always run.
    pub fn is_enabled(&self, group: SubsystemGroup) -> bool {
        self.guards.get(&group).is_none_or(|g| g.enabled)
    }

    pub fn mode(&self) -> RewindMode {
        self.mode
    }

    pub fn groups(&self) -> impl Iterator<Item = (SubsystemGroup, bool)> + '_ {
        self.guards.iter().map(|(group, guard)| (*group, guard.enabled))
    }

    /// Re-evaluate every guard for `mode`, returning the flags that changed.
    pub fn update(&mut self, mode: RewindMode) -> Vec<GateTransition> {
        self.mode = mode;
        let mut transitions = Vec::new();
        for (group, guard) in self.guards.iter_mut() {
            let should_run = (guard.predicate)(mode);
            if should_run != guard.enabled {
                guard.enabled = should_run;
                tracing::debug!(?group, enabled = should_run, ?mode, "subsystem group toggled");
                transitions.push(GateTransition {
                    group: *group,
                    enabled: should_run,
                });
            }
        }
        transitions
    }
}

impl Default for ModeGate {
    fn default() -> Self {
        Self::with_defaults()
    }
}
