//! Time-scale resolution: many requesters, one effective multiplier per tick.
//!
//! # Resolution
//! 1. Entries whose `end_tick < tick` are pruned.
//! 2. Only entries with `start_tick <= tick < end_tick` apply.
//! 3. Any applicable pause entry beats every scale entry.
//! 4. Within a class the highest priority wins; equal priorities go to the
//!    entry inserted last.
//! 5. With nothing applicable the result is scale 1, not paused.

use serde::{Deserialize, Serialize};
use tempora_common::Tick;

use crate::config::TimeScaleConfig;

/// Who asked for a time-scale change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeScaleSource {
    Player,
    Miracle,
    Scenario,
    DevTool,
    Technology,
    System,
    Default,
}

impl TimeScaleSource {
    /// Priority used by `SetSpeed`/`Pause` requests that don't carry one.
    pub fn default_priority(self) -> u8 {
        match self {
            TimeScaleSource::Default => 0,
            TimeScaleSource::Technology => 40,
            TimeScaleSource::Miracle => 50,
            TimeScaleSource::Player => 100,
            TimeScaleSource::Scenario => 150,
            TimeScaleSource::DevTool => 200,
            TimeScaleSource::System => 250,
        }
    }
}

/// Whose simulation an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeScaleScope {
    #[default]
    Global,
    Player(u32),
}

/// Identifier allocated by [`TimeScaleState`] for each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeScaleEntryId(pub u32);

/// One request in the competitive set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeScaleEntry {
    pub id: TimeScaleEntryId,
    pub start_tick: Tick,
    /// Exclusive end. `None` is permanent.
    pub end_tick: Option<Tick>,
    pub scale: f32,
    pub is_pause: bool,
    pub source: TimeScaleSource,
    pub source_id: u32,
    pub priority: u8,
    pub scope: TimeScaleScope,
}

impl TimeScaleEntry {
    pub fn applies_at(&self, tick: Tick) -> bool {
        self.start_tick <= tick && self.end_tick.is_none_or(|end| tick < end)
    }

    fn expired_at(&self, tick: Tick) -> bool {
        self.end_tick.is_some_and(|end| end < tick)
    }
}

/// Parameters of an `AddTimeScaleEntry` command.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeScaleRequest {
    pub scale: f32,
    pub is_pause: bool,
    /// `None` starts at the tick the command is applied.
    pub start_tick: Option<Tick>,
    /// Lifetime in ticks from `start_tick`. `None` is permanent.
    pub duration_ticks: Option<Tick>,
    pub priority: u8,
    pub source: TimeScaleSource,
    pub source_id: u32,
    pub scope: TimeScaleScope,
}

impl TimeScaleRequest {
    pub fn scale(scale: f32, source: TimeScaleSource, source_id: u32, priority: u8) -> Self {
        Self {
            scale,
            is_pause: false,
            start_tick: None,
            duration_ticks: None,
            priority,
            source,
            source_id,
            scope: TimeScaleScope::Global,
        }
    }

    pub fn pause(source: TimeScaleSource, source_id: u32, priority: u8) -> Self {
        Self {
            scale: 0.0,
            is_pause: true,
            ..Self::scale(0.0, source, source_id, priority)
        }
    }

    pub fn starting_at(mut self, tick: Tick) -> Self {
        self.start_tick = Some(tick);
        self
    }

    pub fn lasting(mut self, ticks: Tick) -> Self {
        self.duration_ticks = Some(ticks);
        self
    }

    pub fn scoped(mut self, scope: TimeScaleScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Which entries a remove command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveTarget {
    Id(TimeScaleEntryId),
    Source { source: TimeScaleSource, source_id: u32 },
}

/// Inbound time-scale commands.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeScaleCommand {
    AddEntry(TimeScaleRequest),
    RemoveEntry(RemoveTarget),
    /// Replace any non-pause entry from this source with a permanent scale.
    SetSpeed {
        scale: f32,
        source: TimeScaleSource,
        source_id: u32,
        priority: Option<u8>,
    },
    Pause {
        source: TimeScaleSource,
        source_id: u32,
    },
    Resume {
        source: TimeScaleSource,
        source_id: u32,
    },
}

/// Effective time scale for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTimeScale {
    pub scale: f32,
    pub paused: bool,
    pub winner: Option<TimeScaleEntryId>,
}

impl ResolvedTimeScale {
    pub fn normal() -> Self {
        Self {
            scale: 1.0,
            paused: false,
            winner: None,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

impl Default for ResolvedTimeScale {
    fn default() -> Self {
        Self::normal()
    }
}

/// The competitive set of time-scale entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeScaleState {
    entries: Vec<TimeScaleEntry>,
    next_id: u32,
    min_scale: f32,
    max_scale: f32,
}

impl TimeScaleState {
    pub fn new(config: &TimeScaleConfig) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
        }
    }

    pub fn entries(&self) -> &[TimeScaleEntry] {
        &self.entries
    }

    pub fn get(&self, id: TimeScaleEntryId) -> Option<&TimeScaleEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Apply a command at `current_tick`. Returns the id of a newly created
    /// entry, if any.
    pub fn apply(&mut self, command: TimeScaleCommand, current_tick: Tick) -> Option<TimeScaleEntryId> {
        match command {
            TimeScaleCommand::AddEntry(request) => Some(self.insert(request, current_tick)),
            TimeScaleCommand::RemoveEntry(target) => {
                let removed = self.remove(target);
                if removed == 0 {
                    tracing::debug!(?target, "remove matched no time-scale entry");
                }
                None
            }
            TimeScaleCommand::SetSpeed {
                scale,
                source,
                source_id,
                priority,
            } => {
                self.entries
                    .retain(|e| e.is_pause || e.source != source || e.source_id != source_id);
                let priority = priority.unwrap_or_else(|| source.default_priority());
                Some(self.insert(
                    TimeScaleRequest::scale(scale, source, source_id, priority),
                    current_tick,
                ))
            }
            TimeScaleCommand::Pause { source, source_id } => {
                let already = self
                    .entries
                    .iter()
                    .any(|e| e.is_pause && e.source == source && e.source_id == source_id);
                if already {
                    return None;
                }
                Some(self.insert(
                    TimeScaleRequest::pause(source, source_id, source.default_priority()),
                    current_tick,
                ))
            }
            TimeScaleCommand::Resume { source, source_id } => {
                self.entries
                    .retain(|e| !(e.is_pause && e.source == source && e.source_id == source_id));
                None
            }
        }
    }

    /// Insert an entry and return its id.
    pub fn insert(&mut self, request: TimeScaleRequest, current_tick: Tick) -> TimeScaleEntryId {
        let id = TimeScaleEntryId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let start_tick = request.start_tick.unwrap_or(current_tick);
        let end_tick = request.duration_ticks.map(|d| start_tick.saturating_add(d));
        // Single-session: there is no per-player authority, so player-scoped
        // requests act globally.
        let scope = match request.scope {
            TimeScaleScope::Player(player) => {
                tracing::trace!(player, "coercing player-scoped time-scale entry to global");
                TimeScaleScope::Global
            }
            TimeScaleScope::Global => TimeScaleScope::Global,
        };

        let entry = TimeScaleEntry {
            id,
            start_tick,
            end_tick,
            scale: request.scale,
            is_pause: request.is_pause,
            source: request.source,
            source_id: request.source_id,
            priority: request.priority,
            scope,
        };
        tracing::debug!(
            id = id.0,
            source = ?entry.source,
            priority = entry.priority,
            scale = entry.scale,
            pause = entry.is_pause,
            "time-scale entry added"
        );
        self.entries.push(entry);
        id
    }

    /// Remove matching entries. Returns how many were removed.
    pub fn remove(&mut self, target: RemoveTarget) -> usize {
        let before = self.entries.len();
        match target {
            RemoveTarget::Id(id) => self.entries.retain(|e| e.id != id),
            RemoveTarget::Source { source, source_id } => self
                .entries
                .retain(|e| e.source != source || e.source_id != source_id),
        }
        before - self.entries.len()
    }

    /// Prune expired entries, then resolve the effective scale at `tick`.
    pub fn resolve(&mut self, tick: Tick) -> ResolvedTimeScale {
        self.prune(tick);
        self.evaluate(tick)
    }

    /// Drop entries whose exclusive end lies before `tick`.
    pub fn prune(&mut self, tick: Tick) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.expired_at(tick));
        before - self.entries.len()
    }

    /// Resolve without mutating the entry set.
    pub fn evaluate(&self, tick: Tick) -> ResolvedTimeScale {
        let mut pause: Option<&TimeScaleEntry> = None;
        let mut scale: Option<&TimeScaleEntry> = None;

        for entry in self.entries.iter().filter(|e| e.applies_at(tick)) {
            let slot = if entry.is_pause { &mut pause } else { &mut scale };
            if slot.is_none_or(|best| entry.priority >= best.priority) {
                *slot = Some(entry);
            }
        }

        if let Some(winner) = pause {
            return ResolvedTimeScale {
                scale: 0.0,
                paused: true,
                winner: Some(winner.id),
            };
        }
        match scale {
            Some(winner) if winner.scale.is_nan() || winner.scale <= 0.0 => ResolvedTimeScale {
                scale: 0.0,
                paused: true,
                winner: Some(winner.id),
            },
            Some(winner) => ResolvedTimeScale {
                scale: winner.scale.clamp(self.min_scale, self.max_scale),
                paused: false,
                winner: Some(winner.id),
            },
            None => ResolvedTimeScale::normal(),
        }
    }
}

impl Default for TimeScaleState {
    fn default() -> Self {
        Self::new(&TimeScaleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TimeScaleState {
        TimeScaleState::default()
    }

    #[test]
    fn empty_set_resolves_to_normal() {
        let mut s = state();
        let r = s.resolve(0);
        assert_eq!(r.scale, 1.0);
        assert!(!r.paused);
        assert!(r.winner.is_none());
    }

    #[test]
    fn higher_priority_scale_wins() {
        let mut s = state();
        let player = s.insert(
            TimeScaleRequest::scale(0.5, TimeScaleSource::Player, 1, 100).starting_at(0),
            0,
        );
        s.insert(
            TimeScaleRequest::scale(2.0, TimeScaleSource::Miracle, 7, 50).starting_at(0),
            0,
        );
        let r = s.resolve(10);
        assert_eq!(r.scale, 0.5);
        assert!(!r.paused);
        assert_eq!(r.winner, Some(player));
    }

    #[test]
    fn pause_beats_higher_priority_scale() {
        let mut s = state();
        s.insert(TimeScaleRequest::pause(TimeScaleSource::System, 0, 10), 0);
        s.insert(TimeScaleRequest::scale(3.0, TimeScaleSource::Player, 1, 200), 0);
        let r = s.resolve(5);
        assert!(r.paused);
        assert_eq!(r.scale, 0.0);
    }

    #[test]
    fn equal_priority_last_inserted_wins() {
        let mut s = state();
        s.insert(TimeScaleRequest::scale(2.0, TimeScaleSource::DevTool, 1, 80), 0);
        let later = s.insert(TimeScaleRequest::scale(3.0, TimeScaleSource::Scenario, 2, 80), 0);
        let r = s.resolve(0);
        assert_eq!(r.winner, Some(later));
        assert_eq!(r.scale, 3.0);
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut s = state();
        s.insert(TimeScaleRequest::scale(2.0, TimeScaleSource::DevTool, 1, 80), 0);
        s.insert(TimeScaleRequest::scale(0.5, TimeScaleSource::Player, 2, 90), 3);
        s.insert(TimeScaleRequest::pause(TimeScaleSource::Scenario, 3, 5).starting_at(20), 0);
        let first = s.resolve(10);
        for _ in 0..5 {
            assert_eq!(s.resolve(10), first);
            assert_eq!(s.evaluate(10), first);
        }
    }

    #[test]
    fn future_entries_are_inert() {
        let mut s = state();
        s.insert(TimeScaleRequest::pause(TimeScaleSource::Scenario, 1, 5).starting_at(20), 0);
        assert!(!s.resolve(19).paused);
        assert!(s.resolve(20).paused);
    }

    #[test]
    fn expired_entries_are_pruned() {
        let mut s = state();
        s.insert(
            TimeScaleRequest::scale(4.0, TimeScaleSource::Miracle, 1, 50).lasting(10),
            0,
        );
        assert_eq!(s.resolve(9).scale, 4.0);
        // end_tick is exclusive: inert at 10 but retained until it lies in the past.
        assert_eq!(s.resolve(10).scale, 1.0);
        assert_eq!(s.entries().len(), 1);
        s.resolve(11);
        assert!(s.entries().is_empty());
    }

    #[test]
    fn set_speed_replaces_previous_speed_from_same_source() {
        let mut s = state();
        let cmd = |scale| TimeScaleCommand::SetSpeed {
            scale,
            source: TimeScaleSource::Player,
            source_id: 1,
            priority: None,
        };
        s.apply(cmd(2.0), 0);
        s.apply(cmd(3.0), 0);
        assert_eq!(s.entries().len(), 1);
        assert_eq!(s.resolve(0).scale, 3.0);
    }

    #[test]
    fn set_speed_keeps_pause_from_same_source() {
        let mut s = state();
        s.apply(
            TimeScaleCommand::Pause {
                source: TimeScaleSource::Player,
                source_id: 1,
            },
            0,
        );
        s.apply(
            TimeScaleCommand::SetSpeed {
                scale: 2.0,
                source: TimeScaleSource::Player,
                source_id: 1,
                priority: None,
            },
            0,
        );
        assert!(s.resolve(0).paused);
    }

    #[test]
    fn pause_and_resume() {
        let mut s = state();
        let pause = TimeScaleCommand::Pause {
            source: TimeScaleSource::Player,
            source_id: 1,
        };
        assert!(s.apply(pause.clone(), 0).is_some());
        assert!(s.apply(pause, 0).is_none());
        assert!(s.resolve(0).paused);

        s.apply(
            TimeScaleCommand::Resume {
                source: TimeScaleSource::Player,
                source_id: 1,
            },
            0,
        );
        assert!(!s.resolve(0).paused);
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut s = state();
        s.insert(TimeScaleRequest::scale(2.0, TimeScaleSource::DevTool, 1, 80), 0);
        s.apply(
            TimeScaleCommand::RemoveEntry(RemoveTarget::Id(TimeScaleEntryId(999))),
            0,
        );
        assert_eq!(s.entries().len(), 1);
    }

    #[test]
    fn remove_by_source() {
        let mut s = state();
        s.insert(TimeScaleRequest::scale(2.0, TimeScaleSource::Miracle, 4, 80), 0);
        s.insert(TimeScaleRequest::pause(TimeScaleSource::Miracle, 4, 80), 0);
        s.insert(TimeScaleRequest::scale(2.0, TimeScaleSource::Miracle, 5, 80), 0);
        let removed = s.remove(RemoveTarget::Source {
            source: TimeScaleSource::Miracle,
            source_id: 4,
        });
        assert_eq!(removed, 2);
        assert_eq!(s.entries().len(), 1);
    }

    #[test]
    fn resolved_scale_is_clamped() {
        let mut s = TimeScaleState::new(&TimeScaleConfig {
            min_scale: 0.25,
            max_scale: 4.0,
        });
        let fast = s.insert(TimeScaleRequest::scale(50.0, TimeScaleSource::DevTool, 1, 10), 0);
        assert_eq!(s.resolve(0).scale, 4.0);
        s.remove(RemoveTarget::Id(fast));
        s.insert(TimeScaleRequest::scale(0.01, TimeScaleSource::DevTool, 1, 10), 0);
        assert_eq!(s.resolve(0).scale, 0.25);
    }

    #[test]
    fn zero_scale_resolves_as_paused() {
        let mut s = state();
        s.insert(TimeScaleRequest::scale(0.0, TimeScaleSource::Scenario, 1, 10), 0);
        assert!(s.resolve(0).paused);
    }

    #[test]
    fn player_scope_coerced_to_global() {
        let mut s = state();
        let id = s.insert(
            TimeScaleRequest::scale(2.0, TimeScaleSource::Player, 1, 100)
                .scoped(TimeScaleScope::Player(3)),
            0,
        );
        assert_eq!(s.get(id).unwrap().scope, TimeScaleScope::Global);
    }
}
