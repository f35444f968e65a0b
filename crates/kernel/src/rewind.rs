//! Rewind phase controller: preview scrub, freeze, commit and cancel.
//!
//! Transitions happen only in response to explicit [`RewindCommand`]s.
//! Commands that don't fit the current phase are ignored.

use serde::{Deserialize, Serialize};
use tempora_common::Tick;

use crate::time_scale::{
    RemoveTarget, TimeScaleEntryId, TimeScaleRequest, TimeScaleSource, TimeScaleState,
};

/// `source_id` of the freeze entry the controller places while previewing.
pub const REWIND_FREEZE_SOURCE_ID: u32 = u32::MAX;

/// Priority of the freeze entry; above every source default.
pub const REWIND_FREEZE_PRIORITY: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RewindPhase {
    #[default]
    Inactive,
    ScrubbingPreview,
    FrozenPreview,
    /// Waiting for the committer to apply `preview_tick`.
    CommitPlayback,
}

impl RewindPhase {
    pub fn is_previewing(self) -> bool {
        matches!(self, RewindPhase::ScrubbingPreview | RewindPhase::FrozenPreview)
    }

    pub fn is_active(self) -> bool {
        self != RewindPhase::Inactive
    }
}

/// Inbound rewind commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewindCommand {
    /// Positive speed scrubs backward in time, negative forward.
    BeginPreview { scrub_speed: f32 },
    UpdatePreviewSpeed { scrub_speed: f32 },
    EndScrubPreview,
    CommitFromPreview,
    CancelPreview,
}

/// Singleton rewind session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewindPhaseState {
    phase: RewindPhase,
    present_tick_at_start: Tick,
    preview_tick: Tick,
    scrub_speed: f32,
    scrub_accumulator: f32,
    freeze_entry: Option<TimeScaleEntryId>,
}

impl RewindPhaseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RewindPhase {
        self.phase
    }

    pub fn present_tick_at_start(&self) -> Tick {
        self.present_tick_at_start
    }

    pub fn preview_tick(&self) -> Tick {
        self.preview_tick
    }

    pub fn scrub_speed(&self) -> f32 {
        self.scrub_speed
    }

    /// Oldest tick the preview may reach for a given history horizon.
    pub fn min_tick(&self, horizon_ticks: Tick) -> Tick {
        self.present_tick_at_start.saturating_sub(horizon_ticks)
    }

    /// Apply a command. `current_tick` is the live clock tick. Returns whether
    /// the command was honored.
    pub fn apply(
        &mut self,
        command: RewindCommand,
        current_tick: Tick,
        time_scale: &mut TimeScaleState,
    ) -> bool {
        let honored = match (command, self.phase) {
            (RewindCommand::BeginPreview { scrub_speed }, RewindPhase::Inactive) => {
                self.phase = RewindPhase::ScrubbingPreview;
                self.present_tick_at_start = current_tick;
                self.preview_tick = current_tick;
                self.scrub_speed = sanitize_speed(scrub_speed);
                self.scrub_accumulator = 0.0;
                self.freeze_entry = Some(time_scale.insert(
                    TimeScaleRequest::pause(
                        TimeScaleSource::System,
                        REWIND_FREEZE_SOURCE_ID,
                        REWIND_FREEZE_PRIORITY,
                    ),
                    current_tick,
                ));
                true
            }
            (RewindCommand::UpdatePreviewSpeed { scrub_speed }, RewindPhase::ScrubbingPreview) => {
                self.scrub_speed = sanitize_speed(scrub_speed);
                true
            }
            (RewindCommand::EndScrubPreview, RewindPhase::ScrubbingPreview) => {
                self.phase = RewindPhase::FrozenPreview;
                self.scrub_accumulator = 0.0;
                true
            }
            (RewindCommand::CommitFromPreview, phase) if phase.is_previewing() => {
                self.phase = RewindPhase::CommitPlayback;
                self.scrub_accumulator = 0.0;
                true
            }
            (RewindCommand::CancelPreview, phase) if phase.is_previewing() => {
                self.release_freeze(time_scale);
                self.reset();
                true
            }
            _ => false,
        };

        if honored {
            tracing::debug!(?command, phase = ?self.phase, preview_tick = self.preview_tick, "rewind command applied");
        } else {
            tracing::debug!(?command, phase = ?self.phase, "ignoring rewind command in conflicting phase");
        }
        honored
    }

    /// Advance the scrub cursor for one update. Returns how many ticks the
    /// cursor moved.
    pub fn scrub(&mut self, real_dt: f32, ticks_per_second: f32, horizon_ticks: Tick) -> u64 {
        if self.phase != RewindPhase::ScrubbingPreview || self.scrub_speed == 0.0 {
            return 0;
        }
        let real_dt = if real_dt.is_finite() { real_dt.max(0.0) } else { 0.0 };
        self.scrub_accumulator += real_dt * ticks_per_second * self.scrub_speed.abs();
        if self.scrub_accumulator.is_nan() || self.scrub_accumulator < 1.0 {
            if self.scrub_accumulator.is_nan() {
                self.scrub_accumulator = 0.0;
            }
            return 0;
        }

        // Float-to-int casts saturate, so an infinite accumulator asks for
        // u64::MAX ticks and the clamp below absorbs it.
        let whole = self.scrub_accumulator.floor();
        let requested = whole as u64;
        self.scrub_accumulator = if whole.is_finite() {
            self.scrub_accumulator - whole
        } else {
            0.0
        };

        let backward = self.scrub_speed > 0.0;
        let room = if backward {
            self.preview_tick.saturating_sub(self.min_tick(horizon_ticks))
        } else {
            self.present_tick_at_start.saturating_sub(self.preview_tick)
        };
        let moved = requested.min(room);
        if backward {
            self.preview_tick -= moved;
        } else {
            self.preview_tick += moved;
        }
        if requested >= room {
            // Pinned at a bound: don't bank progress past it.
            self.scrub_accumulator = 0.0;
        }
        if moved > 0 {
            tracing::trace!(preview_tick = self.preview_tick, moved, "scrubbed preview");
        }
        moved
    }

    /// Tick to commit to, while a commit is pending.
    pub fn pending_commit(&self) -> Option<Tick> {
        (self.phase == RewindPhase::CommitPlayback).then_some(self.preview_tick)
    }

    /// Close a processed commit: drop the freeze entry and go inactive.
    pub fn finish_commit(&mut self, time_scale: &mut TimeScaleState) -> Option<Tick> {
        let tick = self.pending_commit()?;
        self.release_freeze(time_scale);
        self.reset();
        Some(tick)
    }

    fn release_freeze(&mut self, time_scale: &mut TimeScaleState) {
        if let Some(id) = self.freeze_entry.take() {
            time_scale.remove(RemoveTarget::Id(id));
        }
    }

    fn reset(&mut self) {
        self.phase = RewindPhase::Inactive;
        self.scrub_speed = 0.0;
        self.scrub_accumulator = 0.0;
    }
}

fn sanitize_speed(speed: f32) -> f32 {
    if speed.is_finite() { speed } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin(state: &mut RewindPhaseState, ts: &mut TimeScaleState, tick: Tick, speed: f32) {
        assert!(state.apply(RewindCommand::BeginPreview { scrub_speed: speed }, tick, ts));
    }

    #[test]
    fn begin_captures_present_and_freezes_time() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 42, 1.0);

        assert_eq!(state.phase(), RewindPhase::ScrubbingPreview);
        assert_eq!(state.present_tick_at_start(), 42);
        assert_eq!(state.preview_tick(), 42);
        assert!(ts.resolve(42).paused);
    }

    #[test]
    fn begin_while_scrubbing_is_ignored() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 10, 1.0);
        assert!(!state.apply(RewindCommand::BeginPreview { scrub_speed: 2.0 }, 99, &mut ts));
        assert_eq!(state.present_tick_at_start(), 10);
        assert_eq!(ts.entries().len(), 1);
    }

    #[test]
    fn positive_speed_scrubs_backward() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 100, 1.0);
        // 0.5s at 10 ticks/s and speed 1 -> five ticks back.
        assert_eq!(state.scrub(0.5, 10.0, 1000), 5);
        assert_eq!(state.preview_tick(), 95);
    }

    #[test]
    fn negative_speed_scrubs_forward_but_not_past_present() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 100, 2.0);
        state.scrub(1.0, 10.0, 1000);
        assert_eq!(state.preview_tick(), 80);

        state.apply(RewindCommand::UpdatePreviewSpeed { scrub_speed: -1.0 }, 100, &mut ts);
        state.scrub(5.0, 10.0, 1000);
        assert_eq!(state.preview_tick(), 100);
    }

    #[test]
    fn scrub_clamps_at_horizon() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 1000, 4.0);
        for _ in 0..100 {
            state.scrub(1.0, 60.0, 300);
            assert!(state.preview_tick() >= 700);
            assert!(state.preview_tick() <= 1000);
        }
        assert_eq!(state.preview_tick(), 700);
    }

    #[test]
    fn huge_scrub_speed_lands_on_horizon_in_one_call() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 1000, 1e6);
        assert_eq!(state.scrub(1.0, 60.0, 300), 300);
        assert_eq!(state.preview_tick(), 700);
        assert_eq!(state.scrub(1.0, 60.0, 300), 0);
        assert_eq!(state.preview_tick(), 700);
    }

    #[test]
    fn infinite_scrub_progress_is_clamped() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 1000, f32::MAX);
        assert_eq!(state.scrub(1000.0, 60.0, 300), 300);
        assert_eq!(state.preview_tick(), 700);

        state.apply(RewindCommand::UpdatePreviewSpeed { scrub_speed: -f32::MAX }, 1000, &mut ts);
        assert_eq!(state.scrub(1000.0, 60.0, 300), 300);
        assert_eq!(state.preview_tick(), 1000);
    }

    #[test]
    fn fractional_progress_carries_between_updates() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 100, 1.0);
        assert_eq!(state.scrub(0.25, 6.0, 1000), 1);
        assert_eq!(state.scrub(0.25, 6.0, 1000), 2);
        assert_eq!(state.preview_tick(), 97);
    }

    #[test]
    fn scrub_clamps_at_zero_for_young_sessions() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 20, 1.0);
        state.scrub(10.0, 60.0, 300);
        assert_eq!(state.preview_tick(), 0);
    }

    #[test]
    fn end_scrub_freezes_cursor() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 100, 1.0);
        state.scrub(0.3, 10.0, 1000);
        assert!(state.apply(RewindCommand::EndScrubPreview, 100, &mut ts));
        assert_eq!(state.phase(), RewindPhase::FrozenPreview);
        let frozen_at = state.preview_tick();
        assert_eq!(state.scrub(5.0, 10.0, 1000), 0);
        assert_eq!(state.preview_tick(), frozen_at);
        // Speed updates only apply while scrubbing.
        assert!(!state.apply(RewindCommand::UpdatePreviewSpeed { scrub_speed: 3.0 }, 100, &mut ts));
    }

    #[test]
    fn cancel_restores_normal_time() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 50, 1.0);
        assert!(state.apply(RewindCommand::CancelPreview, 50, &mut ts));
        assert_eq!(state.phase(), RewindPhase::Inactive);
        let resolved = ts.resolve(50);
        assert!(!resolved.paused);
        assert_eq!(resolved.scale, 1.0);
    }

    #[test]
    fn commit_then_finish() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        begin(&mut state, &mut ts, 100, 1.0);
        state.scrub(1.0, 10.0, 1000);
        assert!(state.apply(RewindCommand::CommitFromPreview, 100, &mut ts));
        assert_eq!(state.pending_commit(), Some(90));

        assert_eq!(state.finish_commit(&mut ts), Some(90));
        assert_eq!(state.phase(), RewindPhase::Inactive);
        assert!(state.pending_commit().is_none());
        assert!(ts.entries().is_empty());
        assert!(state.finish_commit(&mut ts).is_none());
    }

    #[test]
    fn commit_and_cancel_ignored_when_inactive() {
        let mut ts = TimeScaleState::default();
        let mut state = RewindPhaseState::new();
        assert!(!state.apply(RewindCommand::CommitFromPreview, 0, &mut ts));
        assert!(!state.apply(RewindCommand::CancelPreview, 0, &mut ts));
        assert!(!state.apply(RewindCommand::EndScrubPreview, 0, &mut ts));
        assert_eq!(state.phase(), RewindPhase::Inactive);
    }
}
