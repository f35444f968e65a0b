//! Rewind mode: record, playback or catch-up.
//!
//! Mode changes come only from [`ModeCommand`]s. Playback never looks past
//! the live tick.

use serde::{Deserialize, Serialize};
use tempora_common::Tick;

/// Whether the kernel is authoring new ticks or replaying old ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RewindMode {
    /// Ticks advance and history is written.
    #[default]
    Record,
    /// A historical tick is shown for review; nothing is written.
    Playback,
    /// Live ticks are re-simulated from a restored state without new input.
    CatchUp,
}

impl RewindMode {
    /// True while the clock owns tick advancement.
    pub fn is_authoring(self) -> bool {
        self == RewindMode::Record
    }
}

/// Commands that move the kernel between record, playback and catch-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// Show `tick` for review.
    EnterPlayback { tick: Tick },
    /// Move the playback cursor. Ignored outside playback.
    SetPlaybackTick { tick: Tick },
    /// Re-simulate live ticks up to `target_tick`, then return to record.
    BeginCatchUp { target_tick: Tick },
    ReturnToRecord,
}

/// Singleton rewind-mode state owned by the kernel context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindState {
    pub mode: RewindMode,
    /// Tick shown while in [`RewindMode::Playback`].
    pub playback_tick: Tick,
    /// Tick at which catch-up hands control back to the clock.
    pub catch_up_target: Tick,
}

impl RewindState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a mode command. `present_tick` is the live clock tick; playback
    /// never looks past it. Returns whether the command was honored.
    pub fn apply(&mut self, command: ModeCommand, present_tick: Tick) -> bool {
        match command {
            ModeCommand::EnterPlayback { tick } => {
                self.mode = RewindMode::Playback;
                self.playback_tick = tick.min(present_tick);
            }
            ModeCommand::SetPlaybackTick { tick } => {
                if self.mode != RewindMode::Playback {
                    tracing::debug!(?command, mode = ?self.mode, "ignoring playback seek outside playback");
                    return false;
                }
                self.playback_tick = tick.min(present_tick);
            }
            ModeCommand::BeginCatchUp { target_tick } => {
                if target_tick <= present_tick {
                    tracing::debug!(target_tick, present_tick, "catch-up target already reached");
                    self.mode = RewindMode::Record;
                    return false;
                }
                self.mode = RewindMode::CatchUp;
                self.catch_up_target = target_tick;
            }
            ModeCommand::ReturnToRecord => {
                self.mode = RewindMode::Record;
            }
        }
        tracing::debug!(mode = ?self.mode, "rewind mode changed");
        true
    }
}
