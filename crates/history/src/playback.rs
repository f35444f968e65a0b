//! Playback and catch-up restore stage.

use tempora_common::Tick;
use tempora_kernel::{KernelContext, RewindMode};

use crate::rewindable::Rewindable;
use crate::store::RestoreKind;

/// Tick the driver restores to this update, if the mode calls for a restore.
pub fn playback_target(ctx: &KernelContext) -> Option<Tick> {
    match ctx.mode() {
        RewindMode::Record => None,
        RewindMode::Playback => Some(ctx.rewind.playback_tick),
        RewindMode::CatchUp => Some(ctx.tick()),
    }
}

/// Restore every track at `tick`. Returns the number of objects restored.
pub fn restore_all(tracks: &mut [&mut dyn Rewindable], tick: Tick, kind: RestoreKind) -> usize {
    let _span = tracing::debug_span!("restore_all", tick, ?kind).entered();
    tracks
        .iter_mut()
        .map(|track| track.restore(tick, kind))
        .sum()
}
