//! Rewind committer: makes a previewed past tick the live present.

use tempora_common::Tick;
use tempora_kernel::KernelContext;

use crate::rewindable::Rewindable;
use crate::store::RestoreKind;

/// Apply a pending commit, if any. Returns the tick committed to.
///
/// Restores every track at the preview tick, drops history newer than it,
/// moves the clock there and closes the rewind session. In a multiplayer
/// session the session is closed without touching state or the clock.
///
/// At most one commit may run per [`KernelContext::begin_cycle`]; a second
/// one trips a debug assertion.
pub fn commit_preview(ctx: &mut KernelContext, tracks: &mut [&mut dyn Rewindable]) -> Option<Tick> {
    let target = ctx.phase.pending_commit()?;
    let _span = tracing::info_span!("commit_preview", target).entered();

    if !ctx.history_enabled() {
        tracing::warn!(target, "rewind commit blocked in multiplayer session");
        ctx.phase.finish_commit(&mut ctx.time_scale);
        return None;
    }

    let first = ctx.note_commit();
    debug_assert!(first, "rewind committed twice in one update");

    let from = ctx.tick();
    let mut restored = 0;
    for track in tracks.iter_mut() {
        restored += track.restore(target, RestoreKind::Commit);
        track.truncate_after(target);
    }
    ctx.clock.overwrite_tick(target);
    ctx.phase.finish_commit(&mut ctx.time_scale);

    tracing::info!(from, to = target, restored, tracks = tracks.len(), "committed rewind");
    Some(target)
}
