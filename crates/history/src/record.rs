//! Recording stage.

use tempora_common::Tick;
use tempora_kernel::KernelContext;

use crate::rewindable::Rewindable;
use crate::sampling::{RecordBudget, RecordOutcome, SamplingPolicy};

/// Whether the recording stage runs this update.
pub fn should_record(ctx: &KernelContext, ticks_advanced: u32) -> bool {
    ticks_advanced > 0
        && ctx.mode().is_authoring()
        && !ctx.clock.is_paused()
        && ctx.history_enabled()
}

/// Sample every track at `tick`. One budget is shared by all tracks, spent in
/// slice order.
pub fn record_tick(
    tick: Tick,
    tracks: &mut [&mut dyn Rewindable],
    policy: &SamplingPolicy,
) -> RecordOutcome {
    let _span = tracing::debug_span!("record_tick", tick).entered();
    let mut budget = RecordBudget::new(policy.record_budget);
    let mut total = RecordOutcome::default();
    for track in tracks.iter_mut() {
        total += track.record(tick, policy, &mut budget);
    }
    tracing::trace!(
        tick,
        recorded = total.recorded,
        over_budget = total.over_budget,
        "recorded history"
    );
    total
}
