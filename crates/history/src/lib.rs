//! Tick-stamped history: per-object sample rings, composite snapshot records,
//! importance-weighted recording, playback and rewind commit, and the
//! per-update [`Timeline`] scheduler that drives them.
//!
//! # Invariants
//! - Ticks within a ring or snapshot store are strictly increasing. Writing at
//!   tick `t` first discards everything at or after `t`.
//! - No sample older than `tick - horizon` survives a recording pass.
//! - At most `record_budget` samples are written per tick, across all stores.
//! - History is only written in record mode and only read back in playback,
//!   catch-up or commit.

pub mod commit;
pub mod live;
pub mod playback;
pub mod record;
pub mod rewindable;
pub mod ring;
pub mod sampling;
pub mod snapshot;
pub mod store;
pub mod timeline;

pub use commit::commit_preview;
pub use live::LiveState;
pub use playback::{playback_target, restore_all};
pub use record::{record_tick, should_record};
pub use rewindable::{Rewindable, SnapshotHistory, SnapshotSource, SnapshotTrack, TrackedState};
pub use ring::{HistoryRing, HistorySample};
pub use sampling::{Importance, RecordBudget, RecordOutcome, SamplingPolicy};
pub use snapshot::{SnapshotError, SnapshotReader, SnapshotWriter, TickSnapshotStore};
pub use store::{HistoryError, HistoryStats, HistoryStore, RestoreKind, TrackOptions};
pub use timeline::{Timeline, TimelineSummary, UpdateReport};

pub fn crate_info() -> &'static str {
    concat!("tempora-history v", env!("CARGO_PKG_VERSION"))
}
