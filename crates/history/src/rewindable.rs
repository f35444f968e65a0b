//! Object-safe seam between the scheduler and collaborator-owned state.
//!
//! The scheduler drives a slice of `&mut dyn Rewindable`, one per history
//! store, without knowing the value types involved. Collaborators build the
//! bindings each update from the store they own plus their live state.

use tempora_common::Tick;

use crate::live::LiveState;
use crate::sampling::{Importance, RecordBudget, RecordOutcome, SamplingPolicy};
use crate::snapshot::{SnapshotError, SnapshotReader, SnapshotWriter, TickSnapshotStore};
use crate::store::{HistoryStats, HistoryStore, RestoreKind};

/// Something whose state can be recorded into history and restored from it.
pub trait Rewindable {
    fn label(&self) -> &str;

    /// Record due state at `tick`, spending from the shared budget.
    fn record(&mut self, tick: Tick, policy: &SamplingPolicy, budget: &mut RecordBudget) -> RecordOutcome;

    /// Overwrite live state from history at `tick`. Returns objects restored.
    fn restore(&mut self, tick: Tick, kind: RestoreKind) -> usize;

    /// Discard history newer than `tick`.
    fn truncate_after(&mut self, tick: Tick);

    fn stats(&self) -> HistoryStats;
}

/// A [`HistoryStore`] bound to the live state it mirrors.
pub struct TrackedState<'a, T, S> {
    history: &'a mut HistoryStore<T>,
    live: &'a mut S,
}

impl<'a, T, S> TrackedState<'a, T, S> {
    pub fn new(history: &'a mut HistoryStore<T>, live: &'a mut S) -> Self {
        Self { history, live }
    }
}

impl<T: Clone, S: LiveState<T>> Rewindable for TrackedState<'_, T, S> {
    fn label(&self) -> &str {
        self.history.label()
    }

    fn record(&mut self, tick: Tick, policy: &SamplingPolicy, budget: &mut RecordBudget) -> RecordOutcome {
        self.history.record(tick, &*self.live, policy, budget)
    }

    fn restore(&mut self, tick: Tick, kind: RestoreKind) -> usize {
        self.history.restore(tick, &mut *self.live, kind)
    }

    fn truncate_after(&mut self, tick: Tick) {
        self.history.truncate_after(tick);
    }

    fn stats(&self) -> HistoryStats {
        self.history.stats()
    }
}

/// State that is snapshotted as one composite record rather than field by
/// field (an inventory, a job ticket).
///
/// `read_snapshot` must read fields in exactly the order `write_snapshot`
/// wrote them.
pub trait SnapshotSource {
    fn write_snapshot(&self, writer: &mut SnapshotWriter<'_>) -> Result<(), SnapshotError>;
    fn read_snapshot(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), SnapshotError>;
}

/// Composite-record history: a [`TickSnapshotStore`] plus its cadence.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    label: String,
    store: TickSnapshotStore,
    importance: Importance,
    horizon_ticks: Option<Tick>,
    last_sampled: Option<Tick>,
}

impl SnapshotHistory {
    pub fn new(label: impl Into<String>, capacity: usize, importance: Importance) -> Self {
        Self {
            label: label.into(),
            store: TickSnapshotStore::new(capacity),
            importance,
            horizon_ticks: None,
            last_sampled: None,
        }
    }

    pub fn with_horizon(mut self, ticks: Tick) -> Self {
        self.horizon_ticks = Some(ticks);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn store(&self) -> &TickSnapshotStore {
        &self.store
    }
}

/// A [`SnapshotHistory`] bound to its composite live state.
pub struct SnapshotTrack<'a, S> {
    history: &'a mut SnapshotHistory,
    source: &'a mut S,
}

impl<'a, S> SnapshotTrack<'a, S> {
    pub fn new(history: &'a mut SnapshotHistory, source: &'a mut S) -> Self {
        Self { history, source }
    }
}

impl<S: SnapshotSource> Rewindable for SnapshotTrack<'_, S> {
    fn label(&self) -> &str {
        &self.history.label
    }

    fn record(&mut self, tick: Tick, policy: &SamplingPolicy, budget: &mut RecordBudget) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        let history = &mut *self.history;
        let horizon = history.horizon_ticks.unwrap_or(policy.horizon_ticks);
        history.store.prune_older_than(tick.saturating_sub(horizon));

        if !policy.is_due(history.importance, history.last_sampled, tick) {
            outcome.not_due = 1;
            return outcome;
        }
        if !budget.try_spend() {
            outcome.over_budget = 1;
            return outcome;
        }

        let mut writer = history.store.begin_record(tick);
        match self.source.write_snapshot(&mut writer) {
            Ok(()) => {
                writer.end_record();
                history.last_sampled = Some(tick);
                outcome.recorded = 1;
            }
            Err(error) => {
                tracing::warn!(store = %history.label, tick, %error, "composite snapshot write failed");
                outcome.missing = 1;
            }
        }
        outcome
    }

    fn restore(&mut self, tick: Tick, _kind: RestoreKind) -> usize {
        let Some(mut reader) = self.history.store.nearest_or_earliest(tick) else {
            return 0;
        };
        match self.source.read_snapshot(&mut reader) {
            Ok(()) => 1,
            Err(error) => {
                tracing::warn!(store = %self.history.label, tick, %error, "composite snapshot restore failed");
                0
            }
        }
    }

    fn truncate_after(&mut self, tick: Tick) {
        self.history.store.truncate_after(tick);
        self.history.last_sampled = self.history.store.newest_tick();
    }

    fn stats(&self) -> HistoryStats {
        let store = &self.history.store;
        HistoryStats {
            tracked: 1,
            samples: store.len(),
            oldest_tick: store.oldest_tick(),
            newest_tick: store.newest_tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempora_common::EntityId;

    use crate::store::TrackOptions;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Inventory {
        wood: u32,
        stone: u32,
        owner: String,
    }

    impl SnapshotSource for Inventory {
        fn write_snapshot(&self, writer: &mut SnapshotWriter<'_>) -> Result<(), SnapshotError> {
            writer.write(self.wood).write(self.stone);
            writer.write_serde(&self.owner)?;
            Ok(())
        }

        fn read_snapshot(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
            self.wood = reader.read()?;
            self.stone = reader.read()?;
            self.owner = reader.read_serde()?;
            Ok(())
        }
    }

    fn policy() -> SamplingPolicy {
        SamplingPolicy {
            base_interval: 1,
            horizon_ticks: 100,
            record_budget: 10,
        }
    }

    #[test]
    fn composite_record_and_restore() {
        let mut history = SnapshotHistory::new("inventory", 16, Importance::Hero);
        let mut inv = Inventory {
            wood: 1,
            stone: 2,
            owner: "storehouse".into(),
        };
        for tick in 1..=5 {
            inv.wood = tick as u32 * 10;
            let mut track = SnapshotTrack::new(&mut history, &mut inv);
            assert_eq!(track.record(tick, &policy(), &mut RecordBudget::new(1)).recorded, 1);
        }

        inv = Inventory::default();
        let mut track = SnapshotTrack::new(&mut history, &mut inv);
        assert_eq!(track.restore(3, RestoreKind::Commit), 1);
        assert_eq!(inv.wood, 30);
        assert_eq!(inv.stone, 2);
        assert_eq!(inv.owner, "storehouse");
    }

    #[test]
    fn composite_record_respects_budget() {
        let mut history = SnapshotHistory::new("inventory", 16, Importance::Hero);
        let mut inv = Inventory::default();
        let mut track = SnapshotTrack::new(&mut history, &mut inv);
        let outcome = track.record(1, &policy(), &mut RecordBudget::new(0));
        assert_eq!(outcome.over_budget, 1);
        assert_eq!(track.stats().samples, 0);
    }

    #[test]
    fn composite_is_pruned_when_not_recording() {
        let mut history = SnapshotHistory::new("inventory", 16, Importance::Hero).with_horizon(5);
        let mut inv = Inventory::default();
        let mut track = SnapshotTrack::new(&mut history, &mut inv);
        assert_eq!(track.record(1, &policy(), &mut RecordBudget::new(1)).recorded, 1);
        for tick in 2..=9 {
            assert_eq!(track.record(tick, &policy(), &mut RecordBudget::new(0)).over_budget, 1);
            if let Some(oldest) = track.stats().oldest_tick {
                assert!(oldest >= tick - 5, "tick {tick}: oldest {oldest}");
            }
        }
        assert_eq!(track.stats().samples, 0);
    }

    #[test]
    fn composite_cadence_survives_pruning() {
        let mut history = SnapshotHistory::new("inventory", 16, Importance::Background).with_horizon(3);
        let mut inv = Inventory::default();
        let mut track = SnapshotTrack::new(&mut history, &mut inv);
        assert_eq!(track.record(1, &policy(), &mut RecordBudget::new(1)).recorded, 1);
        for tick in 2..=10 {
            assert_eq!(track.record(tick, &policy(), &mut RecordBudget::new(1)).not_due, 1);
        }
        assert_eq!(track.record(11, &policy(), &mut RecordBudget::new(1)).recorded, 1);
    }

    #[test]
    fn stores_share_one_budget_through_the_trait() {
        let mut scalars = HistoryStore::new("scalar", 8);
        let mut live = BTreeMap::new();
        for raw in 1..=3 {
            let id = EntityId::from_raw(raw);
            scalars.track(id, TrackOptions::new(Importance::Hero)).unwrap();
            live.insert(id, raw as f32);
        }
        let mut history = SnapshotHistory::new("inventory", 16, Importance::Hero);
        let mut inv = Inventory::default();

        let mut budget = RecordBudget::new(3);
        let mut a = TrackedState::new(&mut scalars, &mut live);
        let mut b = SnapshotTrack::new(&mut history, &mut inv);
        let tracks: [&mut dyn Rewindable; 2] = [&mut a, &mut b];
        let mut recorded = 0;
        let mut over = 0;
        for track in tracks {
            let outcome = track.record(1, &policy(), &mut budget);
            recorded += outcome.recorded;
            over += outcome.over_budget;
        }
        assert_eq!(recorded, 3);
        assert_eq!(over, 1);
    }
}
