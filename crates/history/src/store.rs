//! Per-object history store.
//!
//! One [`HistoryStore`] holds the rings for one value type across every
//! tracked object, keyed by [`EntityId`]. Objects are visited in id order, so
//! budget decisions are reproducible between runs.

use std::collections::BTreeMap;

use tempora_common::{EntityId, Interpolate, Tick};

use crate::live::LiveState;
use crate::ring::HistoryRing;
use crate::sampling::{Importance, RecordBudget, RecordOutcome, SamplingPolicy};

/// Errors from registering objects for tracking.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history store '{store}' is full ({capacity} tracked objects)")]
    CapacityExceeded { store: String, capacity: usize },
    #[error("entity {0} is already tracked")]
    AlreadyTracked(EntityId),
}

/// Why state is being restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreKind {
    /// Rewind commit: every tracked object, nearest sample, no blending.
    Commit,
    /// Playback or catch-up: playback-enabled objects, blended if requested.
    Playback,
}

/// How one object is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOptions {
    pub importance: Importance,
    /// Retention override in ticks. `None` uses the policy horizon.
    pub horizon_ticks: Option<Tick>,
    /// Restore this object during playback and catch-up.
    pub playback: bool,
    /// Blend bracketing samples during playback when the store supports it.
    pub interpolate: bool,
}

impl TrackOptions {
    pub fn new(importance: Importance) -> Self {
        Self {
            importance,
            ..Self::default()
        }
    }

    pub fn with_horizon(mut self, ticks: Tick) -> Self {
        self.horizon_ticks = Some(ticks);
        self
    }

    pub fn without_playback(mut self) -> Self {
        self.playback = false;
        self
    }

    pub fn interpolated(mut self) -> Self {
        self.interpolate = true;
        self
    }
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            importance: Importance::Normal,
            horizon_ticks: None,
            playback: true,
            interpolate: false,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedObject<T> {
    ring: HistoryRing<T>,
    options: TrackOptions,
    last_sampled: Option<Tick>,
}

/// Summary numbers for inspection output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub tracked: usize,
    pub samples: usize,
    pub oldest_tick: Option<Tick>,
    pub newest_tick: Option<Tick>,
}

impl HistoryStats {
    /// Fold another store's stats into these.
    pub fn merge(&mut self, other: HistoryStats) {
        self.tracked += other.tracked;
        self.samples += other.samples;
        self.oldest_tick = match (self.oldest_tick, other.oldest_tick) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.newest_tick = match (self.newest_tick, other.newest_tick) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

type BlendFn<T> = fn(&T, &T, f32) -> T;

/// History rings for one value type, one ring per tracked object.
#[derive(Debug, Clone)]
pub struct HistoryStore<T> {
    label: String,
    objects: BTreeMap<EntityId, TrackedObject<T>>,
    max_tracked: usize,
    blend: Option<BlendFn<T>>,
}

impl<T: Clone> HistoryStore<T> {
    pub fn new(label: impl Into<String>, max_tracked: usize) -> Self {
        Self {
            label: label.into(),
            objects: BTreeMap::new(),
            max_tracked,
            blend: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Start tracking `id`.
    pub fn track(&mut self, id: EntityId, options: TrackOptions) -> Result<(), HistoryError> {
        if self.objects.contains_key(&id) {
            return Err(HistoryError::AlreadyTracked(id));
        }
        if self.objects.len() >= self.max_tracked {
            return Err(HistoryError::CapacityExceeded {
                store: self.label.clone(),
                capacity: self.max_tracked,
            });
        }
        self.objects.insert(
            id,
            TrackedObject {
                ring: HistoryRing::new(),
                options,
                last_sampled: None,
            },
        );
        tracing::debug!(store = %self.label, %id, importance = ?options.importance, "tracking object");
        Ok(())
    }

    /// Stop tracking `id` and drop its history.
    pub fn untrack(&mut self, id: EntityId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn ring(&self, id: EntityId) -> Option<&HistoryRing<T>> {
        self.objects.get(&id).map(|o| &o.ring)
    }

    pub fn last_sampled(&self, id: EntityId) -> Option<Tick> {
        self.objects.get(&id).and_then(|o| o.last_sampled)
    }

    /// Recorded value for `id` as of `tick`, for previews.
    pub fn value_at(&self, id: EntityId, tick: Tick) -> Option<&T> {
        self.ring(id)?.nearest_or_earliest(tick).map(|s| &s.value)
    }

    /// Sample every due object at `tick`, spending one unit of `budget` per
    /// sample. Objects past the budget keep their previous sample.
    ///
    /// Every ring is pruned to its horizon on each pass, sampled or not, so a
    /// rarely sampled or budget-starved object may be left with no history.
    pub fn record(
        &mut self,
        tick: Tick,
        live: &impl LiveState<T>,
        policy: &SamplingPolicy,
        budget: &mut RecordBudget,
    ) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        for (id, object) in self.objects.iter_mut() {
            let horizon = object.options.horizon_ticks.unwrap_or(policy.horizon_ticks);
            object.ring.prune_older_than(tick.saturating_sub(horizon));

            if !policy.is_due(object.options.importance, object.last_sampled, tick) {
                outcome.not_due += 1;
                continue;
            }
            if budget.is_exhausted() {
                outcome.over_budget += 1;
                continue;
            }
            let Some(value) = live.capture(*id) else {
                outcome.missing += 1;
                continue;
            };
            budget.try_spend();
            object.ring.push(tick, value);
            object.last_sampled = Some(tick);
            outcome.recorded += 1;
        }
        outcome
    }

    /// Overwrite live state from history at `tick`. Returns how many objects
    /// were restored; objects without any samples are left alone.
    pub fn restore(&self, tick: Tick, live: &mut impl LiveState<T>, kind: RestoreKind) -> usize {
        let mut restored = 0;
        for (id, object) in &self.objects {
            if kind == RestoreKind::Playback && !object.options.playback {
                continue;
            }
            let value = match (kind, self.blend) {
                (RestoreKind::Playback, Some(blend)) if object.options.interpolate => {
                    object.ring.blended(tick as f64, blend)
                }
                _ => object.ring.nearest_or_earliest(tick).map(|s| s.value.clone()),
            };
            if let Some(value) = value {
                live.restore(*id, value);
                restored += 1;
            }
        }
        restored
    }

    /// Discard every sample newer than `tick`.
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        let mut dropped = 0;
        for object in self.objects.values_mut() {
            dropped += object.ring.truncate_after(tick);
            object.last_sampled = object.ring.newest().map(|s| s.tick);
        }
        dropped
    }

    pub fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats {
            tracked: self.objects.len(),
            ..HistoryStats::default()
        };
        for object in self.objects.values() {
            stats.samples += object.ring.len();
            stats.merge(HistoryStats {
                tracked: 0,
                samples: 0,
                oldest_tick: object.ring.oldest().map(|s| s.tick),
                newest_tick: object.ring.newest().map(|s| s.tick),
            });
        }
        stats
    }
}

impl<T: Clone + Interpolate> HistoryStore<T> {
    /// Enable blending for objects tracked with [`TrackOptions::interpolated`].
    pub fn with_interpolation(mut self) -> Self {
        let blend: BlendFn<T> = |a, b, t| a.interpolate(b, t);
        self.blend = Some(blend);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tempora_common::Transform;

    fn ids(n: u128) -> Vec<EntityId> {
        (1..=n).map(EntityId::from_raw).collect()
    }

    fn hero_policy(horizon_ticks: Tick, record_budget: usize) -> SamplingPolicy {
        SamplingPolicy {
            base_interval: 1,
            horizon_ticks,
            record_budget,
        }
    }

    fn setup(n: u128, importance: Importance) -> (HistoryStore<f32>, BTreeMap<EntityId, f32>) {
        let mut store = HistoryStore::new("scalar", 64);
        let mut live = BTreeMap::new();
        for id in ids(n) {
            store.track(id, TrackOptions::new(importance)).unwrap();
            live.insert(id, 0.0);
        }
        (store, live)
    }

    #[test]
    fn duplicate_tracking_rejected() {
        let mut store: HistoryStore<f32> = HistoryStore::new("scalar", 4);
        let id = EntityId::from_raw(1);
        store.track(id, TrackOptions::default()).unwrap();
        assert!(matches!(
            store.track(id, TrackOptions::default()),
            Err(HistoryError::AlreadyTracked(_))
        ));
    }

    #[test]
    fn capacity_ceiling_enforced() {
        let mut store: HistoryStore<f32> = HistoryStore::new("scalar", 2);
        store.track(EntityId::from_raw(1), TrackOptions::default()).unwrap();
        store.track(EntityId::from_raw(2), TrackOptions::default()).unwrap();
        assert!(matches!(
            store.track(EntityId::from_raw(3), TrackOptions::default()),
            Err(HistoryError::CapacityExceeded { capacity: 2, .. })
        ));
    }

    #[test]
    fn budget_skips_excess_objects() {
        let (mut store, mut live) = setup(8, Importance::Hero);
        let policy = hero_policy(100, 5);

        let first = store.record(1, &live, &policy, &mut RecordBudget::new(100));
        assert_eq!(first.recorded, 8);

        for value in live.values_mut() {
            *value = 2.0;
        }
        let second = store.record(2, &live, &policy, &mut RecordBudget::new(5));
        assert_eq!(second.recorded, 5);
        assert_eq!(second.over_budget, 3);

        let all = ids(8);
        for id in &all[..5] {
            assert_eq!(store.last_sampled(*id), Some(2));
        }
        for id in &all[5..] {
            assert_eq!(store.last_sampled(*id), Some(1));
            assert_eq!(store.ring(*id).unwrap().newest().unwrap().value, 0.0);
        }
    }

    #[test]
    fn importance_controls_cadence() {
        let mut store = HistoryStore::new("scalar", 8);
        let hero = EntityId::from_raw(1);
        let background = EntityId::from_raw(2);
        store.track(hero, TrackOptions::new(Importance::Hero)).unwrap();
        store.track(background, TrackOptions::new(Importance::Background)).unwrap();
        let live: BTreeMap<_, _> = [(hero, 1.0_f32), (background, 1.0)].into_iter().collect();
        let policy = hero_policy(1000, 100);

        for tick in 1..=30 {
            store.record(tick, &live, &policy, &mut RecordBudget::new(100));
        }
        assert_eq!(store.ring(hero).unwrap().len(), 30);
        // Ticks 1, 11, 21.
        assert_eq!(store.ring(background).unwrap().len(), 3);
    }

    #[test]
    fn pruning_keeps_only_horizon() {
        let (mut store, live) = setup(3, Importance::Hero);
        let policy = hero_policy(10, 100);
        for tick in 1..=100 {
            store.record(tick, &live, &policy, &mut RecordBudget::new(100));
            for id in ids(3) {
                let oldest = store.ring(id).unwrap().oldest().unwrap().tick;
                assert!(oldest >= tick.saturating_sub(10));
            }
        }
    }

    fn assert_within_horizon(store: &HistoryStore<f32>, id: EntityId, tick: Tick, horizon: Tick) {
        if let Some(oldest) = store.ring(id).unwrap().oldest() {
            assert!(
                oldest.tick >= tick.saturating_sub(horizon),
                "tick {tick}: oldest sample {} outside horizon {horizon}",
                oldest.tick
            );
        }
    }

    #[test]
    fn rarely_sampled_object_is_pruned_between_samples() {
        let (mut store, live) = setup(1, Importance::Background);
        let id = EntityId::from_raw(1);
        let policy = hero_policy(5, 10);
        for tick in 1..=9 {
            store.record(tick, &live, &policy, &mut RecordBudget::new(10));
            assert_within_horizon(&store, id, tick, 5);
        }
        assert!(store.ring(id).unwrap().is_empty());
        assert_eq!(store.last_sampled(id), Some(1));

        store.record(11, &live, &policy, &mut RecordBudget::new(10));
        assert_eq!(store.ring(id).unwrap().newest().unwrap().tick, 11);
    }

    #[test]
    fn budget_starved_object_is_still_pruned() {
        let (mut store, live) = setup(2, Importance::Hero);
        let starved = EntityId::from_raw(2);
        let policy = hero_policy(5, 1);
        store.record(1, &live, &policy, &mut RecordBudget::new(2));
        for tick in 2..=50 {
            let outcome = store.record(tick, &live, &policy, &mut RecordBudget::new(1));
            assert_eq!(outcome.over_budget, 1);
            for id in ids(2) {
                assert_within_horizon(&store, id, tick, 5);
            }
        }
        assert!(store.ring(starved).unwrap().is_empty());
    }

    #[test]
    fn per_object_horizon_override() {
        let mut store = HistoryStore::new("scalar", 4);
        let id = EntityId::from_raw(1);
        store
            .track(id, TrackOptions::new(Importance::Hero).with_horizon(3))
            .unwrap();
        let live: BTreeMap<_, _> = [(id, 0.0_f32)].into_iter().collect();
        for tick in 1..=20 {
            store.record(tick, &live, &hero_policy(100, 10), &mut RecordBudget::new(10));
        }
        assert_eq!(store.ring(id).unwrap().oldest().unwrap().tick, 17);
    }

    #[test]
    fn missing_live_state_is_counted_not_recorded() {
        let mut store: HistoryStore<f32> = HistoryStore::new("scalar", 4);
        store.track(EntityId::from_raw(1), TrackOptions::default()).unwrap();
        let live = BTreeMap::new();
        let outcome = store.record(1, &live, &hero_policy(10, 10), &mut RecordBudget::new(10));
        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.recorded, 0);
    }

    #[test]
    fn restore_picks_nearest_sample_at_or_before() {
        let (mut store, mut live) = setup(2, Importance::Hero);
        let policy = hero_policy(100, 10);
        for tick in 1..=10 {
            for value in live.values_mut() {
                *value = tick as f32;
            }
            store.record(tick, &live, &policy, &mut RecordBudget::new(10));
        }
        assert_eq!(store.restore(4, &mut live, RestoreKind::Commit), 2);
        assert!(live.values().all(|v| *v == 4.0));
        // Before any sample: earliest.
        store.restore(0, &mut live, RestoreKind::Commit);
        assert!(live.values().all(|v| *v == 1.0));
    }

    #[test]
    fn playback_skips_objects_without_playback() {
        let mut store = HistoryStore::new("scalar", 4);
        let a = EntityId::from_raw(1);
        let b = EntityId::from_raw(2);
        store.track(a, TrackOptions::new(Importance::Hero)).unwrap();
        store
            .track(b, TrackOptions::new(Importance::Hero).without_playback())
            .unwrap();
        let mut live: BTreeMap<_, _> = [(a, 1.0_f32), (b, 1.0)].into_iter().collect();
        store.record(1, &live, &hero_policy(10, 10), &mut RecordBudget::new(10));
        live.insert(a, 9.0);
        live.insert(b, 9.0);

        assert_eq!(store.restore(1, &mut live, RestoreKind::Playback), 1);
        assert_eq!(live[&a], 1.0);
        assert_eq!(live[&b], 9.0);
        // Commit restores everything.
        assert_eq!(store.restore(1, &mut live, RestoreKind::Commit), 2);
        assert_eq!(live[&b], 1.0);
    }

    #[test]
    fn playback_blends_sparse_samples_when_interpolated() {
        let mut store = HistoryStore::new("transform", 4).with_interpolation();
        let id = EntityId::from_raw(1);
        store
            .track(id, TrackOptions::new(Importance::Background).interpolated())
            .unwrap();
        let mut live = BTreeMap::new();
        let policy = hero_policy(100, 10);
        for tick in 1..=11 {
            live.insert(id, Transform::from_position(Vec3::new(tick as f32, 0.0, 0.0)));
            store.record(tick, &live, &policy, &mut RecordBudget::new(10));
        }
        // Samples at ticks 1 and 11 only.
        assert_eq!(store.ring(id).unwrap().len(), 2);

        store.restore(6, &mut live, RestoreKind::Playback);
        assert_eq!(live[&id].position, Vec3::new(6.0, 0.0, 0.0));

        // Commits never blend.
        store.restore(6, &mut live, RestoreKind::Commit);
        assert_eq!(live[&id].position, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn truncate_resets_last_sampled() {
        let (mut store, live) = setup(1, Importance::Hero);
        let policy = hero_policy(100, 10);
        for tick in 1..=10 {
            store.record(tick, &live, &policy, &mut RecordBudget::new(10));
        }
        let id = EntityId::from_raw(1);
        assert_eq!(store.truncate_after(4), 6);
        assert_eq!(store.last_sampled(id), Some(4));
        let outcome = store.record(5, &live, &policy, &mut RecordBudget::new(10));
        assert_eq!(outcome.recorded, 1);
    }

    #[test]
    fn stats_cover_all_rings() {
        let (mut store, live) = setup(3, Importance::Hero);
        let policy = hero_policy(100, 10);
        for tick in 5..=7 {
            store.record(tick, &live, &policy, &mut RecordBudget::new(10));
        }
        let stats = store.stats();
        assert_eq!(stats.tracked, 3);
        assert_eq!(stats.samples, 9);
        assert_eq!(stats.oldest_tick, Some(5));
        assert_eq!(stats.newest_tick, Some(7));
    }
}
