//! A small scene driven through the timeline: drifting transforms tracked per
//! object, plus a stockpile recorded as one composite snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tempora_common::{EntityId, Transform};
use tempora_history::{
    HistoryStore, Importance, Rewindable, SnapshotError, SnapshotHistory, SnapshotReader,
    SnapshotSource, SnapshotTrack, SnapshotWriter, Timeline, TimelineSummary, TrackOptions,
    TrackedState, UpdateReport,
};
use tempora_kernel::{KernelConfig, RewindMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stockpile {
    pub wood: u32,
    pub stone: u32,
    pub last_delivery: Option<String>,
}

impl SnapshotSource for Stockpile {
    fn write_snapshot(&self, writer: &mut SnapshotWriter<'_>) -> Result<(), SnapshotError> {
        writer.write(self.wood).write(self.stone);
        writer.write_serde(&self.last_delivery)?;
        Ok(())
    }

    fn read_snapshot(&mut self, reader: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.wood = reader.read()?;
        self.stone = reader.read()?;
        self.last_delivery = reader.read_serde()?;
        Ok(())
    }
}

pub struct Scene {
    transforms: HistoryStore<Transform>,
    live: BTreeMap<EntityId, Transform>,
    stockpile_history: SnapshotHistory,
    stockpile: Stockpile,
}

impl Scene {
    pub fn new(config: &KernelConfig, entities: usize) -> anyhow::Result<Self> {
        let mut transforms =
            HistoryStore::new("transforms", config.history.max_tracked_objects).with_interpolation();
        let mut live = BTreeMap::new();
        let importances = [Importance::Hero, Importance::Normal, Importance::Background];
        for i in 0..entities {
            let id = EntityId::new();
            transforms.track(id, TrackOptions::new(importances[i % importances.len()]))?;
            live.insert(
                id,
                Transform::from_position(glam::Vec3::new(i as f32 * 2.0, 0.0, 0.0)),
            );
        }
        Ok(Self {
            transforms,
            live,
            stockpile_history: SnapshotHistory::new(
                "stockpile",
                config.history.snapshot_capacity,
                Importance::High,
            ),
            stockpile: Stockpile::default(),
        })
    }

    /// Simulate one tick of gameplay, if the timeline is authoring.
    fn simulate(&mut self, timeline: &Timeline) {
        if timeline.mode() != RewindMode::Record || timeline.clock_snapshot().is_paused {
            return;
        }
        let tick = timeline.tick();
        for transform in self.live.values_mut() {
            transform.position.z += 0.25;
        }
        if tick % 30 == 0 {
            self.stockpile.wood += 5;
            self.stockpile.stone += 2;
            self.stockpile.last_delivery = Some(format!("caravan@{tick}"));
        }
    }

    pub fn update(&mut self, timeline: &mut Timeline, real_dt: f32) -> UpdateReport {
        self.simulate(timeline);
        let mut transforms = TrackedState::new(&mut self.transforms, &mut self.live);
        let mut stockpile = SnapshotTrack::new(&mut self.stockpile_history, &mut self.stockpile);
        timeline.update(real_dt, &mut [&mut transforms, &mut stockpile])
    }

    pub fn summary(&mut self, timeline: &Timeline) -> TimelineSummary {
        let mut transforms = TrackedState::new(&mut self.transforms, &mut self.live);
        let mut stockpile = SnapshotTrack::new(&mut self.stockpile_history, &mut self.stockpile);
        let tracks: [&mut dyn Rewindable; 2] = [&mut transforms, &mut stockpile];
        timeline.summary(&tracks)
    }

    pub fn stockpile(&self) -> &Stockpile {
        &self.stockpile
    }

    /// Distance travelled by the first tracked object.
    pub fn lead_offset(&self) -> f32 {
        self.live
            .values()
            .next()
            .map(|t| t.position.z)
            .unwrap_or_default()
    }
}
