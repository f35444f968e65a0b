//! Fixed-step simulation clock.

use serde::{Deserialize, Serialize};
use tempora_common::Tick;

use crate::config::ClockConfig;
use crate::mode::RewindMode;
use crate::time_scale::ResolvedTimeScale;

/// Floor applied to the speed multiplier while playing.
pub const MIN_PLAYING_SPEED: f32 = 0.01;

/// Read-only view of the clock published to consumers every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub tick: Tick,
    pub fixed_delta: f32,
    pub speed_multiplier: f32,
    pub is_paused: bool,
}

/// The authoritative tick clock.
///
/// While authoring, `tick` never decreases. The only backward move is
/// [`Clock::overwrite_tick`], issued by the rewind committer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    tick: Tick,
    fixed_delta: f32,
    speed_multiplier: f32,
    is_paused: bool,
    is_playing: bool,
    target_tick: Tick,
    accumulator: f32,
    max_steps_per_update: u32,
}

impl Clock {
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            tick: 0,
            fixed_delta: config.fixed_delta,
            speed_multiplier: 1.0,
            is_paused: false,
            is_playing: true,
            target_tick: 0,
            accumulator: 0.0,
            max_steps_per_update: config.max_steps_per_update.max(1),
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn target_tick(&self) -> Tick {
        self.target_tick
    }

    pub fn fixed_delta(&self) -> f32 {
        self.fixed_delta
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            tick: self.tick,
            fixed_delta: self.fixed_delta,
            speed_multiplier: self.speed_multiplier,
            is_paused: self.is_paused,
        }
    }

    /// Publish the resolver's decision for this tick.
    pub fn apply_time_scale(&mut self, resolved: ResolvedTimeScale) {
        self.speed_multiplier = resolved.scale;
        self.is_paused = resolved.paused;
        self.is_playing = !resolved.paused;
    }

    /// Queue `count` single-tick steps. Honored only while paused; the clock
    /// then catches up one tick per update.
    pub fn request_steps(&mut self, count: u32) -> bool {
        if self.is_playing {
            return false;
        }
        self.target_tick = self.target_tick.max(self.tick) + Tick::from(count);
        true
    }

    /// Force the clock onto `tick`. Used by the rewind committer only.
    pub fn overwrite_tick(&mut self, tick: Tick) {
        self.tick = tick;
        self.target_tick = tick;
        self.accumulator = 0.0;
    }

    /// Move the tick on behalf of an external driver (catch-up). Never moves
    /// backward.
    pub fn drive_to(&mut self, tick: Tick) {
        if tick > self.tick {
            self.tick = tick;
            self.target_tick = self.target_tick.max(tick);
        }
    }

    /// Advance the clock for one update. Returns the number of ticks stepped.
    ///
    /// - Outside record mode the accumulator and tick are frozen.
    /// - Not playing: step at most one tick toward `target_tick`.
    /// - Playing: fixed-step accumulation, capped at `max_steps_per_update`,
    ///   residual clamped to one step.
    pub fn advance(&mut self, mode: RewindMode, real_dt: f32, valve_scale: f32) -> u32 {
        if !mode.is_authoring() {
            return 0;
        }

        if !self.is_playing {
            if self.tick < self.target_tick {
                self.tick += 1;
                return 1;
            }
            return 0;
        }

        let real_dt = if real_dt.is_finite() { real_dt.max(0.0) } else { 0.0 };
        let valve = if valve_scale.is_finite() { valve_scale.max(0.0) } else { 0.0 };
        self.accumulator += real_dt * self.speed_multiplier.max(MIN_PLAYING_SPEED) * valve;

        let mut steps = 0;
        while self.accumulator >= self.fixed_delta && steps < self.max_steps_per_update {
            self.accumulator -= self.fixed_delta;
            self.tick += 1;
            steps += 1;
        }
        self.accumulator = self.accumulator.min(self.fixed_delta);

        if steps > 0 {
            self.target_tick = self.target_tick.max(self.tick);
        }
        steps
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(&ClockConfig::default())
    }
}
