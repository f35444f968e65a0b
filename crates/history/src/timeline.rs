//! Per-update scheduler.
//!
//! [`Timeline::update`] runs one strictly ordered cycle:
//!
//! 1. drain queued commands into the resolver, phase controller and mode state
//! 2. resolve the time scale at the current tick and publish it to the clock
//! 3. advance the preview scrub cursor
//! 4. apply a pending rewind commit
//! 5. advance the clock (record), or drive it toward the catch-up target
//! 6. re-evaluate the mode gate
//! 7. record history, or restore it for playback and catch-up
//!
//! A cycle that commits does not advance the clock afterwards.

use std::fmt;

use tempora_common::Tick;
use tempora_kernel::{
    ClockSnapshot, CommandQueue, GateTransition, KernelCommand, KernelConfig, KernelContext,
    ModeCommand, ResolvedTimeScale, RewindCommand, RewindMode, RewindPhase, SubsystemGroup,
};

use crate::commit::commit_preview;
use crate::playback::{playback_target, restore_all};
use crate::record::{record_tick, should_record};
use crate::rewindable::Rewindable;
use crate::sampling::{RecordOutcome, SamplingPolicy};
use crate::store::{HistoryStats, RestoreKind};

/// What one update did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Live tick after the update.
    pub tick: Tick,
    pub mode: RewindMode,
    pub resolved: ResolvedTimeScale,
    /// Ticks the live clock moved forward, by stepping or catch-up.
    pub ticks_advanced: u32,
    pub recorded: RecordOutcome,
    pub restored: usize,
    pub committed_tick: Option<Tick>,
    /// Preview cursor while a preview is open.
    pub preview_tick: Option<Tick>,
    pub transitions: Vec<GateTransition>,
}

/// Owns the kernel context and the inbound command queue.
#[derive(Debug, Clone)]
pub struct Timeline {
    ctx: KernelContext,
    queue: CommandQueue,
    policy: SamplingPolicy,
    valve_scale: f32,
}

impl Timeline {
    pub fn new(config: KernelConfig) -> Self {
        let policy = SamplingPolicy::from_config(&config);
        tracing::info!(
            ticks_per_second = config.ticks_per_second(),
            horizon_ticks = policy.horizon_ticks,
            base_interval = policy.base_interval,
            multiplayer = config.multiplayer_session,
            "timeline created"
        );
        Self {
            ctx: KernelContext::new(config),
            queue: CommandQueue::new(),
            policy,
            valve_scale: 1.0,
        }
    }

    /// Queue a command for the next update.
    pub fn submit(&mut self, command: impl Into<KernelCommand>) {
        self.queue.push(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// External throttle on simulation speed, multiplied into the clock's
    /// accumulation. Negative or non-finite values stall the clock.
    pub fn set_valve_scale(&mut self, valve_scale: f32) {
        self.valve_scale = valve_scale;
    }

    pub fn context(&self) -> &KernelContext {
        &self.ctx
    }

    /// Direct access for loaders and tools. Changes bypass the command queue.
    pub fn context_mut(&mut self) -> &mut KernelContext {
        &mut self.ctx
    }

    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    pub fn tick(&self) -> Tick {
        self.ctx.tick()
    }

    pub fn mode(&self) -> RewindMode {
        self.ctx.mode()
    }

    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.ctx.clock_snapshot()
    }

    pub fn phase(&self) -> RewindPhase {
        self.ctx.phase.phase()
    }

    pub fn preview_tick(&self) -> Option<Tick> {
        self.ctx
            .phase
            .phase()
            .is_active()
            .then(|| self.ctx.phase.preview_tick())
    }

    pub fn is_enabled(&self, group: SubsystemGroup) -> bool {
        self.ctx.gate.is_enabled(group)
    }

    /// Run one update over `tracks`.
    pub fn update(&mut self, real_dt: f32, tracks: &mut [&mut dyn Rewindable]) -> UpdateReport {
        let _span = tracing::info_span!("timeline_update", tick = self.ctx.tick()).entered();
        self.ctx.begin_cycle();

        let pending_steps = self.drain_commands();

        let mut resolved = self.resolve();
        self.apply_steps(pending_steps);

        let tps = self.ctx.config.ticks_per_second();
        let horizon = self.ctx.horizon_ticks();
        self.ctx.phase.scrub(real_dt, tps, horizon);

        let committing = self.ctx.phase.pending_commit().is_some();
        let committed_tick = if committing {
            let committed = commit_preview(&mut self.ctx, tracks);
            resolved = self.resolve();
            committed
        } else {
            None
        };

        let mode = self.ctx.mode();
        let mut catch_up_range = None;
        let ticks_advanced = if committing {
            0
        } else {
            match mode {
                RewindMode::Record => self.ctx.clock.advance(mode, real_dt, self.valve_scale),
                RewindMode::CatchUp => {
                    let from = self.ctx.tick();
                    let limit = Tick::from(self.ctx.config.rewind.catch_up_ticks_per_update.max(1));
                    let to = self.ctx.rewind.catch_up_target.min(from.saturating_add(limit));
                    self.ctx.clock.drive_to(to);
                    catch_up_range = Some((from, to));
                    u32::try_from(to.saturating_sub(from)).unwrap_or(u32::MAX)
                }
                RewindMode::Playback => 0,
            }
        };

        let mut transitions = self.ctx.gate.update(mode);

        let mut recorded = RecordOutcome::default();
        let mut restored = 0;
        if should_record(&self.ctx, ticks_advanced) {
            recorded = record_tick(self.ctx.tick(), tracks, &self.policy);
        } else if self.ctx.history_enabled() {
            match (mode, catch_up_range) {
                (RewindMode::CatchUp, Some((from, to))) => {
                    for tick in (from + 1)..=to {
                        restored += restore_all(tracks, tick, RestoreKind::Playback);
                    }
                }
                (RewindMode::Playback, _) => {
                    if let Some(target) = playback_target(&self.ctx) {
                        restored = restore_all(tracks, target, RestoreKind::Playback);
                    }
                }
                _ => {}
            }
        }

        if mode == RewindMode::CatchUp && self.ctx.tick() >= self.ctx.rewind.catch_up_target {
            let present = self.ctx.tick();
            self.ctx.rewind.apply(ModeCommand::ReturnToRecord, present);
            tracing::info!(tick = present, "catch-up complete");
            transitions.extend(self.ctx.gate.update(self.ctx.mode()));
        }

        UpdateReport {
            tick: self.ctx.tick(),
            mode: self.ctx.mode(),
            resolved,
            ticks_advanced,
            recorded,
            restored,
            committed_tick,
            preview_tick: self.preview_tick(),
            transitions,
        }
    }

    /// Inspection summary over the given tracks.
    pub fn summary(&self, tracks: &[&mut dyn Rewindable]) -> TimelineSummary {
        let mut history = HistoryStats::default();
        for track in tracks {
            history.merge(track.stats());
        }
        TimelineSummary {
            clock: self.ctx.clock_snapshot(),
            mode: self.ctx.mode(),
            phase: self.ctx.phase.phase(),
            preview_tick: self.preview_tick(),
            time_scale_entries: self.ctx.time_scale.entries().len(),
            history,
        }
    }

    /// Returns the total of single-step requests found in the queue.
    fn drain_commands(&mut self) -> u32 {
        let mut steps: u32 = 0;
        let tick = self.ctx.tick();
        for command in self.queue.drain() {
            match command {
                KernelCommand::TimeScale(command) => {
                    self.ctx.time_scale.apply(command, tick);
                }
                KernelCommand::Rewind(command) => {
                    if !self.ctx.history_enabled()
                        && matches!(command, RewindCommand::BeginPreview { .. })
                    {
                        tracing::warn!(?command, "rewind preview unavailable in multiplayer session");
                        continue;
                    }
                    self.ctx.phase.apply(command, tick, &mut self.ctx.time_scale);
                }
                KernelCommand::Mode(command) => {
                    if self.ctx.phase.phase().is_active() {
                        tracing::debug!(?command, "ignoring mode command during rewind session");
                        continue;
                    }
                    if !self.ctx.history_enabled() && command != ModeCommand::ReturnToRecord {
                        tracing::warn!(?command, "playback unavailable in multiplayer session");
                        continue;
                    }
                    self.ctx.rewind.apply(command, tick);
                }
                KernelCommand::StepTicks { count } => {
                    if self.ctx.phase.phase().is_active() {
                        tracing::debug!(count, "ignoring step request during rewind session");
                        continue;
                    }
                    steps = steps.saturating_add(count);
                }
            }
        }
        steps
    }

    fn resolve(&mut self) -> ResolvedTimeScale {
        let tick = self.ctx.tick();
        let resolved = self.ctx.time_scale.resolve(tick);
        self.ctx.clock.apply_time_scale(resolved);
        resolved
    }

    fn apply_steps(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        if !self.ctx.clock.request_steps(count) {
            tracing::debug!(count, "ignoring step request while playing");
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

/// Snapshot of timeline state for debug output.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSummary {
    pub clock: ClockSnapshot,
    pub mode: RewindMode,
    pub phase: RewindPhase,
    pub preview_tick: Option<Tick>,
    pub time_scale_entries: usize,
    pub history: HistoryStats,
}

impl fmt::Display for TimelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tick {} ({:?}, speed x{:.2}{})",
            self.clock.tick,
            self.mode,
            self.clock.speed_multiplier,
            if self.clock.is_paused { ", paused" } else { "" }
        )?;
        match self.preview_tick {
            Some(tick) => writeln!(f, "rewind: {:?} at tick {tick}", self.phase)?,
            None => writeln!(f, "rewind: {:?}", self.phase)?,
        }
        writeln!(f, "time-scale entries: {}", self.time_scale_entries)?;
        write!(
            f,
            "history: {} objects, {} samples",
            self.history.tracked, self.history.samples
        )?;
        if let (Some(oldest), Some(newest)) = (self.history.oldest_tick, self.history.newest_tick) {
            write!(f, ", ticks {oldest}..={newest}")?;
        }
        Ok(())
    }
}
