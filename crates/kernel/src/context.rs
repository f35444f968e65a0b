use tempora_common::Tick;

use crate::clock::{Clock, ClockSnapshot};
use crate::config::KernelConfig;
use crate::gate::ModeGate;
use crate::mode::{RewindMode, RewindState};
use crate::rewind::RewindPhaseState;
use crate::time_scale::TimeScaleState;

/// All kernel singletons, owned by the scheduler and passed explicitly to
/// each stage. Each field has exactly one writer per update.
#[derive(Debug, Clone)]
pub struct KernelContext {
    pub config: KernelConfig,
    pub clock: Clock,
    pub time_scale: TimeScaleState,
    pub rewind: RewindState,
    pub phase: RewindPhaseState,
    pub gate: ModeGate,
    cycle: u64,
    last_commit_cycle: Option<u64>,
}

impl KernelContext {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            clock: Clock::new(&config.clock),
            time_scale: TimeScaleState::new(&config.time_scale),
            rewind: RewindState::new(),
            phase: RewindPhaseState::new(),
            gate: ModeGate::with_defaults(),
            config,
            cycle: 0,
            last_commit_cycle: None,
        }
    }

    pub fn tick(&self) -> Tick {
        self.clock.tick()
    }

    pub fn mode(&self) -> RewindMode {
        self.rewind.mode
    }

    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    /// History horizon in ticks, derived from the config.
    pub fn horizon_ticks(&self) -> Tick {
        self.config.horizon_ticks()
    }

    /// False in a multiplayer session: recording, playback and commit are off.
    pub fn history_enabled(&self) -> bool {
        !self.config.multiplayer_session
    }

    /// Start a new scheduler update. Returns its sequence number.
    pub fn begin_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Record that a rewind commit ran in the current update. Returns false
    /// if one already did.
    pub fn note_commit(&mut self) -> bool {
        if self.last_commit_cycle == Some(self.cycle) {
            return false;
        }
        self.last_commit_cycle = Some(self.cycle);
        true
    }
}

impl Default for KernelContext {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}
