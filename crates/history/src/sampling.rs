use serde::{Deserialize, Serialize};
use tempora_common::Tick;
use tempora_kernel::KernelConfig;

/// How often an object's state is sampled into history, relative to the
/// base sample interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Importance {
    /// Sampled at the base interval.
    Hero,
    High,
    #[default]
    Normal,
    Low,
    /// Sampled at ten times the base interval.
    Background,
}

impl Importance {
    pub fn interval_multiplier(self) -> Tick {
        match self {
            Importance::Hero => 1,
            Importance::High => 2,
            Importance::Normal => 4,
            Importance::Low => 6,
            Importance::Background => 10,
        }
    }
}

/// Sampling cadence and retention shared by every tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    /// Ticks between samples for a [`Importance::Hero`] object.
    pub base_interval: Tick,
    /// Default retention in ticks.
    pub horizon_ticks: Tick,
    /// Maximum samples written per tick across all tracked objects.
    pub record_budget: usize,
}

impl SamplingPolicy {
    pub fn from_config(config: &KernelConfig) -> Self {
        Self {
            base_interval: config.base_sample_interval(),
            horizon_ticks: config.horizon_ticks(),
            record_budget: config.history.record_budget,
        }
    }

    pub fn interval(&self, importance: Importance) -> Tick {
        self.base_interval.max(1) * importance.interval_multiplier()
    }

    /// Whether an object last sampled at `last_sampled` is due at `tick`.
    pub fn is_due(&self, importance: Importance, last_sampled: Option<Tick>, tick: Tick) -> bool {
        match last_sampled {
            None => true,
            Some(last) if last >= tick => false,
            Some(last) => tick - last >= self.interval(importance),
        }
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::from_config(&KernelConfig::default())
    }
}

/// Per-tick allowance of history writes, shared across every tracked store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordBudget {
    remaining: usize,
}

impl RecordBudget {
    pub fn new(limit: usize) -> Self {
        Self { remaining: limit }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Take one write from the budget if any is left.
    pub fn try_spend(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Counts from one recording pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub recorded: usize,
    /// Eligible but skipped because the budget ran out.
    pub over_budget: usize,
    /// Sampled too recently for their importance.
    pub not_due: usize,
    /// Tracked but without live state to capture.
    pub missing: usize,
}

impl std::ops::AddAssign for RecordOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.recorded += rhs.recorded;
        self.over_budget += rhs.over_budget;
        self.not_due += rhs.not_due;
        self.missing += rhs.missing;
    }
}
