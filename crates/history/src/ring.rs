use serde::{Deserialize, Serialize};
use tempora_common::{Interpolate, Tick};

/// One recorded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample<T> {
    pub tick: Tick,
    pub value: T,
}

/// Tick-ordered history of one object's value.
///
/// Ticks are strictly increasing by construction: pushing at a tick at or
/// before the newest sample first discards the samples it supersedes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRing<T> {
    samples: Vec<HistorySample<T>>,
}

impl<T> HistoryRing<T> {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[HistorySample<T>] {
        &self.samples
    }

    pub fn oldest(&self) -> Option<&HistorySample<T>> {
        self.samples.first()
    }

    pub fn newest(&self) -> Option<&HistorySample<T>> {
        self.samples.last()
    }

    pub fn push(&mut self, tick: Tick, value: T) {
        let keep = self.samples.partition_point(|s| s.tick < tick);
        self.samples.truncate(keep);
        self.samples.push(HistorySample { tick, value });
    }

    /// Drop samples older than `tick`. Returns how many were dropped.
    pub fn prune_older_than(&mut self, tick: Tick) -> usize {
        let n = self.samples.partition_point(|s| s.tick < tick);
        self.samples.drain(..n);
        n
    }

    /// Drop samples newer than `tick`. Returns how many were dropped.
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        let keep = self.samples.partition_point(|s| s.tick <= tick);
        let dropped = self.samples.len() - keep;
        self.samples.truncate(keep);
        dropped
    }

    /// Newest sample at or before `tick`.
    pub fn at_or_before(&self, tick: Tick) -> Option<&HistorySample<T>> {
        let idx = self.samples.partition_point(|s| s.tick <= tick);
        idx.checked_sub(1).map(|i| &self.samples[i])
    }

    /// Newest sample at or before `tick`, or the oldest sample when all are
    /// newer. `None` only for an empty ring.
    pub fn nearest_or_earliest(&self, tick: Tick) -> Option<&HistorySample<T>> {
        self.at_or_before(tick).or_else(|| self.samples.first())
    }

    /// Samples bracketing `tick`: the newest at or before it and the oldest
    /// after it.
    pub fn bracket(&self, tick: Tick) -> (Option<&HistorySample<T>>, Option<&HistorySample<T>>) {
        let idx = self.samples.partition_point(|s| s.tick <= tick);
        let before = idx.checked_sub(1).map(|i| &self.samples[i]);
        (before, self.samples.get(idx))
    }
}

impl<T: Clone> HistoryRing<T> {
    /// Value at `tick` blended by `blend` between the bracketing samples.
    /// Outside the recorded range the nearest end sample is returned.
    pub fn blended(&self, tick: f64, blend: impl Fn(&T, &T, f32) -> T) -> Option<T> {
        let floor = if tick.is_finite() && tick > 0.0 {
            tick.floor() as Tick
        } else {
            0
        };
        match self.bracket(floor) {
            (Some(a), Some(b)) => {
                let span = (b.tick - a.tick) as f64;
                let t = ((tick - a.tick as f64) / span).clamp(0.0, 1.0) as f32;
                Some(blend(&a.value, &b.value, t))
            }
            (Some(a), None) => Some(a.value.clone()),
            (None, Some(b)) => Some(b.value.clone()),
            (None, None) => None,
        }
    }
}

impl<T: Clone + Interpolate> HistoryRing<T> {
    /// Interpolated value at a fractional tick.
    pub fn sample_interpolated(&self, tick: f64) -> Option<T> {
        self.blended(tick, |a, b, t| a.interpolate(b, t))
    }
}

impl<T> Default for HistoryRing<T> {
    fn default() -> Self {
        Self::new()
    }
}
