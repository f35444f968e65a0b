//! Time kernel: authoritative tick clock, time-scale resolution, rewind phase
//! control and mode gating.
//!
//! # Invariants
//! - While recording, the tick never decreases; only a rewind commit moves it
//!   backward, and only once per update.
//! - Time-scale resolution is a pure function of the entry set and the tick.
//! - Rewind phases change only in response to explicit commands.

pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod gate;
pub mod mode;
pub mod rewind;
pub mod time_scale;

pub use clock::{Clock, ClockSnapshot};
pub use command::{CommandQueue, KernelCommand};
pub use config::{ConfigError, KernelConfig};
pub use context::KernelContext;
pub use gate::{GateTransition, ModeGate, SubsystemGroup};
pub use mode::{ModeCommand, RewindMode, RewindState};
pub use rewind::{RewindCommand, RewindPhase, RewindPhaseState};
pub use time_scale::{
    RemoveTarget, ResolvedTimeScale, TimeScaleCommand, TimeScaleEntry, TimeScaleEntryId,
    TimeScaleRequest, TimeScaleScope, TimeScaleSource, TimeScaleState,
};

pub fn crate_info() -> &'static str {
    concat!("tempora-kernel v", env!("CARGO_PKG_VERSION"))
}
