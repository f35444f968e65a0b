//! Shared types for the tempora time kernel.
//!
//! # Invariants
//! - `EntityId` ordering is total and stable, so every per-object loop in the
//!   kernel iterates in the same order on every run.
//! - `Tick` is the only unit of authoritative simulation time.

mod interpolate;
mod types;

pub use interpolate::Interpolate;
pub use types::{EntityId, Tick, Transform};
