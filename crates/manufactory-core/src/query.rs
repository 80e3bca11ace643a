//! Read-only query API for inspecting simulation state.
//!
//! Snapshot types aggregate live state into owned views for UI and FFI
//! consumers -- no references into internal storage.

use crate::fixed::Fixed64;
use crate::mixer::IngredientFilter;

/// Fill level of one ingredient bay slot, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLevel {
    pub filter: IngredientFilter,
    pub held: u32,
    pub limit: u32,
}

/// An aggregated, read-only view of a single mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerSnapshot {
    /// Output units currently in connected storage.
    pub stored_output: u32,
    /// Output units in the hidden overflow bay.
    pub overflow_output: u32,
    /// Output units promised by the in-flight batch.
    pub pending_output: u32,
    pub max_capacity: u32,
    pub input_levels: Vec<InputLevel>,
    /// Batch progress as a 0..1 fraction. 0 when idle.
    pub progress: Fixed64,
    pub enabled: bool,
    pub powered: bool,
}
