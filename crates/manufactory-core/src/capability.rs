//! Capability traits for production entities.
//!
//! Behavior is composed from interface-typed capabilities rather than a
//! class hierarchy: a concrete producer implements the subset it supports,
//! and collaborators (hauling-task assignment, inspection UI) depend only
//! on the capability they use.

use crate::id::MaterialId;
use crate::material::MaterialStack;
use crate::query::MixerSnapshot;
use crate::registry::MaterialRegistry;

/// Accepts raw resources delivered by hauling collaborators.
pub trait ResourceAcceptor {
    /// How many units of `material` are wanted right now.
    fn demand(&self, material: MaterialId, registry: &MaterialRegistry) -> u32;

    /// Optimistic clamped transfer. Returns false with no side effect when
    /// nothing is accepted; the caller keeps the stack either way.
    fn try_accept(
        &mut self,
        stack: &mut MaterialStack,
        requested: u32,
        registry: &MaterialRegistry,
    ) -> bool;
}

/// Exposes an owned snapshot for inspection collaborators.
pub trait Inspectable {
    fn inspect(&self, registry: &MaterialRegistry) -> MixerSnapshot;
}

impl ResourceAcceptor for crate::mixer::Mixer {
    fn demand(&self, material: MaterialId, registry: &MaterialRegistry) -> u32 {
        crate::mixer::Mixer::demand(self, material, registry)
    }

    fn try_accept(
        &mut self,
        stack: &mut MaterialStack,
        requested: u32,
        registry: &MaterialRegistry,
    ) -> bool {
        self.try_add_ingredient(stack, requested, registry)
    }
}

impl Inspectable for crate::mixer::Mixer {
    fn inspect(&self, registry: &MaterialRegistry) -> MixerSnapshot {
        self.snapshot(registry)
    }
}
