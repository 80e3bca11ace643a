//! Slot-based storage: a capacity-bounded, cell-indexed ledger.
//!
//! Each slot cell holds at most one stack, bounded by the material's stack
//! limit. This is the single storage abstraction for connected production
//! storage; legacy hidden holdings migrate into it once on load.

use crate::id::{CellIndex, MaterialId};
use crate::ledger::ResourceLedger;
use crate::material::MaterialStack;
use crate::registry::MaterialRegistry;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStorage {
    /// The storage's slot cells, fixed at construction.
    slot_cells: Vec<CellIndex>,
    /// Occupied slots. Keys are always members of `slot_cells`.
    slots: BTreeMap<CellIndex, MaterialStack>,
}

impl SlotStorage {
    pub fn new(mut slot_cells: Vec<CellIndex>) -> Self {
        slot_cells.sort_unstable();
        slot_cells.dedup();
        Self {
            slot_cells,
            slots: BTreeMap::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_cells.len()
    }

    pub fn slot_cells(&self) -> &[CellIndex] {
        &self.slot_cells
    }

    /// Rebuild from persisted parts. Stacks at cells outside the slot
    /// layout are re-homed through `insert_stack` rather than dropped.
    pub(crate) fn restore(
        slot_cells: Vec<CellIndex>,
        stacks: Vec<(CellIndex, MaterialStack)>,
        stack_limit_of: impl Fn(MaterialId) -> u32,
    ) -> Self {
        let mut storage = Self::new(slot_cells);
        let mut homeless = Vec::new();
        for (cell, stack) in stacks {
            if stack.is_empty() {
                continue;
            }
            if storage.slot_cells.binary_search(&cell).is_ok()
                && !storage.slots.contains_key(&cell)
            {
                storage.slots.insert(cell, stack);
            } else {
                homeless.push(stack);
            }
        }
        for stack in homeless {
            let limit = stack_limit_of(stack.material);
            if let Some(remainder) = storage.insert_stack(stack, limit) {
                log::warn!(
                    "dropping {} units of {:?} with no slot to restore into",
                    remainder.quantity,
                    remainder.material
                );
            }
        }
        storage
    }

    pub fn free_slot_count(&self) -> usize {
        self.slot_cells.len() - self.slots.len()
    }

    pub fn stack_at(&self, cell: CellIndex) -> Option<&MaterialStack> {
        self.slots.get(&cell)
    }

    /// Iterate occupied slots in cell order.
    pub fn stacks(&self) -> impl Iterator<Item = (CellIndex, &MaterialStack)> {
        self.slots.iter().map(|(&cell, stack)| (cell, stack))
    }

    /// Mutable iteration for per-tick passes over held stacks.
    pub fn stacks_mut(&mut self) -> impl Iterator<Item = (CellIndex, &mut MaterialStack)> {
        self.slots.iter_mut().map(|(&cell, stack)| (cell, stack))
    }

    /// Total quantity of a material across all slots.
    pub fn count_of(&self, material: MaterialId) -> u32 {
        self.slots
            .values()
            .filter(|s| s.material == material)
            .map(|s| s.quantity)
            .sum()
    }

    /// Add `quantity` units of `material`, topping up existing matching
    /// stacks first, then opening new slots. Returns the quantity that did
    /// not fit.
    #[must_use = "overflow count indicates units that did not fit"]
    pub fn fill(&mut self, material: MaterialId, quantity: u32, stack_limit: u32) -> u32 {
        let stack_limit = stack_limit.max(1);
        let mut remaining = quantity;

        // Existing stacks of the same material first.
        for stack in self.slots.values_mut() {
            if remaining == 0 {
                break;
            }
            if stack.material != material || stack.quantity >= stack_limit {
                continue;
            }
            let add = remaining.min(stack_limit - stack.quantity);
            // Fresh units merge in with zero setting progress; the stack's
            // own progress stands (merge keeps the maximum).
            stack.absorb(MaterialStack::new(material, add));
            remaining -= add;
        }

        // Then any open slot cell.
        if remaining > 0 {
            for i in 0..self.slot_cells.len() {
                if remaining == 0 {
                    break;
                }
                let cell = self.slot_cells[i];
                if self.slots.contains_key(&cell) {
                    continue;
                }
                let add = remaining.min(stack_limit);
                self.slots.insert(cell, MaterialStack::new(material, add));
                remaining -= add;
            }
        }

        remaining
    }

    /// Insert a whole stack, preserving its setting progress. Merges onto a
    /// matching stack or takes an open slot. Returns the remainder that did
    /// not fit.
    #[must_use = "the unplaced remainder carries real material"]
    pub fn insert_stack(
        &mut self,
        mut stack: MaterialStack,
        stack_limit: u32,
    ) -> Option<MaterialStack> {
        let stack_limit = stack_limit.max(1);

        for existing in self.slots.values_mut() {
            if stack.is_empty() {
                break;
            }
            if !existing.can_absorb(&stack) || existing.quantity >= stack_limit {
                continue;
            }
            let add = (stack_limit - existing.quantity).min(stack.quantity);
            existing.absorb(stack.split_off(add));
        }

        if !stack.is_empty() {
            for i in 0..self.slot_cells.len() {
                if stack.is_empty() {
                    break;
                }
                let cell = self.slot_cells[i];
                if self.slots.contains_key(&cell) {
                    continue;
                }
                let part = stack.split_off(stack.quantity.min(stack_limit));
                self.slots.insert(cell, part);
            }
        }

        if stack.is_empty() { None } else { Some(stack) }
    }

    pub fn remove_stack(&mut self, cell: CellIndex) -> Option<MaterialStack> {
        self.slots.remove(&cell)
    }

    /// Remove and return every held stack.
    #[must_use = "removed stacks carry real material; drop only deliberately"]
    pub fn take_all(&mut self) -> Vec<MaterialStack> {
        let slots = std::mem::take(&mut self.slots);
        slots.into_values().collect()
    }

    /// Replace the stack at `cell` with a byproduct stack of equal
    /// quantity. Rolls back (original restored, byproduct discarded) when
    /// the byproduct cannot occupy the slot -- its stack limit may be
    /// smaller than the held quantity. Returns true on conversion.
    pub fn convert_stack(
        &mut self,
        cell: CellIndex,
        byproduct: MaterialId,
        byproduct_limit: u32,
    ) -> bool {
        let Some(original) = self.slots.remove(&cell) else {
            return false;
        };
        if original.quantity > byproduct_limit.max(1) {
            self.slots.insert(cell, original);
            return false;
        }
        self.slots
            .insert(cell, MaterialStack::new(byproduct, original.quantity));
        true
    }
}

// ---------------------------------------------------------------------------
// Capacity model
// ---------------------------------------------------------------------------

/// Maximum concurrent output a producer may hold: slot count times the
/// per-unit stack limit when storage is connected, else the flat fallback.
pub fn max_output_capacity(
    storage: Option<&SlotStorage>,
    per_unit_limit: u32,
    fallback: u32,
) -> u32 {
    match storage {
        Some(s) if s.slot_count() > 0 => s.slot_count() as u32 * per_unit_limit.max(1),
        _ => fallback.max(1),
    }
}

// ---------------------------------------------------------------------------
// Legacy migration
// ---------------------------------------------------------------------------

/// Flush legacy hidden holdings into slot storage. One-shot on first load;
/// the caller guards re-runs with a persisted flag. Whatever does not fit
/// stays in the legacy ledger rather than being dropped. Returns the
/// quantity moved.
pub fn migrate_legacy_holdings(
    legacy: &mut ResourceLedger,
    storage: &mut SlotStorage,
    registry: &MaterialRegistry,
) -> u32 {
    let mut moved = 0;
    for stack in legacy.drain() {
        let limit = registry.stack_limit(stack.material);
        let quantity = stack.quantity;
        match storage.insert_stack(stack, limit) {
            None => moved += quantity,
            Some(remainder) => {
                moved += quantity - remainder.quantity;
                legacy.add_stack(remainder);
            }
        }
    }
    moved
}
