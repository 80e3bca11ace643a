use crate::fixed::Ticks;
use crate::id::MaterialId;
use serde::{Serialize, Deserialize};

/// A stack of fungible material with per-stack setting progress.
///
/// `setting_ticks` is meaningful only for materials whose definition carries
/// a setting rule; it stays zero for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStack {
    pub material: MaterialId,
    pub quantity: u32,
    /// Ticks of setting progress accumulated by this stack.
    #[serde(default)]
    pub setting_ticks: Ticks,
}

impl MaterialStack {
    pub fn new(material: MaterialId, quantity: u32) -> Self {
        Self {
            material,
            quantity,
            setting_ticks: 0,
        }
    }

    /// Split `quantity` units off into a new stack. Both halves keep the
    /// same setting progress: setting is a physical property of the whole
    /// unit, so a split never resets or divides it.
    ///
    /// Requests are clamped to the available quantity; splitting off the
    /// full amount leaves this stack empty (quantity 0).
    #[must_use = "the split-off stack carries real material"]
    pub fn split_off(&mut self, quantity: u32) -> MaterialStack {
        let taken = quantity.min(self.quantity);
        self.quantity -= taken;
        MaterialStack {
            material: self.material,
            quantity: taken,
            setting_ticks: self.setting_ticks,
        }
    }

    /// Whether `other` can merge into this stack.
    pub fn can_absorb(&self, other: &MaterialStack) -> bool {
        self.material == other.material
    }

    /// Merge `other` into this stack. Quantities add; setting progress takes
    /// the maximum of the two -- once any part has set, the merged unit
    /// counts as that far along.
    pub fn absorb(&mut self, other: MaterialStack) {
        debug_assert_eq!(self.material, other.material);
        self.quantity += other.quantity;
        self.setting_ticks = self.setting_ticks.max(other.setting_ticks);
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}
