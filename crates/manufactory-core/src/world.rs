//! Contracts the host world implements for the simulation core.
//!
//! The grid, entity lifecycle, and item placement all belong to the host;
//! the core only sees them through these traits. Every mutation is phrased
//! so that a refusal leaves the world unchanged -- the core's transactions
//! rely on that to guarantee material is never lost or duplicated.

use crate::fixed::Fixed32;
use crate::id::{CellIndex, EntityId, FactionId, MaterialId};
use crate::material::MaterialStack;

/// Physical attributes carried across an entity conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityAttributes {
    /// Remaining durability as a 0..1 fraction of maximum. The host applies
    /// it proportionally to the replacement's own maximum.
    pub durability: Fixed32,
    pub faction: Option<FactionId>,
    pub quality: Option<u8>,
    pub color: Option<[u8; 3]>,
}

impl Default for EntityAttributes {
    fn default() -> Self {
        Self {
            durability: Fixed32::from_num(1),
            faction: None,
            quality: None,
            color: None,
        }
    }
}

/// The host's terrain layer, addressed by flat cell index.
pub trait TerrainGrid {
    /// Material currently placed at a cell. `None` for out-of-bounds cells.
    fn material_at(&self, cell: CellIndex) -> Option<MaterialId>;

    /// Replace the material at a cell. Returns false when the grid refuses
    /// (out of bounds); the cell is then unchanged.
    fn set_material(&mut self, cell: CellIndex, material: MaterialId) -> bool;
}

/// The host's placed-entity layer.
pub trait EntityHost {
    fn is_spawned(&self, entity: EntityId) -> bool;

    /// Material the entity is made of. `None` for unknown/despawned entities.
    fn material_of(&self, entity: EntityId) -> Option<MaterialId>;

    fn attributes_of(&self, entity: EntityId) -> EntityAttributes;

    /// Place a replacement of `material` where `entity` stands, carrying
    /// `attrs`, and destroy the original -- atomically from the core's view.
    /// Returns false when placement is refused; the original must then be
    /// left spawned and untouched, and nothing placed.
    fn try_replace(
        &mut self,
        entity: EntityId,
        material: MaterialId,
        attrs: EntityAttributes,
    ) -> bool;
}

/// The host's loose-item layer, for flushing holdings to the ground.
pub trait Environment {
    /// Place a stack at or near the given origin cell. Returns the part
    /// that could not be placed (the caller keeps ownership of it).
    fn place_near(&mut self, origin: CellIndex, stack: MaterialStack) -> Option<MaterialStack>;
}
