use serde::{Serialize, Deserialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a mixer instance owned by a region.
    pub struct MixerId;
}

/// Identifies a material definition in the registry. Covers both placed
/// terrain materials and entity/stack materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Identifies a material category (e.g. stone chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u16);

/// Flat index of a map cell within a region's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellIndex(pub u32);

/// Host-assigned identifier of a placed entity (wall, furniture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Stable identifier of a world region. Doubles as the phase offset for
/// sampled sweeps so regions don't all sweep on the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

/// Identifies a faction. Opaque to this crate; carried through conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactionId(pub u32);
