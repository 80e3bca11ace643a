//! Versioned persistence for region state.
//!
//! Binary serialization via `bitcode` with a magic/version header. The
//! persisted schema keeps the pending-conversion registries as
//! integer-keyed, integer-valued mappings and every counter as a signed
//! integer: loading never rejects malformed values, it clamps them into
//! their valid range. The event bus and scratch buffers are not persisted.

use crate::curing::CuringScheduler;
use crate::fixed::Ticks;
use crate::id::{CellIndex, EntityId, MaterialId, RegionId};
use crate::ledger::ResourceLedger;
use crate::material::MaterialStack;
use crate::mixer::{Mixer, MixerConfig};
use crate::region::Region;
use crate::registry::MaterialRegistry;
use crate::setting::clamp_setting_ticks;
use crate::storage::SlotStorage;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Manufactory region snapshot.
pub const SAVE_MAGIC: u32 = 0x4D46_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SAVE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header carried by every region snapshot. Enables format detection and
/// version checking before trusting the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveHeader {
    pub magic: u32,
    pub version: u32,
    pub tick: i64,
}

impl SaveHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SAVE_MAGIC,
            version: FORMAT_VERSION,
            tick: tick as i64,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SAVE_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persisted schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StackSave {
    material: u32,
    quantity: i64,
    setting_ticks: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StorageSave {
    slot_cells: Vec<u32>,
    slots: Vec<(u32, StackSave)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MixerSave {
    config: MixerConfig,
    input_bay: Vec<StackSave>,
    overflow_bay: Vec<StackSave>,
    storage: Option<StorageSave>,
    ticks_remaining: i64,
    pending_output: i64,
    enabled: bool,
    legacy_migrated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegionSave {
    header: SaveHeader,
    region: u32,
    pending_cells: BTreeMap<u32, i64>,
    pending_entities: BTreeMap<u32, i64>,
    mixers: Vec<MixerSave>,
}

// ---------------------------------------------------------------------------
// Saving
// ---------------------------------------------------------------------------

fn save_stack(stack: &MaterialStack) -> StackSave {
    StackSave {
        material: stack.material.0,
        quantity: stack.quantity as i64,
        setting_ticks: stack.setting_ticks as i64,
    }
}

fn save_mixer(mixer: &Mixer) -> MixerSave {
    MixerSave {
        config: mixer.config().clone(),
        input_bay: mixer.input_bay().stacks().iter().map(save_stack).collect(),
        overflow_bay: mixer
            .overflow_bay()
            .stacks()
            .iter()
            .map(save_stack)
            .collect(),
        storage: mixer.storage().map(|storage| StorageSave {
            slot_cells: storage.slot_cells().iter().map(|c| c.0).collect(),
            slots: storage
                .stacks()
                .map(|(cell, stack)| (cell.0, save_stack(stack)))
                .collect(),
        }),
        ticks_remaining: mixer.ticks_remaining() as i64,
        pending_output: mixer.pending_output() as i64,
        enabled: mixer.is_enabled(),
        legacy_migrated: mixer.legacy_migrated(),
    }
}

/// Serialize a region to bytes.
pub fn save_region(region: &Region) -> Result<Vec<u8>, SerializeError> {
    let save = RegionSave {
        header: SaveHeader::new(region.tick()),
        region: region.id().0,
        pending_cells: region
            .scheduler
            .pending_cells()
            .iter()
            .map(|(&cell, &due)| (cell.0, due as i64))
            .collect(),
        pending_entities: region
            .scheduler
            .pending_entities()
            .iter()
            .map(|(&entity, &due)| (entity.0, due as i64))
            .collect(),
        mixers: region.mixers().values().map(save_mixer).collect(),
    };
    bitcode::serialize(&save).map_err(|e| SerializeError::Encode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_stack(save: &StackSave, registry: &MaterialRegistry) -> Option<MaterialStack> {
    let quantity = save.quantity.max(0) as u32;
    if quantity == 0 {
        return None;
    }
    let material = MaterialId(save.material);
    let mut stack = MaterialStack::new(material, quantity);
    stack.setting_ticks = clamp_setting_ticks(save.setting_ticks, registry.setting_rule(material));
    Some(stack)
}

fn load_ledger(saves: &[StackSave], registry: &MaterialRegistry) -> ResourceLedger {
    let mut ledger = ResourceLedger::new();
    for save in saves {
        if let Some(stack) = load_stack(save, registry) {
            ledger.add_stack(stack);
        }
    }
    ledger
}

fn load_mixer(save: MixerSave, registry: &MaterialRegistry) -> Mixer {
    let storage = save.storage.map(|s| {
        SlotStorage::restore(
            s.slot_cells.into_iter().map(CellIndex).collect(),
            s.slots
                .iter()
                .filter_map(|(cell, stack)| {
                    load_stack(stack, registry).map(|stack| (CellIndex(*cell), stack))
                })
                .collect(),
            |material| registry.stack_limit(material),
        )
    });

    let mut ticks_remaining = save.ticks_remaining.max(0) as Ticks;
    let pending_output = save.pending_output.max(0) as u32;
    // A pending batch with no countdown would never resolve; give it one
    // tick so it completes on the next step.
    if pending_output > 0 && ticks_remaining == 0 {
        ticks_remaining = 1;
    }

    Mixer::restore(
        save.config,
        load_ledger(&save.input_bay, registry),
        load_ledger(&save.overflow_bay, registry),
        storage,
        ticks_remaining,
        pending_output,
        save.enabled,
        save.legacy_migrated,
    )
}

/// Deserialize a region from bytes.
///
/// Malformed integers are clamped into their valid range rather than
/// rejected; only a bad header or undecodable payload is an error. Mixer
/// legacy migration runs here, once, for saves that predate slot storage.
pub fn load_region(data: &[u8], registry: &MaterialRegistry) -> Result<Region, DeserializeError> {
    let save: RegionSave =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    save.header.validate()?;

    let region_id = RegionId(save.region);
    let scheduler = CuringScheduler::restore(
        region_id,
        save.pending_cells
            .iter()
            .map(|(&cell, &due)| (CellIndex(cell), due.max(0) as Ticks))
            .collect(),
        save.pending_entities
            .iter()
            .map(|(&entity, &due)| (EntityId(entity), due.max(0) as Ticks))
            .collect(),
    );

    let mut mixers = SlotMap::with_key();
    for mixer_save in save.mixers {
        let mut mixer = load_mixer(mixer_save, registry);
        mixer.migrate_legacy(registry);
        mixers.insert(mixer);
    }

    Ok(Region::restore(
        region_id,
        scheduler,
        mixers,
        save.header.tick.max(0) as Ticks,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn region_with_state() -> (MaterialRegistry, Region) {
        let registry = concrete_registry();
        let mut grid = TestGrid::default();
        let mut host = TestHost::default();
        let mut region = Region::new(RegionId(3));

        let wet_cell = registry.material_id("wet_concrete").unwrap();
        let wet_wall = registry.material_id("wet_concrete_wall").unwrap();
        grid.place(CellIndex(11), wet_cell);
        host.spawn(EntityId(4), wet_wall);
        region.register_wet_cell(CellIndex(11), &grid, &registry);
        region.register_wet_entity(EntityId(4), &host, &registry);

        let mixer_id = region.add_mixer(Mixer::new(
            concrete_mixer_config(&registry),
            Some(SlotStorage::new((0..4).map(CellIndex).collect())),
        ));
        {
            let mixer = region.mixer_mut(mixer_id).unwrap();
            let fuel = registry.material_id("binder_fuel").unwrap();
            let mut stack = MaterialStack::new(fuel, 9);
            assert!(mixer.try_add_ingredient(&mut stack, 9, &registry));
            let mix = registry.material_id("concrete_mix").unwrap();
            let mut stored = MaterialStack::new(mix, 30);
            stored.setting_ticks = 1_234;
            assert!(
                mixer
                    .storage_mut()
                    .unwrap()
                    .insert_stack(stored, 75)
                    .is_none()
            );
        }

        for _ in 0..10 {
            region.step(&mut grid, &mut host, &registry);
        }
        (registry, region)
    }

    #[test]
    fn round_trip_preserves_all_integers() {
        let (registry, region) = region_with_state();
        let bytes = save_region(&region).unwrap();
        let loaded = load_region(&bytes, &registry).unwrap();

        assert_eq!(loaded.tick(), region.tick());
        assert_eq!(loaded.id(), region.id());
        assert_eq!(
            loaded.scheduler.pending_cells(),
            region.scheduler.pending_cells()
        );
        assert_eq!(
            loaded.scheduler.pending_entities(),
            region.scheduler.pending_entities()
        );
        assert_eq!(loaded.mixer_count(), 1);

        let original = region.mixers().values().next().unwrap();
        let restored = loaded.mixers().values().next().unwrap();
        let fuel = registry.material_id("binder_fuel").unwrap();
        assert_eq!(
            restored.input_bay().count_of(fuel),
            original.input_bay().count_of(fuel)
        );
        assert_eq!(restored.stored_output(), original.stored_output());
        let held = restored.storage().unwrap().stack_at(CellIndex(0)).unwrap();
        assert_eq!(held.setting_ticks, 1_234);
        assert_eq!(restored.ticks_remaining(), original.ticks_remaining());
        assert_eq!(restored.pending_output(), original.pending_output());
    }

    #[test]
    fn negative_values_clamp_on_load() {
        let registry = concrete_registry();
        let save = RegionSave {
            header: SaveHeader::new(0),
            region: 0,
            pending_cells: [(5u32, -100i64)].into_iter().collect(),
            pending_entities: BTreeMap::new(),
            mixers: vec![MixerSave {
                config: concrete_mixer_config(&registry),
                input_bay: vec![StackSave {
                    material: registry.material_id("binder_fuel").unwrap().0,
                    quantity: -3,
                    setting_ticks: 0,
                }],
                overflow_bay: vec![StackSave {
                    material: registry.material_id("concrete_mix").unwrap().0,
                    quantity: 10,
                    setting_ticks: 999_999,
                }],
                storage: None,
                ticks_remaining: -50,
                pending_output: -2,
                enabled: true,
                legacy_migrated: true,
            }],
        };
        let bytes = bitcode::serialize(&save).unwrap();
        let region = load_region(&bytes, &registry).unwrap();

        // Negative due tick clamps to zero (cures at the next sweep).
        assert_eq!(
            region.scheduler.pending_cells().get(&CellIndex(5)),
            Some(&0)
        );
        let mixer = region.mixers().values().next().unwrap();
        assert_eq!(mixer.ticks_remaining(), 0);
        assert_eq!(mixer.pending_output(), 0);
        // Negative-quantity stack dropped entirely.
        assert!(mixer.input_bay().is_empty());
        // Oversized setting counter clamps to the rule duration.
        let mix = registry.material_id("concrete_mix").unwrap();
        let duration = registry.setting_rule(mix).unwrap().duration;
        assert_eq!(
            mixer.overflow_bay().stacks()[0].setting_ticks,
            duration
        );
    }

    #[test]
    fn pending_without_countdown_gets_one_tick() {
        let registry = concrete_registry();
        let save = RegionSave {
            header: SaveHeader::new(7),
            region: 0,
            pending_cells: BTreeMap::new(),
            pending_entities: BTreeMap::new(),
            mixers: vec![MixerSave {
                config: concrete_mixer_config(&registry),
                input_bay: vec![],
                overflow_bay: vec![],
                storage: None,
                ticks_remaining: 0,
                pending_output: 20,
                enabled: true,
                legacy_migrated: true,
            }],
        };
        let bytes = bitcode::serialize(&save).unwrap();
        let region = load_region(&bytes, &registry).unwrap();
        let mixer = region.mixers().values().next().unwrap();
        assert_eq!(mixer.pending_output(), 20);
        assert_eq!(mixer.ticks_remaining(), 1);
    }

    #[test]
    fn legacy_holdings_migrate_once_on_load() {
        let registry = concrete_registry();
        let mix = registry.material_id("concrete_mix").unwrap();
        let save = RegionSave {
            header: SaveHeader::new(0),
            region: 0,
            pending_cells: BTreeMap::new(),
            pending_entities: BTreeMap::new(),
            mixers: vec![MixerSave {
                config: concrete_mixer_config(&registry),
                input_bay: vec![],
                overflow_bay: vec![StackSave {
                    material: mix.0,
                    quantity: 40,
                    setting_ticks: 100,
                }],
                storage: Some(StorageSave {
                    slot_cells: vec![0, 1, 2, 3],
                    slots: vec![],
                }),
                ticks_remaining: 0,
                pending_output: 0,
                enabled: true,
                legacy_migrated: false,
            }],
        };
        let bytes = bitcode::serialize(&save).unwrap();
        let region = load_region(&bytes, &registry).unwrap();
        let mixer = region.mixers().values().next().unwrap();

        // Hidden legacy mix moved into slot storage, progress intact.
        assert_eq!(mixer.overflow_output(), 0);
        assert_eq!(mixer.stored_output(), 40);
        assert!(mixer.legacy_migrated());
        assert_eq!(
            mixer.storage().unwrap().stack_at(CellIndex(0)).unwrap().setting_ticks,
            100
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let registry = concrete_registry();
        let save = RegionSave {
            header: SaveHeader {
                magic: 0xDEAD_BEEF,
                version: FORMAT_VERSION,
                tick: 0,
            },
            region: 0,
            pending_cells: BTreeMap::new(),
            pending_entities: BTreeMap::new(),
            mixers: vec![],
        };
        let bytes = bitcode::serialize(&save).unwrap();
        assert!(matches!(
            load_region(&bytes, &registry),
            Err(DeserializeError::InvalidMagic(_))
        ));
    }

    #[test]
    fn future_version_is_rejected() {
        let registry = concrete_registry();
        let save = RegionSave {
            header: SaveHeader {
                magic: SAVE_MAGIC,
                version: FORMAT_VERSION + 1,
                tick: 0,
            },
            region: 0,
            pending_cells: BTreeMap::new(),
            pending_entities: BTreeMap::new(),
            mixers: vec![],
        };
        let bytes = bitcode::serialize(&save).unwrap();
        assert!(matches!(
            load_region(&bytes, &registry),
            Err(DeserializeError::FutureVersion(_))
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let registry = concrete_registry();
        assert!(matches!(
            load_region(&[0x13, 0x37, 0x00], &registry),
            Err(DeserializeError::Decode(_))
        ));
    }
}
