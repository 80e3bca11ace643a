//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::id::{CellIndex, EntityId, MaterialId};
use crate::material::MaterialStack;
use crate::mixer::{IngredientFilter, IngredientSpec, MixerConfig};
use crate::registry::{CureRule, MaterialRegistry, RegistryBuilder, SettingRule};
use crate::world::{EntityAttributes, EntityHost, Environment, TerrainGrid};
use std::collections::HashMap;

// ===========================================================================
// Canonical content
// ===========================================================================

/// The canonical concrete content set: wet/cured terrain and walls, chunk
/// ingredients, binder fuel, and the mix with its slag byproduct.
pub fn concrete_registry() -> MaterialRegistry {
    let mut b = RegistryBuilder::new();
    let chunks = b.register_category("stone_chunks");

    b.register_material("wet_concrete", 1);
    b.register_material("concrete", 1);
    b.register_material("wet_concrete_wall", 1);
    b.register_material("concrete_wall", 1);
    b.register_material("granite_chunk", 1);
    b.register_material("limestone_chunk", 1);
    b.register_material("binder_fuel", 150);
    b.register_material("concrete_mix", 75);
    b.register_material("concrete_slag", 75);

    let concrete = b.material_id("concrete").unwrap();
    let concrete_wall = b.material_id("concrete_wall").unwrap();
    let slag = b.material_id("concrete_slag").unwrap();

    b.mutate_material("wet_concrete", |def| {
        def.cure = Some(CureRule {
            cured: concrete,
            duration: 60_000,
        })
    })
    .unwrap();
    b.mutate_material("wet_concrete_wall", |def| {
        def.cure = Some(CureRule {
            cured: concrete_wall,
            duration: 60_000,
        })
    })
    .unwrap();
    b.mutate_material("granite_chunk", |def| def.category = Some(chunks))
        .unwrap();
    b.mutate_material("limestone_chunk", |def| def.category = Some(chunks))
        .unwrap();
    b.mutate_material("concrete_mix", |def| {
        def.setting = Some(SettingRule {
            byproduct: slag,
            duration: 60_000,
        })
    })
    .unwrap();

    b.build().unwrap()
}

/// The canonical mixer recipe: 1 stone chunk + 5 binder fuel -> 20 mix
/// over 2500 ticks, flat cap 200 when no storage is connected.
pub fn concrete_mixer_config(registry: &MaterialRegistry) -> MixerConfig {
    MixerConfig {
        ingredients: vec![
            IngredientSpec {
                filter: IngredientFilter::Category(registry.category_id("stone_chunks").unwrap()),
                per_batch: 1,
                bay_limit: 5,
            },
            IngredientSpec {
                filter: IngredientFilter::Material(registry.material_id("binder_fuel").unwrap()),
                per_batch: 5,
                bay_limit: 20,
            },
        ],
        output: registry.material_id("concrete_mix").unwrap(),
        output_per_batch: 20,
        batch_duration: 2_500,
        fallback_capacity: 200,
    }
}

// ===========================================================================
// Host fakes
// ===========================================================================

/// In-memory terrain grid.
#[derive(Debug, Default)]
pub struct TestGrid {
    cells: HashMap<CellIndex, MaterialId>,
}

impl TestGrid {
    pub fn place(&mut self, cell: CellIndex, material: MaterialId) {
        self.cells.insert(cell, material);
    }
}

impl TerrainGrid for TestGrid {
    fn material_at(&self, cell: CellIndex) -> Option<MaterialId> {
        self.cells.get(&cell).copied()
    }

    fn set_material(&mut self, cell: CellIndex, material: MaterialId) -> bool {
        if !self.cells.contains_key(&cell) {
            return false;
        }
        self.cells.insert(cell, material);
        true
    }
}

/// In-memory entity host with a placement-failure toggle.
#[derive(Debug, Default)]
pub struct TestHost {
    entities: HashMap<EntityId, (MaterialId, EntityAttributes)>,
    /// When set, `try_replace` refuses and leaves the original untouched.
    pub fail_placement: bool,
}

impl TestHost {
    pub fn spawn(&mut self, entity: EntityId, material: MaterialId) {
        self.entities
            .insert(entity, (material, EntityAttributes::default()));
    }

    pub fn despawn(&mut self, entity: EntityId) {
        self.entities.remove(&entity);
    }

    pub fn set_attributes(&mut self, entity: EntityId, attrs: EntityAttributes) {
        if let Some((_, existing)) = self.entities.get_mut(&entity) {
            *existing = attrs;
        }
    }
}

impl EntityHost for TestHost {
    fn is_spawned(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn material_of(&self, entity: EntityId) -> Option<MaterialId> {
        self.entities.get(&entity).map(|(material, _)| *material)
    }

    fn attributes_of(&self, entity: EntityId) -> EntityAttributes {
        self.entities
            .get(&entity)
            .map(|(_, attrs)| *attrs)
            .unwrap_or_default()
    }

    fn try_replace(
        &mut self,
        entity: EntityId,
        material: MaterialId,
        attrs: EntityAttributes,
    ) -> bool {
        if self.fail_placement || !self.entities.contains_key(&entity) {
            return false;
        }
        self.entities.insert(entity, (material, attrs));
        true
    }
}

/// In-memory environment with a reject toggle.
#[derive(Debug, Default)]
pub struct TestEnvironment {
    pub placed: Vec<MaterialStack>,
    /// When set, `place_near` refuses everything.
    pub reject: bool,
}

impl Environment for TestEnvironment {
    fn place_near(&mut self, _origin: CellIndex, stack: MaterialStack) -> Option<MaterialStack> {
        if self.reject {
            return Some(stack);
        }
        self.placed.push(stack);
        None
    }
}
