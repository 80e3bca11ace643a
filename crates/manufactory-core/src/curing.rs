//! Deferred timed conversion of wet materials into their cured counterparts.
//!
//! The scheduler keeps two due-tick registries per region -- one keyed by
//! terrain cell, one by placed entity -- and sweeps them on a sampled
//! cadence rather than every tick. Entries are removed exactly once: when
//! their sweep processes them, or when re-validation shows the underlying
//! cell/entity no longer qualifies.

use crate::event::{Event, EventBus};
use crate::fixed::Ticks;
use crate::id::{CellIndex, EntityId, RegionId};
use crate::registry::MaterialRegistry;
use crate::world::{EntityHost, TerrainGrid};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// How often a region sweeps its pending registries, in ticks.
pub const SWEEP_INTERVAL: Ticks = 250;

/// Per-region scheduler for wet-material conversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuringScheduler {
    region: RegionId,
    pending_cells: BTreeMap<CellIndex, Ticks>,
    pending_entities: BTreeMap<EntityId, Ticks>,

    /// Scratch buffers so a sweep never mutates a registry mid-iteration.
    #[serde(skip)]
    due_cells: Vec<CellIndex>,
    #[serde(skip)]
    due_entities: Vec<EntityId>,
}

impl CuringScheduler {
    pub fn new(region: RegionId) -> Self {
        Self {
            region,
            pending_cells: BTreeMap::new(),
            pending_entities: BTreeMap::new(),
            due_cells: Vec::new(),
            due_entities: Vec::new(),
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn pending_cell_count(&self) -> usize {
        self.pending_cells.len()
    }

    pub fn pending_entity_count(&self) -> usize {
        self.pending_entities.len()
    }

    pub fn is_cell_pending(&self, cell: CellIndex) -> bool {
        self.pending_cells.contains_key(&cell)
    }

    pub fn is_entity_pending(&self, entity: EntityId) -> bool {
        self.pending_entities.contains_key(&entity)
    }

    /// Register a wet terrain cell. No-op when the cell's material carries
    /// no cure rule (not every wet material registers a cure path) or the
    /// cell is already registered -- the original due tick always stands.
    pub fn register_wet_cell(
        &mut self,
        now: Ticks,
        cell: CellIndex,
        grid: &impl TerrainGrid,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        let Some(material) = grid.material_at(cell) else {
            return;
        };
        let Some(rule) = registry.cure_rule(material) else {
            return;
        };
        if self.pending_cells.contains_key(&cell) {
            return;
        }
        let due_tick = now + rule.duration;
        self.pending_cells.insert(cell, due_tick);
        bus.emit(Event::WetCellRegistered {
            cell,
            material,
            due_tick,
        });
    }

    /// Register a wet placed entity. Same no-op rules as cells, plus the
    /// entity must currently be spawned.
    pub fn register_wet_entity(
        &mut self,
        now: Ticks,
        entity: EntityId,
        host: &impl EntityHost,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        if !host.is_spawned(entity) {
            return;
        }
        let Some(material) = host.material_of(entity) else {
            return;
        };
        let Some(rule) = registry.cure_rule(material) else {
            return;
        };
        if self.pending_entities.contains_key(&entity) {
            return;
        }
        let due_tick = now + rule.duration;
        self.pending_entities.insert(entity, due_tick);
        bus.emit(Event::WetEntityRegistered {
            entity,
            material,
            due_tick,
        });
    }

    /// Remaining ticks until a registered entity cures, for inspection.
    pub fn remaining_ticks(&self, now: Ticks, entity: EntityId) -> Option<Ticks> {
        self.pending_entities
            .get(&entity)
            .map(|&due| due.saturating_sub(now))
    }

    /// Remaining ticks until a registered cell cures, for inspection.
    pub fn remaining_cell_ticks(&self, now: Ticks, cell: CellIndex) -> Option<Ticks> {
        self.pending_cells
            .get(&cell)
            .map(|&due| due.saturating_sub(now))
    }

    /// Whether this tick is one of the region's sampled sweep ticks. The
    /// region id offsets the phase so regions don't all sweep together.
    pub fn is_sweep_tick(&self, now: Ticks) -> bool {
        (now + self.region.0 as Ticks) % SWEEP_INTERVAL == 0
    }

    /// Sampled sweep. A no-op except on sweep ticks; then every entry due
    /// at or before `now` is processed from a snapshot and removed
    /// regardless of transaction outcome. Entries registered during the
    /// sweep wait for the next one.
    pub fn advance(
        &mut self,
        now: Ticks,
        grid: &mut impl TerrainGrid,
        host: &mut impl EntityHost,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        if !self.is_sweep_tick(now) {
            return;
        }
        self.sweep_cells(now, grid, registry, bus);
        self.sweep_entities(now, host, registry, bus);
    }

    fn sweep_cells(
        &mut self,
        now: Ticks,
        grid: &mut impl TerrainGrid,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        if self.pending_cells.is_empty() {
            return;
        }

        self.due_cells.clear();
        for (&cell, &due) in &self.pending_cells {
            if due <= now {
                self.due_cells.push(cell);
            }
        }

        for i in 0..self.due_cells.len() {
            let cell = self.due_cells[i];
            self.cure_cell(now, cell, grid, registry, bus);
            self.pending_cells.remove(&cell);
        }
    }

    /// Conversion transaction for one due cell. The terrain may have
    /// changed since registration, so the cell's *current* material must
    /// still carry a cure rule; otherwise the entry is silently dropped.
    fn cure_cell(
        &self,
        now: Ticks,
        cell: CellIndex,
        grid: &mut impl TerrainGrid,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        let Some(current) = grid.material_at(cell) else {
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        };
        let Some(rule) = registry.cure_rule(current) else {
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        };
        if registry.get(rule.cured).is_none() {
            log::warn!(
                "missing cured material {:?} for wet material {:?}; dropping cell {:?}",
                rule.cured,
                current,
                cell
            );
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        }
        if grid.set_material(cell, rule.cured) {
            bus.emit(Event::CellCured {
                cell,
                cured: rule.cured,
                tick: now,
            });
        } else {
            bus.emit(Event::CureAbandoned { tick: now });
        }
    }

    fn sweep_entities(
        &mut self,
        now: Ticks,
        host: &mut impl EntityHost,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        if self.pending_entities.is_empty() {
            return;
        }

        self.due_entities.clear();
        for (&entity, &due) in &self.pending_entities {
            if due <= now {
                self.due_entities.push(entity);
            }
        }

        for i in 0..self.due_entities.len() {
            let entity = self.due_entities[i];
            self.cure_entity(now, entity, host, registry, bus);
            self.pending_entities.remove(&entity);
        }
    }

    /// Conversion transaction for one due entity: re-validate spawned state
    /// and material, transfer attributes, place the cured replacement. If
    /// placement is refused the original is preserved -- no loss, no
    /// duplication -- and the entry is still dropped (never retried).
    fn cure_entity(
        &self,
        now: Ticks,
        entity: EntityId,
        host: &mut impl EntityHost,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) {
        if !host.is_spawned(entity) {
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        }
        let Some(current) = host.material_of(entity) else {
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        };
        let Some(rule) = registry.cure_rule(current) else {
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        };
        if registry.get(rule.cured).is_none() {
            log::warn!(
                "missing cured material {:?} for wet material {:?}; dropping entity {:?}",
                rule.cured,
                current,
                entity
            );
            bus.emit(Event::CureAbandoned { tick: now });
            return;
        }

        let attrs = host.attributes_of(entity);
        if host.try_replace(entity, rule.cured, attrs) {
            bus.emit(Event::EntityCured {
                entity,
                cured: rule.cured,
                tick: now,
            });
        } else {
            bus.emit(Event::CureAbandoned { tick: now });
        }
    }

    /// Reload reconciliation: any spawned wet entity the host still knows
    /// about but the registry lost gets a fresh full-duration countdown.
    /// Re-timing beats silently assuming "already cured".
    pub fn reconcile<I>(
        &mut self,
        now: Ticks,
        entities: I,
        host: &impl EntityHost,
        registry: &MaterialRegistry,
    ) where
        I: IntoIterator<Item = EntityId>,
    {
        for entity in entities {
            if self.pending_entities.contains_key(&entity) {
                continue;
            }
            if !host.is_spawned(entity) {
                continue;
            }
            let Some(material) = host.material_of(entity) else {
                continue;
            };
            let Some(rule) = registry.cure_rule(material) else {
                continue;
            };
            self.pending_entities.insert(entity, now + rule.duration);
        }
    }

    /// Raw registry views for persistence.
    pub(crate) fn pending_cells(&self) -> &BTreeMap<CellIndex, Ticks> {
        &self.pending_cells
    }

    pub(crate) fn pending_entities(&self) -> &BTreeMap<EntityId, Ticks> {
        &self.pending_entities
    }

    pub(crate) fn restore(
        region: RegionId,
        pending_cells: BTreeMap<CellIndex, Ticks>,
        pending_entities: BTreeMap<EntityId, Ticks>,
    ) -> Self {
        Self {
            region,
            pending_cells,
            pending_entities,
            due_cells: Vec::new(),
            due_entities: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn setup() -> (MaterialRegistry, TestGrid, TestHost, EventBus) {
        (
            concrete_registry(),
            TestGrid::default(),
            TestHost::default(),
            EventBus::new(),
        )
    }

    #[test]
    fn register_cell_inserts_due_tick() {
        let (reg, mut grid, _host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete").unwrap();
        grid.place(CellIndex(5), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_cell(100, CellIndex(5), &grid, &reg, &mut bus);
        assert!(sched.is_cell_pending(CellIndex(5)));
    }

    #[test]
    fn register_cell_without_rule_is_no_op() {
        let (reg, mut grid, _host, mut bus) = setup();
        let concrete = reg.material_id("concrete").unwrap();
        grid.place(CellIndex(5), concrete);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_cell(100, CellIndex(5), &grid, &reg, &mut bus);
        assert_eq!(sched.pending_cell_count(), 0);
    }

    #[test]
    fn register_is_idempotent() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        host.spawn(EntityId(1), wet);
        grid.place(CellIndex(9), reg.material_id("wet_concrete").unwrap());

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(1), &host, &reg, &mut bus);
        let first = sched.remaining_ticks(0, EntityId(1)).unwrap();

        // Re-registering later must not push the due tick out.
        sched.register_wet_entity(5_000, EntityId(1), &host, &reg, &mut bus);
        assert_eq!(sched.remaining_ticks(0, EntityId(1)).unwrap(), first);

        sched.register_wet_cell(0, CellIndex(9), &grid, &reg, &mut bus);
        sched.register_wet_cell(5_000, CellIndex(9), &grid, &reg, &mut bus);
        assert_eq!(sched.pending_cell_count(), 1);
    }

    #[test]
    fn remaining_ticks_counts_down_and_floors_at_zero() {
        let (reg, _grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        host.spawn(EntityId(1), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(1), &host, &reg, &mut bus);

        let total = reg.cure_rule(wet).unwrap().duration;
        assert_eq!(sched.remaining_ticks(0, EntityId(1)), Some(total));
        assert_eq!(sched.remaining_ticks(total - 1, EntityId(1)), Some(1));
        assert_eq!(sched.remaining_ticks(total + 10, EntityId(1)), Some(0));
        assert_eq!(sched.remaining_ticks(0, EntityId(99)), None);
    }

    #[test]
    fn sweep_only_on_sampled_ticks() {
        let sched = CuringScheduler::new(RegionId(0));
        assert!(sched.is_sweep_tick(0));
        assert!(!sched.is_sweep_tick(1));
        assert!(sched.is_sweep_tick(SWEEP_INTERVAL));

        // Region id shifts the phase.
        let offset = CuringScheduler::new(RegionId(3));
        assert!(!offset.is_sweep_tick(0));
        assert!(offset.is_sweep_tick(SWEEP_INTERVAL - 3));
    }

    #[test]
    fn cell_cures_at_first_sweep_after_due() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete").unwrap();
        let cured = reg.material_id("concrete").unwrap();
        grid.place(CellIndex(4), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_cell(0, CellIndex(4), &grid, &reg, &mut bus);
        let due = 60_000;

        // A sweep before the due tick leaves the cell wet.
        sched.advance(due - SWEEP_INTERVAL, &mut grid, &mut host, &reg, &mut bus);
        assert_eq!(grid.material_at(CellIndex(4)), Some(wet));
        assert!(sched.is_cell_pending(CellIndex(4)));

        // The first sweep at/after the due tick converts and removes.
        sched.advance(due, &mut grid, &mut host, &reg, &mut bus);
        assert_eq!(grid.material_at(CellIndex(4)), Some(cured));
        assert!(!sched.is_cell_pending(CellIndex(4)));
    }

    #[test]
    fn changed_terrain_is_dropped_silently() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete").unwrap();
        let granite = reg.material_id("granite_chunk").unwrap();
        grid.place(CellIndex(4), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_cell(0, CellIndex(4), &grid, &reg, &mut bus);

        // Someone replaced the terrain before the due tick.
        grid.place(CellIndex(4), granite);
        sched.advance(60_000, &mut grid, &mut host, &reg, &mut bus);
        assert_eq!(grid.material_at(CellIndex(4)), Some(granite));
        assert!(!sched.is_cell_pending(CellIndex(4)));
    }

    #[test]
    fn entity_cure_transfers_attributes() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        let cured = reg.material_id("concrete_wall").unwrap();
        host.spawn(EntityId(7), wet);
        host.set_attributes(
            EntityId(7),
            crate::world::EntityAttributes {
                durability: crate::fixed::f64_to_fixed32(0.5),
                faction: Some(crate::id::FactionId(2)),
                quality: Some(3),
                color: None,
            },
        );

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(7), &host, &reg, &mut bus);
        sched.advance(60_000, &mut grid, &mut host, &reg, &mut bus);

        assert_eq!(host.material_of(EntityId(7)), Some(cured));
        let attrs = host.attributes_of(EntityId(7));
        assert_eq!(attrs.durability, crate::fixed::f64_to_fixed32(0.5));
        assert_eq!(attrs.quality, Some(3));
        assert!(!sched.is_entity_pending(EntityId(7)));
    }

    #[test]
    fn failed_placement_preserves_original() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        host.spawn(EntityId(7), wet);
        host.fail_placement = true;

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(7), &host, &reg, &mut bus);
        sched.advance(60_000, &mut grid, &mut host, &reg, &mut bus);

        // Original untouched, entry dropped, never retried.
        assert_eq!(host.material_of(EntityId(7)), Some(wet));
        assert!(host.is_spawned(EntityId(7)));
        assert!(!sched.is_entity_pending(EntityId(7)));
    }

    #[test]
    fn despawned_entity_is_dropped() {
        let (reg, mut grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        host.spawn(EntityId(7), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(7), &host, &reg, &mut bus);
        host.despawn(EntityId(7));

        sched.advance(60_000, &mut grid, &mut host, &reg, &mut bus);
        assert!(!sched.is_entity_pending(EntityId(7)));
    }

    #[test]
    fn reconcile_re_registers_untracked_wet_entities() {
        let (reg, _grid, mut host, _bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        let cured = reg.material_id("concrete_wall").unwrap();
        host.spawn(EntityId(1), wet);
        host.spawn(EntityId(2), wet);
        host.spawn(EntityId(3), cured);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.reconcile(1_000, [EntityId(1), EntityId(2), EntityId(3)], &host, &reg);

        let total = reg.cure_rule(wet).unwrap().duration;
        assert_eq!(sched.remaining_ticks(1_000, EntityId(1)), Some(total));
        assert_eq!(sched.remaining_ticks(1_000, EntityId(2)), Some(total));
        // Cured material has no rule; not registered.
        assert!(!sched.is_entity_pending(EntityId(3)));
    }

    #[test]
    fn reconcile_keeps_existing_due_ticks() {
        let (reg, _grid, mut host, mut bus) = setup();
        let wet = reg.material_id("wet_concrete_wall").unwrap();
        host.spawn(EntityId(1), wet);

        let mut sched = CuringScheduler::new(RegionId(0));
        sched.register_wet_entity(0, EntityId(1), &host, &reg, &mut bus);
        let before = sched.remaining_ticks(0, EntityId(1));

        sched.reconcile(30_000, [EntityId(1)], &host, &reg);
        assert_eq!(sched.remaining_ticks(0, EntityId(1)), before);
    }
}
