//! The per-region tick driver.
//!
//! A region owns its curing scheduler, its mixers, and the event bus, and
//! advances them from a single cooperative step: scheduler sweep first,
//! then each mixer's production and setting passes, then the tick counter.
//! One step runs to completion before the next begins; nothing here
//! suspends or interleaves.

use crate::curing::CuringScheduler;
use crate::event::EventBus;
use crate::fixed::Ticks;
use crate::id::{CellIndex, EntityId, MixerId, RegionId};
use crate::mixer::Mixer;
use crate::registry::MaterialRegistry;
use crate::world::{EntityHost, Environment, TerrainGrid};
use slotmap::SlotMap;

#[derive(Debug)]
pub struct Region {
    id: RegionId,
    pub scheduler: CuringScheduler,
    mixers: SlotMap<MixerId, Mixer>,
    pub bus: EventBus,
    tick: Ticks,
}

impl Region {
    pub fn new(id: RegionId) -> Self {
        Self {
            id,
            scheduler: CuringScheduler::new(id),
            mixers: SlotMap::with_key(),
            bus: EventBus::new(),
            tick: 0,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn add_mixer(&mut self, mixer: Mixer) -> MixerId {
        self.mixers.insert(mixer)
    }

    pub fn mixer(&self, id: MixerId) -> Option<&Mixer> {
        self.mixers.get(id)
    }

    pub fn mixer_mut(&mut self, id: MixerId) -> Option<&mut Mixer> {
        self.mixers.get_mut(id)
    }

    pub fn mixer_count(&self) -> usize {
        self.mixers.len()
    }

    pub fn mixer_ids(&self) -> impl Iterator<Item = MixerId> + '_ {
        self.mixers.keys()
    }

    /// Remove a mixer, flushing every holding to the environment first --
    /// bays and storage are never silently discarded with their owner.
    pub fn remove_mixer(
        &mut self,
        id: MixerId,
        env: &mut impl Environment,
        origin: CellIndex,
    ) -> bool {
        let Some(mut mixer) = self.mixers.remove(id) else {
            return false;
        };
        mixer.flush_all(env, origin);
        true
    }

    /// Advance the region by one tick.
    pub fn step(
        &mut self,
        grid: &mut impl TerrainGrid,
        host: &mut impl EntityHost,
        registry: &MaterialRegistry,
    ) {
        let now = self.tick;

        self.scheduler.advance(now, grid, host, registry, &mut self.bus);

        for (id, mixer) in self.mixers.iter_mut() {
            mixer.tick(now, id, registry, &mut self.bus);
        }

        self.tick += 1;
    }

    /// Operator force-start on one mixer (see
    /// [`Mixer::force_start_batch`]). Returns false for unknown mixers.
    pub fn force_start_batch(&mut self, id: MixerId, registry: &MaterialRegistry) -> bool {
        let now = self.tick;
        let Some(mixer) = self.mixers.get_mut(id) else {
            return false;
        };
        mixer.force_start_batch(now, id, registry, &mut self.bus)
    }

    // -----------------------------------------------------------------------
    // Registration and query pass-throughs
    // -----------------------------------------------------------------------

    pub fn register_wet_cell(
        &mut self,
        cell: CellIndex,
        grid: &impl TerrainGrid,
        registry: &MaterialRegistry,
    ) {
        self.scheduler
            .register_wet_cell(self.tick, cell, grid, registry, &mut self.bus);
    }

    pub fn register_wet_entity(
        &mut self,
        entity: EntityId,
        host: &impl EntityHost,
        registry: &MaterialRegistry,
    ) {
        self.scheduler
            .register_wet_entity(self.tick, entity, host, registry, &mut self.bus);
    }

    pub fn remaining_cure_ticks(&self, entity: EntityId) -> Option<Ticks> {
        self.scheduler.remaining_ticks(self.tick, entity)
    }

    pub fn remaining_cell_cure_ticks(&self, cell: CellIndex) -> Option<Ticks> {
        self.scheduler.remaining_cell_ticks(self.tick, cell)
    }

    // -----------------------------------------------------------------------
    // Persistence plumbing
    // -----------------------------------------------------------------------

    pub(crate) fn mixers(&self) -> &SlotMap<MixerId, Mixer> {
        &self.mixers
    }

    pub(crate) fn restore(
        id: RegionId,
        scheduler: CuringScheduler,
        mixers: SlotMap<MixerId, Mixer>,
        tick: Ticks,
    ) -> Self {
        Self {
            id,
            scheduler,
            mixers,
            bus: EventBus::new(),
            tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialStack;
    use crate::storage::SlotStorage;
    use crate::test_utils::*;

    #[test]
    fn step_drives_scheduler_and_mixers() {
        let registry = concrete_registry();
        let mut grid = TestGrid::default();
        let mut host = TestHost::default();
        let mut region = Region::new(RegionId(0));

        let wet = registry.material_id("wet_concrete").unwrap();
        let cured = registry.material_id("concrete").unwrap();
        grid.place(CellIndex(2), wet);
        region.register_wet_cell(CellIndex(2), &grid, &registry);

        let id = region.add_mixer(Mixer::new(
            concrete_mixer_config(&registry),
            Some(SlotStorage::new((0..4).map(CellIndex).collect())),
        ));
        {
            let mixer = region.mixer_mut(id).unwrap();
            let fuel = registry.material_id("binder_fuel").unwrap();
            let granite = registry.material_id("granite_chunk").unwrap();
            let mut stack = MaterialStack::new(fuel, 5);
            assert!(mixer.try_add_ingredient(&mut stack, 5, &registry));
            let mut stack = MaterialStack::new(granite, 1);
            assert!(mixer.try_add_ingredient(&mut stack, 1, &registry));
        }

        // Enough steps for the cure (60k ticks) and the batch (2.5k ticks).
        for _ in 0..60_001 {
            region.step(&mut grid, &mut host, &registry);
        }

        assert_eq!(grid.material_at(CellIndex(2)), Some(cured));
        assert_eq!(region.mixer(id).unwrap().stored_output(), 20);
    }

    #[test]
    fn remove_mixer_flushes_holdings() {
        let registry = concrete_registry();
        let mut env = TestEnvironment::default();
        let mut region = Region::new(RegionId(0));

        let id = region.add_mixer(Mixer::new(concrete_mixer_config(&registry), None));
        {
            let mixer = region.mixer_mut(id).unwrap();
            let fuel = registry.material_id("binder_fuel").unwrap();
            let mut stack = MaterialStack::new(fuel, 7);
            assert!(mixer.try_add_ingredient(&mut stack, 7, &registry));
        }

        assert!(region.remove_mixer(id, &mut env, CellIndex(0)));
        assert_eq!(region.mixer_count(), 0);
        assert_eq!(env.placed.iter().map(|s| s.quantity).sum::<u32>(), 7);

        // Removing again is a clean no-op.
        assert!(!region.remove_mixer(id, &mut env, CellIndex(0)));
    }
}
