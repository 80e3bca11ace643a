//! Batch production engine.
//!
//! A mixer holds two private bays -- a raw-ingredient input bay and a
//! hidden overflow bay -- plus batch timing state, and is usually connected
//! to slot storage that receives finished output. Ingredient intake is an
//! optimistic clamped transfer; batch start is an all-or-nothing
//! transaction gated on availability and downstream capacity; completion
//! routes output into storage with the remainder absorbed by the overflow
//! bay, so no quantity is ever created or destroyed.

use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, Ticks, unit_fraction};
use crate::id::{CategoryId, CellIndex, MaterialId, MixerId};
use crate::ledger::ResourceLedger;
use crate::material::MaterialStack;
use crate::query::{InputLevel, MixerSnapshot};
use crate::registry::MaterialRegistry;
use crate::setting::{SettingTick, tick_setting};
use crate::storage::{SlotStorage, max_output_capacity, migrate_legacy_holdings};
use crate::world::Environment;
use serde::{Serialize, Deserialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How an ingredient requirement matches incoming material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientFilter {
    /// A specific material (e.g. binder fuel).
    Material(MaterialId),
    /// Any material in a category (e.g. stone chunks).
    Category(CategoryId),
}

impl IngredientFilter {
    pub fn matches(&self, material: MaterialId, registry: &MaterialRegistry) -> bool {
        match *self {
            IngredientFilter::Material(id) => material == id,
            IngredientFilter::Category(cat) => registry.is_in_category(material, cat),
        }
    }
}

/// One ingredient requirement of the batch recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientSpec {
    pub filter: IngredientFilter,
    /// Units consumed per batch.
    pub per_batch: u32,
    /// Maximum units the input bay holds for this ingredient; demand is
    /// computed against this cap.
    pub bay_limit: u32,
}

/// The mixer's batch recipe and capacity parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerConfig {
    pub ingredients: Vec<IngredientSpec>,
    pub output: MaterialId,
    pub output_per_batch: u32,
    pub batch_duration: Ticks,
    /// Flat output cap used when no storage is connected.
    pub fallback_capacity: u32,
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

/// A single producer instance: bays, optional connected storage, and batch
/// timing state.
#[derive(Debug, Clone)]
pub struct Mixer {
    config: MixerConfig,
    input_bay: ResourceLedger,
    overflow_bay: ResourceLedger,
    storage: Option<SlotStorage>,
    ticks_remaining: Ticks,
    pending_output: u32,
    enabled: bool,
    powered: bool,
    legacy_migrated: bool,
}

impl Mixer {
    pub fn new(config: MixerConfig, storage: Option<SlotStorage>) -> Self {
        Self {
            config,
            input_bay: ResourceLedger::new(),
            overflow_bay: ResourceLedger::new(),
            storage,
            ticks_remaining: 0,
            pending_output: 0,
            enabled: true,
            powered: true,
            legacy_migrated: true,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn input_bay(&self) -> &ResourceLedger {
        &self.input_bay
    }

    pub fn overflow_bay(&self) -> &ResourceLedger {
        &self.overflow_bay
    }

    pub fn storage(&self) -> Option<&SlotStorage> {
        self.storage.as_ref()
    }

    pub fn ticks_remaining(&self) -> Ticks {
        self.ticks_remaining
    }

    pub fn pending_output(&self) -> u32 {
        self.pending_output
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Whether a batch is currently running.
    pub fn is_batching(&self) -> bool {
        self.ticks_remaining > 0
    }

    /// Toggle automatic production. Never cancels an in-flight batch and
    /// never touches stored output.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Power state, fed in by the host. Unpowered mixers make no batch
    /// progress and their storage stops pausing setting.
    pub fn set_powered(&mut self, powered: bool) {
        self.powered = powered;
    }

    // -----------------------------------------------------------------------
    // Ingredient supply
    // -----------------------------------------------------------------------

    fn held_matching(&self, spec: &IngredientSpec, registry: &MaterialRegistry) -> u32 {
        self.input_bay
            .count_matching(|s| spec.filter.matches(s.material, registry))
    }

    /// How many units of `material` this mixer wants right now. Zero when
    /// production is disabled or the material is not an ingredient;
    /// otherwise the gap to the matching ingredient's bay cap, computed
    /// independently per ingredient.
    pub fn demand(&self, material: MaterialId, registry: &MaterialRegistry) -> u32 {
        if !self.enabled {
            return 0;
        }
        self.config
            .ingredients
            .iter()
            .find(|spec| spec.filter.matches(material, registry))
            .map(|spec| {
                spec.bay_limit
                    .saturating_sub(self.held_matching(spec, registry))
            })
            .unwrap_or(0)
    }

    /// Optimistic clamped transfer into the input bay.
    ///
    /// The accepted quantity is `min(requested, stack.quantity, demand)`.
    /// Returns false with no side effect when that comes to zero or
    /// production is disabled; the caller keeps ownership of the stack
    /// either way (a partial transfer splits it).
    pub fn try_add_ingredient(
        &mut self,
        stack: &mut MaterialStack,
        requested: u32,
        registry: &MaterialRegistry,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let accept = requested
            .min(stack.quantity)
            .min(self.demand(stack.material, registry));
        if accept == 0 {
            return false;
        }
        self.input_bay.add_stack(stack.split_off(accept));
        true
    }

    // -----------------------------------------------------------------------
    // Capacity
    // -----------------------------------------------------------------------

    /// Output units already in connected storage.
    pub fn stored_output(&self) -> u32 {
        self.storage
            .as_ref()
            .map(|s| s.count_of(self.config.output))
            .unwrap_or(0)
    }

    /// Output units hidden in the overflow bay.
    pub fn overflow_output(&self) -> u32 {
        self.overflow_bay.count_of(self.config.output)
    }

    /// Output units the current input bay contents could still produce.
    fn producible_from_inputs(&self, registry: &MaterialRegistry) -> u32 {
        let batches = self
            .config
            .ingredients
            .iter()
            .map(|spec| self.held_matching(spec, registry) / spec.per_batch.max(1))
            .min()
            .unwrap_or(0);
        batches * self.config.output_per_batch
    }

    /// Everything that counts against capacity: stored output, overflow,
    /// the in-flight batch, and what current inputs could still become.
    /// In-flight material is never double-counted.
    pub fn total_output_equivalent(&self, registry: &MaterialRegistry) -> u32 {
        self.stored_output()
            + self.overflow_output()
            + self.pending_output
            + self.producible_from_inputs(registry)
    }

    /// Maximum concurrent output: slot-derived when storage is connected,
    /// else the configured flat cap.
    pub fn max_capacity(&self, registry: &MaterialRegistry) -> u32 {
        max_output_capacity(
            self.storage.as_ref(),
            registry.stack_limit(self.config.output),
            self.config.fallback_capacity,
        )
    }

    // -----------------------------------------------------------------------
    // Batch lifecycle
    // -----------------------------------------------------------------------

    fn ingredients_available(&self, registry: &MaterialRegistry) -> bool {
        self.config
            .ingredients
            .iter()
            .all(|spec| self.held_matching(spec, registry) >= spec.per_batch.max(1))
    }

    /// Automatic batch-start gate: every ingredient at its per-batch
    /// requirement and the capacity ceiling respected.
    pub fn can_start_batch(&self, registry: &MaterialRegistry) -> bool {
        self.enabled
            && self.total_output_equivalent(registry) + self.config.output_per_batch
                <= self.max_capacity(registry)
            && self.ingredients_available(registry)
    }

    /// Consume one batch worth of every ingredient, all-or-nothing.
    ///
    /// Ingredients are taken spec by spec; if a later spec cannot be
    /// satisfied, everything taken so far is refunded into the bay before
    /// aborting. On success the batch timer starts and the output is
    /// promised into `pending_output`.
    fn start_batch(&mut self, now: Ticks, id: MixerId, registry: &MaterialRegistry, bus: &mut EventBus) -> bool {
        let mut consumed: Vec<MaterialStack> = Vec::new();
        for spec in &self.config.ingredients {
            match self.input_bay.try_take(spec.per_batch.max(1), |s| {
                spec.filter.matches(s.material, registry)
            }) {
                Some(mut taken) => consumed.append(&mut taken),
                None => {
                    for stack in consumed {
                        self.input_bay.add_stack(stack);
                    }
                    return false;
                }
            }
        }

        // Consumed stacks are destroyed here; their material is now
        // represented by pending_output.
        drop(consumed);
        self.pending_output += self.config.output_per_batch;
        self.ticks_remaining = self.config.batch_duration.max(1);
        bus.emit(Event::BatchStarted { mixer: id, tick: now });
        true
    }

    /// Operator-triggered start: bypasses the capacity gate (overflow
    /// absorbs any excess) but never the ingredient gate. No-op while a
    /// batch is running, unpowered, or short on ingredients.
    pub fn force_start_batch(
        &mut self,
        now: Ticks,
        id: MixerId,
        registry: &MaterialRegistry,
        bus: &mut EventBus,
    ) -> bool {
        if self.ticks_remaining > 0 || !self.powered {
            return false;
        }
        if !self.ingredients_available(registry) {
            return false;
        }
        self.start_batch(now, id, registry, bus)
    }

    /// Resolve the pending quantity into output: fill existing compatible
    /// stacks in storage, then open slots; the remainder routes to the
    /// overflow bay. `placed + overflowed == pending` exactly. An
    /// unresolvable output material discards the pending quantity with a
    /// warning -- the ingredients are already gone.
    fn complete_batch(&mut self, now: Ticks, id: MixerId, registry: &MaterialRegistry, bus: &mut EventBus) {
        let to_produce = self.pending_output;
        self.pending_output = 0;
        if to_produce == 0 {
            return;
        }
        if registry.get(self.config.output).is_none() {
            log::warn!(
                "missing output material {:?}; discarding {} pending units",
                self.config.output,
                to_produce
            );
            return;
        }

        let limit = registry.stack_limit(self.config.output);
        let overflowed = match &mut self.storage {
            Some(storage) => storage.fill(self.config.output, to_produce, limit),
            None => to_produce,
        };
        if overflowed > 0 {
            self.overflow_bay
                .add_stack(MaterialStack::new(self.config.output, overflowed));
        }
        bus.emit(Event::BatchCompleted {
            mixer: id,
            placed: to_produce - overflowed,
            overflowed,
            tick: now,
        });
    }

    /// Per-tick update. Batch progress requires power; a completing batch
    /// resolves its output before a new start is considered, so freed
    /// capacity is visible consistently within the same tick. The setting
    /// pass runs regardless of production state.
    pub fn tick(&mut self, now: Ticks, id: MixerId, registry: &MaterialRegistry, bus: &mut EventBus) {
        if self.powered {
            if self.ticks_remaining > 0 {
                self.ticks_remaining -= 1;
                if self.ticks_remaining == 0 && self.pending_output > 0 {
                    self.complete_batch(now, id, registry, bus);
                }
            }

            if self.ticks_remaining == 0 && self.can_start_batch(registry) {
                self.start_batch(now, id, registry, bus);
            }
        }

        self.tick_setting_pass(now, registry, bus);
    }

    // -----------------------------------------------------------------------
    // Setting pass
    // -----------------------------------------------------------------------

    /// Advance setting for every held stack that registered a setting rule.
    /// Stacks sitting in this mixer's storage or bays pause exactly while
    /// the mixer is powered; due stacks convert in place.
    fn tick_setting_pass(&mut self, now: Ticks, registry: &MaterialRegistry, bus: &mut EventBus) {
        let paused = self.powered;

        if let Some(storage) = &mut self.storage {
            let mut due: Vec<CellIndex> = Vec::new();
            for (cell, stack) in storage.stacks_mut() {
                let Some(rule) = registry.setting_rule(stack.material) else {
                    continue;
                };
                if tick_setting(stack, rule, paused) == SettingTick::Due {
                    due.push(cell);
                }
            }

            for cell in due {
                let Some(stack) = storage.stack_at(cell) else {
                    continue;
                };
                let material = stack.material;
                let quantity = stack.quantity;
                let Some(rule) = registry.setting_rule(material) else {
                    continue;
                };
                if registry.get(rule.byproduct).is_none() {
                    log::warn!(
                        "missing setting byproduct {:?} for material {:?}; conversion skipped",
                        rule.byproduct,
                        material
                    );
                    continue;
                }
                let limit = registry.stack_limit(rule.byproduct);
                if storage.convert_stack(cell, rule.byproduct, limit) {
                    bus.emit(Event::SettingConverted {
                        material,
                        byproduct: rule.byproduct,
                        quantity,
                        tick: now,
                    });
                }
            }
        }

        // Bay-held stacks convert in place; a ledger has no slot bound, so
        // the swap cannot fail.
        for bay in [&mut self.overflow_bay, &mut self.input_bay] {
            for stack in bay.stacks_mut() {
                let Some(rule) = registry.setting_rule(stack.material) else {
                    continue;
                };
                if tick_setting(stack, rule, paused) != SettingTick::Due {
                    continue;
                }
                if registry.get(rule.byproduct).is_none() {
                    log::warn!(
                        "missing setting byproduct {:?} for material {:?}; conversion skipped",
                        rule.byproduct,
                        stack.material
                    );
                    continue;
                }
                bus.emit(Event::SettingConverted {
                    material: stack.material,
                    byproduct: rule.byproduct,
                    quantity: stack.quantity,
                    tick: now,
                });
                stack.material = rule.byproduct;
                stack.setting_ticks = 0;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    /// Eject the input bay to the environment. Anything the environment
    /// refuses returns to the bay. No-op when the bay is empty.
    pub fn extract_ingredients(&mut self, env: &mut impl Environment, origin: CellIndex) {
        for stack in self.input_bay.drain() {
            if let Some(remainder) = env.place_near(origin, stack) {
                self.input_bay.add_stack(remainder);
            }
        }
    }

    /// Eject the hidden overflow bay to the environment. Same refusal
    /// handling as `extract_ingredients`.
    pub fn unload_overflow(&mut self, env: &mut impl Environment, origin: CellIndex) {
        for stack in self.overflow_bay.drain() {
            if let Some(remainder) = env.place_near(origin, stack) {
                self.overflow_bay.add_stack(remainder);
            }
        }
    }

    /// Flush every holding -- both bays and connected storage -- to the
    /// environment ahead of destruction. Refused stacks return to the
    /// input bay so nothing is silently discarded.
    pub fn flush_all(&mut self, env: &mut impl Environment, origin: CellIndex) {
        self.extract_ingredients(env, origin);
        self.unload_overflow(env, origin);
        if let Some(storage) = &mut self.storage {
            for stack in storage.take_all() {
                if let Some(remainder) = env.place_near(origin, stack) {
                    self.input_bay.add_stack(remainder);
                }
            }
        }
    }

    /// One-time migration of legacy hidden holdings into slot storage.
    /// Guarded by a persisted flag; later calls are no-ops. Returns the
    /// quantity moved.
    pub fn migrate_legacy(&mut self, registry: &MaterialRegistry) -> u32 {
        if self.legacy_migrated {
            return 0;
        }
        self.legacy_migrated = true;
        match &mut self.storage {
            Some(storage) => migrate_legacy_holdings(&mut self.overflow_bay, storage, registry),
            None => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn snapshot(&self, registry: &MaterialRegistry) -> MixerSnapshot {
        let progress = if self.ticks_remaining > 0 {
            let elapsed = self
                .config
                .batch_duration
                .max(1)
                .saturating_sub(self.ticks_remaining);
            unit_fraction(elapsed, self.config.batch_duration.max(1))
        } else {
            Fixed64::from_num(0)
        };

        MixerSnapshot {
            stored_output: self.stored_output(),
            overflow_output: self.overflow_output(),
            pending_output: self.pending_output,
            max_capacity: self.max_capacity(registry),
            input_levels: self
                .config
                .ingredients
                .iter()
                .map(|spec| InputLevel {
                    filter: spec.filter,
                    held: self.held_matching(spec, registry),
                    limit: spec.bay_limit,
                })
                .collect(),
            progress,
            enabled: self.enabled,
            powered: self.powered,
        }
    }

    /// Mutable access to connected storage, for hauling collaborators that
    /// load stacks in or out.
    pub fn storage_mut(&mut self) -> Option<&mut SlotStorage> {
        self.storage.as_mut()
    }

    // -----------------------------------------------------------------------
    // Persistence plumbing
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        config: MixerConfig,
        input_bay: ResourceLedger,
        overflow_bay: ResourceLedger,
        storage: Option<SlotStorage>,
        ticks_remaining: Ticks,
        pending_output: u32,
        enabled: bool,
        legacy_migrated: bool,
    ) -> Self {
        Self {
            config,
            input_bay,
            overflow_bay,
            storage,
            ticks_remaining,
            pending_output,
            enabled,
            powered: true,
            legacy_migrated,
        }
    }

    pub(crate) fn legacy_migrated(&self) -> bool {
        self.legacy_migrated
    }
}
