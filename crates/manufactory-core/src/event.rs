//! Typed lifecycle events with explicit observer registration.
//!
//! Collaborators interested in spawn, cure, batch, and setting lifecycle
//! points subscribe here. Listeners are passive: they observe, they never
//! mutate sim state, and the bus is excluded from serialization.

use crate::fixed::Ticks;
use crate::id::{CellIndex, EntityId, MaterialId, MixerId};

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Curing --
    WetCellRegistered {
        cell: CellIndex,
        material: MaterialId,
        due_tick: Ticks,
    },
    WetEntityRegistered {
        entity: EntityId,
        material: MaterialId,
        due_tick: Ticks,
    },
    CellCured {
        cell: CellIndex,
        cured: MaterialId,
        tick: Ticks,
    },
    EntityCured {
        entity: EntityId,
        cured: MaterialId,
        tick: Ticks,
    },
    /// A due entry was dropped without converting (material changed,
    /// placement refused, or the cured target failed to resolve).
    CureAbandoned {
        tick: Ticks,
    },

    // -- Production --
    BatchStarted {
        mixer: MixerId,
        tick: Ticks,
    },
    BatchCompleted {
        mixer: MixerId,
        placed: u32,
        overflowed: u32,
        tick: Ticks,
    },

    // -- Setting --
    SettingConverted {
        material: MaterialId,
        byproduct: MaterialId,
        quantity: u32,
        tick: Ticks,
    },
}

/// A registered passive listener.
type Listener = Box<dyn FnMut(&Event)>;

/// Subscription-based event bus. Passive listeners only.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a passive listener. Listeners are invoked in registration
    /// order, synchronously, at the point the event occurs.
    pub fn subscribe(&mut self, listener: impl FnMut(&Event) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: Event) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
