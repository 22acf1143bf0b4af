//! Core execution substrate: paged sparse-set component storage, a parked
//! worker pool with chunked fetch-add parallel-for, a per-thread A*
//! pathfinder, and the system registration/drive loop tying them together.

pub mod component_store;
pub mod config;
pub mod entity;
pub mod error;
pub mod event_queue;
pub mod executor;
pub mod log;
pub mod pathfinder;
pub mod sparse_set;
pub mod system_manager;
pub mod thread_registry;

pub use component_store::{ComponentStore, ComponentTypeId};
pub use config::{Config, ConfigBuilder};
pub use entity::Entity;
pub use error::ExecutorBuildError;
pub use event_queue::{EventBus, EventQueue};
pub use executor::{Executor, ExecutionResults};
pub use pathfinder::{CostGrid, FloodFillGrid, PathContext, PathHandle, Pathfinder, Point};
pub use sparse_set::SparseSet;
pub use system_manager::{MultiThreadedSystem, RevisionChannel, SingleThreadedSystem, SystemManager, Time};
pub use thread_registry::{ThreadRegistry, MAIN_THREAD_ID};

use std::sync::Arc;

/// Owns every piece a host needs to drive one simulation: component
/// storage, the worker pool, the pathfinder, and the system schedule.
/// Construction registers the calling thread as the main thread (id 0).
pub struct Simulation {
    pub components: ComponentStore,
    pub executor: Executor,
    pub pathfinder: Pathfinder,
    pub systems: SystemManager,
    pub events: EventBus,
    registry: Arc<ThreadRegistry>,
    tick: u64,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self, ExecutorBuildError> {
        let registry = Arc::new(ThreadRegistry::new());
        registry.register_current(MAIN_THREAD_ID);
        let executor = Executor::new(&config, Arc::clone(&registry))?;
        let thread_count = executor.worker_thread_count() + 1;
        let pathfinder = Pathfinder::new(
            thread_count,
            config.a_star_step_cost_cardinal(),
            config.a_star_step_cost_diagonal(),
            config.path_entry_refresh_interval_ticks(),
        );

        Ok(Simulation {
            components: ComponentStore::new(),
            executor,
            pathfinder,
            systems: SystemManager::new(),
            events: EventBus::new(),
            registry,
            tick: 0,
        })
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Freezes component registration on the first call, then drives one
    /// simulation step: every system's Process/Apply pass, followed by the
    /// pathfinder's expiry sweep. `d_ticks` is the host's whole-tick catch-up
    /// count (spec.md §6's host-clock contract); it is forwarded to systems
    /// inside [`Time`] and never drives `tick()` itself, which always
    /// advances by exactly one per `update` call.
    pub fn update(&mut self, dt: f32, d_ticks: u32) {
        if self.tick == 0 {
            self.components.freeze();
        }
        self.systems.update(
            &self.executor,
            &mut self.components,
            &self.pathfinder,
            &mut self.events,
            dt,
            d_ticks,
            self.tick,
        );
        self.pathfinder.process(&self.executor, self.tick);
        self.tick += 1;
    }
}
