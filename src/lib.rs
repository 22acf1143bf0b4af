//! Public facade over [`ecs_core`]: construction knobs and the core types
//! needed to embed the simulation in a host application. The heavy lifting
//! (paged storage, the worker pool, the pathfinder, system scheduling)
//! lives in `ecs-core`; this crate just re-exports its stable surface.

pub use ecs_core::{
    CostGrid, Entity, EventBus, EventQueue, Executor, ExecutionResults, ExecutorBuildError,
    FloodFillGrid, MultiThreadedSystem, PathContext, PathHandle, Pathfinder, Point,
    RevisionChannel, Simulation, SingleThreadedSystem, SparseSet, SystemManager, Time,
};
pub use ecs_core::{Config, ConfigBuilder};
pub use ecs_core::{ComponentStore, ComponentTypeId};
pub use ecs_core::{ThreadRegistry, MAIN_THREAD_ID};
