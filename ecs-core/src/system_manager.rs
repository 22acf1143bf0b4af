//! Ordered system registration and the per-tick Process/Apply drive loop.
//!
//! Concrete system blueprints supply their simulation logic and a declared
//! axis component type; this module owns the two ordered registries
//! (multi- and single-threaded), dispatching each multi-threaded system's
//! `Process` across its axis itself rather than leaving dispatch to the
//! system, and the barrier between that parallel `Process` and the
//! system's serial `Apply`. A multi-threaded system's worker tasks record
//! mutations into a per-system [`RevisionChannel`] — a lock-free Treiber
//! stack — instead of writing shared state directly; `Apply` drains it on
//! the main thread after every worker has returned.

use crate::component_store::ComponentStore;
use crate::event_queue::EventBus;
use crate::executor::Executor;
use crate::pathfinder::Pathfinder;
use std::any::TypeId;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<R> {
    value: R,
    next: *mut Node<R>,
}

/// Lock-free single-producer-per-push, single-consumer-after-barrier stack.
/// Concurrent [`RevisionChannel::push`] calls from worker threads during a
/// system's `Process` phase race only against each other (CAS on the head);
/// [`RevisionChannel::drain`] is only ever called from `Apply`, serially,
/// after the barrier has joined every worker, so it never races a push.
pub struct RevisionChannel<R> {
    head: AtomicPtr<Node<R>>,
}

impl<R> Default for RevisionChannel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RevisionChannel<R> {
    pub fn new() -> Self {
        RevisionChannel { head: AtomicPtr::new(ptr::null_mut()) }
    }

    pub fn push(&self, value: R) {
        let node = Box::into_raw(Box::new(Node { value, next: ptr::null_mut() }));
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            unsafe { (*node).next = head };
            match self.head.compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => head = actual,
            }
        }
    }

    /// Order is whatever the CAS races produced; spec requires `Apply` to
    /// be order-independent, so callers must not rely on push order.
    pub fn drain(&self) -> Vec<R> {
        let mut current = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        let mut out = Vec::new();
        while !current.is_null() {
            let node = unsafe { Box::from_raw(current) };
            current = node.next;
            out.push(node.value);
        }
        out
    }
}

unsafe impl<R: Send> Send for RevisionChannel<R> {}
unsafe impl<R: Send> Sync for RevisionChannel<R> {}

impl<R> Drop for RevisionChannel<R> {
    fn drop(&mut self) {
        self.drain();
    }
}

/// The three temporal values every `Process`/`Apply` call needs, bundled
/// into one argument and constructed fresh per tick rather than published
/// as long-lived fields a worker could read stale across the park barrier.
#[derive(Clone, Copy, Debug)]
pub struct Time {
    pub dt: f32,
    pub d_ticks: u32,
    pub tick: u64,
}

/// A system whose `Process` phase fans out across the worker pool over its
/// declared [`Axis`](MultiThreadedSystem::Axis) component type, writing
/// per-tick mutations into its own revision channel, and whose `Apply`
/// phase drains that channel serially.
///
/// `process` only ever sees `&Self::Axis` (never `&mut`): giving a worker
/// task both a mutable axis component and a shared `ecs: &ComponentStore`
/// view into everything else would need an unsound split borrow of the
/// same store, so in-place mutation goes through the revision channel and
/// is applied serially in `apply` instead.
///
/// A concrete system never calls the executor itself — implement `process`
/// and `apply`, register with [`SystemManager::register_multi_threaded`],
/// and [`SystemManager::update`] dispatches `process` across `Axis`'s dense
/// array on your behalf (see `ErasedMultiThreadedSystem` below for how).
pub trait MultiThreadedSystem: Send + Sync {
    type Axis: 'static + Send + Sync;

    fn process(
        &self,
        entity: crate::entity::Entity,
        axis_component: &Self::Axis,
        pathfinder: &Pathfinder,
        ecs: &ComponentStore,
        time: Time,
    );

    fn apply(&mut self, ecs: &mut ComponentStore, events: &mut EventBus, pathfinder: &Pathfinder, time: Time);

    fn release(&mut self);

    /// Work granularity handed to the executor's fetch-add cursor; override
    /// to tune for an axis whose per-entity work is unusually cheap or
    /// expensive. Defaults to the executor's own default.
    fn chunk_size(&self) -> u32 {
        crate::executor::DEFAULT_CHUNK_SIZE
    }
}

/// Object-safe face of [`MultiThreadedSystem`] that [`SystemManager`]
/// actually stores.
///
/// `MultiThreadedSystem::Axis` being an associated type means `dyn
/// MultiThreadedSystem` isn't a legal type at all (every associated type of
/// a trait object must be bound, and each registered system has a
/// different `Axis`) — so instead of boxing `MultiThreadedSystem` directly,
/// every `S: MultiThreadedSystem` gets this blanket impl, which closes over
/// `S::Axis` once, at a point where `S` is still a concrete, `Sized` type,
/// and erases it behind a plain `&ComponentStore`/`&Executor` signature.
/// This is also where axis-type-driven dispatch actually happens: the
/// concrete system's `process` never touches the executor.
trait ErasedMultiThreadedSystem: Send + Sync {
    fn run_process(&self, executor: &Executor, store: &ComponentStore, pathfinder: &Pathfinder, time: Time);
    fn apply(&mut self, store: &mut ComponentStore, events: &mut EventBus, pathfinder: &Pathfinder, time: Time);
    fn release(&mut self);
}

impl<S: MultiThreadedSystem> ErasedMultiThreadedSystem for S {
    fn run_process(&self, executor: &Executor, store: &ComponentStore, pathfinder: &Pathfinder, time: Time) {
        executor.parallel_for_components::<S::Axis, (), (), _>(store, &(), self.chunk_size(), |entity, axis_component, _ctx| {
            self.process(entity, axis_component, pathfinder, store, time);
            None
        });
    }

    fn apply(&mut self, store: &mut ComponentStore, events: &mut EventBus, pathfinder: &Pathfinder, time: Time) {
        MultiThreadedSystem::apply(self, store, events, pathfinder, time)
    }

    fn release(&mut self) {
        MultiThreadedSystem::release(self)
    }
}

/// A system that runs entirely on the main thread, combining `Process` and
/// `Apply` into one call (spec.md §4.4: `ProcessAndApply`).
pub trait SingleThreadedSystem: Send + Sync {
    fn process_and_apply(&mut self, store: &mut ComponentStore, events: &mut EventBus, pathfinder: &Pathfinder, time: Time);
}

#[derive(Default)]
pub struct SystemManager {
    multi_threaded: Vec<(TypeId, Box<dyn ErasedMultiThreadedSystem>)>,
    single_threaded: Vec<(TypeId, Box<dyn SingleThreadedSystem>)>,
}

impl SystemManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejected (fatal) if `S`'s type identity is already registered in
    /// either list.
    pub fn register_multi_threaded<S: MultiThreadedSystem + 'static>(&mut self, system: S) {
        let tid = TypeId::of::<S>();
        self.assert_type_identity_is_free(tid);
        self.multi_threaded.push((tid, Box::new(system)));
    }

    pub fn register_single_threaded<S: SingleThreadedSystem + 'static>(&mut self, system: S) {
        let tid = TypeId::of::<S>();
        self.assert_type_identity_is_free(tid);
        self.single_threaded.push((tid, Box::new(system)));
    }

    fn assert_type_identity_is_free(&self, tid: TypeId) {
        let taken = self.multi_threaded.iter().any(|(t, _)| *t == tid)
            || self.single_threaded.iter().any(|(t, _)| *t == tid);
        assert!(!taken, "a system with this type identity is already registered");
    }

    /// Runs one full tick: every multi-threaded system's `Process` then
    /// `Apply`+`release`, in registration order, followed by every
    /// single-threaded system's `ProcessAndApply` in registration order.
    pub fn update(
        &mut self,
        executor: &Executor,
        store: &mut ComponentStore,
        pathfinder: &Pathfinder,
        events: &mut EventBus,
        dt: f32,
        d_ticks: u32,
        tick: u64,
    ) {
        let time = Time { dt, d_ticks, tick };
        for (_, system) in &self.multi_threaded {
            system.run_process(executor, store, pathfinder, time);
        }
        for (_, system) in &mut self.multi_threaded {
            system.apply(store, events, pathfinder, time);
            system.release();
        }
        for (_, system) in &mut self.single_threaded {
            system.process_and_apply(store, events, pathfinder, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::Entity;
    use crate::thread_registry::ThreadRegistry;
    use std::sync::{Arc, Mutex};

    fn test_executor(worker_count: u32) -> Executor {
        let config = Config::builder().worker_thread_count(worker_count).build();
        let registry = Arc::new(ThreadRegistry::new());
        registry.register_current(crate::thread_registry::MAIN_THREAD_ID);
        Executor::new(&config, registry).unwrap()
    }

    fn test_pathfinder() -> Pathfinder {
        Pathfinder::new(1, 10, 14, 100)
    }

    #[derive(Default)]
    struct Counter(u32);

    struct RevisionSystem {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        channel: RevisionChannel<(Entity, u32)>,
    }

    impl MultiThreadedSystem for RevisionSystem {
        type Axis = Counter;

        fn process(&self, entity: Entity, counter: &Counter, _pathfinder: &Pathfinder, _ecs: &ComponentStore, _time: Time) {
            self.channel.push((entity, counter.0 + 1));
        }

        fn apply(&mut self, store: &mut ComponentStore, _events: &mut EventBus, _pathfinder: &Pathfinder, _time: Time) {
            self.log.lock().unwrap().push(self.name);
            for (entity, value) in self.channel.drain() {
                if let Some(counter) = store.get_mut::<Counter>(entity) {
                    counter.0 = value;
                }
            }
        }

        fn release(&mut self) {}
    }

    #[test]
    fn process_and_apply_run_in_registration_order() {
        let mut store = ComponentStore::new();
        store.register_type::<Counter>();
        for i in 0..8u32 {
            store.create::<Counter>(Entity::new(0, i));
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = SystemManager::new();
        manager.register_multi_threaded(RevisionSystem { log: Arc::clone(&log), name: "A", channel: RevisionChannel::new() });
        manager.register_multi_threaded(RevisionSystem { log: Arc::clone(&log), name: "B", channel: RevisionChannel::new() });

        let executor = test_executor(4);
        let pathfinder = test_pathfinder();
        let mut events = EventBus::new();
        manager.update(&executor, &mut store, &pathfinder, &mut events, 1.0 / 60.0, 1, 0);

        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
        for i in 0..8u32 {
            assert_eq!(store.get::<Counter>(Entity::new(0, i)).unwrap().0, 1);
        }
    }

    struct DuplicateMarker;
    impl MultiThreadedSystem for DuplicateMarker {
        type Axis = Counter;
        fn process(&self, _entity: Entity, _axis: &Counter, _pathfinder: &Pathfinder, _ecs: &ComponentStore, _time: Time) {}
        fn apply(&mut self, _store: &mut ComponentStore, _events: &mut EventBus, _pathfinder: &Pathfinder, _time: Time) {}
        fn release(&mut self) {}
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_type_identity_registration_is_fatal() {
        let mut manager = SystemManager::new();
        manager.register_multi_threaded(DuplicateMarker);
        manager.register_multi_threaded(DuplicateMarker);
    }

    struct EventEmittingSystem {
        channel: RevisionChannel<Entity>,
    }

    impl MultiThreadedSystem for EventEmittingSystem {
        type Axis = Counter;

        fn process(&self, entity: Entity, _counter: &Counter, _pathfinder: &Pathfinder, _ecs: &ComponentStore, _time: Time) {
            self.channel.push(entity);
        }

        fn apply(&mut self, _store: &mut ComponentStore, events: &mut EventBus, _pathfinder: &Pathfinder, _time: Time) {
            let queue = events.queue_mut::<Entity>();
            for entity in self.channel.drain() {
                queue.push(entity);
            }
        }

        fn release(&mut self) {}
    }

    #[test]
    fn apply_can_reach_the_shared_event_bus() {
        let mut store = ComponentStore::new();
        store.register_type::<Counter>();
        store.create::<Counter>(Entity::new(0, 0));
        store.create::<Counter>(Entity::new(0, 1));

        let mut manager = SystemManager::new();
        manager.register_multi_threaded(EventEmittingSystem { channel: RevisionChannel::new() });

        let executor = test_executor(2);
        let pathfinder = test_pathfinder();
        let mut events = EventBus::new();
        manager.update(&executor, &mut store, &pathfinder, &mut events, 1.0 / 60.0, 1, 0);

        assert_eq!(events.queue::<Entity>().unwrap().len(), 2);
    }

    #[test]
    fn revision_channel_preserves_every_pushed_value_under_concurrent_push() {
        let channel = Arc::new(RevisionChannel::new());
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let channel = Arc::clone(&channel);
            handles.push(std::thread::spawn(move || {
                for i in 0..100u32 {
                    channel.push(t * 100 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut drained = channel.drain();
        drained.sort_unstable();
        assert_eq!(drained, (0..800u32).collect::<Vec<_>>());
    }
}
