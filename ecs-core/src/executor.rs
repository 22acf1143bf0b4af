//! Fixed worker pool and parallel-for primitives.
//!
//! Workers are spawned once and parked between ticks rather than spun up
//! per call (spec.md §5: "no work-stealing, no thread spawn in the hot
//! path"). A tick's unit of work is distributed by a single
//! fetch-and-add cursor shared across all workers: each worker claims a
//! contiguous chunk, runs it, and loops back for the next chunk until the
//! cursor walks past the axis length. This is the "good" distribution
//! scheme; a per-element compare-and-swap cursor was considered and
//! rejected for contending on every single item instead of every chunk.

use crate::component_store::ComponentStore;
use crate::config::Config;
use crate::entity::Entity;
use crate::error::ExecutorBuildError;
use crate::event_queue::EventQueue;
use crate::log::{Event, Logger};
use crate::thread_registry::ThreadRegistry;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub const DEFAULT_CHUNK_SIZE: u32 = 32;

/// A type-erased, synchronously-invoked unit of per-tick work.
///
/// `data` points at a closure living on the calling thread's stack for the
/// duration of one `run_on_all_workers` call; workers only ever read it
/// while the calling thread is blocked waiting for every worker to report
/// idle again, which happens-after every worker has observed the pointer
/// and happens-before
/// the calling thread resumes and the closure is dropped. No worker holds
/// onto `data` past its own single invocation.
struct RawWork {
    data: *const (),
    call: unsafe fn(*const (), u32),
}

unsafe impl Send for RawWork {}
unsafe impl Sync for RawWork {}

impl RawWork {
    fn new<F: Fn(u32) + Sync>(f: &F) -> Self {
        unsafe fn call_erased<F: Fn(u32) + Sync>(data: *const (), thread_id: u32) {
            (*(data as *const F))(thread_id)
        }
        RawWork {
            data: f as *const F as *const (),
            call: call_erased::<F>,
        }
    }

    fn noop() -> Self {
        fn noop_fn(_data: *const (), _thread_id: u32) {}
        RawWork {
            data: std::ptr::null(),
            call: |data, id| noop_fn(data, id),
        }
    }

    #[inline]
    fn invoke(&self, thread_id: u32) {
        unsafe { (self.call)(self.data, thread_id) }
    }
}

/// Asserts `Sync` for a raw pointer captured by a `Fn(u32) -> _ + Sync`
/// closure in `run_chunked`. The actual safety argument (disjoint dense
/// index ranges per chunk, so no aliasing `&mut` ever overlaps) lives at
/// each call site; this wrapper only exists to satisfy the bound the
/// compiler can't otherwise see through a raw pointer.
#[derive(Clone, Copy)]
struct SyncPtr<T>(*mut T);

unsafe impl<T> Sync for SyncPtr<T> {}

struct ParkSlot {
    working: Mutex<bool>,
    cv: Condvar,
}

impl ParkSlot {
    fn new() -> Self {
        ParkSlot {
            working: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    fn wake(&self) {
        let mut working = self.working.lock().unwrap();
        *working = true;
        self.cv.notify_one();
    }

    fn wait_while_idle(&self) {
        let mut working = self.working.lock().unwrap();
        while !*working {
            working = self.cv.wait(working).unwrap();
        }
    }

    fn mark_idle(&self) {
        let mut working = self.working.lock().unwrap();
        *working = false;
        self.cv.notify_one();
    }

    fn wait_until_idle(&self) {
        let mut working = self.working.lock().unwrap();
        while *working {
            working = self.cv.wait(working).unwrap();
        }
    }
}

/// Guards against a second dispatch starting on the same executor while an
/// earlier one hasn't returned — the one misuse this owned-`Vec` design
/// still can't rule out at the type level, since nothing stops a host from
/// calling a `parallel_for_*` method from two threads at once. Entering
/// twice concurrently is a programmer error, matching the fatal-assertion
/// style the rest of this crate uses for phase/ordering misuse.
struct DispatchGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let already_in_flight = flag.swap(true, Ordering::AcqRel);
        assert!(!already_in_flight, "a parallel-for dispatch started while a prior dispatch on the same executor was still running");
        DispatchGuard { flag }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Shared {
    parks: Vec<CachePadded<ParkSlot>>,
    should_stop: AtomicBool,
    work_cursor: CachePadded<AtomicU32>,
    current_work: Mutex<RawWork>,
    registry: Arc<ThreadRegistry>,
    logger: Logger,
    dispatch_in_progress: AtomicBool,
}

impl Shared {
    fn run_on_all_workers(&self, work: RawWork) {
        *self.current_work.lock().unwrap() = work;
        for park in &self.parks {
            park.wake();
        }
        for park in &self.parks {
            park.wait_until_idle();
        }
    }
}

/// A long-lived pool of parked worker threads plus the synchronous
/// parallel-for entry points built on top of it.
pub struct Executor {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    worker_count: u32,
}

impl Executor {
    pub fn new(config: &Config, registry: Arc<ThreadRegistry>) -> Result<Self, ExecutorBuildError> {
        let worker_count = config.worker_thread_count();
        let shared = Arc::new(Shared {
            parks: (0..worker_count).map(|_| CachePadded::new(ParkSlot::new())).collect(),
            should_stop: AtomicBool::new(false),
            work_cursor: CachePadded::new(AtomicU32::new(0)),
            current_work: Mutex::new(RawWork::noop()),
            registry,
            logger: Logger::default(),
            dispatch_in_progress: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(worker_count as usize);
        for thread_id in 1..=worker_count {
            let worker_shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("ecs-worker-{}", thread_id))
                .spawn(move || worker_thread_body(thread_id, worker_shared))
                .map_err(ExecutorBuildError::io)?;
            // Block until the freshly spawned worker has registered with
            // the thread registry and completed its first (no-op) cycle,
            // mirroring the ack handshake in the source pool.
            shared.parks[(thread_id - 1) as usize].wait_until_idle();
            handles.push(handle);
        }
        shared.registry.lock_registration();

        Ok(Executor { shared, handles, worker_count })
    }

    pub fn worker_thread_count(&self) -> u32 {
        self.worker_count
    }

    fn is_single_threaded(&self) -> bool {
        self.worker_count == 0
    }

    fn run_chunked<R: Copy + Send, F>(&self, total: u32, chunk_size: u32, per_index: F) -> ExecutionResults<R>
    where
        F: Fn(u32) -> Option<R> + Sync,
    {
        let _dispatch = DispatchGuard::enter(&self.shared.dispatch_in_progress);
        let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
        if self.is_single_threaded() {
            let mut out = Vec::new();
            let mut i = 0u32;
            while i < total {
                if let Some(r) = per_index(i) {
                    out.push(r);
                }
                i += 1;
            }
            return ExecutionResults { buckets: vec![out] };
        }

        let shared = &self.shared;
        shared.work_cursor.store(0, Ordering::Relaxed);
        let buckets: Vec<Mutex<Vec<R>>> = (0..self.worker_count).map(|_| Mutex::new(Vec::new())).collect();

        shared.logger.log(Event::ParallelForStarted { total_items: total });
        let closure = |thread_id: u32| {
            let bucket = &buckets[(thread_id - 1) as usize];
            loop {
                let work_begin = shared.work_cursor.fetch_add(chunk_size, Ordering::Relaxed);
                let work_end = (work_begin + chunk_size).min(total);
                if work_begin >= total {
                    return;
                }
                let mut local = bucket.lock().unwrap();
                for i in work_begin..work_end {
                    if let Some(r) = per_index(i) {
                        local.push(r);
                    }
                }
            }
        };
        shared.run_on_all_workers(RawWork::new(&closure));
        shared.logger.log(Event::ParallelForFinished);

        ExecutionResults {
            buckets: buckets.into_iter().map(|m| m.into_inner().unwrap()).collect(),
        }
    }

    /// Immutable axis over a component type's dense array. `context` is
    /// read-only ambient state (other component types, the pathfinder,
    /// event queues, ...) visible to every task invocation alongside the
    /// axis element itself.
    pub fn parallel_for_components<T, C, R, F>(
        &self,
        store: &ComponentStore,
        context: &C,
        chunk_size: u32,
        task: F,
    ) -> ExecutionResults<R>
    where
        T: 'static,
        C: Sync,
        R: Copy + Send,
        F: Fn(Entity, &T, &C) -> Option<R> + Sync,
    {
        let total = store.len_of::<T>() as u32;
        self.run_chunked(total, chunk_size, |i| {
            let (entity, component) = store.get_by_dense_index::<T>(i)?;
            task(entity, component, context)
        })
    }

    /// Mutable axis over a component type's dense array.
    ///
    /// Safety: the chunked fetch-add cursor hands out disjoint dense index
    /// ranges to every worker, so concurrent `&mut T` access through the
    /// raw pointer below never aliases. `context` is a resource disjoint
    /// from `store` (the caller must not alias `T` through it).
    pub fn parallel_for_components_mut<T, C, R, F>(
        &self,
        store: &mut ComponentStore,
        context: &C,
        chunk_size: u32,
        task: F,
    ) -> ExecutionResults<R>
    where
        T: 'static,
        C: Sync,
        R: Copy + Send,
        F: Fn(Entity, &mut T, &C) -> Option<R> + Sync,
    {
        let total = store.len_of::<T>() as u32;
        let store_ptr = SyncPtr(store as *mut ComponentStore);
        self.run_chunked(total, chunk_size, |i| {
            let (entity, component) = unsafe { (*store_ptr.0).get_by_dense_index_mut::<T>(i) }?;
            task(entity, component, context)
        })
    }

    pub fn parallel_for_events<E, C, R, F>(
        &self,
        queue: &EventQueue<E>,
        context: &C,
        chunk_size: u32,
        task: F,
    ) -> ExecutionResults<R>
    where
        E: Sync,
        C: Sync,
        R: Copy + Send,
        F: Fn(&E, &C) -> Option<R> + Sync,
    {
        let total = queue.len() as u32;
        self.run_chunked(total, chunk_size, |i| task(queue.get(i)?, context))
    }

    /// Safety: disjoint indices, same argument as
    /// [`Executor::parallel_for_components_mut`].
    pub fn parallel_for_events_mut<E, C, R, F>(
        &self,
        queue: &mut EventQueue<E>,
        context: &C,
        chunk_size: u32,
        task: F,
    ) -> ExecutionResults<R>
    where
        C: Sync,
        R: Copy + Send,
        F: Fn(&mut E, &C) -> Option<R> + Sync,
    {
        let total = queue.len() as u32;
        let queue_ptr = SyncPtr(queue as *mut EventQueue<E>);
        self.run_chunked(total, chunk_size, |i| {
            let event = unsafe { (*queue_ptr.0).get_mut(i) }?;
            task(event, context)
        })
    }

    /// Runs `task` once on every worker thread (and, in the single-threaded
    /// fallback, once on the calling thread standing in for worker 1).
    pub fn parallel_for_worker_threads<C, R, F>(&self, context: &C, task: F) -> ExecutionResults<R>
    where
        C: Sync,
        R: Copy + Send,
        F: Fn(u32, &C) -> Option<R> + Sync,
    {
        let _dispatch = DispatchGuard::enter(&self.shared.dispatch_in_progress);
        if self.is_single_threaded() {
            let out = task(crate::thread_registry::MAIN_THREAD_ID, context).into_iter().collect();
            return ExecutionResults { buckets: vec![out] };
        }

        let buckets: Vec<Mutex<Vec<R>>> = (0..self.worker_count).map(|_| Mutex::new(Vec::new())).collect();
        let closure = |thread_id: u32| {
            if let Some(r) = task(thread_id, context) {
                buckets[(thread_id - 1) as usize].lock().unwrap().push(r);
            }
        };
        self.shared.run_on_all_workers(RawWork::new(&closure));

        ExecutionResults {
            buckets: buckets.into_iter().map(|m| m.into_inner().unwrap()).collect(),
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shared.should_stop.store(true, Ordering::Relaxed);
        *self.shared.current_work.lock().unwrap() = RawWork::noop();
        for park in &self.shared.parks {
            park.wake();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.shared.registry.unlock_registration();
    }
}

fn worker_thread_body(thread_id: u32, shared: Arc<Shared>) {
    shared.registry.register_current(thread_id);
    shared.logger.log(Event::WorkerSpawned { thread_id });

    while !shared.should_stop.load(Ordering::Relaxed) {
        shared.parks[(thread_id - 1) as usize].wait_while_idle();
        if shared.should_stop.load(Ordering::Relaxed) {
            break;
        }
        shared.logger.log(Event::WorkerWoken { thread_id });
        let work = shared.current_work.lock().unwrap();
        work.invoke(thread_id);
        drop(work);
        shared.parks[(thread_id - 1) as usize].mark_idle();
        shared.logger.log(Event::WorkerParked { thread_id });
    }

    shared.parks[(thread_id - 1) as usize].mark_idle();
    shared.registry.unregister_current();
}

/// Concatenation of every worker's per-dispatch results, one bucket per
/// worker. Freshly allocated on each dispatch rather than drawn from a
/// reused arena: `R` varies per call site, so there is no single persistent
/// buffer shape to reuse across dispatches without erasing `R`, and an
/// owned `Vec` means a caller holding onto `ExecutionResults` past the next
/// dispatch is inert instead of dangling (see [`DispatchGuard`] for the one
/// misuse this design still has to assert against at runtime: two
/// dispatches racing on the same executor).
pub struct ExecutionResults<R> {
    buckets: Vec<Vec<R>>,
}

impl<R> IntoIterator for ExecutionResults<R> {
    type Item = R;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Vec<R>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter().flatten()
    }
}

impl<R> ExecutionResults<R> {
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.buckets.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
