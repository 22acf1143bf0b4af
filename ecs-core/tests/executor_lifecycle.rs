use ecs_core::{Config, Executor, ThreadRegistry, MAIN_THREAD_ID};
use std::sync::Arc;

fn registry() -> Arc<ThreadRegistry> {
    let registry = Arc::new(ThreadRegistry::new());
    registry.register_current(MAIN_THREAD_ID);
    registry
}

#[test]
fn constructs_and_tears_down_a_multi_worker_pool() {
    let config = Config::builder().worker_thread_count(4).build();
    let executor = Executor::new(&config, registry()).unwrap();
    assert_eq!(executor.worker_thread_count(), 4);
    drop(executor);
}

#[test]
fn zero_workers_falls_back_to_the_calling_thread() {
    let config = Config::builder().worker_thread_count(0).build();
    let executor = Executor::new(&config, registry()).unwrap();
    assert_eq!(executor.worker_thread_count(), 0);

    let results = executor.parallel_for_worker_threads::<(), u32, _>(&(), |thread_id, _ctx| Some(thread_id));
    let seen: Vec<u32> = results.into_iter().collect();
    assert_eq!(seen, vec![MAIN_THREAD_ID]);
}

#[test]
fn sequential_pools_do_not_leak_worker_thread_ids() {
    // Each pool registers ids 1..=W then unregisters them on drop; a second
    // pool built from the same registry must be able to reuse those ids.
    let registry = registry();
    for _ in 0..3 {
        let config = Config::builder().worker_thread_count(3).build();
        let executor = Executor::new(&config, Arc::clone(&registry)).unwrap();
        assert_eq!(executor.worker_thread_count(), 3);
        drop(executor);
    }
}
