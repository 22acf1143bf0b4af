use ecs_core::{ComponentStore, Config, Entity, Executor, ThreadRegistry, MAIN_THREAD_ID};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xorshift::XorShiftRng;
use std::sync::Arc;

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
struct Health(u32);

fn executor(worker_count: u32) -> Executor {
    let config = Config::builder().worker_thread_count(worker_count).build();
    let registry = Arc::new(ThreadRegistry::new());
    registry.register_current(MAIN_THREAD_ID);
    Executor::new(&config, registry).unwrap()
}

#[test]
fn ten_thousand_components_are_each_visited_exactly_once() {
    let mut store = ComponentStore::new();
    store.register_type::<Health>();
    for i in 0..10_000u32 {
        *store.create::<Health>(Entity::new(0, i)) = Health(i);
    }

    let exec = executor(4);
    let results = exec.parallel_for_components::<Health, (), u32, _>(&store, &(), 32, |entity, health, _ctx| {
        assert_eq!(entity.id(), health.0);
        Some(health.0)
    });

    let mut seen: Vec<u32> = results.into_iter().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..10_000u32).collect::<Vec<_>>());
}

#[test]
fn destroy_and_recreate_mid_run_does_not_corrupt_the_dense_array() {
    // Destroying entities reshuffles the dense array via swap-and-pop
    // concurrently with other worker chunks reading it; every surviving
    // slot must still resolve to a live, correctly-versioned entity.
    let mut store = ComponentStore::new();
    store.register_type::<Health>();
    let mut rng = XorShiftRng::seed_from_u64(7);

    let mut entities: Vec<Entity> = (0..2_000u32).map(|i| Entity::new(0, i)).collect();
    for &e in &entities {
        *store.create::<Health>(e) = Health(e.id());
    }

    let mut doomed: Vec<Entity> = entities.clone();
    doomed.shuffle(&mut rng);
    for &e in doomed.iter().take(500) {
        store.destroy::<Health>(e);
    }
    entities.retain(|e| !doomed.iter().take(500).any(|d| d == e));

    for i in 2_000u32..2_200u32 {
        let e = Entity::new(0, i);
        *store.create::<Health>(e) = Health(e.id());
        entities.push(e);
    }

    assert_eq!(store.len_of::<Health>(), entities.len());

    let exec = executor(4);
    let results = exec.parallel_for_components::<Health, (), u32, _>(&store, &(), 16, |entity, health, _ctx| {
        assert_eq!(entity.id(), health.0);
        Some(entity.id())
    });
    let mut seen: Vec<u32> = results.into_iter().collect();
    seen.sort_unstable();
    let mut expected: Vec<u32> = entities.iter().map(|e| e.id()).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn chunk_boundaries_do_not_drop_or_duplicate_items() {
    let mut store = ComponentStore::new();
    store.register_type::<Health>();
    for i in 0..97u32 {
        *store.create::<Health>(Entity::new(0, i)) = Health(i);
    }

    let exec = executor(4);
    let results = exec.parallel_for_components::<Health, (), u32, _>(&store, &(), 32, |_e, h, _ctx| Some(h.0));
    assert_eq!(results.len(), 97);
}
