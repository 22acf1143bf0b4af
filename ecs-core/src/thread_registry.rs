//! Process-wide mapping from OS threads to small dense thread identifiers:
//! main thread is always 0, workers are 1..W. Other per-thread arrays
//! (the [`crate::pathfinder::Pathfinder`]'s contexts, in particular) index
//! themselves by this id instead of carrying their own thread-id allocator.

use std::cell::Cell;
use std::sync::Mutex;

pub const MAIN_THREAD_ID: u32 = 0;
pub const UNREGISTERED_THREAD_ID: u32 = u32::MAX;

thread_local! {
    static CURRENT_THREAD_ID: Cell<u32> = Cell::new(UNREGISTERED_THREAD_ID);
}

/// All invariant violations here are programmer errors and abort via
/// `assert!`/`panic!`, matching spec.md §7: a thread registry misuse is
/// never a recoverable `DomainMiss`.
pub struct ThreadRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    registered: Vec<bool>,
    registration_locked: bool,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        ThreadRegistry {
            inner: Mutex::new(Inner {
                registered: Vec::new(),
                registration_locked: false,
            }),
        }
    }

    /// Asserts the calling thread has no id yet, that `id` is free, and
    /// assigns it. Grows the liveness vector as needed.
    pub fn register_current(&self, id: u32) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.registration_locked, "thread registration is locked");
        assert_eq!(
            CURRENT_THREAD_ID.with(Cell::get),
            UNREGISTERED_THREAD_ID,
            "calling thread is already registered"
        );

        while inner.registered.len() <= id as usize {
            inner.registered.push(false);
        }
        assert!(!inner.registered[id as usize], "thread id {} is already taken", id);
        inner.registered[id as usize] = true;
        CURRENT_THREAD_ID.with(|c| c.set(id));
    }

    /// Clears the calling thread's slot and trims trailing empties.
    pub fn unregister_current(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(inner.registration_locked, "unregister called while registration is unlocked");
        let id = CURRENT_THREAD_ID.with(Cell::get);
        assert_ne!(id, UNREGISTERED_THREAD_ID, "calling thread was never registered");

        inner.registered[id as usize] = false;
        while matches!(inner.registered.last(), Some(false)) {
            inner.registered.pop();
        }
        CURRENT_THREAD_ID.with(|c| c.set(UNREGISTERED_THREAD_ID));
    }

    /// Undefined-if-unregistered is a fatal assertion, matching the source.
    pub fn current_id(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        assert!(inner.registration_locked, "current_id read before registration was locked");
        let id = CURRENT_THREAD_ID.with(Cell::get);
        assert_ne!(id, UNREGISTERED_THREAD_ID, "calling thread is not registered");
        id
    }

    /// Returns the count only when every slot `0..count` is live; asserts
    /// otherwise (spec.md §4.1: "contiguously registered").
    pub fn thread_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        assert!(inner.registration_locked, "thread_count read before registration was locked");
        assert!(
            inner.registered.iter().all(|&live| live),
            "thread ids are not contiguously registered"
        );
        inner.registered.len()
    }

    pub fn lock_registration(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(!inner.registration_locked, "registration already locked");
        inner.registration_locked = true;
    }

    pub fn unlock_registration(&self) {
        let mut inner = self.inner.lock().unwrap();
        assert!(inner.registration_locked, "registration already unlocked");
        inner.registration_locked = false;
    }
}
