//! Internal instrumentation, compiled out unless the `log-events` feature
//! is enabled, so embedders that don't want it pay nothing for it. Not
//! `log`/`tracing` integration: this is a low-level event tap, mirroring
//! `rayon_core`'s own internal `log` module, for tests and tooling that
//! need to see scheduling/pathfinding decisions as they happen.

#[derive(Clone, Debug)]
pub enum Event {
    WorkerSpawned { thread_id: u32 },
    WorkerParked { thread_id: u32 },
    WorkerWoken { thread_id: u32 },
    ParallelForStarted { total_items: u32 },
    ParallelForFinished,
    PathfindStarted { thread_id: u32 },
    PathfindFinished { thread_id: u32, found: bool },
}

#[cfg(feature = "log-events")]
mod imp {
    use super::Event;
    use std::sync::Mutex;

    pub struct Logger {
        sink: Mutex<Vec<Event>>,
    }

    impl Default for Logger {
        fn default() -> Self {
            Logger { sink: Mutex::new(Vec::new()) }
        }
    }

    impl Logger {
        #[inline]
        pub fn log(&self, event: Event) {
            self.sink.lock().unwrap().push(event);
        }

        pub fn drain(&self) -> Vec<Event> {
            std::mem::take(&mut *self.sink.lock().unwrap())
        }
    }
}

#[cfg(not(feature = "log-events"))]
mod imp {
    use super::Event;

    #[derive(Default)]
    pub struct Logger;

    impl Logger {
        #[inline(always)]
        pub fn log(&self, _event: Event) {}

        pub fn drain(&self) -> Vec<Event> {
            Vec::new()
        }
    }
}

pub use imp::Logger;
