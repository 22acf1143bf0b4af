//! Append-only per-tick event sequence. Events are produced by `Apply`
//! phases (or the host, between ticks) and consumed the following tick by
//! `parallel_for_events`; the queue is cleared once consumed.

use std::any::{Any, TypeId};
use std::collections::HashMap;

pub struct EventQueue<E> {
    events: Vec<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue { events: Vec::new() }
    }

    pub fn push(&mut self, event: E) {
        self.events.push(event);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Random access by dense index, used by `parallel_for_events`.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&E> {
        self.events.get(index as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut E> {
        self.events.get_mut(index as usize)
    }

    pub fn iterate(&self) -> std::slice::Iter<'_, E> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

trait ErasedEventQueue: Any + Send + Sync {
    fn clear_erased(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: 'static + Send + Sync> ErasedEventQueue for EventQueue<E> {
    fn clear_erased(&mut self) {
        self.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-heterogeneous home for every concrete [`EventQueue<E>`] in a
/// simulation, keyed by `E`'s `TypeId` the same way [`ComponentStore`] keys
/// its sparse sets — lets `Apply`/`ProcessAndApply` reach any event type
/// without the system trait declaring an associated event type of its own.
///
/// [`ComponentStore`]: crate::component_store::ComponentStore
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn ErasedEventQueue>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `E`'s queue, lazily creating it on first access.
    pub fn queue_mut<E: 'static + Send + Sync>(&mut self) -> &mut EventQueue<E> {
        self.queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(EventQueue::<E>::new()))
            .as_any_mut()
            .downcast_mut()
            .expect("event type id / E mismatch")
    }

    /// Read-only access; `None` if nothing has ever pushed to `E`'s queue.
    pub fn queue<E: 'static + Send + Sync>(&self) -> Option<&EventQueue<E>> {
        self.queues.get(&TypeId::of::<E>())?.as_any().downcast_ref()
    }

    /// Clears every registered queue's contents, leaving the queues
    /// themselves (and their capacity) in place.
    pub fn clear_all(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear_erased();
        }
    }
}
