//! Type-indexed collection of [`SparseSet`]s — the interface surfaced to
//! systems.
//!
//! spec.md §9 flags the source's runtime-type-identity keying and
//! inheritance-based type erasure as patterns needing re-architecture: here
//! a component type is identified by a small dense [`ComponentTypeId`]
//! handed out at registration (a `Vec` index, not a hash lookup, on every
//! hot path), and each concrete `SparseSet<T>` registers an implementation
//! of a small capability trait (`destroy_by_entity`) instead of inheriting
//! from a polymorphic base class.

use crate::entity::Entity;
use crate::sparse_set::SparseSet;
use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentTypeId(pub(crate) usize);

trait ErasedSparseSet: Any + Send + Sync {
    fn destroy_by_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static + Send + Sync> ErasedSparseSet for SparseSet<T> {
    fn destroy_by_entity(&mut self, entity: Entity) {
        self.destroy_of(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct ComponentStore {
    type_ids: HashMap<TypeId, ComponentTypeId>,
    sets: Vec<Box<dyn ErasedSparseSet>>,
    frozen: bool,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is rejected (fatal) if `T` is already registered or the
    /// store has already been frozen by simulation start.
    pub fn register_type<T: 'static + Default + Send + Sync>(&mut self) -> ComponentTypeId {
        assert!(!self.frozen, "component type registration is frozen");
        let tid = TypeId::of::<T>();
        assert!(
            !self.type_ids.contains_key(&tid),
            "component type {} already registered",
            std::any::type_name::<T>()
        );
        let id = ComponentTypeId(self.sets.len());
        self.sets.push(Box::new(SparseSet::<T>::new()));
        self.type_ids.insert(tid, id);
        id
    }

    pub fn type_id_of<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.type_ids.get(&TypeId::of::<T>()).copied()
    }

    /// Called by the executor/scheduler before the first tick; no component
    /// type may be registered afterward (spec.md §1 Non-goals: "dynamic
    /// component type registration after startup").
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn sparse_set<T: 'static>(&self) -> &SparseSet<T> {
        let id = self
            .type_id_of::<T>()
            .unwrap_or_else(|| panic!("component type {} was never registered", std::any::type_name::<T>()));
        self.sets[id.0].as_any().downcast_ref().expect("component type id / T mismatch")
    }

    fn sparse_set_mut<T: 'static>(&mut self) -> &mut SparseSet<T> {
        let id = self
            .type_id_of::<T>()
            .unwrap_or_else(|| panic!("component type {} was never registered", std::any::type_name::<T>()));
        self.sets[id.0]
            .as_any_mut()
            .downcast_mut()
            .expect("component type id / T mismatch")
    }

    pub fn create<T: 'static + Default>(&mut self, entity: Entity) -> &mut T {
        self.sparse_set_mut::<T>().create_for(entity)
    }

    pub fn destroy<T: 'static>(&mut self, entity: Entity) {
        self.sparse_set_mut::<T>().destroy_of(entity);
    }

    pub fn destroy_by_type_id(&mut self, type_id: ComponentTypeId, entity: Entity) {
        self.sets[type_id.0].destroy_by_entity(entity);
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.sparse_set::<T>().get(entity)
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.sparse_set_mut::<T>().get_mut(entity)
    }

    pub fn len_of<T: 'static>(&self) -> usize {
        self.sparse_set::<T>().len()
    }

    pub fn get_by_dense_index<T: 'static>(&self, index: u32) -> Option<(Entity, &T)> {
        self.sparse_set::<T>().get_by_dense_index(index)
    }

    pub fn get_by_dense_index_mut<T: 'static>(&mut self, index: u32) -> Option<(Entity, &mut T)> {
        self.sparse_set_mut::<T>().get_by_dense_index_mut(index)
    }

    pub fn iterate<T: 'static>(&self) -> crate::sparse_set::Iter<'_, T> {
        self.sparse_set::<T>().iterate()
    }

    pub fn iterate_mut<T: 'static>(&mut self) -> crate::sparse_set::IterMut<'_, T> {
        self.sparse_set_mut::<T>().iterate_mut()
    }
}
