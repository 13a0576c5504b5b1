// container.rs - Entity container owning slots and entity groups
//
// Entities are persistent slots in a paged store; their data lives in exactly
// one entity group row. Groups are created lazily the first time an exact
// component set is requested and live until the container is dropped.

use crate::config::EcsConfig;
use crate::ecs::{
    ComponentGroup, ComponentId, Entity, EntityConstRef, EntityGroup, EntityInitializer,
    EntityLocation, EntityRef, EntitySlot, Generation, PagedStore, SlotId, StagingBuffer,
};
use crate::error::{ConfigError, EcsError};
use super::initializer::ReleasedSlots;
use std::ops::Range;
use std::sync::Arc;
use tessera_metrics::{metrics, Counter};

/// Owner of every entity slot and entity group.
pub struct EntityContainer {
    config: EcsConfig,
    slots: PagedStore<EntitySlot>,
    free: Vec<SlotId>,
    groups: Vec<EntityGroup>,
    live: usize,
    reserved: usize,
    released: Arc<ReleasedSlots>, // Slots handed back by dropped initializers
    counters: Counter,
}

impl EntityContainer {
    /// Create an empty container with default settings.
    pub fn new() -> Self {
        Self::build(EcsConfig::default())
    }

    /// Create an empty container after validating `config`.
    pub fn with_config(config: EcsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EcsConfig) -> Self {
        Self {
            slots: PagedStore::with_rows_per_page(config.storage.entity_page_size),
            config,
            free: Vec::new(),
            groups: Vec::new(),
            live: 0,
            reserved: 0,
            released: Arc::default(),
            counters: Counter::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    /// A staging buffer sized by this container's settings.
    pub fn staging_buffer(&self) -> StagingBuffer {
        StagingBuffer::with_config(&self.config.staging)
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    fn allocate_slot(&mut self) -> SlotId {
        self.reclaim_released();
        if let Some(slot) = self.free.pop() {
            return slot;
        }
        let id = self.slots.len() as SlotId;
        self.slots.push(EntitySlot::new(id));
        id
    }

    /// Whether `slot` is still reserved by the initializer that saw `generation`.
    fn still_reserved(&self, slot: SlotId, generation: Generation) -> bool {
        self.slots
            .get(slot as usize)
            .is_some_and(|s| s.generation == generation && s.location.is_none())
    }

    /// Return slots of dropped initializers to the free list. Releases from
    /// before an `empty()` carry an old generation and are ignored.
    fn reclaim_released(&mut self) {
        for (slot, generation) in self.released.take() {
            if self.still_reserved(slot, generation) {
                self.free.push(slot);
                self.reserved -= 1;
                tracing::trace!(slot, "reclaimed released slot");
            }
        }
    }

    /// Retire a slot: bump its generation and make it reusable.
    fn recycle_slot(&mut self, slot: SlotId) {
        let record = &mut self.slots[slot as usize];
        record.generation = record.generation.wrapping_add(1);
        record.location = None;
        self.free.push(slot);
    }

    fn set_location(&mut self, slot: SlotId, group: usize, row: usize) -> Entity {
        let location = EntityLocation {
            group: group as u32,
            row: row as u32,
        };
        let record = &mut self.slots[slot as usize];
        record.location = Some(location);
        Entity::new(location, slot, record.generation)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Index of the group storing exactly `components`, created on first use.
    fn find_or_create_group(&mut self, components: &ComponentGroup) -> usize {
        if let Some(index) = self.groups.iter().position(|g| g.components() == components) {
            return index;
        }
        tracing::debug!(
            index = self.groups.len(),
            components = ?components,
            "creating entity group"
        );
        self.groups
            .push(EntityGroup::new(components.clone(), &self.config.storage));
        metrics!(self.counters.increment("groups_created", 1));
        self.groups.len() - 1
    }

    /// First group at or after `start` whose component set contains all of `query`.
    pub fn match_next_entity_group(&self, start: usize, query: &ComponentGroup) -> Option<usize> {
        self.groups
            .get(start..)?
            .iter()
            .position(|g| query.matches(g.components()))
            .map(|offset| start + offset)
    }

    /// Lazily walk every non-empty group matching `query`.
    pub fn entities<'a>(&'a self, query: &'a ComponentGroup) -> GroupRanges<'a> {
        GroupRanges {
            container: self,
            query,
            next: 0,
        }
    }

    /// Indices of every group matching `query`, written into `out`.
    pub fn matching_groups(&self, query: &ComponentGroup, out: &mut Vec<usize>) {
        out.clear();
        let mut next = 0;
        while let Some(index) = self.match_next_entity_group(next, query) {
            out.push(index);
            next = index + 1;
        }
    }

    #[inline]
    pub fn group(&self, index: usize) -> Option<&EntityGroup> {
        self.groups.get(index)
    }

    #[inline]
    pub fn group_mut(&mut self, index: usize) -> Option<&mut EntityGroup> {
        self.groups.get_mut(index)
    }

    #[inline]
    pub fn groups(&self) -> &[EntityGroup] {
        &self.groups
    }

    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create an entity whose components are all default-constructed.
    pub fn create_entity(&mut self, components: &ComponentGroup) -> Result<Entity, EcsError> {
        if components.is_empty() {
            return Err(EcsError::EmptyGroup);
        }
        let slot = self.allocate_slot();
        let group = self.find_or_create_group(components);
        let row = self.groups[group].add_entity(slot);
        let entity = self.set_location(slot, group, row);
        self.live += 1;
        metrics!(self.counters.increment("entities_created", 1));
        tracing::trace!(slot, group, row, "created entity");
        Ok(entity)
    }

    /// Reserve a slot and start staging components into `staging`.
    pub fn start_entity_initialization<'s>(
        &mut self,
        staging: &'s mut StagingBuffer,
    ) -> EntityInitializer<'s> {
        let slot = self.allocate_slot();
        let generation = self.slots[slot as usize].generation;
        self.reserved += 1;
        EntityInitializer::new(slot, generation, Arc::clone(&self.released), staging)
    }

    fn check_initializer(&self, init: &EntityInitializer<'_>) -> Result<(), EcsError> {
        if !init.belongs_to(&self.released) {
            return Err(EcsError::ForeignInitializer { slot: init.slot() });
        }
        let generation = self.slots[init.slot() as usize].generation;
        if generation != init.generation() {
            // The container was emptied while the initializer was in flight.
            return Err(EcsError::StaleEntity {
                slot: init.slot(),
                generation: init.generation(),
            });
        }
        Ok(())
    }

    /// Commit the staged components as a new row.
    ///
    /// An initializer with nothing staged is aborted and reported as
    /// [`EcsError::EmptyGroup`].
    pub fn finish_entity_initialization(
        &mut self,
        mut init: EntityInitializer<'_>,
    ) -> Result<Entity, EcsError> {
        if let Err(err) = self.check_initializer(&init) {
            init.release();
            return Err(err);
        }
        if init.components().is_empty() {
            self.abort_entity_initialization(init)?;
            return Err(EcsError::EmptyGroup);
        }

        let slot = init.slot();
        let components = init.components().clone();
        let group = self.find_or_create_group(&components);
        let row = self.groups[group].initialize_entity(slot, init.staging_mut());
        init.settle();

        let entity = self.set_location(slot, group, row);
        self.reserved -= 1;
        self.live += 1;
        metrics!(self.counters.increment("entities_created", 1));
        tracing::trace!(slot, group, row, "initialized entity");
        Ok(entity)
    }

    /// Destroy every staged value and release the reserved slot.
    ///
    /// An initializer from another container is released to its owner and
    /// reported as [`EcsError::ForeignInitializer`].
    pub fn abort_entity_initialization(
        &mut self,
        mut init: EntityInitializer<'_>,
    ) -> Result<(), EcsError> {
        if let Err(err) = self.check_initializer(&init) {
            init.release();
            return Err(err);
        }
        let destroyed = init.discard();

        // The slot never held a live entity, so no handle can observe it.
        self.free.push(init.slot());
        self.reserved -= 1;
        metrics!(self.counters.increment("initializations_aborted", 1));
        tracing::trace!(slot = init.slot(), destroyed, "aborted entity initialization");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    fn stale(&self, slot: SlotId) -> EcsError {
        EcsError::StaleEntity {
            slot,
            generation: self.slots.get(slot as usize).map_or(0, |s| s.generation),
        }
    }

    /// Destroy the entity behind a fast handle.
    ///
    /// Fails if the handle no longer points at the entity's current row, or
    /// its slot has been recycled since the handle was issued.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        let slot = entity.slot();
        let current = self.slots.get(slot as usize).and_then(|s| s.entity());
        if current != Some(entity) {
            return Err(self.stale(slot));
        }

        self.recycle_slot(slot);
        let (group, row) = (entity.group(), entity.row());
        if let Some(moved) = self.groups[group].remove_entity(row) {
            self.slots[moved as usize].location = Some(entity.location());
        }
        self.live -= 1;
        metrics!(self.counters.increment("entities_destroyed", 1));
        tracing::trace!(slot, group, row, "destroyed entity");
        Ok(())
    }

    /// Destroy the entity behind a stable handle. Returns `false` if it was
    /// already gone.
    pub fn destroy_ref(&mut self, stable: EntityRef) -> bool {
        match self.resolve(stable) {
            Some(entity) => self.destroy_entity(entity).is_ok(),
            None => false,
        }
    }

    /// Destroy every entity, keeping group allocations.
    ///
    /// Every slot's generation is bumped, which also invalidates initializers
    /// that are still in flight.
    pub fn empty(&mut self) {
        for group in &mut self.groups {
            group.clear();
        }
        self.free.clear();
        for record in self.slots.iter_mut() {
            record.generation = record.generation.wrapping_add(1);
            record.location = None;
        }
        // Reverse so low slots are handed out first again.
        self.free.extend((0..self.slots.len() as SlotId).rev());
        let destroyed = std::mem::take(&mut self.live);
        self.reserved = 0;
        self.released.take();
        metrics!(self.counters.increment("entities_destroyed", destroyed as u64));
        tracing::debug!(destroyed, groups = self.groups.len(), "emptied container");
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    /// Stable handle for a live entity.
    ///
    /// # Panics
    /// If `entity` was not produced by this container.
    pub fn entity_ref(&self, entity: Entity) -> EntityRef {
        EntityRef::new(entity.slot(), self.slots[entity.slot() as usize].generation)
    }

    /// Fast handle for the entity in `row` of group `group`.
    pub fn entity_at(&self, group: usize, row: usize) -> Option<Entity> {
        let slot = self.groups.get(group)?.slot_at(row)?;
        self.slots.get(slot as usize)?.entity()
    }

    /// Current fast handle for a stable handle, if the entity is still alive.
    pub fn resolve(&self, stable: impl Into<EntityConstRef>) -> Option<Entity> {
        let stable = stable.into().inner();
        let record = self.slots.get(stable.slot() as usize)?;
        if stable.matches(record) {
            record.entity()
        } else {
            None
        }
    }

    #[inline]
    pub fn is_valid(&self, stable: impl Into<EntityConstRef>) -> bool {
        self.resolve(stable).is_some()
    }

    /// Slot record, including free and reserved ones.
    pub fn slot(&self, slot: SlotId) -> Option<&EntitySlot> {
        self.slots.get(slot as usize)
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    /// # Panics
    /// If the entity's group lacks `id` or `T` is not its type.
    pub fn get_value<T: 'static>(&self, entity: Entity, id: ComponentId) -> &T {
        self.groups[entity.group()].get_value(id, entity.row())
    }

    pub fn get_value_mut<T: 'static>(&mut self, entity: Entity, id: ComponentId) -> &mut T {
        self.groups[entity.group()].get_value_mut(id, entity.row())
    }

    /// `None` if the entity's group lacks `id`.
    pub fn try_get_value<T: 'static>(&self, entity: Entity, id: ComponentId) -> Option<&T> {
        self.groups.get(entity.group())?.try_get_value(id, entity.row())
    }

    pub fn try_get_value_mut<T: 'static>(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<&mut T> {
        self.groups
            .get_mut(entity.group())?
            .try_get_value_mut(id, entity.row())
    }

    /// Component of a live entity behind a stable handle.
    pub fn get_ref<T: 'static>(
        &self,
        stable: impl Into<EntityConstRef>,
        id: ComponentId,
    ) -> Option<&T> {
        let entity = self.resolve(stable)?;
        self.try_get_value(entity, id)
    }

    pub fn get_ref_mut<T: 'static>(&mut self, stable: EntityRef, id: ComponentId) -> Option<&mut T> {
        let entity = self.resolve(stable)?;
        self.try_get_value_mut(entity, id)
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    /// Live (committed) entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots held by live initializers that have not been finished or aborted.
    pub fn reserved_slots(&self) -> usize {
        let released = self
            .released
            .count(|slot, generation| self.still_reserved(slot, generation));
        self.reserved - released
    }

    /// Slot records ever allocated: live, reserved and free.
    #[inline]
    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn counters(&self) -> &Counter {
        &self.counters
    }
}

impl Default for EntityContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContainer")
            .field("entities", &self.live)
            .field("groups", &self.groups)
            .field("reserved", &self.reserved)
            .finish()
    }
}

/// Rows of one matching group.
#[derive(Debug, Clone)]
pub struct GroupRange<'a> {
    pub index: usize,
    pub group: &'a EntityGroup,
    pub rows: Range<usize>,
}

impl GroupRange<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fast handles for every row, in row order.
    pub fn entities<'c>(
        &self,
        container: &'c EntityContainer,
    ) -> impl Iterator<Item = Entity> + 'c {
        let index = self.index;
        self.rows.clone().filter_map(move |row| container.entity_at(index, row))
    }
}

/// Iterator over non-empty groups matching a query. See [`EntityContainer::entities`].
#[derive(Clone)]
pub struct GroupRanges<'a> {
    container: &'a EntityContainer,
    query: &'a ComponentGroup,
    next: usize,
}

impl<'a> Iterator for GroupRanges<'a> {
    type Item = GroupRange<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(index) = self.container.match_next_entity_group(self.next, self.query) {
            self.next = index + 1;
            let group = &self.container.groups[index];
            if !group.is_empty() {
                return Some(GroupRange {
                    index,
                    group,
                    rows: group.rows(),
                });
            }
        }
        self.next = self.container.groups.len();
        None
    }
}
