//! Two-phase entity construction
//!
//! An [`EntityInitializer`] reserves a slot in the container and collects
//! component values in a caller-owned [`StagingBuffer`]. Nothing touches an
//! entity group until the initializer is finished, at which point the final
//! component set is known and the row is written in one go. Aborting (or
//! simply dropping) the initializer destroys every staged value. A dropped
//! initializer hands its slot back to the container that reserved it; the
//! container reclaims it on its next allocation.
//!
//! Example:
//! ```ignore
//! let mut staging = container.staging_buffer();
//! let mut init = container.start_entity_initialization(&mut staging);
//! init.add_component_data(position, Position::default());
//! init.add_component_data(name, Name("player".into()));
//! let entity = container.finish_entity_initialization(init)?;
//! ```

use super::storage::BlobSegment;
use crate::config::StagingConfig;
use crate::ecs::{Component, ComponentDescriptor, ComponentGroup, Generation, SlotId};
use fixedbitset::FixedBitSet;
use std::any::type_name;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct StagedWrite {
    descriptor: &'static ComponentDescriptor,
    offset: usize,
}

/// Reusable byte storage for values staged by an initializer.
///
/// Values without drop glue go to a zero-filled trivial segment, the rest to
/// a destructible segment. Committing or discarding resets the bookkeeping
/// but keeps both allocations, so one buffer can stage entity after entity.
pub struct StagingBuffer {
    trivial: BlobSegment,
    destructible: BlobSegment,
    writes: Vec<StagedWrite>,
    components: ComponentGroup,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::with_config(&StagingConfig::default())
    }

    pub fn with_config(config: &StagingConfig) -> Self {
        Self {
            trivial: BlobSegment::new(config.initial_bytes, true),
            destructible: BlobSegment::new(config.initial_bytes, false),
            writes: Vec::new(),
            components: ComponentGroup::new(),
        }
    }

    /// Union of every component staged so far.
    #[inline]
    pub fn components(&self) -> &ComponentGroup {
        &self.components
    }

    /// Number of staged writes, counting overwrites separately.
    #[inline]
    pub fn staged_writes(&self) -> usize {
        self.writes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Bytes occupied by staged values, including alignment padding.
    pub fn staged_bytes(&self) -> usize {
        self.trivial.len() + self.destructible.len()
    }

    /// Bytes currently allocated across both segments.
    pub fn allocated_bytes(&self) -> usize {
        self.trivial.capacity() + self.destructible.capacity()
    }

    fn segment(&self, descriptor: &ComponentDescriptor) -> &BlobSegment {
        if descriptor.is_destructible() {
            &self.destructible
        } else {
            &self.trivial
        }
    }

    fn segment_mut(&mut self, descriptor: &ComponentDescriptor) -> &mut BlobSegment {
        if descriptor.is_destructible() {
            &mut self.destructible
        } else {
            &mut self.trivial
        }
    }

    pub(crate) fn stage<T: Component>(&mut self, descriptor: &'static ComponentDescriptor, value: T) {
        assert!(
            descriptor.is::<T>(),
            "component {} ({}) staged as {}",
            descriptor.id(),
            descriptor.name(),
            type_name::<T>()
        );
        let offset = self.segment_mut(descriptor).push(value);
        self.writes.push(StagedWrite { descriptor, offset });
        self.components.add(descriptor);
    }

    fn latest(&self, descriptor: &ComponentDescriptor) -> Option<StagedWrite> {
        self.writes
            .iter()
            .rev()
            .find(|w| w.descriptor.id() == descriptor.id())
            .copied()
    }

    pub(crate) fn find<T: Component>(&self, descriptor: &ComponentDescriptor) -> Option<&T> {
        let write = self.latest(descriptor)?;
        assert!(write.descriptor.is::<T>(), "staged {} read as {}", write.descriptor.name(), type_name::<T>());
        // SAFETY: the write was staged by `stage::<T>` and is still live.
        Some(unsafe { self.segment(write.descriptor).get::<T>(write.offset) })
    }

    pub(crate) fn find_mut<T: Component>(&mut self, descriptor: &ComponentDescriptor) -> Option<&mut T> {
        let write = self.latest(descriptor)?;
        assert!(write.descriptor.is::<T>(), "staged {} read as {}", write.descriptor.name(), type_name::<T>());
        // SAFETY: as in `find`.
        Some(unsafe { self.segment_mut(write.descriptor).get_mut::<T>(write.offset) })
    }

    /// Hand the newest value of each component to `sink`, destroy values
    /// superseded by a later write, and reset.
    ///
    /// `sink` receives a pointer it must take ownership of by bitwise move.
    pub(crate) fn drain_latest(&mut self, mut sink: impl FnMut(&'static ComponentDescriptor, *const u8)) {
        let mut seen = FixedBitSet::with_capacity(self.components.component_set().len());
        let mut writes = std::mem::take(&mut self.writes);
        for write in writes.iter().rev() {
            let segment = if write.descriptor.is_destructible() {
                &mut self.destructible
            } else {
                &mut self.trivial
            };
            if seen.put(write.descriptor.id() as usize) {
                // SAFETY: superseded values are still live and never handed out again.
                unsafe { segment.destroy_at(write.descriptor, write.offset) };
            } else {
                sink(write.descriptor, segment.ptr_at(write.offset));
            }
        }
        writes.clear();
        self.writes = writes;
        self.reset();
    }

    /// Destroy every staged value and reset. Returns how many were destroyed.
    pub(crate) fn discard(&mut self) -> usize {
        let destroyed = self.writes.len();
        for write in std::mem::take(&mut self.writes) {
            // SAFETY: every recorded write is live until drained or discarded.
            unsafe { self.segment_mut(write.descriptor).destroy_at(write.descriptor, write.offset) };
        }
        self.reset();
        destroyed
    }

    fn reset(&mut self) {
        self.trivial.reset();
        self.destructible.reset();
        self.components = ComponentGroup::new();
    }
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("components", &self.components)
            .field("writes", &self.writes.len())
            .field("bytes", &self.staged_bytes())
            .finish()
    }
}

/// Slots released by initializers that were dropped or handed to the wrong
/// container. Shared between a container and every initializer it starts.
#[derive(Debug, Default)]
pub(crate) struct ReleasedSlots {
    slots: Mutex<Vec<(SlotId, Generation)>>,
}

impl ReleasedSlots {
    fn release(&self, slot: SlotId, generation: Generation) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((slot, generation));
    }

    pub(crate) fn take(&self) -> Vec<(SlotId, Generation)> {
        std::mem::take(&mut *self.slots.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Released slots for which `still_reserved` holds.
    pub(crate) fn count(
        &self,
        mut still_reserved: impl FnMut(SlotId, Generation) -> bool,
    ) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|&&(slot, generation)| still_reserved(slot, generation))
            .count()
    }
}

/// In-flight construction of one entity.
///
/// Should be handed back to the container that started it, either through
/// `finish_entity_initialization` or `abort_entity_initialization`. Dropping
/// it, or handing it to another container, destroys the staged values and
/// returns the slot to its owner.
pub struct EntityInitializer<'s> {
    slot: SlotId,
    generation: Generation,
    owner: Arc<ReleasedSlots>,
    staging: &'s mut StagingBuffer,
    settled: bool,
}

impl<'s> EntityInitializer<'s> {
    pub(crate) fn new(
        slot: SlotId,
        generation: Generation,
        owner: Arc<ReleasedSlots>,
        staging: &'s mut StagingBuffer,
    ) -> Self {
        // A reused buffer may still hold values from an initializer that was leaked.
        if !staging.is_empty() {
            staging.discard();
        }
        Self {
            slot,
            generation,
            owner,
            staging,
            settled: false,
        }
    }

    /// Slot reserved for the entity being built.
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Generation of the reserved slot when the initializer started.
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether this initializer was started by the container owning `released`.
    #[inline]
    pub(crate) fn belongs_to(&self, released: &Arc<ReleasedSlots>) -> bool {
        Arc::ptr_eq(&self.owner, released)
    }

    /// Components staged so far.
    #[inline]
    pub fn components(&self) -> &ComponentGroup {
        self.staging.components()
    }

    /// Stage `value` for the component described by `descriptor`. A later
    /// write of the same component replaces this one.
    ///
    /// # Panics
    /// If `descriptor` does not describe `T`.
    pub fn add_component_data<T: Component>(
        &mut self,
        descriptor: &'static ComponentDescriptor,
        value: T,
    ) -> &mut Self {
        self.staging.stage(descriptor, value);
        self
    }

    /// Latest staged value for `descriptor`, if any.
    pub fn find_component_data<T: Component>(&self, descriptor: &ComponentDescriptor) -> Option<&T> {
        self.staging.find(descriptor)
    }

    pub fn find_component_data_mut<T: Component>(
        &mut self,
        descriptor: &ComponentDescriptor,
    ) -> Option<&mut T> {
        self.staging.find_mut(descriptor)
    }

    pub(crate) fn staging_mut(&mut self) -> &mut StagingBuffer {
        self.staging
    }

    /// Destroy staged values and mark the initializer as handled.
    pub(crate) fn discard(&mut self) -> usize {
        self.settled = true;
        self.staging.discard()
    }

    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }

    /// Destroy staged values and hand the slot back to the owning container.
    pub(crate) fn release(&mut self) -> usize {
        let destroyed = self.discard();
        self.owner.release(self.slot, self.generation);
        destroyed
    }
}

impl Drop for EntityInitializer<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let destroyed = self.release();
        tracing::warn!(
            slot = self.slot,
            destroyed,
            "entity initializer dropped without finish or abort; slot released"
        );
    }
}

impl std::fmt::Debug for EntityInitializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityInitializer")
            .field("slot", &self.slot)
            .field("components", self.staging.components())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone, Copy, Debug, PartialEq)]
    struct Health(u32);

    #[derive(Default)]
    struct Tracked(Option<Arc<AtomicUsize>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            if let Some(counter) = &self.0 {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn last_write_wins() {
        let registry = ComponentRegistry::new();
        let health = registry.register::<Health>();
        let mut staging = StagingBuffer::new();
        let mut init = EntityInitializer::new(0, 0, Arc::default(), &mut staging);
        init.add_component_data(health, Health(10))
            .add_component_data(health, Health(25));
        assert_eq!(init.find_component_data::<Health>(health), Some(&Health(25)));
        init.find_component_data_mut::<Health>(health).unwrap().0 += 1;
        assert_eq!(init.find_component_data::<Health>(health), Some(&Health(26)));
        assert_eq!(init.components().len(), 1);
        init.discard();
    }

    #[test]
    fn drain_destroys_superseded_values_only() {
        let registry = ComponentRegistry::new();
        let tracked = registry.register::<Tracked>();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut staging = StagingBuffer::new();
        staging.stage(tracked, Tracked(Some(drops.clone())));
        staging.stage(tracked, Tracked(Some(drops.clone())));

        let mut handed_out = Vec::new();
        staging.drain_latest(|descriptor, ptr| handed_out.push((descriptor.id(), ptr)));
        assert_eq!(handed_out.len(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(staging.is_empty());
        assert!(staging.components().is_empty());
    }

    #[test]
    fn discard_destroys_every_staged_value() {
        let registry = ComponentRegistry::new();
        let tracked = registry.register::<Tracked>();
        let health = registry.register::<Health>();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut staging = StagingBuffer::new();
        for _ in 0..3 {
            staging.stage(tracked, Tracked(Some(drops.clone())));
        }
        staging.stage(health, Health(1));
        assert_eq!(staging.discard(), 4);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropped_initializer_cleans_up() {
        let registry = ComponentRegistry::new();
        let tracked = registry.register::<Tracked>();
        let drops = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(ReleasedSlots::default());
        let mut staging = StagingBuffer::new();
        {
            let mut init = EntityInitializer::new(3, 2, released.clone(), &mut staging);
            init.add_component_data(tracked, Tracked(Some(drops.clone())));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(staging.is_empty());
        assert_eq!(released.take(), vec![(3, 2)]);
        assert!(released.take().is_empty());
    }

    #[test]
    fn buffer_keeps_allocation_between_entities() {
        let registry = ComponentRegistry::new();
        let health = registry.register::<Health>();
        let mut staging = StagingBuffer::new();
        for i in 0..32 {
            staging.stage(health, Health(i));
        }
        let allocated = staging.allocated_bytes();
        assert_eq!(staging.staged_bytes(), 32 * std::mem::size_of::<Health>());
        assert!(allocated >= staging.staged_bytes());
        staging.discard();
        assert_eq!(staging.staged_bytes(), 0);
        assert_eq!(staging.allocated_bytes(), allocated);
    }

    #[test]
    #[should_panic(expected = "staged as")]
    fn staging_wrong_type_panics() {
        let registry = ComponentRegistry::new();
        let health = registry.register::<Health>();
        let mut staging = StagingBuffer::new();
        staging.stage(health, 5u64);
    }
}
