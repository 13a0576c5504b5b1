// entity_group.rs - SoA storage for one archetype
//
// Implements Structure-of-Arrays layout for cache-efficient entity storage.
// Columns are split into a trivial partition (no destroy hook) and a
// destructible partition, and an id-indexed table maps a component id to
// its column in O(1).

use super::blob::{self, Column};
use crate::config::StorageConfig;
use crate::ecs::{ComponentGroup, ComponentId, SlotId, StagingBuffer};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnSlot {
    Trivial(u32),
    Destructible(u32),
}

/// Storage for all entities of a single archetype.
///
/// Rows are dense: row `i` belongs to the entity whose persistent slot is
/// `slots[i]`. Removing a row moves the last row into the hole and reports
/// which slot moved so the container can repoint it.
pub struct EntityGroup {
    components: ComponentGroup, // The exact component set stored here

    trivial: Vec<Column>,
    destructible: Vec<Column>,

    min_component_id: ComponentId,
    column_index: Vec<Option<ColumnSlot>>, // id - min_component_id -> column

    slots: Vec<SlotId>, // Maps row index to persistent slot

    capacity: usize, // Rows every column has space for
    growth: StorageConfig,
}

impl EntityGroup {
    /// Create empty storage for `components`. No column memory is allocated
    /// until the first row is added.
    pub fn new(components: ComponentGroup, growth: &StorageConfig) -> Self {
        let (min_id, max_id) = components.id_range().unwrap_or((0, 0));
        let mut column_index = vec![None; (max_id - min_id) as usize + 1];
        let mut trivial = Vec::new();
        let mut destructible = Vec::new();

        for &descriptor in components.descriptors() {
            let index = (descriptor.id() - min_id) as usize;
            if descriptor.is_destructible() {
                column_index[index] = Some(ColumnSlot::Destructible(destructible.len() as u32));
                destructible.push(Column::new(descriptor));
            } else {
                column_index[index] = Some(ColumnSlot::Trivial(trivial.len() as u32));
                trivial.push(Column::new(descriptor));
            }
        }

        Self {
            components,
            trivial,
            destructible,
            min_component_id: min_id,
            column_index,
            slots: Vec::new(),
            capacity: 0,
            growth: growth.clone(),
        }
    }

    #[inline]
    pub fn components(&self) -> &ComponentGroup {
        &self.components
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Row range of every live entity.
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        0..self.len()
    }

    /// Persistent slot of the entity stored at `row`.
    #[inline]
    pub fn slot_at(&self, row: usize) -> Option<SlotId> {
        self.slots.get(row).copied()
    }

    #[inline]
    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    #[inline]
    pub fn has(&self, id: ComponentId) -> bool {
        self.locate(id).is_some()
    }

    pub fn trivial_columns(&self) -> &[Column] {
        &self.trivial
    }

    pub fn destructible_columns(&self) -> &[Column] {
        &self.destructible
    }

    fn locate(&self, id: ComponentId) -> Option<ColumnSlot> {
        let index = id.checked_sub(self.min_component_id)? as usize;
        self.column_index.get(index).copied().flatten()
    }

    pub fn column(&self, id: ComponentId) -> Option<&Column> {
        match self.locate(id)? {
            ColumnSlot::Trivial(i) => self.trivial.get(i as usize),
            ColumnSlot::Destructible(i) => self.destructible.get(i as usize),
        }
    }

    pub fn column_mut(&mut self, id: ComponentId) -> Option<&mut Column> {
        match self.locate(id)? {
            ColumnSlot::Trivial(i) => self.trivial.get_mut(i as usize),
            ColumnSlot::Destructible(i) => self.destructible.get_mut(i as usize),
        }
    }

    fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.trivial.iter_mut().chain(self.destructible.iter_mut())
    }

    /// Grow every column if the next row would not fit.
    fn reserve_row(&mut self) {
        if self.len() < self.capacity {
            return;
        }
        let new_capacity = self.growth.next_capacity(self.capacity);
        tracing::trace!(
            group = ?self.components,
            from = self.capacity,
            to = new_capacity,
            "growing entity group"
        );
        for column in self.columns_mut() {
            column.grow(new_capacity);
        }
        self.slots.reserve(new_capacity - self.slots.len());
        self.capacity = new_capacity;
    }

    /// Append a row with every component default-constructed.
    pub fn add_entity(&mut self, slot: SlotId) -> usize {
        self.reserve_row();
        for column in self.columns_mut() {
            column.push_default();
        }
        self.slots.push(slot);
        self.slots.len() - 1
    }

    /// Append a row whose components are moved out of `staged`.
    ///
    /// `staged` must hold exactly this group's component set; its bookkeeping
    /// is reset afterwards while its memory is kept for reuse.
    pub fn initialize_entity(&mut self, slot: SlotId, staged: &mut StagingBuffer) -> usize {
        assert!(
            staged.components() == &self.components,
            "staged components {:?} do not form group {:?}",
            staged.components(),
            self.components
        );
        self.reserve_row();
        let row = self.slots.len();
        staged.drain_latest(|descriptor, src| {
            let column = self.column_mut(descriptor.id()).unwrap_or_else(|| {
                panic!("staged component {} is not part of this group", descriptor.name())
            });
            // SAFETY: `src` points at a live staged value of `descriptor`'s type,
            // and `drain_latest` forgets it once this closure returns.
            unsafe { column.push_moved(descriptor, src) };
        });
        debug_assert!(self.columns_mut().all(|c| c.len() == row + 1));
        self.slots.push(slot);
        row
    }

    /// Destroy `row`, moving the last row into its place.
    ///
    /// Returns the slot of the entity that now lives at `row`, if one moved.
    pub fn remove_entity(&mut self, row: usize) -> Option<SlotId> {
        assert!(row < self.len(), "row {row} out of bounds (len {})", self.len());
        let last = self.len() - 1;
        if row == last {
            self.delete_last_entity();
            return None;
        }
        for column in self.columns_mut() {
            column.swap_remove(row);
        }
        self.slots.swap_remove(row);
        Some(self.slots[row])
    }

    /// Destroy the last row.
    pub fn delete_last_entity(&mut self) {
        assert!(!self.is_empty(), "delete_last_entity on empty group");
        for column in self.columns_mut() {
            column.pop();
        }
        self.slots.pop();
    }

    /// Destroy every row, keeping column allocations.
    pub fn clear(&mut self) {
        for column in self.columns_mut() {
            column.clear();
        }
        self.slots.clear();
    }

    fn missing(&self, id: ComponentId) -> ! {
        panic!("entity group {:?} has no component {id}", self.components)
    }

    /// Typed access to one component of one row.
    ///
    /// # Panics
    /// If the group lacks the component, `T` is not its type, or `row` is out of bounds.
    pub fn get_value<T: 'static>(&self, id: ComponentId, row: usize) -> &T {
        let column = self.column(id).unwrap_or_else(|| self.missing(id));
        column
            .get::<T>(row)
            .unwrap_or_else(|| panic!("row {row} out of bounds (len {})", column.len()))
    }

    pub fn get_value_mut<T: 'static>(&mut self, id: ComponentId, row: usize) -> &mut T {
        if !self.has(id) {
            self.missing(id);
        }
        let len = self.len();
        self.column_mut(id)
            .and_then(|column| column.get_mut::<T>(row))
            .unwrap_or_else(|| panic!("row {row} out of bounds (len {len})"))
    }

    /// `None` if the group lacks the component or the row does not exist.
    pub fn try_get_value<T: 'static>(&self, id: ComponentId, row: usize) -> Option<&T> {
        self.column(id)?.get::<T>(row)
    }

    pub fn try_get_value_mut<T: 'static>(&mut self, id: ComponentId, row: usize) -> Option<&mut T> {
        self.column_mut(id)?.get_mut::<T>(row)
    }

    /// Whole column as a typed slice, one element per row.
    pub fn column_slice<T: 'static>(&self, id: ComponentId) -> Option<&[T]> {
        Some(self.column(id)?.as_slice::<T>())
    }

    pub fn column_slice_mut<T: 'static>(&mut self, id: ComponentId) -> Option<&mut [T]> {
        Some(self.column_mut(id)?.as_mut_slice::<T>())
    }

    /// Two distinct columns mutably at once.
    ///
    /// # Panics
    /// If `a == b`.
    pub fn column_pair_mut<A: 'static, B: 'static>(
        &mut self,
        a: ComponentId,
        b: ComponentId,
    ) -> Option<(&mut [A], &mut [B])> {
        assert_ne!(a, b, "column_pair_mut needs two different components");
        let (sa, sb) = (self.locate(a)?, self.locate(b)?);
        Some(match (sa, sb) {
            (ColumnSlot::Trivial(i), ColumnSlot::Trivial(j)) => {
                blob::column_pair_mut::<A, B>(&mut self.trivial, i as usize, j as usize)
            }
            (ColumnSlot::Destructible(i), ColumnSlot::Destructible(j)) => {
                blob::column_pair_mut::<A, B>(&mut self.destructible, i as usize, j as usize)
            }
            (ColumnSlot::Trivial(i), ColumnSlot::Destructible(j)) => (
                self.trivial[i as usize].as_mut_slice::<A>(),
                self.destructible[j as usize].as_mut_slice::<B>(),
            ),
            (ColumnSlot::Destructible(i), ColumnSlot::Trivial(j)) => (
                self.destructible[i as usize].as_mut_slice::<A>(),
                self.trivial[j as usize].as_mut_slice::<B>(),
            ),
        })
    }
}

impl std::fmt::Debug for EntityGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGroup")
            .field("components", &self.components)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentGroup, ComponentRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone, Copy, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Default, Clone, Copy, Debug, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Default, Debug, PartialEq)]
    struct Name(String);

    #[derive(Default)]
    struct DropCounter(Option<Arc<AtomicUsize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            if let Some(counter) = &self.0 {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn partitions_columns_by_drop_glue() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let name = registry.register::<Name>();
        let group = EntityGroup::new(ComponentGroup::of(&[name, pos]), &StorageConfig::default());
        assert_eq!(group.trivial_columns().len(), 1);
        assert_eq!(group.destructible_columns().len(), 1);
        assert!(group.has(pos.id()));
        assert!(!group.has(99));
        assert_eq!(group.capacity(), 0);
    }

    #[test]
    fn grows_geometrically_from_minimum() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[pos]), &StorageConfig::default());
        for slot in 0..9 {
            assert_eq!(group.add_entity(slot), slot as usize);
        }
        assert_eq!(group.capacity(), 12);
        assert_eq!(group.len(), 9);
    }

    #[test]
    fn remove_moves_last_row_and_reports_slot() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let name = registry.register::<Name>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[pos, name]), &StorageConfig::default());
        for slot in 0..3 {
            let row = group.add_entity(slot * 10);
            group.get_value_mut::<Position>(pos.id(), row).x = slot as f32;
            group.get_value_mut::<Name>(name.id(), row).0 = format!("e{slot}");
        }

        assert_eq!(group.remove_entity(0), Some(20));
        assert_eq!(group.len(), 2);
        assert_eq!(group.slots(), &[20, 10]);
        assert_eq!(group.get_value::<Position>(pos.id(), 0).x, 2.0);
        assert_eq!(group.get_value::<Name>(name.id(), 0), &Name("e2".into()));

        assert_eq!(group.remove_entity(1), None);
        assert_eq!(group.slots(), &[20]);
    }

    #[test]
    fn destroy_hooks_run_once_per_row() {
        let registry = ComponentRegistry::new();
        let counter = registry.register::<DropCounter>();
        let drops = Arc::new(AtomicUsize::new(0));
        let mut group = EntityGroup::new(ComponentGroup::of(&[counter]), &StorageConfig::default());
        for slot in 0..20 {
            let row = group.add_entity(slot);
            *group.get_value_mut::<DropCounter>(counter.id(), row) = DropCounter(Some(drops.clone()));
        }
        // Growth relocates rows without dropping them.
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        group.remove_entity(3);
        group.delete_last_entity();
        assert_eq!(drops.load(Ordering::SeqCst), 2);

        let capacity = group.capacity();
        group.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 20);
        assert_eq!(group.capacity(), capacity);
        assert!(group.is_empty());
    }

    #[test]
    fn try_get_reports_missing_components() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let vel = registry.register::<Velocity>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[pos]), &StorageConfig::default());
        let row = group.add_entity(0);
        assert!(group.try_get_value::<Position>(pos.id(), row).is_some());
        assert!(group.try_get_value::<Velocity>(vel.id(), row).is_none());
        assert!(group.try_get_value::<Position>(pos.id(), row + 1).is_none());
    }

    #[test]
    #[should_panic(expected = "accessed as")]
    fn get_value_with_wrong_type_panics() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[pos]), &StorageConfig::default());
        let row = group.add_entity(0);
        let _ = group.get_value::<Velocity>(pos.id(), row);
    }

    #[test]
    fn initialize_moves_staged_values_into_row() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let name = registry.register::<Name>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[pos, name]), &StorageConfig::default());
        let mut staging = StagingBuffer::new();
        staging.stage(name, Name("staged".into()));
        staging.stage(pos, Position { x: 3.0, y: 4.0 });

        let row = group.initialize_entity(7, &mut staging);
        assert_eq!(group.slot_at(row), Some(7));
        assert_eq!(group.get_value::<Name>(name.id(), row), &Name("staged".into()));
        assert_eq!(group.get_value::<Position>(pos.id(), row), &Position { x: 3.0, y: 4.0 });
        assert!(staging.is_empty());
    }

    #[test]
    #[should_panic(expected = "do not form group")]
    fn initialize_rejects_components_from_another_registry() {
        #[derive(Default)]
        struct Raw(#[allow(dead_code)] [u64; 3]);

        let names = ComponentRegistry::new();
        let raws = ComponentRegistry::new();
        let name = names.register::<Name>();
        let raw = raws.register::<Raw>();
        let mut group = EntityGroup::new(ComponentGroup::of(&[name]), &StorageConfig::default());
        let mut staging = StagingBuffer::new();
        staging.stage(raw, Raw([7, 0x10, 7]));
        group.initialize_entity(0, &mut staging);
    }

    #[test]
    fn column_pair_spans_partitions() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let vel = registry.register::<Velocity>();
        let name = registry.register::<Name>();
        let mut group =
            EntityGroup::new(ComponentGroup::of(&[pos, vel, name]), &StorageConfig::default());
        for slot in 0..4 {
            let row = group.add_entity(slot);
            *group.get_value_mut::<Velocity>(vel.id(), row) = Velocity { x: 1.0, y: 2.0 };
        }

        let (positions, velocities) = group
            .column_pair_mut::<Position, Velocity>(pos.id(), vel.id())
            .unwrap();
        for (p, v) in positions.iter_mut().zip(velocities.iter()) {
            p.x += v.x;
            p.y += v.y;
        }
        assert!(group
            .column_slice::<Position>(pos.id())
            .unwrap()
            .iter()
            .all(|p| *p == Position { x: 1.0, y: 2.0 }));

        let (names, positions) = group
            .column_pair_mut::<Name, Position>(name.id(), pos.id())
            .unwrap();
        assert_eq!(names.len(), positions.len());
    }
}
