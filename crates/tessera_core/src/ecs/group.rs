// group.rs - Component groups (archetype keys and query filters)
//
// A group is a de-duplicated list of component descriptors plus a bit set
// keyed by component id. The bit set answers every question that matters:
// two groups describe the same archetype when their sets are equal, and a
// query group matches a storage group when the storage set is a superset.
// The ordered list only exists so storage can walk descriptors when it
// allocates columns.

use crate::ecs::{ComponentDescriptor, ComponentId};
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::fmt;

#[derive(Clone, Default)]
pub struct ComponentGroup {
    descriptors: SmallVec<[&'static ComponentDescriptor; 8]>,
    set: FixedBitSet,
}

impl ComponentGroup {
    /// An empty group.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(components: usize) -> Self {
        Self {
            descriptors: SmallVec::with_capacity(components),
            set: FixedBitSet::new(),
        }
    }

    /// Group of the given descriptors (duplicates collapse).
    pub fn of(descriptors: &[&'static ComponentDescriptor]) -> Self {
        let mut group = Self::with_capacity(descriptors.len());
        for descriptor in descriptors {
            group.add(descriptor);
        }
        group
    }

    /// Union of descriptors and groups, reserving space for all members up front.
    pub fn from_members(members: &[&dyn GroupMember]) -> Self {
        let total = members.iter().map(|m| m.member_count()).sum();
        let mut group = Self::with_capacity(total);
        for member in members {
            member.union_into(&mut group);
        }
        group
    }

    /// Add a component. Returns `false` if it was already present.
    pub fn add(&mut self, descriptor: &'static ComponentDescriptor) -> bool {
        let bit = descriptor.id() as usize;
        if self.set.contains(bit) {
            return false;
        }
        if bit >= self.set.len() {
            self.set.grow(bit + 1);
        }
        self.set.insert(bit);
        self.descriptors.push(descriptor);
        true
    }

    /// Add every component of `other`.
    pub fn extend(&mut self, other: &ComponentGroup) {
        self.descriptors.reserve(other.len());
        for descriptor in other.descriptors() {
            self.add(descriptor);
        }
    }

    /// Read-only view of the id bit set.
    #[inline]
    pub fn component_set(&self) -> &FixedBitSet {
        &self.set
    }

    /// Descriptors in insertion order.
    #[inline]
    pub fn descriptors(&self) -> &[&'static ComponentDescriptor] {
        &self.descriptors
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.set.contains(id as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Query semantics: every component of `self` is present in `other`.
    #[inline]
    pub fn matches(&self, other: &ComponentGroup) -> bool {
        self.set.is_subset(&other.set)
    }

    /// Smallest and largest component id, if any.
    pub fn id_range(&self) -> Option<(ComponentId, ComponentId)> {
        let mut ones = self.set.ones();
        let min = ones.next()? as ComponentId;
        let max = self.set.ones().last().map_or(min, |m| m as ComponentId);
        Some((min, max))
    }

    /// Component ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.set.ones().map(|bit| bit as ComponentId)
    }
}

/// Archetype equality: same component set, regardless of insertion order.
impl PartialEq for ComponentGroup {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.set.is_subset(&other.set)
    }
}

impl Eq for ComponentGroup {}

impl fmt::Debug for ComponentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.descriptors.iter().map(|d| d.name()))
            .finish()
    }
}

impl From<&'static ComponentDescriptor> for ComponentGroup {
    fn from(descriptor: &'static ComponentDescriptor) -> Self {
        Self::of(&[descriptor])
    }
}

impl FromIterator<&'static ComponentDescriptor> for ComponentGroup {
    fn from_iter<I: IntoIterator<Item = &'static ComponentDescriptor>>(iter: I) -> Self {
        let mut group = Self::new();
        for descriptor in iter {
            group.add(descriptor);
        }
        group
    }
}

/// Anything that can be unioned into a group: a descriptor or another group.
pub trait GroupMember {
    /// Upper bound on the components this member contributes.
    fn member_count(&self) -> usize;
    fn union_into(&self, group: &mut ComponentGroup);
}

impl GroupMember for &'static ComponentDescriptor {
    fn member_count(&self) -> usize {
        1
    }

    fn union_into(&self, group: &mut ComponentGroup) {
        group.add(self);
    }
}

impl GroupMember for ComponentGroup {
    fn member_count(&self) -> usize {
        self.len()
    }

    fn union_into(&self, group: &mut ComponentGroup) {
        group.extend(self);
    }
}

impl GroupMember for &ComponentGroup {
    fn member_count(&self) -> usize {
        self.len()
    }

    fn union_into(&self, group: &mut ComponentGroup) {
        group.extend(self);
    }
}

/// Build a [`ComponentGroup`] from descriptors and/or other groups.
///
/// # Example
/// ```ignore
/// let movable = component_group![position, velocity];
/// let named_movable = component_group![movable, name];
/// ```
#[macro_export]
macro_rules! component_group {
    () => {
        $crate::ecs::ComponentGroup::new()
    };
    ($($member:expr),+ $(,)?) => {{
        let members: &[&dyn $crate::ecs::GroupMember] = &[$(&$member),+];
        $crate::ecs::ComponentGroup::from_members(members)
    }};
}
