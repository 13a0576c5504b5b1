//! Entity handles and persistent slot data
//!
//! Two kinds of handle point at an entity:
//!
//! - [`Entity`] is the fast handle: group index + row + slot + generation.
//!   It is only valid until the next structural change of its group (a
//!   swap-remove can move another entity into its row), so it should not be
//!   stored.
//! - [`EntityRef`] is the stable handle: slot + captured generation. It stays
//!   safe across any mutation and simply stops resolving once the entity is
//!   destroyed, even if the slot is reused later.

pub type Generation = u32;

/// Stable index of an entity's persistent slot.
pub type SlotId = u32;

/// Where a committed entity's row lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    pub group: u32,
    pub row: u32,
}

/// Persistent per-entity record.
///
/// `location` is `None` while the slot is free or reserved by an in-flight
/// initializer. `generation` only ever increases, once per destruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySlot {
    pub(crate) id: SlotId,
    pub(crate) generation: Generation,
    pub(crate) location: Option<EntityLocation>,
}

impl EntitySlot {
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            generation: 0,
            location: None,
        }
    }

    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    pub fn location(&self) -> Option<EntityLocation> {
        self.location
    }

    /// Fast handle for the committed entity in this slot.
    pub fn entity(&self) -> Option<Entity> {
        self.location
            .map(|loc| Entity::new(loc, self.id, self.generation))
    }
}

impl Default for EntitySlot {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Fast entity handle (group + row), valid until its group changes shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    group: u32,
    row: u32,
    slot: SlotId,
    generation: Generation,
}

impl Entity {
    pub(crate) const fn new(
        location: EntityLocation,
        slot: SlotId,
        generation: Generation,
    ) -> Self {
        Self {
            group: location.group,
            row: location.row,
            slot,
            generation,
        }
    }

    /// Index of the entity group holding this entity.
    #[inline]
    pub fn group(&self) -> usize {
        self.group as usize
    }

    #[inline]
    pub fn row(&self) -> usize {
        self.row as usize
    }

    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Generation of the slot when this handle was issued.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    pub fn location(&self) -> EntityLocation {
        EntityLocation {
            group: self.group,
            row: self.row,
        }
    }
}

/// Stable entity handle (slot + generation).
///
/// Format: [32-bit slot | 32-bit generation] when packed with `to_bits`.
///
/// Example:
/// ```ignore
/// let entity = container.create_entity(&group)?;
/// let stable = container.entity_ref(entity);
/// container.destroy_entity(entity)?;
/// assert!(!container.is_valid(stable));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    slot: SlotId,
    generation: Generation,
}

impl EntityRef {
    pub(crate) const fn new(slot: SlotId, generation: Generation) -> Self {
        Self { slot, generation }
    }

    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether this handle still denotes the live entity in `slot`.
    #[inline]
    pub fn matches(&self, slot: &EntitySlot) -> bool {
        slot.id == self.slot && slot.generation == self.generation && slot.location.is_some()
    }

    /// Read-only flavour of this handle.
    #[inline]
    pub fn as_const(&self) -> EntityConstRef {
        EntityConstRef(*self)
    }

    /// Serialize to 64-bit integer (for logs and external tables)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.slot as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            slot: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Stable handle that only grants read access.
///
/// Container lookups through it take `&EntityContainer`, so holders of an
/// `EntityConstRef` cannot reach mutating APIs through the handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntityConstRef(EntityRef);

impl EntityConstRef {
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.0.slot
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.0.generation
    }

    #[inline]
    pub(crate) fn inner(&self) -> EntityRef {
        self.0
    }
}

impl From<EntityRef> for EntityConstRef {
    fn from(value: EntityRef) -> Self {
        value.as_const()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        let stable = EntityRef::new(17, 3);
        assert_eq!(EntityRef::from_bits(stable.to_bits()), stable);
    }

    #[test]
    fn matches_requires_generation_and_location() {
        let mut slot = EntitySlot::new(4);
        let stable = EntityRef::new(4, 0);
        assert!(!stable.matches(&slot));

        slot.location = Some(EntityLocation { group: 0, row: 2 });
        assert!(stable.matches(&slot));
        assert_eq!(slot.entity().map(|e| e.row()), Some(2));

        slot.generation += 1;
        assert!(!stable.matches(&slot));
        assert_eq!(slot.entity().map(|e| e.generation()), Some(1));
    }
}
