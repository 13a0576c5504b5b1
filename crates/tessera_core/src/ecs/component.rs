// component.rs - Runtime component registration
//
// Components are identified by u32 ids handed out in registration order,
// not by Rust TypeIds. Ids come from one process-wide counter, so no two
// descriptors ever share an id, whichever registry created them.
// Descriptors live for the rest of the process, so groups and columns can
// hold plain `&'static` references to them.

use crate::error::EcsError;
use crate::ecs::ComponentGroup;
use once_cell::sync::Lazy;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, needs_drop, size_of};
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

pub type ComponentId = u32;

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(0);

/// Marker for types that can be stored in entity columns.
///
/// Every `'static + Send + Sync + Default` type qualifies; `Default` is what
/// direct entity creation uses to fill a fresh row.
pub trait Component: 'static + Sized + Send + Sync + Default {}

impl<T: 'static + Send + Sync + Default> Component for T {}

/// Type-erased construct hook: default-construct `count` elements at `dst`.
pub type ConstructFn = unsafe fn(dst: *mut u8, count: usize);

/// Type-erased destroy hook: drop `count` elements in place at `dst`.
pub type DestroyFn = unsafe fn(dst: *mut u8, count: usize);

unsafe fn construct_impl<T: Default>(dst: *mut u8, count: usize) {
    let dst = dst as *mut T;
    for i in 0..count {
        ptr::write(dst.add(i), T::default());
    }
}

unsafe fn destroy_impl<T>(dst: *mut u8, count: usize) {
    ptr::drop_in_place(ptr::slice_from_raw_parts_mut(dst as *mut T, count));
}

/// Immutable metadata describing one component type.
///
/// The destroy hook is `None` for types without drop glue; columns of such
/// types form the trivial partition and are never walked on removal.
/// Moves are always bitwise relocations, so no move hooks are stored.
pub struct ComponentDescriptor {
    id: ComponentId,
    name: &'static str,
    type_id: TypeId,
    size: usize,
    align: usize,
    construct: ConstructFn,
    destroy: Option<DestroyFn>,
}

impl ComponentDescriptor {
    fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            construct: construct_impl::<T>,
            destroy: needs_drop::<T>().then_some(destroy_impl::<T> as DestroyFn),
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Element size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Whether elements need their destroy hook run when they leave storage.
    #[inline]
    pub fn is_destructible(&self) -> bool {
        self.destroy.is_some()
    }

    #[inline]
    pub fn construct_fn(&self) -> ConstructFn {
        self.construct
    }

    #[inline]
    pub fn destroy_fn(&self) -> Option<DestroyFn> {
        self.destroy
    }

    /// Whether this descriptor describes `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("destructible", &self.is_destructible())
            .finish()
    }
}

/// Registry handing out component ids and descriptors.
///
/// Registration is idempotent per type: the first call for `T` allocates the
/// next id from the process-wide counter, later calls return the same
/// descriptor. A registry is normally created once at startup and threaded
/// through the application; [`ComponentRegistry::global`] offers a
/// process-wide instance for code that has no context to pass around.
///
/// Registering `T` in two registries yields two descriptors with distinct
/// ids, so their entities land in different groups.
pub struct ComponentRegistry {
    by_type: RwLock<HashMap<TypeId, &'static ComponentDescriptor>>,
    by_id: RwLock<HashMap<ComponentId, &'static ComponentDescriptor>>,
}

static GLOBAL: Lazy<ComponentRegistry> = Lazy::new(ComponentRegistry::new);

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_type: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ComponentRegistry {
        &GLOBAL
    }

    /// Register `T`, returning its descriptor. Repeated calls are cheap and
    /// return the descriptor created by the first call.
    pub fn register<T: Component>(&self) -> &'static ComponentDescriptor {
        if let Some(existing) = self.lookup::<T>() {
            return existing;
        }

        let mut by_type = self.by_type.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have won the race between the read and write locks.
        if let Some(existing) = by_type.get(&TypeId::of::<T>()) {
            return existing;
        }

        let id = NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed);
        let descriptor: &'static ComponentDescriptor =
            Box::leak(Box::new(ComponentDescriptor::of::<T>(id)));
        by_type.insert(TypeId::of::<T>(), descriptor);

        self.by_id
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, descriptor);

        tracing::debug!(id, name = descriptor.name, size = descriptor.size, "registered component");
        descriptor
    }

    /// Id of an already registered `T`.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentId> {
        self.lookup::<T>().map(|d| d.id)
    }

    /// Descriptor for a registered id.
    pub fn descriptor(&self, id: ComponentId) -> Option<&'static ComponentDescriptor> {
        self.by_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .copied()
    }

    /// Build a group from registered ids.
    pub fn group(&self, ids: &[ComponentId]) -> Result<ComponentGroup, EcsError> {
        let mut group = ComponentGroup::with_capacity(ids.len());
        for &id in ids {
            let descriptor = self
                .descriptor(id)
                .ok_or(EcsError::UnknownComponent { id })?;
            group.add(descriptor);
        }
        Ok(group)
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.by_id.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<T: 'static>(&self) -> Option<&'static ComponentDescriptor> {
        self.by_type
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<T>())
            .copied()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register `T` with the process-wide registry.
pub fn register_component<T: Component>() -> &'static ComponentDescriptor {
    ComponentRegistry::global().register::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Position {
        _x: f32,
        _y: f32,
    }

    #[derive(Default)]
    struct Name(#[allow(dead_code)] String);

    #[test]
    fn registration_is_idempotent() {
        let registry = ComponentRegistry::new();
        let a = registry.register::<Position>();
        let b = registry.register::<Position>();
        assert!(std::ptr::eq(a, b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ids_follow_registration_order() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let name = registry.register::<Name>();
        assert!(pos.id() < name.id());
        assert_eq!(registry.id_of::<Name>(), Some(name.id()));
        assert_eq!(registry.id_of::<u64>(), None);
        assert!(std::ptr::eq(registry.descriptor(name.id()).unwrap(), name));
    }

    #[test]
    fn registries_never_share_ids() {
        let first = ComponentRegistry::new();
        let second = ComponentRegistry::new();
        let name = first.register::<Name>();
        let pos = second.register::<Position>();
        let name_again = second.register::<Name>();
        assert_ne!(name.id(), pos.id());
        assert_ne!(name.id(), name_again.id());
        assert!(first.descriptor(pos.id()).is_none());
        assert!(second.descriptor(name.id()).is_none());
    }

    #[test]
    fn descriptor_partitions_by_drop_glue() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let name = registry.register::<Name>();
        assert!(!pos.is_destructible());
        assert!(name.is_destructible());
        assert_eq!(pos.size(), 8);
        assert!(pos.is::<Position>());
        assert!(!pos.is::<Name>());
    }

    #[test]
    fn group_from_unknown_id_fails() {
        let registry = ComponentRegistry::new();
        let pos = registry.register::<Position>();
        let foreign = ComponentRegistry::new().register::<Name>();
        assert!(registry.group(&[pos.id()]).is_ok());
        assert_eq!(
            registry.group(&[pos.id(), foreign.id()]).err(),
            Some(EcsError::UnknownComponent { id: foreign.id() })
        );
    }

    #[test]
    fn global_registry_is_shared() {
        struct OnlyGlobal;
        impl Default for OnlyGlobal {
            fn default() -> Self {
                OnlyGlobal
            }
        }
        let a = register_component::<OnlyGlobal>();
        let b = ComponentRegistry::global().register::<OnlyGlobal>();
        assert!(std::ptr::eq(a, b));
    }
}
