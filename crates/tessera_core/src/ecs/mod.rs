//! Entity Component System core types.
//!
//! Entities are grouped by their exact component set (an archetype). Each
//! group stores its components column by column, and systems iterate every
//! group whose component set contains the components they need.

mod component;
mod container;
mod entity;
mod group;
mod initializer;
pub mod storage;
mod system;
mod system_descriptor;
mod system_handle;
mod system_registration_error;
mod system_scheduler;
mod world;

pub use component::{
    register_component, Component, ComponentDescriptor, ComponentId, ComponentRegistry,
    ConstructFn, DestroyFn,
};
pub use container::{EntityContainer, GroupRange, GroupRanges};
pub use entity::{Entity, EntityConstRef, EntityLocation, EntityRef, EntitySlot, Generation, SlotId};
pub use group::{ComponentGroup, GroupMember};
pub use initializer::{EntityInitializer, StagingBuffer};
pub use storage::{Column, EntityGroup, PagedStore};
pub use system::{DrawSystem, MatchedGroups, UpdateSystem};
pub use system_descriptor::{Priority, SystemDescriptor};
pub use system_handle::{SystemId, SystemOwner};
pub use system_registration_error::SystemRegistrationError;
pub use world::EntityComponentSystem;
