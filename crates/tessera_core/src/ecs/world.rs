// world.rs - The EntityComponentSystem facade
//
// Owns the entity container and both system lists. One tick is
// `run_update` followed by `run_draw`; every system sees the container as
// earlier systems left it, including entities they created or destroyed.

use crate::ecs::system_scheduler::SystemList;
use crate::ecs::{
    DrawSystem, EntityContainer, MatchedGroups, SystemDescriptor, SystemId, SystemOwner,
    SystemRegistrationError, UpdateSystem,
};
use tessera_metrics::{time_scope, SystemProfiler};

/// Entity container plus priority-ordered update and draw systems.
///
/// `C` is the per-tick context handed to every system (frame time, input,
/// a renderer, ...).
pub struct EntityComponentSystem<C> {
    container: EntityContainer,
    update: SystemList<dyn UpdateSystem<C>>,
    draw: SystemList<dyn DrawSystem<C>>,
    next_system: u32,
    matched: MatchedGroups,
    profiler: SystemProfiler,
}

impl<C> EntityComponentSystem<C> {
    pub fn new() -> Self {
        Self::with_container(EntityContainer::new())
    }

    pub fn with_container(container: EntityContainer) -> Self {
        Self {
            container,
            update: SystemList::new("update"),
            draw: SystemList::new("draw"),
            next_system: 0,
            matched: MatchedGroups::new(),
            profiler: SystemProfiler::new(),
        }
    }

    #[inline]
    pub fn container(&self) -> &EntityContainer {
        &self.container
    }

    #[inline]
    pub fn container_mut(&mut self) -> &mut EntityContainer {
        &mut self.container
    }

    fn next_id(&mut self) -> SystemId {
        let id = SystemId::new(self.next_system);
        self.next_system += 1;
        id
    }

    /// Register a mutating system. Dropping the returned owner removes it.
    pub fn add_update_system(
        &mut self,
        descriptor: SystemDescriptor,
        system: impl UpdateSystem<C> + 'static,
    ) -> Result<SystemOwner, SystemRegistrationError> {
        let id = self.next_id();
        self.update.insert(id, descriptor, Box::new(system))
    }

    /// Register a read-only system. Dropping the returned owner removes it.
    pub fn add_draw_system(
        &mut self,
        descriptor: SystemDescriptor,
        system: impl DrawSystem<C> + 'static,
    ) -> Result<SystemOwner, SystemRegistrationError> {
        let id = self.next_id();
        self.draw.insert(id, descriptor, Box::new(system))
    }

    /// Run every update system in priority order.
    pub fn run_update(&mut self, context: &mut C) {
        for name in self.update.prune() {
            self.profiler.forget(&name);
        }
        for entry in self.update.entries_mut() {
            if !entry.is_alive() {
                continue;
            }
            self.matched.resolve(&self.container, entry.descriptor.target());
            tracing::trace!(
                system = entry.descriptor.name(),
                id = %entry.id,
                groups = self.matched.len(),
                "running update system"
            );
            let container = &mut self.container;
            let matched = &self.matched;
            let system = &mut entry.system;
            time_scope!(self.profiler, entry.descriptor.name(), {
                system.update(context, container, matched)
            });
        }
    }

    /// Run every draw system in priority order. Draw systems only see the
    /// container immutably.
    pub fn run_draw(&mut self, context: &mut C) {
        for name in self.draw.prune() {
            self.profiler.forget(&name);
        }
        for entry in self.draw.entries_mut() {
            if !entry.is_alive() {
                continue;
            }
            self.matched.resolve(&self.container, entry.descriptor.target());
            tracing::trace!(
                system = entry.descriptor.name(),
                id = %entry.id,
                groups = self.matched.len(),
                "running draw system"
            );
            let container = &self.container;
            let matched = &self.matched;
            let system = &mut entry.system;
            time_scope!(self.profiler, entry.descriptor.name(), {
                system.draw(context, container, matched)
            });
        }
    }

    /// Update systems in execution order.
    pub fn update_systems(&self) -> impl Iterator<Item = &SystemDescriptor> {
        self.update.descriptors()
    }

    /// Draw systems in execution order.
    pub fn draw_systems(&self) -> impl Iterator<Item = &SystemDescriptor> {
        self.draw.descriptors()
    }

    pub fn system_count(&self) -> usize {
        self.update.live_len() + self.draw.live_len()
    }

    #[inline]
    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    #[inline]
    pub fn profiler_mut(&mut self) -> &mut SystemProfiler {
        &mut self.profiler
    }
}

impl<C> Default for EntityComponentSystem<C> {
    fn default() -> Self {
        Self::new()
    }
}
