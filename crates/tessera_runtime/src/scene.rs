// scene.rs - Demo components, spawning and systems
//
// A small particle scene: everything moves, some entities are named, and
// some expire after a few ticks. Expiry destroys entities mid-tick, so the
// census draw system always reports the post-update population.

use glam::Vec2;
use tessera_core::ecs::{
    ComponentDescriptor, ComponentGroup, ComponentRegistry, EntityComponentSystem,
    EntityContainer, MatchedGroups, StagingBuffer, SystemDescriptor, SystemOwner,
    SystemRegistrationError,
};
use tessera_core::EcsError;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Position(pub Vec2);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec2);

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Name(pub String);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Lifetime {
    pub ticks_left: u32,
}

/// Descriptors of every demo component.
#[derive(Debug, Clone, Copy)]
pub struct SceneComponents {
    pub position: &'static ComponentDescriptor,
    pub velocity: &'static ComponentDescriptor,
    pub name: &'static ComponentDescriptor,
    pub lifetime: &'static ComponentDescriptor,
}

impl SceneComponents {
    pub fn register(registry: &ComponentRegistry) -> Self {
        Self {
            position: registry.register::<Position>(),
            velocity: registry.register::<Velocity>(),
            name: registry.register::<Name>(),
            lifetime: registry.register::<Lifetime>(),
        }
    }

    pub fn movable(&self) -> ComponentGroup {
        ComponentGroup::of(&[self.position, self.velocity])
    }
}

/// Population numbers gathered by the census draw system.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Census {
    pub total: usize,
    pub named: usize,
    pub groups: usize,
}

/// Fixed simulation step (60 Hz).
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Per-tick context shared by every system.
#[derive(Debug)]
pub struct TickContext {
    pub tick: u64,
    pub dt: f32,
    pub expired: usize,
    pub census: Census,
}

impl TickContext {
    pub fn new(dt: f32) -> Self {
        Self {
            tick: 0,
            dt,
            expired: 0,
            census: Census::default(),
        }
    }

    /// Simulated seconds so far.
    pub fn elapsed(&self) -> f32 {
        self.tick as f32 * self.dt
    }

    pub fn advance(&mut self) {
        self.tick += 1;
    }
}

impl Default for TickContext {
    fn default() -> Self {
        Self::new(FIXED_DT)
    }
}

/// Stage and commit `count` entities. Every entity moves; even ones get a
/// name and every third one a lifetime.
pub fn spawn_wave(
    container: &mut EntityContainer,
    components: &SceneComponents,
    staging: &mut StagingBuffer,
    wave: u64,
    count: u32,
) -> Result<usize, EcsError> {
    for i in 0..count {
        let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
        let mut init = container.start_entity_initialization(staging);
        init.add_component_data(components.position, Position(Vec2::ZERO))
            .add_component_data(components.velocity, Velocity(Vec2::from_angle(angle) * 2.0));
        if i % 2 == 0 {
            init.add_component_data(components.name, Name(format!("w{wave}-{i}")));
        }
        if i % 3 == 0 {
            init.add_component_data(components.lifetime, Lifetime { ticks_left: 2 + i % 4 });
        }
        container.finish_entity_initialization(init)?;
    }
    tracing::debug!(wave, count, "spawned wave");
    Ok(count as usize)
}

fn movement(components: SceneComponents) -> impl FnMut(&mut TickContext, &mut EntityContainer, &MatchedGroups) {
    move |ctx, container, groups| {
        let dt = ctx.dt;
        groups.for_each_mut(container, |_, group| {
            if let Some((positions, velocities)) = group.column_pair_mut::<Position, Velocity>(
                components.position.id(),
                components.velocity.id(),
            ) {
                for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
                    position.0 += velocity.0 * dt;
                }
            }
        });
    }
}

fn expiry(components: SceneComponents) -> impl FnMut(&mut TickContext, &mut EntityContainer, &MatchedGroups) {
    let mut expired_rows = Vec::new();
    let mut doomed = Vec::new();
    move |ctx, container, groups| {
        doomed.clear();
        for &index in groups.indices() {
            expired_rows.clear();
            if let Some(lifetimes) = container
                .group_mut(index)
                .and_then(|group| group.column_slice_mut::<Lifetime>(components.lifetime.id()))
            {
                for (row, lifetime) in lifetimes.iter_mut().enumerate() {
                    lifetime.ticks_left = lifetime.ticks_left.saturating_sub(1);
                    if lifetime.ticks_left == 0 {
                        expired_rows.push(row);
                    }
                }
            }
            doomed.extend(
                expired_rows
                    .iter()
                    .filter_map(|&row| container.entity_at(index, row))
                    .map(|entity| container.entity_ref(entity)),
            );
        }
        // Stable refs survive the swap-removes done by earlier destroys.
        let destroyed = doomed.iter().filter(|&&stable| container.destroy_ref(stable)).count();
        ctx.expired += destroyed;
    }
}

fn census(components: SceneComponents) -> impl FnMut(&mut TickContext, &EntityContainer, &MatchedGroups) {
    move |ctx, container, groups| {
        let mut census = Census::default();
        for (_, group) in groups.groups(container) {
            census.total += group.len();
            census.groups += 1;
            if group.has(components.name.id()) {
                census.named += group.len();
            }
        }
        ctx.census = census;
    }
}

/// Register the demo systems. The returned owners keep them registered.
pub fn install_systems(
    ecs: &mut EntityComponentSystem<TickContext>,
    components: &SceneComponents,
) -> Result<Vec<SystemOwner>, SystemRegistrationError> {
    let components = *components;
    Ok(vec![
        ecs.add_update_system(
            SystemDescriptor::new("movement").with_target(components.movable()),
            movement(components),
        )?,
        ecs.add_update_system(
            SystemDescriptor::new("expiry")
                .with_priority(10)
                .with_target(ComponentGroup::of(&[components.lifetime])),
            expiry(components),
        )?,
        ecs.add_draw_system(
            SystemDescriptor::new("census").with_target(ComponentGroup::of(&[components.position])),
            census(components),
        )?,
    ])
}
