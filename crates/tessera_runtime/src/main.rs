//! Tessera Runtime
//!
//! Demo binary: boots an entity component system, spawns waves of particles
//! through staged initialization and runs a fixed number of ticks.
//!
//! Usage: `tessera [config.json]`

mod scene;

use anyhow::{Context, Result};
use scene::{install_systems, spawn_wave, SceneComponents, TickContext};
use tessera_core::ecs::{ComponentRegistry, EntityComponentSystem, EntityContainer};
use tessera_core::EcsConfig;
use tessera_metrics::SystemTiming;
use tracing_subscriber::EnvFilter;

const DEMO_TICKS: u64 = 120;
const WAVE_EVERY: u64 = 30;
const WAVE_SIZE: u32 = 48;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Tessera v{}", tessera_core::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => EcsConfig::load(&path).with_context(|| format!("loading config from {path}"))?,
        None => EcsConfig::default(),
    };
    let container = EntityContainer::with_config(config).context("invalid ECS config")?;

    let registry = ComponentRegistry::new();
    let components = SceneComponents::register(&registry);
    tracing::info!(components = registry.len(), "registered components");

    let mut ecs = EntityComponentSystem::with_container(container);
    let _systems = install_systems(&mut ecs, &components)?;
    let mut staging = ecs.container().staging_buffer();
    let mut ctx = TickContext::default();

    for _ in 0..DEMO_TICKS {
        let tick = ctx.tick;
        if tick % WAVE_EVERY == 0 {
            spawn_wave(ecs.container_mut(), &components, &mut staging, tick / WAVE_EVERY, WAVE_SIZE)?;
        }

        ecs.run_update(&mut ctx);
        ecs.run_draw(&mut ctx);

        if tick % 10 == 0 {
            tracing::info!(
                tick,
                alive = ctx.census.total,
                named = ctx.census.named,
                groups = ctx.census.groups,
                expired = ctx.expired,
                "tick"
            );
        }
        ctx.advance();
    }

    tracing::info!(
        ticks = ctx.tick,
        simulated_secs = ctx.elapsed(),
        entities = ecs.container().len(),
        slots = ecs.container().slot_capacity(),
        "simulation finished"
    );
    for (name, timing) in ecs.profiler().report() {
        report_system(&name, &timing);
    }
    for (name, value) in ecs.container().counters().snapshot() {
        tracing::info!(counter = name, value, "counter");
    }

    Ok(())
}

fn report_system(name: &str, timing: &SystemTiming) {
    tracing::info!(
        system = name,
        calls = timing.calls,
        total = ?timing.total,
        average = ?timing.average(),
        "system timing"
    );
}
