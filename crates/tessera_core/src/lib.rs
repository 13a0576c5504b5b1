//! Tessera Core
//!
//! Archetype-based entity component store:
//! - Component registry and component groups
//! - Column storage per archetype with stable, generation-checked handles
//! - Two-phase entity initialization
//! - Priority-ordered update and draw systems

pub mod config;
pub mod ecs;
pub mod error;

pub use config::EcsConfig;
pub use error::{ConfigError, EcsError};
pub use tessera_metrics;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
