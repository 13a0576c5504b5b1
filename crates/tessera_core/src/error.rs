//! Error types surfaced by the ECS store.
//!
//! Layout mismatches (reading a component as the wrong type) are programmer
//! errors and panic instead; only conditions a caller can react to live here.

use crate::ecs::{ComponentId, Generation, SlotId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcsError {
    #[error("entity in slot {slot} (generation {generation}) is no longer alive")]
    StaleEntity { slot: SlotId, generation: Generation },

    #[error("component id {id} is not registered")]
    UnknownComponent { id: ComponentId },

    #[error("initializer for slot {slot} was started by a different container")]
    ForeignInitializer { slot: SlotId },

    #[error("cannot create an entity with an empty component group")]
    EmptyGroup,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
