//! Column storage for entity groups.
//!
//! - `blob`: aligned raw buffers, typed columns and staging segments (all
//!   unsafe code lives here)
//! - `entity_group`: one archetype's rows in Structure-of-Arrays layout
//! - `paged`: append-only paged store used for persistent entity slots

mod blob;
mod entity_group;
mod paged;

pub(crate) use blob::BlobSegment;
pub use blob::Column;
pub use entity_group::EntityGroup;
pub use paged::PagedStore;
