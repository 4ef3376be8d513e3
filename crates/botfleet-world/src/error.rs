//! Error types for the `botfleet-world` crate.
//!
//! All fallible operations in this crate return [`WorldError`] through the
//! standard [`Result`] type alias.

use botfleet_types::{BlockPos, EntityRef};

/// Errors that can occur when editing the in-memory world.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// An entity with this reference is already present.
    #[error("duplicate entity: {0}")]
    DuplicateEntity(EntityRef),

    /// No entity with this reference exists.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    /// A bulk edit covered more cells than allowed.
    #[error("region from {from} to {to} covers {volume} cells (max {max})")]
    RegionTooLarge {
        /// First corner of the region.
        from: BlockPos,
        /// Second corner of the region.
        to: BlockPos,
        /// Number of cells in the region.
        volume: u64,
        /// Maximum cells allowed in one edit.
        max: u64,
    },
}
