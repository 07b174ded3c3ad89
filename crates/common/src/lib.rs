//! Shared types for the revision history workspace.

pub mod revision_number;
pub mod types;

pub use revision_number::{ParseRevisionNumberKindError, RevisionNumber, RevisionNumberKind};
pub use types::{EntityId, InvalidEntityIdError};
