//! Core types for StorePulse.
//!
//! This module provides type-safe wrappers for storage keys, remote ids, and
//! the canonical records shared by every sync protocol.

pub mod external_id;
pub mod id;
pub mod record;
pub mod summary;

pub use external_id::ExternalId;
pub use id::*;
pub use record::*;
pub use summary::*;
