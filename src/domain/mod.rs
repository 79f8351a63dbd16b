//! Domain layer types and invariants.

pub mod duplicates;
pub mod entities;
pub mod error;
pub mod fallback;
pub mod front_matter;
pub mod slug;
pub mod taxonomy;
pub mod types;
