//! Application services layer.

pub mod duplicates;
pub mod error;
pub mod posts;
pub mod replica;
pub mod repos;
pub mod sync;
pub mod taxonomy;
