//! Blog content store that keeps a SQLite database, a GitHub Markdown
//! repository, and an optional replica database in agreement.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
