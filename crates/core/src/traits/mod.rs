//! Core traits for the lifecycle manager.
//!
//! - `store`: the adapter every backing store exposes to the manager
//! - `dedup`: the catalog behind the deduplication index

mod dedup;
mod store;

pub use dedup::*;
pub use store::*;
