//! Core type definitions for the lifecycle manager.
//!
//! Broken down into submodules by concern.

pub mod dedup;
pub mod resource;
pub mod task;

pub use dedup::*;
pub use resource::*;
pub use task::*;
