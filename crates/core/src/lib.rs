#![deny(unused)]
//! Core types, traits, and error definitions for the resource lifecycle manager.
//!
//! This crate provides the building blocks shared by the store adapters,
//! the manager loops, and the operational HTTP surface.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
