//! depcache - tiered dependency cache for build agents
//!
//! Restores dependency trees from a local archive store, a shared
//! repository-backed store, or a fresh installer run, and publishes fresh
//! installs back to the caches so other agents can reuse them.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod pipeline;
pub mod process;
pub mod repository;
#[cfg(test)]
pub(crate) mod testing;
pub mod ui;

pub use error::{DepcacheError, DepcacheResult};
