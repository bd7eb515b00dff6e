//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - JSON files: markets, trades and stored parameters in a data directory
//! - In-memory: the same ports held in process memory
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod json_store;
pub mod memory_store;

pub use cli::CliApp;
pub use json_store::{JsonFileStore, Markets};
pub use memory_store::InMemoryStore;
