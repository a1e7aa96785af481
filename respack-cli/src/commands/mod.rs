//! CLI command implementations.

pub mod common;
pub mod config;
pub mod history;
pub mod install;
pub mod packs;
