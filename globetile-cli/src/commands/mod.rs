//! CLI command handlers.

pub mod common;
pub mod estimate;
pub mod fetch;
pub mod show_config;
