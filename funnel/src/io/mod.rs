//! I/O adapters for the funnel: backend client, configuration, desktop helpers.

pub mod backend;
pub mod clipboard;
pub mod config;
pub mod process;
