//! Command-line runner for automation schedules.
//!
//! Reads schedule definitions from a file, restores engine state, and feeds
//! JSON-lines events from stdin to the engine. Executions are written to
//! stdout as JSON lines.

pub mod config;
pub mod definitions;
pub mod error;
pub mod events;
pub mod executor;
