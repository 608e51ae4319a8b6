//! Core types shared by the automation schedule crates.
//!
//! This crate provides the strongly-typed identifiers and the error
//! handling foundation used by the schedule model and the engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExecutionId, ParseIdError, ScheduleId};
