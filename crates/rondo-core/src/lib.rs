//! rondo-core: shared wire types, framing codec, and configuration.
//! All other Rondo crates depend on this one.

pub mod codec;
pub mod config;
pub mod wire;

pub use codec::WireError;
pub use wire::{Envelope, TaskData, TaskRequest, TaskResult, TaskStatus, TaskType, WorkerId};
