//! Process supervision.
//!
//! Covers spawning approved commands, the durable live-process registry
//! used for crash recovery, and the per-process lifecycle state machine.

pub mod lifecycle;
pub mod manager;
pub mod registry;

pub use manager::{ProcessHandle, ProcessManager, SpawnOptions};
