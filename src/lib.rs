#![forbid(unsafe_code)]

//! Local command-execution gateway.
//!
//! Before an external program runs, the gateway resolves its canonical
//! path, checks it against an allow/deny policy and a content hash, and
//! only then lets the process manager spawn, supervise, and audit it.

pub mod approval;
pub mod audit;
pub mod config;
pub mod errors;
pub mod models;
pub mod policy;
pub mod process;

pub use config::GatewayConfig;
pub use errors::{AppError, Result};
