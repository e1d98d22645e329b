//! Command approval: path resolution, content hashing, and policy
//! evaluation of caller-supplied command specs.

pub mod hasher;
pub mod resolver;
pub mod service;

pub use service::ApprovalService;
