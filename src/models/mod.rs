//! Domain model module declarations.

pub mod approval;
pub mod command;
pub mod policy;
pub mod process;
