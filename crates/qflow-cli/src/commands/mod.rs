//! CLI command implementations.

pub mod bell;
pub mod check;
pub mod common;
pub mod exec;
