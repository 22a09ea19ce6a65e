//! Netinspect Common
//!
//! Shared utilities for the netinspect pairing stack.
//!
//! This crate provides:
//! - Component-based structured logging with session context
//! - `log_*!` macros that format lazily behind level checks

pub mod logging;
mod macros;

pub use logging::{Component, Logger};
