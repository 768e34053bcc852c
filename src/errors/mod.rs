//! Centralized error handling module
//!
//! Subsystem errors live next to their code; this module gathers them into
//! a single `AppError` for the daemon and CLI layers.

pub mod types;

pub use types::{AppError, AppResult};
