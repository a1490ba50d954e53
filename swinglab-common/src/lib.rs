//! Shared types for SwingLab modules
//!
//! Provides the common error type, event bus, and root-folder resolution
//! used by the SwingLab services.

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
