//! # Learning Path Dashboard Common Library
//!
//! Shared code for the dashboard sync engine crates:
//! - Error type (`Error`, `Result`)
//! - Event types (`DashboardEvent`) and the per-instance `EventBus`
//! - Configuration loading (`DashboardConfig`)
//! - Logging initialization

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
