//! Common utilities and types shared across the campusdrive crates.
//!
//! This module provides the error taxonomy every layer propagates and the
//! drive item model materialized from remote listings.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{DriveItem, ItemKind};
