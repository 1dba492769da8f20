//! Folder navigation sessions for campusdrive.
//!
//! A [`Navigator`] tracks where a user is inside the shared folder and
//! forwards file and folder operations to the drive client, defaulting
//! their target to the current folder.
//!
//! # Architecture
//! [`Cursor`] is the pure navigation state (current folder and history).
//! [`Navigator`] combines it with a `campusdrive_drive::DriveClient`.

pub mod cursor;
pub mod navigator;

pub use cursor::{Cursor, Position};
pub use navigator::Navigator;
