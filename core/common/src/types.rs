//! Common types used throughout campusdrive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a drive entry is a file or a folder.
///
/// The kind of an item never changes after it is created remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::File => write!(f, "file"),
            ItemKind::Folder => write!(f, "folder"),
        }
    }
}

/// One file-or-folder entry of a remote drive.
///
/// Items are materialized from a listing or lookup response and are never
/// persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveItem {
    /// Opaque identifier, unique within a drive.
    pub id: String,
    /// Display name.
    pub name: String,
    /// File or folder.
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Size in bytes. Only meaningful for files; folders report 0.
    pub size: u64,
    /// Creation timestamp as reported upstream (ISO 8601).
    #[serde(rename = "created_datetime")]
    pub created_at: String,
    /// Last modification timestamp as reported upstream (ISO 8601).
    #[serde(rename = "modified_datetime")]
    pub modified_at: String,
}

impl DriveItem {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    /// Case-insensitive exact name comparison, as the remote store treats names.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Size in mebibytes, for display.
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}
