//! Request and response bodies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use campusdrive_common::{DriveItem, ItemKind};
use campusdrive_navigator::Cursor;

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FolderContentsResponse {
    pub current_folder_id: String,
    pub current_path: Vec<String>,
    pub items: Vec<DriveItem>,
    pub total_items: usize,
    pub folders_count: usize,
    pub files_count: usize,
}

impl FolderContentsResponse {
    pub fn new(current_folder_id: String, current_path: Vec<String>, items: Vec<DriveItem>) -> Self {
        let folders_count = items.iter().filter(|i| i.kind == ItemKind::Folder).count();
        Self {
            current_folder_id,
            current_path,
            total_items: items.len(),
            folders_count,
            files_count: items.len() - folders_count,
            items,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NavigationResponse {
    pub current_folder_id: String,
    pub current_path: Vec<String>,
    pub depth: usize,
    pub can_go_back: bool,
}

impl From<&Cursor> for NavigationResponse {
    fn from(cursor: &Cursor) -> Self {
        Self {
            current_folder_id: cursor.folder_id().to_string(),
            current_path: cursor.path().to_vec(),
            depth: cursor.depth(),
            can_go_back: !cursor.is_at_start(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackResponse {
    pub moved: bool,
    #[serde(flatten)]
    pub position: NavigationResponse,
}

/// Target of `/navigate/enter`: a folder id, or a name in the current folder.
#[derive(Debug, Deserialize)]
pub struct EnterRequest {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub folder_name: String,
    #[serde(default)]
    pub parent_folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub filename: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Column name to column values, in column order.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    #[serde(default)]
    pub file_id: Option<String>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FolderCreatedResponse {
    pub message: String,
    pub folder_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileCreatedResponse {
    pub message: String,
    pub file_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
