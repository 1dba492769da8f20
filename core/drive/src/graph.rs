//! Graph drive API payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use campusdrive_common::{DriveItem, ItemKind};

/// Reference to an item's parent or to the drive holding a shared item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Item metadata as returned by the Graph API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Present only on folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<Value>,
    /// Present only on files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Value>,
    #[serde(default)]
    pub created_date_time: String,
    #[serde(default)]
    pub last_modified_date_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemReference>,
    /// For entries of the shared-with-me listing, the item in its home drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_item: Option<Box<RemoteItem>>,
    /// Any other properties, kept for `get_item` callers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteItem {
    /// Folder facet presence decides the kind.
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Drive and item id of the shared original, if this is a shared entry.
    pub fn shared_target(&self) -> Option<(String, String)> {
        let remote = self.remote_item.as_ref()?;
        let drive_id = remote.parent_reference.as_ref()?.drive_id.clone()?;
        Some((drive_id, remote.id.clone()))
    }
}

impl From<RemoteItem> for DriveItem {
    fn from(item: RemoteItem) -> Self {
        let kind = if item.is_folder() {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        DriveItem {
            id: item.id,
            name: item.name,
            kind,
            size: match kind {
                ItemKind::Folder => 0,
                ItemKind::File => item.size.unwrap_or(0),
            },
            created_at: item.created_date_time,
            modified_at: item.last_modified_date_time,
        }
    }
}

/// One page of a collection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub value: Vec<RemoteItem>,
    #[serde(
        rename = "@odata.nextLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_link: Option<String>,
}
