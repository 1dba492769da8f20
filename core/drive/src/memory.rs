//! In-memory drive for testing and demos.
//!
//! [`MemoryDrive`] answers the subset of the Graph drive API used by
//! [`DriveClient`](crate::DriveClient), so the whole stack can run without
//! network access or credentials.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use percent_encoding::percent_decode_str;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use campusdrive_common::Result;

use crate::transport::{ApiRequest, ApiResponse, RequestBody, Transport};

#[derive(Debug, Clone)]
struct Node {
    id: String,
    name: String,
    parent: Option<String>,
    folder: bool,
    content: Bytes,
    created: String,
    modified: String,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, Node>,
    /// Ids in creation order, which is also listing order.
    order: Vec<String>,
    /// Roots shared with the signed-in user.
    shared: Vec<String>,
    next_id: u64,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("MEM!{}", self.next_id)
    }

    fn insert(&mut self, parent: Option<&str>, name: &str, folder: bool, content: Bytes) -> String {
        let id = self.allocate_id();
        let now = timestamp();
        self.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                name: name.to_string(),
                parent: parent.map(String::from),
                folder,
                content,
                created: now.clone(),
                modified: now,
            },
        );
        self.order.push(id.clone());
        id
    }

    fn children(&self, parent: &str) -> Vec<&Node> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.parent.as_deref() == Some(parent))
            .collect()
    }

    fn child_named(&self, parent: &str, name: &str) -> Option<&Node> {
        let name = name.to_lowercase();
        self.children(parent)
            .into_iter()
            .find(|node| node.name.to_lowercase() == name)
    }

    fn unique_name(&self, parent: &str, name: &str) -> String {
        if self.child_named(parent, name).is_none() {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{} {}", name, n))
            .find(|candidate| self.child_named(parent, candidate).is_none())
            .unwrap_or_else(|| name.to_string())
    }

    fn remove_subtree(&mut self, id: &str) {
        let children: Vec<String> = self.children(id).iter().map(|n| n.id.clone()).collect();
        for child in children {
            self.remove_subtree(&child);
        }
        self.nodes.remove(id);
        self.order.retain(|other| other != id);
        self.shared.retain(|other| other != id);
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn item_json(node: &Node) -> Value {
    let mut item = json!({
        "id": node.id,
        "name": node.name,
        "size": node.content.len(),
        "createdDateTime": node.created,
        "lastModifiedDateTime": node.modified,
        "parentReference": { "driveId": MemoryDrive::DRIVE_ID, "id": node.parent },
    });
    if node.folder {
        item["folder"] = json!({});
    } else {
        item["file"] = json!({});
    }
    item
}

fn error(status: StatusCode, code: &str, message: &str) -> ApiResponse {
    ApiResponse::json_body(
        status,
        &json!({ "error": { "code": code, "message": message } }),
    )
}

fn not_found() -> ApiResponse {
    error(StatusCode::NOT_FOUND, "itemNotFound", "The resource could not be found.")
}

/// In-memory stand-in for a Graph drive.
///
/// Items live in a single drive with id [`MemoryDrive::DRIVE_ID`]. Folders
/// registered with [`share_folder`](MemoryDrive::share_folder) appear in the
/// shared-with-me listing.
pub struct MemoryDrive {
    state: Mutex<State>,
    page_size: usize,
}

impl MemoryDrive {
    /// Base URL to configure the client with.
    pub const BASE_URL: &'static str = "https://drive.memory.invalid/v1.0";
    /// Id of the single drive.
    pub const DRIVE_ID: &'static str = "memory-drive";

    /// Create an empty drive.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 200,
        }
    }

    /// Limit the number of entries per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a top-level folder shared with the user. Returns its id.
    pub fn share_folder(&self, name: &str) -> String {
        let mut state = self.state();
        let id = state.insert(None, name, true, Bytes::new());
        state.shared.push(id.clone());
        id
    }

    /// Create a folder. Returns its id.
    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.state().insert(Some(parent), name, true, Bytes::new())
    }

    /// Create a file with raw content. Returns its id.
    pub fn add_file(&self, parent: &str, name: &str, content: impl Into<Bytes>) -> String {
        self.state().insert(Some(parent), name, false, content.into())
    }

    /// Raw content of a file.
    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.state()
            .nodes
            .get(id)
            .filter(|node| !node.folder)
            .map(|node| node.content.clone())
    }

    /// Whether an item exists.
    pub fn contains(&self, id: &str) -> bool {
        self.state().nodes.contains_key(id)
    }

    fn page(&self, path: &str, skip: usize, items: Vec<Value>) -> ApiResponse {
        let total = items.len();
        let value: Vec<Value> = items.into_iter().skip(skip).take(self.page_size).collect();
        let mut body = json!({ "value": value });
        if skip + self.page_size < total {
            body["@odata.nextLink"] = json!(format!(
                "{}{}?$skiptoken={}",
                Self::BASE_URL,
                path,
                skip + self.page_size
            ));
        }
        ApiResponse::json_body(StatusCode::OK, &body)
    }

    fn shared_with_me(&self, path: &str, skip: usize) -> ApiResponse {
        let state = self.state();
        let entries = state
            .shared
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .map(|node| {
                json!({
                    "id": format!("shared-{}", node.id),
                    "name": node.name,
                    "remoteItem": item_json(node),
                })
            })
            .collect();
        drop(state);
        self.page(path, skip, entries)
    }

    fn list_children(&self, path: &str, id: &str, skip: usize) -> ApiResponse {
        let state = self.state();
        match state.nodes.get(id) {
            Some(node) if node.folder => {}
            _ => return not_found(),
        }
        let entries = state.children(id).into_iter().map(item_json).collect();
        drop(state);
        self.page(path, skip, entries)
    }

    fn create_folder(&self, parent: &str, body: &RequestBody) -> ApiResponse {
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "invalidRequest", "Expected JSON body");
        };
        let Some(name) = body.get("name").and_then(Value::as_str) else {
            return error(StatusCode::BAD_REQUEST, "invalidRequest", "Missing name");
        };
        let rename = body.get("@microsoft.graph.conflictBehavior").and_then(Value::as_str)
            == Some("rename");

        let mut state = self.state();
        match state.nodes.get(parent) {
            Some(node) if node.folder => {}
            _ => return not_found(),
        }
        let name = if state.child_named(parent, name).is_none() {
            name.to_string()
        } else if rename {
            state.unique_name(parent, name)
        } else {
            return error(StatusCode::CONFLICT, "nameAlreadyExists", "Name already exists");
        };

        let id = state.insert(Some(parent), &name, true, Bytes::new());
        ApiResponse::json_body(StatusCode::CREATED, &item_json(&state.nodes[&id]))
    }

    fn upload(&self, parent: &str, name: &str, body: &RequestBody) -> ApiResponse {
        let RequestBody::Bytes { data, .. } = body else {
            return error(StatusCode::BAD_REQUEST, "invalidRequest", "Expected content");
        };

        let mut state = self.state();
        match state.nodes.get(parent) {
            Some(node) if node.folder => {}
            _ => return not_found(),
        }

        let existing = state.child_named(parent, name).map(|node| node.id.clone());
        let (status, id) = match existing {
            Some(id) => (StatusCode::OK, id),
            None => (
                StatusCode::CREATED,
                state.insert(Some(parent), name, false, Bytes::new()),
            ),
        };
        let Some(node) = state.nodes.get_mut(&id) else {
            return not_found();
        };
        node.content = data.clone();
        node.modified = timestamp();
        ApiResponse::json_body(status, &item_json(node))
    }

    fn download(&self, id: &str) -> ApiResponse {
        match self.state().nodes.get(id) {
            Some(node) if !node.folder => ApiResponse::new(StatusCode::OK, node.content.clone()),
            _ => not_found(),
        }
    }

    fn replace_content(&self, id: &str, body: &RequestBody) -> ApiResponse {
        let RequestBody::Bytes { data, .. } = body else {
            return error(StatusCode::BAD_REQUEST, "invalidRequest", "Expected content");
        };
        let mut state = self.state();
        match state.nodes.get_mut(id) {
            Some(node) if !node.folder => {
                node.content = data.clone();
                node.modified = timestamp();
                ApiResponse::json_body(StatusCode::OK, &item_json(node))
            }
            _ => not_found(),
        }
    }

    fn get_item(&self, id: &str) -> ApiResponse {
        match self.state().nodes.get(id) {
            Some(node) => ApiResponse::json_body(StatusCode::OK, &item_json(node)),
            None => not_found(),
        }
    }

    fn delete(&self, id: &str) -> ApiResponse {
        let mut state = self.state();
        if !state.nodes.contains_key(id) {
            return not_found();
        }
        state.remove_subtree(id);
        ApiResponse::new(StatusCode::NO_CONTENT, Bytes::new())
    }

    fn route(&self, request: &ApiRequest) -> ApiResponse {
        let Some(rest) = request.url.strip_prefix(Self::BASE_URL) else {
            return not_found();
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let skip = query
            .strip_prefix("$skiptoken=")
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);

        let segments: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let method = &request.method;
        let get = *method == Method::GET;

        match segments.as_slice() {
            ["me", "drive", "sharedWithMe"] if get => self.shared_with_me(path, skip),
            ["drives", drive, ..] if *drive != Self::DRIVE_ID => not_found(),
            ["drives", _, "items", id] if get => self.get_item(id),
            ["drives", _, "items", id] if *method == Method::DELETE => self.delete(id),
            ["drives", _, "items", id, "children"] if get => self.list_children(path, id, skip),
            ["drives", _, "items", id, "children"] if *method == Method::POST => {
                self.create_folder(id, &request.body)
            }
            ["drives", _, "items", id, "content"] if get => self.download(id),
            ["drives", _, "items", id, "content"] if *method == Method::PUT => {
                self.replace_content(id, &request.body)
            }
            ["drives", _, "items", parent, name, "content"] if *method == Method::PUT => {
                match (parent.strip_suffix(':'), name.strip_suffix(':')) {
                    (Some(parent), Some(name)) => self.upload(parent, name, &request.body),
                    _ => not_found(),
                }
            }
            _ => not_found(),
        }
    }
}

impl Default for MemoryDrive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryDrive {
    async fn send(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse> {
        if bearer.is_empty() {
            return Ok(error(
                StatusCode::UNAUTHORIZED,
                "InvalidAuthenticationToken",
                "Access token is empty.",
            ));
        }
        Ok(self.route(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ListResponse, RemoteItem};

    fn url(path: &str) -> String {
        format!("{}{}", MemoryDrive::BASE_URL, path)
    }

    fn items_url(id: &str, suffix: &str) -> String {
        url(&format!("/drives/{}/items/{}{}", MemoryDrive::DRIVE_ID, id, suffix))
    }

    #[tokio::test]
    async fn test_shared_with_me_lists_remote_items() {
        let drive = MemoryDrive::new();
        let root = drive.share_folder("datacampus");

        let response = drive
            .send(&ApiRequest::get(url("/me/drive/sharedWithMe")), "tok")
            .await
            .unwrap();
        let page: ListResponse = response.json().unwrap();

        assert_eq!(page.value.len(), 1);
        assert_eq!(
            page.value[0].shared_target(),
            Some((MemoryDrive::DRIVE_ID.to_string(), root))
        );
    }

    #[tokio::test]
    async fn test_empty_bearer_is_unauthorized() {
        let drive = MemoryDrive::new();
        let response = drive
            .send(&ApiRequest::get(url("/me/drive/sharedWithMe")), "")
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_creates_then_replaces() {
        let drive = MemoryDrive::new();
        let root = drive.share_folder("datacampus");
        let upload = items_url(&root, ":/a%20b.xlsx:/content");

        let first = drive
            .send(&ApiRequest::put_bytes(upload.clone(), "x", b"one".to_vec()), "tok")
            .await
            .unwrap();
        assert_eq!(first.status, StatusCode::CREATED);
        let item: RemoteItem = first.json().unwrap();
        assert_eq!(item.name, "a b.xlsx");

        let second = drive
            .send(&ApiRequest::put_bytes(upload, "x", b"two!".to_vec()), "tok")
            .await
            .unwrap();
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(drive.content(&item.id).unwrap(), Bytes::from_static(b"two!"));
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let drive = MemoryDrive::new();
        let root = drive.share_folder("datacampus");
        let folder = drive.add_folder(&root, "sub");
        let file = drive.add_file(&folder, "f.xlsx", b"x".to_vec());

        let response = drive
            .send(&ApiRequest::delete(items_url(&folder, "")), "tok")
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(!drive.contains(&file));
        assert!(drive.contains(&root));
    }

    #[tokio::test]
    async fn test_unknown_drive_is_not_found() {
        let drive = MemoryDrive::new();
        let root = drive.share_folder("datacampus");
        let response = drive
            .send(
                &ApiRequest::get(url(&format!("/drives/other/items/{}", root))),
                "tok",
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
