//! Remote drive client over the Graph drive API.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use campusdrive_common::{DriveItem, Error, Result};
use campusdrive_tabular::{Table, TabularCodec, XlsxCodec};

use crate::auth::{DeviceCodeTokenProvider, TokenProvider};
use crate::config::DriveConfig;
use crate::graph::{ListResponse, RemoteItem};
use crate::transport::{ApiRequest, ApiResponse, AuthorizedTransport, ReqwestTransport, Transport};

/// Characters left as-is in URL path segments.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!');

/// Encode one URL path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Append `extension` to `filename` unless it already ends with it,
/// compared case-insensitively.
pub fn normalize_filename(filename: &str, extension: &str) -> Result<String> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("File name cannot be empty".to_string()));
    }
    if trimmed.to_lowercase().ends_with(&extension.to_lowercase()) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}{}", trimmed, extension))
    }
}

/// Drive and root folder of the resolved shared folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveLocation {
    /// Name the folder was resolved by.
    pub name: String,
    pub drive_id: String,
    pub root_id: String,
}

/// What a request addresses, which decides how a 404 is reported.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    /// A specific item; 404 means the item does not exist.
    Item(&'a str),
    /// A fixed endpoint such as shared-with-me; 404 is an upstream failure.
    Endpoint(&'a str),
}

/// Map a response to an error unless its status is one of `accepted`.
fn check_status(response: ApiResponse, accepted: &[StatusCode], target: Target<'_>) -> Result<ApiResponse> {
    if accepted.contains(&response.status) {
        return Ok(response);
    }
    match (response.status, target) {
        (StatusCode::NOT_FOUND, Target::Item(what)) => Err(Error::NotFound(what.to_string())),
        (StatusCode::UNAUTHORIZED, Target::Item(what) | Target::Endpoint(what)) => {
            Err(Error::Authentication(format!(
                "Still unauthorized after re-authentication: {}",
                what
            )))
        }
        (status, _) => Err(Error::upstream(status.as_u16(), response.text())),
    }
}

/// [`check_status`] for calls addressing one item by id.
fn expect_status(response: ApiResponse, accepted: &[StatusCode], what: &str) -> Result<ApiResponse> {
    check_status(response, accepted, Target::Item(what))
}

/// Client for one remote drive.
///
/// Safe to share between tasks: every call is self-contained apart from the
/// memoized shared-folder location.
pub struct DriveClient {
    transport: AuthorizedTransport,
    codec: Arc<dyn TabularCodec>,
    graph_base: String,
    location: RwLock<Option<DriveLocation>>,
}

impl DriveClient {
    /// Create a client using the XLSX codec.
    pub fn new(
        graph_base: impl Into<String>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            transport: AuthorizedTransport::new(transport, tokens),
            codec: Arc::new(XlsxCodec::new()),
            graph_base: graph_base.into().trim_end_matches('/').to_string(),
            location: RwLock::new(None),
        }
    }

    /// Replace the tabular codec.
    pub fn with_codec(mut self, codec: Arc<dyn TabularCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Create a client talking to the real Graph API with device-code sign-in.
    pub fn connect(config: &DriveConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        let tokens = Arc::new(DeviceCodeTokenProvider::new(config.auth.clone())?);
        Ok(Self::new(config.graph_base.clone(), transport, tokens))
    }

    /// The codec used for file content.
    pub fn codec(&self) -> &Arc<dyn TabularCodec> {
        &self.codec
    }

    /// The token provider behind this client.
    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        self.transport.tokens()
    }

    /// The resolved shared folder, if any.
    pub async fn location(&self) -> Option<DriveLocation> {
        self.location.read().await.clone()
    }

    async fn drive_id(&self) -> Result<String> {
        self.location
            .read()
            .await
            .as_ref()
            .map(|l| l.drive_id.clone())
            .ok_or_else(|| {
                Error::InvalidOperation("Shared folder has not been resolved yet".to_string())
            })
    }

    async fn item_url(&self, item_id: &str) -> Result<String> {
        Ok(format!(
            "{}/drives/{}/items/{}",
            self.graph_base,
            encode_segment(&self.drive_id().await?),
            encode_segment(item_id)
        ))
    }

    /// Fetch every page of a collection.
    async fn list_all(&self, first_url: String, target: Target<'_>) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let response = self.transport.execute(&ApiRequest::get(url)).await?;
            let page: ListResponse = check_status(response, &[StatusCode::OK], target)?.json()?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    /// Find the folder shared with the signed-in user called `name`.
    ///
    /// The result is memoized; later calls with the same name (ignoring
    /// case) return it without a remote call.
    ///
    /// # Errors
    /// - `Error::NotFound` if no shared folder has that name
    /// - `Error::Upstream` if the shared-with-me listing fails
    pub async fn resolve_well_known_folder(&self, name: &str) -> Result<DriveLocation> {
        if let Some(location) = self.location.read().await.as_ref() {
            if location.name.to_lowercase() == name.to_lowercase() {
                return Ok(location.clone());
            }
        }

        let mut slot = self.location.write().await;
        if let Some(location) = slot.as_ref() {
            if location.name.to_lowercase() == name.to_lowercase() {
                return Ok(location.clone());
            }
        }

        let url = format!("{}/me/drive/sharedWithMe", self.graph_base);
        let shared = self
            .list_all(url, Target::Endpoint("shared-with-me listing"))
            .await?;
        let target = name.to_lowercase();

        for entry in &shared {
            if entry.name.to_lowercase() != target {
                continue;
            }
            let Some((drive_id, root_id)) = entry.shared_target() else {
                debug!("Shared entry {} has no remote drive reference", entry.id);
                continue;
            };
            info!("Resolved shared folder '{}' in drive {}", entry.name, drive_id);
            let location = DriveLocation {
                name: name.to_string(),
                drive_id,
                root_id,
            };
            *slot = Some(location.clone());
            return Ok(location);
        }

        Err(Error::NotFound(format!("Shared folder '{}'", name)))
    }

    /// List the direct children of a folder, in upstream order.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveItem>> {
        let url = format!("{}/children", self.item_url(folder_id).await?);
        let items = self
            .list_all(url, Target::Item(&format!("Folder {}", folder_id)))
            .await?;
        debug!("Listed {} items in {}", items.len(), folder_id);
        Ok(items.into_iter().map(DriveItem::from).collect())
    }

    /// First child of `folder_id` whose name matches `name` ignoring case.
    pub async fn find_by_name(&self, folder_id: &str, name: &str) -> Result<Option<DriveItem>> {
        let children = self.list_children(folder_id).await?;
        Ok(children.into_iter().find(|item| item.name_matches(name)))
    }

    /// Get full metadata of an item.
    pub async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        let url = self.item_url(item_id).await?;
        let response = self.transport.execute(&ApiRequest::get(url)).await?;
        expect_status(response, &[StatusCode::OK], &format!("Item {}", item_id))?.json()
    }

    /// Create a folder under `parent_id`.
    ///
    /// On a name conflict the upstream picks a new name.
    pub async fn create_folder(&self, parent_id: &str, name: &str) -> Result<DriveItem> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Folder name cannot be empty".to_string()));
        }

        let url = format!("{}/children", self.item_url(parent_id).await?);
        let body = json!({
            "name": name.trim(),
            "folder": {},
            "@microsoft.graph.conflictBehavior": "rename"
        });
        let response = self.transport.execute(&ApiRequest::post_json(url, body)).await?;
        let created: RemoteItem = expect_status(
            response,
            &[StatusCode::OK, StatusCode::CREATED],
            &format!("Folder {}", parent_id),
        )?
        .json()?;

        info!("Created folder '{}'", created.name);
        Ok(created.into())
    }

    /// Delete an item. Folders are deleted with their contents.
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let url = self.item_url(item_id).await?;
        let response = self.transport.execute(&ApiRequest::delete(url)).await?;
        expect_status(
            response,
            &[StatusCode::NO_CONTENT, StatusCode::OK],
            &format!("Item {}", item_id),
        )?;
        info!("Deleted item {}", item_id);
        Ok(())
    }

    /// Upload a spreadsheet into `folder_id`.
    ///
    /// The codec's extension is appended to `filename` if missing. Without
    /// a table the placeholder table is written.
    pub async fn create_file(
        &self,
        folder_id: &str,
        filename: &str,
        table: Option<&Table>,
    ) -> Result<DriveItem> {
        let filename = normalize_filename(filename, self.codec.extension())?;
        let placeholder;
        let table = match table {
            Some(table) => table,
            None => {
                placeholder = Table::placeholder();
                &placeholder
            }
        };
        let content = self.codec.encode(table)?;

        let url = format!(
            "{}:/{}:/content",
            self.item_url(folder_id).await?,
            encode_segment(&filename)
        );
        let request = ApiRequest::put_bytes(url, self.codec.content_type(), content);
        let response = self.transport.execute(&request).await?;
        let created: RemoteItem = expect_status(
            response,
            &[StatusCode::OK, StatusCode::CREATED],
            &format!("Folder {}", folder_id),
        )?
        .json()?;

        info!("Uploaded '{}' ({} rows)", created.name, table.height());
        Ok(created.into())
    }

    /// Download and decode a spreadsheet.
    ///
    /// # Errors
    /// - `Error::Decode` if the content is not a spreadsheet
    pub async fn read_file(&self, file_id: &str) -> Result<Table> {
        let url = format!("{}/content", self.item_url(file_id).await?);
        let response = self.transport.execute(&ApiRequest::get(url)).await?;
        let response = expect_status(response, &[StatusCode::OK], &format!("File {}", file_id))?;
        self.codec.decode(&response.body)
    }

    /// Overwrite a spreadsheet's content in place.
    pub async fn update_file(&self, file_id: &str, table: &Table) -> Result<()> {
        let content = self.codec.encode(table)?;
        let url = format!("{}/content", self.item_url(file_id).await?);
        let request = ApiRequest::put_bytes(url, self.codec.content_type(), content);
        let response = self.transport.execute(&request).await?;
        expect_status(
            response,
            &[StatusCode::OK, StatusCode::CREATED],
            &format!("File {}", file_id),
        )?;
        info!("Updated file {}", file_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::memory::MemoryDrive;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use campusdrive_common::ItemKind;
    use campusdrive_tabular::{CellValue, Column, ColumnData};
    use std::sync::Mutex;

    fn setup() -> (Arc<MemoryDrive>, String, DriveClient) {
        let drive = Arc::new(MemoryDrive::new());
        let root = drive.share_folder("DataCampus");
        let client = DriveClient::new(
            MemoryDrive::BASE_URL,
            drive.clone(),
            Arc::new(StaticTokenProvider::new("tok")),
        );
        (drive, root, client)
    }

    /// Answers 401 a fixed number of times, then delegates to a memory drive.
    struct Flaky {
        inner: Arc<MemoryDrive>,
        unauthorized: Mutex<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn send(&self, request: &ApiRequest, bearer: &str) -> Result<ApiResponse> {
            *self.calls.lock().unwrap() += 1;
            let reject = {
                let mut remaining = self.unauthorized.lock().unwrap();
                let reject = *remaining > 0;
                if reject {
                    *remaining -= 1;
                }
                reject
            };
            if reject {
                return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "expired"));
            }
            self.inner.send(request, bearer).await
        }
    }

    fn flaky(unauthorized: usize) -> (Arc<Flaky>, Arc<StaticTokenProvider>, DriveClient) {
        let drive = Arc::new(MemoryDrive::new());
        drive.share_folder("datacampus");
        let transport = Arc::new(Flaky {
            inner: drive,
            unauthorized: Mutex::new(unauthorized),
            calls: Mutex::new(0),
        });
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let client = DriveClient::new(MemoryDrive::BASE_URL, transport.clone(), tokens.clone());
        (transport, tokens, client)
    }

    #[test]
    fn test_normalize_filename() {
        assert_eq!(normalize_filename("report", ".xlsx").unwrap(), "report.xlsx");
        assert_eq!(normalize_filename("report.xlsx", ".xlsx").unwrap(), "report.xlsx");
        assert_eq!(normalize_filename("REPORT.XLSX", ".xlsx").unwrap(), "REPORT.XLSX");
        assert!(normalize_filename("  ", ".xlsx").is_err());
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("a b/c.xlsx"), "a%20b%2Fc.xlsx");
        assert_eq!(encode_segment("ID!123"), "ID!123");
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let (_drive, root, client) = setup();
        let location = client.resolve_well_known_folder("datacampus").await.unwrap();

        assert_eq!(location.root_id, root);
        assert_eq!(location.drive_id, MemoryDrive::DRIVE_ID);
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let (transport, _tokens, client) = flaky(0);
        client.resolve_well_known_folder("datacampus").await.unwrap();
        let after_first = *transport.calls.lock().unwrap();
        client.resolve_well_known_folder("DATACAMPUS").await.unwrap();

        assert_eq!(*transport.calls.lock().unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_resolve_missing_folder() {
        let (_drive, _root, client) = setup();
        let result = client.resolve_well_known_folder("nowhere").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_follows_pagination() {
        let drive = Arc::new(MemoryDrive::new().with_page_size(1));
        drive.share_folder("first");
        drive.share_folder("second");
        let target = drive.share_folder("third");
        let client = DriveClient::new(
            MemoryDrive::BASE_URL,
            drive,
            Arc::new(StaticTokenProvider::new("tok")),
        );

        let location = client.resolve_well_known_folder("third").await.unwrap();
        assert_eq!(location.root_id, target);
    }

    #[tokio::test]
    async fn test_operations_require_resolution() {
        let (_drive, root, client) = setup();
        let result = client.list_children(&root).await;
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_empty_folder_lists_nothing() {
        let (_drive, root, client) = setup();
        client.resolve_well_known_folder("datacampus").await.unwrap();
        assert!(client.list_children(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_children_paginates() {
        let drive = Arc::new(MemoryDrive::new().with_page_size(2));
        let root = drive.share_folder("datacampus");
        for name in ["a", "b", "c", "d", "e"] {
            drive.add_folder(&root, name);
        }
        let client = DriveClient::new(
            MemoryDrive::BASE_URL,
            drive,
            Arc::new(StaticTokenProvider::new("tok")),
        );
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let names: Vec<String> = client
            .list_children(&root)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let (drive, root, client) = setup();
        drive.add_folder(&root, "Reports");
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let found = client.find_by_name(&root, "reports").await.unwrap().unwrap();
        assert_eq!(found.kind, ItemKind::Folder);
        assert!(client.find_by_name(&root, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_folder_renames_on_conflict() {
        let (_drive, root, client) = setup();
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let first = client.create_folder(&root, "2024").await.unwrap();
        let second = client.create_folder(&root, "2024").await.unwrap();

        assert_eq!(first.name, "2024");
        assert_ne!(second.name, "2024");
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_create_read_update_file() {
        let (_drive, root, client) = setup();
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let created = client.create_file(&root, "budget", None).await.unwrap();
        assert_eq!(created.name, "budget.xlsx");
        assert!(created.size > 0);

        let mut table = client.read_file(&created.id).await.unwrap();
        assert_eq!(table, Table::placeholder());

        table
            .push_row(vec![
                CellValue::Text("Value4".into()),
                CellValue::Integer(40),
                CellValue::Text("D".into()),
            ])
            .unwrap();
        client.update_file(&created.id, &table).await.unwrap();

        let reread = client.read_file(&created.id).await.unwrap();
        assert_eq!(reread.height(), 4);

        let listed = client.list_children(&root).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn test_create_file_with_table() {
        let (_drive, root, client) = setup();
        client.resolve_well_known_folder("datacampus").await.unwrap();
        let table =
            Table::new(vec![Column::new("score", ColumnData::Float(vec![1.5, 2.5]))]).unwrap();

        let created = client.create_file(&root, "scores.XLSX", Some(&table)).await.unwrap();
        assert_eq!(created.name, "scores.XLSX");
        assert_eq!(client.read_file(&created.id).await.unwrap(), table);
    }

    #[tokio::test]
    async fn test_read_non_spreadsheet_fails_to_decode() {
        let (drive, root, client) = setup();
        let id = drive.add_file(&root, "notes.txt", b"plain text".to_vec());
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let result = client.read_file(&id).await;
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_delete_and_get_missing_item() {
        let (drive, root, client) = setup();
        let id = drive.add_folder(&root, "old");
        client.resolve_well_known_folder("datacampus").await.unwrap();

        assert_eq!(client.get_item(&id).await.unwrap().name, "old");
        client.delete_item(&id).await.unwrap();

        assert!(matches!(client.get_item(&id).await, Err(Error::NotFound(_))));
        assert!(matches!(client.delete_item(&id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_single_401_is_recovered() {
        let (transport, tokens, client) = flaky(1);
        client.resolve_well_known_folder("datacampus").await.unwrap();

        assert_eq!(tokens.reauth_count(), 1);
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persistent_401_fails_after_two_attempts() {
        let (transport, tokens, client) = flaky(usize::MAX);
        let result = client.resolve_well_known_folder("datacampus").await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(tokens.reauth_count(), 1);
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_reauth_is_fatal() {
        let drive = Arc::new(MemoryDrive::new());
        drive.share_folder("datacampus");
        let transport = Arc::new(Flaky {
            inner: drive,
            unauthorized: Mutex::new(1),
            calls: Mutex::new(0),
        });
        let client = DriveClient::new(
            MemoryDrive::BASE_URL,
            transport.clone(),
            Arc::new(StaticTokenProvider::new("tok").failing_reauth()),
        );

        let result = client.resolve_well_known_folder("datacampus").await;
        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(*transport.calls.lock().unwrap(), 1);
    }

    /// Answers every request with 404.
    struct Gone;

    #[async_trait]
    impl Transport for Gone {
        async fn send(&self, _request: &ApiRequest, _bearer: &str) -> Result<ApiResponse> {
            Ok(ApiResponse::new(StatusCode::NOT_FOUND, "gone"))
        }
    }

    #[tokio::test]
    async fn test_missing_shared_listing_is_upstream_failure() {
        let client = DriveClient::new(
            MemoryDrive::BASE_URL,
            Arc::new(Gone),
            Arc::new(StaticTokenProvider::new("tok")),
        );

        let result = client.resolve_well_known_folder("datacampus").await;
        assert!(matches!(result, Err(Error::Upstream { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_listing_missing_folder_is_not_found() {
        let (_drive, _root, client) = setup();
        client.resolve_well_known_folder("datacampus").await.unwrap();

        let result = client.list_children("MEM!404").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
