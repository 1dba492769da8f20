//! Session over the shared folder.

use std::sync::Arc;
use tracing::{debug, info};

use campusdrive_common::{DriveItem, Error, Result};
use campusdrive_drive::{DriveClient, RemoteItem};
use campusdrive_tabular::Table;

use crate::cursor::{Cursor, Position};

/// One logical user's walk through the shared folder.
///
/// A navigator holds mutable cursor state and is meant for a single caller
/// at a time; share it behind a mutex. The [`DriveClient`] underneath can be
/// shared freely between navigators.
pub struct Navigator {
    client: Arc<DriveClient>,
    folder_name: String,
    cursor: Option<Cursor>,
}

impl Navigator {
    /// Create an uninitialized navigator rooted at the shared folder `folder_name`.
    pub fn new(client: Arc<DriveClient>, folder_name: impl Into<String>) -> Self {
        Self {
            client,
            folder_name: folder_name.into(),
            cursor: None,
        }
    }

    /// The drive client.
    pub fn client(&self) -> &Arc<DriveClient> {
        &self.client
    }

    /// Name of the shared root folder.
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.cursor.is_some()
    }

    /// Resolve the shared folder and move to its root.
    ///
    /// # Postconditions
    /// - Current folder is the shared root, history is empty
    ///
    /// Calling this again on an initialized navigator returns the current
    /// position without any remote call.
    ///
    /// # Errors
    /// - `Error::NotFound` if no shared folder has the configured name
    /// - `Error::Authentication` if sign-in fails
    pub async fn initialize(&mut self) -> Result<Position> {
        if let Some(cursor) = &self.cursor {
            return Ok(cursor.current().clone());
        }

        let location = self
            .client
            .resolve_well_known_folder(&self.folder_name)
            .await?;
        info!(folder = %self.folder_name, root = %location.root_id, "Navigator initialized");

        let cursor = Cursor::new(location.root_id, self.folder_name.clone());
        let position = cursor.current().clone();
        self.cursor = Some(cursor);
        Ok(position)
    }

    /// The cursor, if initialized.
    pub fn cursor(&self) -> Result<&Cursor> {
        self.cursor
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation("Navigator is not initialized".to_string()))
    }

    fn cursor_mut(&mut self) -> Result<&mut Cursor> {
        self.cursor
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation("Navigator is not initialized".to_string()))
    }

    /// Identifier of the current folder.
    pub fn current_folder_id(&self) -> Result<&str> {
        Ok(self.cursor()?.folder_id())
    }

    /// Identifier of the shared root folder.
    pub async fn root_id(&self) -> Result<String> {
        self.cursor()?;
        self.client
            .location()
            .await
            .map(|location| location.root_id)
            .ok_or_else(|| Error::InvalidOperation("Navigator is not initialized".to_string()))
    }

    /// Folder names from the root to the current folder.
    pub fn current_path(&self) -> Result<Vec<String>> {
        Ok(self.cursor()?.path().to_vec())
    }

    fn target_folder(&self, folder_id: Option<&str>) -> Result<String> {
        match folder_id {
            Some(id) => Ok(id.to_string()),
            None => Ok(self.current_folder_id()?.to_string()),
        }
    }

    /// List the current folder.
    pub async fn list_current(&self) -> Result<Vec<DriveItem>> {
        let folder_id = self.current_folder_id()?;
        self.client.list_children(folder_id).await
    }

    /// List a folder, defaulting to the current one.
    pub async fn list(&self, folder_id: Option<&str>) -> Result<Vec<DriveItem>> {
        let folder_id = self.target_folder(folder_id)?;
        self.client.list_children(&folder_id).await
    }

    /// Move into a folder.
    ///
    /// Only session state changes; nothing is written remotely.
    ///
    /// # Errors
    /// - `Error::InvalidOperation` if `item` is a file or the navigator is
    ///   not initialized
    pub fn enter(&mut self, item: &DriveItem) -> Result<()> {
        let cursor = self.cursor_mut()?;
        cursor.enter(item)?;
        debug!(folder = %item.name, depth = cursor.depth(), "Entered folder");
        Ok(())
    }

    /// Move into the child of the current folder called `name`.
    pub async fn enter_by_name(&mut self, name: &str) -> Result<DriveItem> {
        let item = self
            .find(name, None)
            .await?
            .ok_or_else(|| Error::NotFound(format!("'{}' in current folder", name)))?;
        self.enter(&item)?;
        Ok(item)
    }

    /// Move into the folder with identifier `folder_id`.
    pub async fn enter_by_id(&mut self, folder_id: &str) -> Result<DriveItem> {
        let item: DriveItem = self.get_item(folder_id).await?.into();
        self.enter(&item)?;
        Ok(item)
    }

    /// Walk a `/`-separated path of folder names from the current folder.
    ///
    /// Stops at the first failing segment, leaving the cursor at the last
    /// folder reached.
    pub async fn enter_path(&mut self, path: &str) -> Result<()> {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.enter_by_name(segment).await?;
        }
        Ok(())
    }

    /// Return to the previously visited folder; `false` at the start.
    pub fn go_back(&mut self) -> Result<bool> {
        Ok(self.cursor_mut()?.go_back())
    }

    /// Find an item by name in a folder, defaulting to the current one.
    pub async fn find(&self, name: &str, folder_id: Option<&str>) -> Result<Option<DriveItem>> {
        let folder_id = self.target_folder(folder_id)?;
        self.client.find_by_name(&folder_id, name).await
    }

    /// Full metadata of an item.
    pub async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        self.cursor()?;
        self.client.get_item(item_id).await
    }

    /// Create a folder, by default in the current folder.
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<DriveItem> {
        let parent_id = self.target_folder(parent_id)?;
        self.client.create_folder(&parent_id, name).await
    }

    /// Create a spreadsheet, by default in the current folder.
    pub async fn create_file(
        &self,
        filename: &str,
        table: Option<&Table>,
        folder_id: Option<&str>,
    ) -> Result<DriveItem> {
        let folder_id = self.target_folder(folder_id)?;
        self.client.create_file(&folder_id, filename, table).await
    }

    /// Read a spreadsheet.
    pub async fn read_file(&self, file_id: &str) -> Result<Table> {
        self.cursor()?;
        self.client.read_file(file_id).await
    }

    /// Overwrite a spreadsheet.
    pub async fn update_file(&self, file_id: &str, table: &Table) -> Result<()> {
        self.cursor()?;
        self.client.update_file(file_id, table).await
    }

    /// Delete an item.
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        self.cursor()?;
        self.client.delete_item(item_id).await
    }
}
