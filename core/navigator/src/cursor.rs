//! Navigation cursor through the folder tree.
//!
//! The cursor is pure state: it never talks to the drive. The
//! [`Navigator`](crate::Navigator) feeds it items obtained remotely.

use serde::Serialize;

use campusdrive_common::{DriveItem, Error, Result};

/// A folder together with the names leading to it from the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Folder identifier. Always a folder, never a file.
    pub folder_id: String,
    /// Folder names from the root down to this folder, root included.
    pub path: Vec<String>,
}

/// Current folder plus the positions visited before it.
///
/// The history never contains the current folder.
#[derive(Debug, Clone)]
pub struct Cursor {
    current: Position,
    history: Vec<Position>,
}

impl Cursor {
    /// Place a cursor at the root folder with an empty history.
    pub fn new(root_id: impl Into<String>, root_name: impl Into<String>) -> Self {
        Self {
            current: Position {
                folder_id: root_id.into(),
                path: vec![root_name.into()],
            },
            history: Vec::new(),
        }
    }

    /// The current position.
    pub fn current(&self) -> &Position {
        &self.current
    }

    /// Identifier of the current folder.
    pub fn folder_id(&self) -> &str {
        &self.current.folder_id
    }

    /// Folder names from the root to the current folder.
    pub fn path(&self) -> &[String] {
        &self.current.path
    }

    /// Path joined for display, e.g. `datacampus / 2024 / reports`.
    pub fn breadcrumb(&self) -> String {
        self.current.path.join(" / ")
    }

    /// Number of positions that `go_back` can return to.
    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Whether there is nothing to go back to.
    pub fn is_at_start(&self) -> bool {
        self.history.is_empty()
    }

    /// Move into a folder.
    ///
    /// Entering the current folder changes nothing. Entering a folder that
    /// is already in the history rewinds to it, so the history never holds
    /// the current folder.
    ///
    /// # Errors
    /// - `Error::InvalidOperation` if `item` is a file
    pub fn enter(&mut self, item: &DriveItem) -> Result<()> {
        if !item.is_folder() {
            return Err(Error::InvalidOperation(format!(
                "'{}' is a file, not a folder",
                item.name
            )));
        }

        if item.id == self.current.folder_id {
            return Ok(());
        }

        if let Some(index) = self.history.iter().position(|p| p.folder_id == item.id) {
            self.current = self.history[index].clone();
            self.history.truncate(index);
            return Ok(());
        }

        let mut path = self.current.path.clone();
        path.push(item.name.clone());
        let previous = std::mem::replace(
            &mut self.current,
            Position {
                folder_id: item.id.clone(),
                path,
            },
        );
        self.history.push(previous);
        Ok(())
    }

    /// Return to the previously visited folder.
    ///
    /// Returns `false` and changes nothing when the history is empty.
    pub fn go_back(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.current = previous;
                true
            }
            None => false,
        }
    }
}
