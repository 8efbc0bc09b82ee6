use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// The deepest level a folder may be created at. Root sits at depth 0.
pub const MAX_FOLDER_DEPTH: i32 = 10;

/// The longest folder name accepted, counted in characters.
pub const MAX_FOLDER_NAME_CHARS: usize = 255;

/// The display name of every user's root folder.
pub const ROOT_FOLDER_NAME: &str = "My Files";

/// Represents a logical folder in a user's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// The unique identifier for the folder.
    pub id: Uuid,
    /// The ID of the user who owns the folder.
    pub user_id: Uuid,
    /// The ID of the parent folder; `None` only for the root.
    pub parent_id: Option<Uuid>,
    /// The name of the folder, unique among its siblings.
    pub name: String,
    /// Distance from the root.
    pub depth: i32,
    /// System-managed folders cannot be renamed, moved or deleted by users.
    pub is_protected: bool,
    /// The display color of the folder.
    pub color: Option<String>,
    /// The description of the folder.
    pub description: Option<String>,
    /// The timestamp when the folder was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the folder was last updated.
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for Folder {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            parent_id: row.get("parent_id"),
            name: row.get("name"),
            depth: row.get("depth"),
            is_protected: row.get("is_protected"),
            color: row.get("color"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl Folder {
    /// Builds a new, not yet persisted folder.
    pub fn new(
        user_id: Uuid,
        parent_id: Option<Uuid>,
        name: String,
        depth: i32,
        is_protected: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            parent_id,
            name,
            depth,
            is_protected,
            color: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional metadata supplied when creating a folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderOptions {
    pub color: Option<String>,
    pub description: Option<String>,
}

/// A partial update to a folder. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// A folder name as typed by the user.
#[derive(Debug, Validate)]
pub struct FolderName {
    #[garde(custom(not_blank), custom(within_length), custom(no_path_separator))]
    pub value: String,
}

impl FolderName {
    pub fn new(value: &str) -> Self {
        Self { value: value.to_string() }
    }
}

fn within_length(value: &str, _ctx: &()) -> garde::Result {
    if value.chars().count() > MAX_FOLDER_NAME_CHARS {
        return Err(garde::Error::new(format!(
            "folder name cannot exceed {} characters",
            MAX_FOLDER_NAME_CHARS
        )));
    }
    Ok(())
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("folder name cannot be blank"));
    }
    Ok(())
}

fn no_path_separator(value: &str, _ctx: &()) -> garde::Result {
    if value.contains('/') || value.contains('\\') {
        return Err(garde::Error::new("folder name cannot contain path separators"));
    }
    Ok(())
}

/// A node of the nested folder tree.
#[derive(Debug, Clone, Serialize)]
pub struct FolderTreeNode {
    pub id: Uuid,
    pub name: String,
    pub depth: i32,
    pub color: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FolderTreeNode>,
}

impl From<&Folder> for FolderTreeNode {
    fn from(folder: &Folder) -> Self {
        Self {
            id: folder.id,
            name: folder.name.clone(),
            depth: folder.depth,
            color: folder.color.clone(),
            description: folder.description.clone(),
            children: Vec::new(),
        }
    }
}

/// Represents a folder with its statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderWithStats {
    /// The unique identifier for the folder.
    pub id: Uuid,
    /// The name of the folder.
    pub name: String,
    /// The description of the folder.
    pub description: Option<String>,
    /// The timestamp when the folder was created.
    pub created_at: DateTime<Utc>,
    /// The number of files in the folder.
    pub file_count: i64,
    /// The number of subfolders in the folder.
    pub subfolder_count: i64,
    /// The total size of the files in the folder in bytes.
    pub total_size: i64,
}
