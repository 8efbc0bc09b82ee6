use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::bucket::{bucket_folder_name, StorageBucket},
    models::folder::{
        Folder, FolderOptions, FolderTreeNode, FolderUpdate, FolderWithStats, MAX_FOLDER_DEPTH,
        ROOT_FOLDER_NAME,
    },
    services::files as file_service,
    state::AppState,
    validation::folder::{path_segments, validate_folder_name},
};

const DUPLICATE_NAME: &str = "Folder with this name already exists in the parent directory";

/// Counts of what a folder delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub folders_removed: usize,
    pub files_removed: usize,
}

/// Maps a store-level unique violation onto the same conflict the pre-check reports.
fn duplicate_name(e: AppError) -> AppError {
    match e {
        AppError::UniqueViolation(_) => AppError::Conflict(DUPLICATE_NAME.to_string()),
        other => other,
    }
}

async fn load_folder(state: &AppState, user_id: Uuid, folder_id: Uuid) -> Result<Folder> {
    state
        .folders
        .find_by_id(user_id, folder_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))
}

async fn ensure_name_free(state: &AppState, user_id: Uuid, parent_id: Uuid, name: &str) -> Result<()> {
    if state.folders.find_child(user_id, parent_id, name).await?.is_some() {
        return Err(AppError::Conflict(DUPLICATE_NAME.to_string()));
    }
    Ok(())
}

/// Returns the user's root folder, creating it on first access.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The ID of the user.
///
/// # Returns
///
/// A `Result` containing the root `Folder`.
pub async fn get_or_create_root(state: &AppState, user_id: Uuid) -> Result<Folder> {
    if let Some(root) = state.folders.find_root(user_id).await? {
        return Ok(root);
    }

    let root = Folder::new(user_id, None, ROOT_FOLDER_NAME.to_string(), 0, true);
    match state.folders.insert(&root).await {
        Ok(root) => {
            tracing::info!("Created root folder {} for user {}", root.id, user_id);
            Ok(root)
        }
        Err(AppError::UniqueViolation(_)) => state
            .folders
            .find_root(user_id)
            .await?
            .ok_or_else(|| {
                AppError::StorageInconsistency(format!("Root folder for user {} vanished", user_id))
            }),
        Err(e) => Err(e),
    }
}

/// Creates a new folder.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The ID of the user who owns the folder.
/// * `name` - The name of the folder.
/// * `parent_id` - The ID of the parent folder. Defaults to the root.
/// * `opts` - Optional color and description.
///
/// # Returns
///
/// A `Result` containing the created `Folder`.
pub async fn create_folder(
    state: &AppState,
    user_id: Uuid,
    name: &str,
    parent_id: Option<Uuid>,
    opts: FolderOptions,
) -> Result<Folder> {
    let name = validate_folder_name(name)?;

    let parent = match parent_id {
        Some(id) => state
            .folders
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent folder not found".to_string()))?,
        None => get_or_create_root(state, user_id).await?,
    };

    if parent.depth + 1 > MAX_FOLDER_DEPTH {
        return Err(AppError::Validation(format!(
            "Maximum folder depth of {} exceeded",
            MAX_FOLDER_DEPTH
        )));
    }

    ensure_name_free(state, user_id, parent.id, &name).await?;

    let mut folder = Folder::new(user_id, Some(parent.id), name, parent.depth + 1, false);
    folder.color = opts.color;
    folder.description = opts.description;

    let folder = state.folders.insert(&folder).await.map_err(duplicate_name)?;
    tracing::info!("Created folder {} ({}) under {}", folder.id, folder.name, parent.id);
    Ok(folder)
}

/// Renames a folder and/or changes its color and description.
pub async fn rename_or_update(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
    update: FolderUpdate,
) -> Result<Folder> {
    let mut folder = load_folder(state, user_id, folder_id).await?;
    if folder.is_protected {
        return Err(AppError::Forbidden("Cannot modify system folder".to_string()));
    }

    if let Some(name) = update.name {
        let name = validate_folder_name(&name)?;
        if name != folder.name {
            if let Some(parent_id) = folder.parent_id {
                ensure_name_free(state, user_id, parent_id, &name).await?;
            }
            folder.name = name;
        }
    }
    if let Some(color) = update.color {
        folder.color = Some(color);
    }
    if let Some(description) = update.description {
        folder.description = Some(description);
    }

    state
        .folders
        .update(&folder)
        .await
        .map_err(duplicate_name)?
        .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))
}

/// Resolves a slash-separated path of user folders, starting at the root.
///
/// # Returns
///
/// A `Result` containing the ID of the folder the path names. The root
/// itself (an empty path) is reported as not found.
pub async fn resolve_path(state: &AppState, user_id: Uuid, path: &str) -> Result<Uuid> {
    let not_found = || AppError::NotFound(format!("No folder at path '{}'", path));

    let segments = path_segments(path);
    if segments.is_empty() {
        return Err(not_found());
    }

    let root = get_or_create_root(state, user_id).await?;
    let mut current = root.id;
    for segment in segments {
        let child = state
            .folders
            .find_child(user_id, current, segment)
            .await?
            .filter(|f| !f.is_protected)
            .ok_or_else(not_found)?;
        current = child.id;
    }

    Ok(current)
}

/// Whether `candidate` lies below `ancestor`, walking parent links upward.
///
/// Moves keep stored depths, so a chain may sit deeper than
/// `MAX_FOLDER_DEPTH`; the walk runs to the root instead of a fixed count.
async fn is_descendant(state: &AppState, user_id: Uuid, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
    let mut current = candidate;
    let mut seen = HashSet::new();
    while seen.insert(current) {
        let Some(folder) = state.folders.find_by_id(user_id, current).await? else {
            return Ok(false);
        };
        let Some(parent_id) = folder.parent_id else {
            return Ok(false);
        };
        if parent_id == ancestor {
            return Ok(true);
        }
        current = parent_id;
    }
    Err(AppError::StorageInconsistency(format!(
        "Folder {} is part of a parent cycle",
        current
    )))
}

/// Moves a folder under the folder named by `target_path`. A blank path
/// means the root.
///
/// Only the parent reference changes; depths inside the moved subtree are
/// left as they were.
pub async fn move_folder(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
    target_path: &str,
) -> Result<Folder> {
    let mut folder = load_folder(state, user_id, folder_id).await?;
    if folder.is_protected {
        return Err(AppError::Forbidden("Cannot move system folder".to_string()));
    }

    let target_id = if target_path.trim().is_empty() {
        get_or_create_root(state, user_id).await?.id
    } else {
        resolve_path(state, user_id, target_path).await?
    };

    if target_id == folder.id {
        return Err(AppError::Conflict("Cannot move folder into itself".to_string()));
    }
    if is_descendant(state, user_id, folder.id, target_id).await? {
        return Err(AppError::Conflict(
            "Cannot move folder into its own descendant".to_string(),
        ));
    }
    if folder.parent_id == Some(target_id) {
        tracing::debug!("Folder {} is already in the target location", folder.id);
        return Ok(folder);
    }

    ensure_name_free(state, user_id, target_id, &folder.name).await?;

    folder.parent_id = Some(target_id);
    let moved = state
        .folders
        .update(&folder)
        .await
        .map_err(duplicate_name)?
        .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))?;
    tracing::info!("Moved folder {} under {}", moved.id, target_id);
    Ok(moved)
}

enum DeleteStep {
    Enter(Uuid),
    Exit(Uuid),
}

/// Deletes a folder, its files and, when `recursive`, every descendant.
///
/// Children are processed one at a time in name order, each fully removed
/// before the next. Every step re-reads the store, so a failed delete can be
/// retried on the same folder.
pub async fn delete_folder(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
    recursive: bool,
) -> Result<DeleteSummary> {
    let folder = load_folder(state, user_id, folder_id).await?;
    if folder.is_protected {
        return Err(AppError::Forbidden("Cannot delete system folder".to_string()));
    }

    let children = state.folders.list_children(user_id, folder.id).await?;
    if !children.is_empty() && !recursive {
        return Err(AppError::Conflict(
            "Cannot delete folder with subfolders. Use recursive option or delete subfolders first."
                .to_string(),
        ));
    }

    let mut summary = DeleteSummary::default();
    let mut stack = vec![DeleteStep::Enter(folder.id)];

    while let Some(step) = stack.pop() {
        match step {
            DeleteStep::Enter(id) => {
                summary.files_removed += file_service::delete_files_in_folder(state, id, user_id).await?;
                let children = state.folders.list_children(user_id, id).await?;
                stack.push(DeleteStep::Exit(id));
                stack.extend(children.iter().rev().map(|c| DeleteStep::Enter(c.id)));
            }
            DeleteStep::Exit(id) => {
                if state.folders.delete(user_id, id).await? {
                    summary.folders_removed += 1;
                }
            }
        }
    }

    tracing::info!(
        "Deleted folder {} ({} folders, {} files)",
        folder.id,
        summary.folders_removed,
        summary.files_removed
    );
    Ok(summary)
}

/// Lists the user-created subfolders of a folder, ordered by name.
pub async fn list_subfolders(state: &AppState, user_id: Uuid, folder_id: Uuid) -> Result<Vec<Folder>> {
    let folder = load_folder(state, user_id, folder_id).await?;
    let children = state.folders.list_children(user_id, folder.id).await?;
    Ok(children.into_iter().filter(|f| !f.is_protected).collect())
}

/// Builds the nested tree of user-created folders below `parent_id`, or
/// below the root when `None`.
pub async fn folder_tree(
    state: &AppState,
    user_id: Uuid,
    parent_id: Option<Uuid>,
) -> Result<Vec<FolderTreeNode>> {
    let start = match parent_id {
        Some(id) => load_folder(state, user_id, id).await?.id,
        None => get_or_create_root(state, user_id).await?.id,
    };

    // Breadth-first, so every folder appears after its parent.
    let mut visited: Vec<Folder> = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        for child in state.folders.list_children(user_id, id).await? {
            if child.is_protected {
                continue;
            }
            queue.push_back(child.id);
            visited.push(child);
        }
    }

    // Assemble bottom-up; siblings arrive in reverse, so flip them on use.
    let mut built: HashMap<Uuid, Vec<FolderTreeNode>> = HashMap::new();
    for folder in visited.iter().rev() {
        let mut node = FolderTreeNode::from(folder);
        node.children = built.remove(&folder.id).unwrap_or_default();
        node.children.reverse();
        if let Some(parent) = folder.parent_id {
            built.entry(parent).or_default().push(node);
        }
    }

    let mut roots = built.remove(&start).unwrap_or_default();
    roots.reverse();
    Ok(roots)
}

/// Returns the slash-separated path of a folder, `/` for the root.
pub async fn folder_path(state: &AppState, user_id: Uuid, folder_id: Uuid) -> Result<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut current = load_folder(state, user_id, folder_id).await?;

    while let Some(parent_id) = current.parent_id {
        if !seen.insert(current.id) {
            return Err(AppError::StorageInconsistency(format!(
                "Folder {} is part of a parent cycle",
                current.id
            )));
        }
        names.push(current.name.clone());
        current = load_folder(state, user_id, parent_id).await?;
    }

    names.reverse();
    Ok(format!("/{}", names.join("/")))
}

/// Gets a folder with its statistics.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The ID of the user.
/// * `folder_id` - The ID of the folder.
///
/// # Returns
///
/// A `Result` containing the `FolderWithStats`.
pub async fn folder_stats(state: &AppState, user_id: Uuid, folder_id: Uuid) -> Result<FolderWithStats> {
    let folder = load_folder(state, user_id, folder_id).await?;
    let (file_count, total_size) = state.files.folder_totals(user_id, folder.id).await?;
    let subfolder_count = state
        .folders
        .list_children(user_id, folder.id)
        .await?
        .iter()
        .filter(|f| !f.is_protected)
        .count() as i64;

    Ok(FolderWithStats {
        id: folder.id,
        name: folder.name,
        description: folder.description,
        created_at: folder.created_at,
        file_count,
        subfolder_count,
        total_size,
    })
}

/// Returns the protected folder under the root that mirrors `bucket`,
/// creating it if needed.
pub async fn get_or_create_mirror_folder(
    state: &AppState,
    user_id: Uuid,
    bucket: &StorageBucket,
) -> Result<Folder> {
    if bucket.user_id != user_id {
        return Err(AppError::NotFound("Storage bucket not found".to_string()));
    }

    let root = get_or_create_root(state, user_id).await?;
    let name = bucket_folder_name(bucket.bucket_index);

    let existing = match state.folders.find_child(user_id, root.id, &name).await? {
        Some(folder) => Some(folder),
        None => {
            let mirror = Folder::new(user_id, Some(root.id), name.clone(), root.depth + 1, true);
            match state.folders.insert(&mirror).await {
                Ok(folder) => {
                    tracing::info!("Created mirror folder {} for bucket {}", folder.name, bucket.id);
                    return Ok(folder);
                }
                Err(AppError::UniqueViolation(_)) => {
                    state.folders.find_child(user_id, root.id, &name).await?
                }
                Err(e) => return Err(e),
            }
        }
    };

    match existing {
        Some(folder) if folder.is_protected => Ok(folder),
        Some(_) => Err(AppError::Conflict(format!(
            "A user folder named {} already exists under the root",
            name
        ))),
        None => Err(AppError::StorageInconsistency(format!(
            "Mirror folder {} for user {} vanished",
            name, user_id
        ))),
    }
}
