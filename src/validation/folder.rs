use garde::Validate;
use crate::error::{AppError, Result};
use crate::models::folder::FolderName;

/// Validates a folder name and returns it trimmed.
///
/// # Arguments
///
/// * `name` - The name as typed by the user.
///
/// # Returns
///
/// A `Result` containing the name to store.
pub fn validate_folder_name(name: &str) -> Result<String> {
    let candidate = FolderName::new(name);
    candidate
        .validate()
        .map_err(|report| AppError::Validation(format!("Invalid folder name: {}", report)))?;
    Ok(candidate.value.trim().to_string())
}

/// Splits a slash-separated folder path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.trim_matches('/')
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}
