use std::path::Path;

use mediabox::storage::{LocalObjectStore, ObjectKind, ObjectStore};
use mediabox::ErrorKind;

fn write_object(root: &Path, kind: ObjectKind, path: &str) {
    let target = root.join(kind.bucket_name()).join(path);
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, b"bytes").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_removes_objects_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_object(dir.path(), ObjectKind::Originals, "u1/a.jpg");
        write_object(dir.path(), ObjectKind::Thumbnails, "u1/a.jpg");

        let store = LocalObjectStore::new(dir.path());
        store
            .remove_objects(ObjectKind::Originals, &["u1/a.jpg".to_string()])
            .await
            .unwrap();

        assert!(!dir.path().join("originals/u1/a.jpg").exists());
        assert!(dir.path().join("thumbnails/u1/a.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_objects_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_object(dir.path(), ObjectKind::Originals, "b.jpg");

        let store = LocalObjectStore::new(dir.path());
        store
            .remove_objects(
                ObjectKind::Originals,
                &["gone.jpg".to_string(), "b.jpg".to_string()],
            )
            .await
            .unwrap();

        assert!(!dir.path().join("originals/b.jpg").exists());
    }

    #[tokio::test]
    async fn test_paths_escaping_the_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"keep").unwrap();
        write_object(dir.path(), ObjectKind::Originals, "c.jpg");

        let store = LocalObjectStore::new(dir.path());
        let err = store
            .remove_objects(
                ObjectKind::Originals,
                &[
                    "../secret.txt".to_string(),
                    "/etc/hostname".to_string(),
                    "c.jpg".to_string(),
                ],
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(dir.path().join("secret.txt").exists());
        // Valid paths in the same batch are still removed.
        assert!(!dir.path().join("originals/c.jpg").exists());
    }
}
