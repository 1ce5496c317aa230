// src/storage.rs

use std::io;
use std::path::PathBuf;

use tokio::fs;
use uuid::Uuid;

/// Local-disk file store collaborator. `store` hands back an opaque
/// locator; `release` removes the bytes for a locator. Metadata stays in
/// Mongo (`asset.rs`); this module never sees it.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn init(root: &str) -> io::Result<Self> {
        let root = PathBuf::from(root);
        fs::create_dir_all(&root).await?;
        Ok(FileStore { root })
    }

    pub async fn store(&self, file_name: &str, bytes: &[u8]) -> io::Result<String> {
        let locator = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(file_name));
        fs::write(self.root.join(&locator), bytes).await?;
        Ok(locator)
    }

    pub async fn release(&self, locator: &str) -> io::Result<()> {
        // Locators are generated by `store`; a traversal-shaped locator is
        // a corrupted record, not a request to honor.
        let name = sanitize_file_name(locator);
        fs::remove_file(self.root.join(name)).await
    }
}

/// Flattens a client-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\temp\\report.pdf"), "report.pdf");
    }

    #[test]
    fn sanitize_replaces_odd_characters() {
        assert_eq!(sanitize_file_name("my report (v2).pdf"), "my_report__v2_.pdf");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[tokio::test]
    async fn store_then_release_round_trip() {
        let dir = std::env::temp_dir().join(format!("taskwave-test-{}", Uuid::new_v4()));
        let store = FileStore::init(dir.to_str().unwrap()).await.unwrap();
        let locator = store.store("notes.txt", b"hello").await.unwrap();
        assert!(locator.ends_with("notes.txt"));
        assert_eq!(fs::read(dir.join(&locator)).await.unwrap(), b"hello");
        store.release(&locator).await.unwrap();
        assert!(store.release(&locator).await.is_err());
        fs::remove_dir_all(&dir).await.unwrap();
    }
}
