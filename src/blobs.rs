use std::fmt;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

#[derive(Debug)]
pub enum BlobError {
    InvalidKey(String),
    NotFound,
    Io(std::io::Error),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::InvalidKey(key) => write!(f, "invalid blob key: {key}"),
            BlobError::NotFound => write!(f, "blob not found"),
            BlobError::Io(err) => write!(f, "blob I/O failure: {err}"),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlobError::NotFound
        } else {
            BlobError::Io(err)
        }
    }
}

pub fn avatar_key(email: &str) -> String {
    format!("Avatar/{email}")
}

pub fn logo_key(shop_id: &str) -> String {
    format!("Logo/{shop_id}")
}

/// Filesystem-backed object storage addressed by logical key
/// (`Avatar/{email}`, `Logo/{shop_id}`). Keys map to paths under a root
/// directory and are served back over `/blobs/{key}`.
#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys must be relative and free of parent-directory components.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let path = Path::new(key);
        let valid = !key.is_empty()
            && path
                .components()
                .all(|part| matches!(part, Component::Normal(_)));
        if !valid {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(path))
    }

    /// Stores the bytes under the key and returns the URL they are served
    /// from. Overwrites any previous content for the key.
    pub async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(format!("/blobs/{key}"))
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key)?;
        Ok(fs::read(&path).await?)
    }

    /// Path on disk for a stored key, for file-serving responses.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        self.resolve(key)
    }

    pub async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        fs::remove_file(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> BlobStore {
        let root = std::env::temp_dir().join(format!("easycutter-blobs-{}", Uuid::new_v4()));
        BlobStore::new(root)
    }

    #[tokio::test]
    async fn upload_download_delete_round_trip() {
        let store = temp_store();
        let key = avatar_key("ana@mail.com");

        let url = store.upload(&key, b"png-bytes").await.unwrap();
        assert_eq!(url, "/blobs/Avatar/ana@mail.com");

        let bytes = store.download(&key).await.unwrap();
        assert_eq!(bytes, b"png-bytes");

        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.download(&key).await.unwrap_err(),
            BlobError::NotFound
        ));
    }

    #[tokio::test]
    async fn upload_overwrites_previous_content() {
        let store = temp_store();
        let key = logo_key("fade-joe@cut.io");

        store.upload(&key, b"v1").await.unwrap();
        store.upload(&key, b"v2").await.unwrap();

        assert_eq!(store.download(&key).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let store = temp_store();
        for key in ["", "../etc/passwd", "/abs/path", "Logo/../../x"] {
            assert!(matches!(
                store.upload(key, b"x").await.unwrap_err(),
                BlobError::InvalidKey(_)
            ));
        }
    }

    #[tokio::test]
    async fn delete_missing_blob_is_not_found() {
        let store = temp_store();
        assert!(matches!(
            store.delete("Logo/none").await.unwrap_err(),
            BlobError::NotFound
        ));
    }
}
