use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use super::{StoreError, REF_DELIMITER};

/// Backend-agnostic blob storage.
///
/// Implement this trait to plug in any object store. [`FsBlobStore`] persists
/// to a local directory; [`MemoryBlobStore`] is for development and testing.
#[async_trait]
pub trait BlobStore: Send + Sync + Clone + 'static {
    /// Store a named blob, replacing any existing blob with the same name.
    async fn put(&self, name: &str, content: Vec<u8>) -> Result<(), StoreError>;

    /// Download a named blob into `dest_dir`, returning the written path.
    /// Fails with [`StoreError::NotFound`] for unknown names.
    async fn fetch(&self, name: &str, dest_dir: &Path) -> Result<PathBuf, StoreError>;
}

/// An uploaded file: its original filename and its content.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// Attachment upload/download over any [`BlobStore`], producing the collated
/// reference string stored in the email record and carried on the queue.
#[derive(Clone)]
pub struct AttachmentStore<B: BlobStore> {
    backend: B,
    upload_limit: Arc<Semaphore>,
}

impl<B: BlobStore> AttachmentStore<B> {
    /// Default bound on concurrent uploads within one submission.
    pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

    pub fn new(backend: B) -> Self {
        Self::with_upload_concurrency(backend, Self::DEFAULT_UPLOAD_CONCURRENCY)
    }

    /// Create a store with an explicit bound on concurrent uploads.
    pub fn with_upload_concurrency(backend: B, limit: usize) -> Self {
        Self {
            backend,
            upload_limit: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Upload a batch of attachments and collate their names.
    ///
    /// Zero-length entries are skipped: form submissions routinely produce an
    /// empty file artifact even when no attachment was chosen. Accepted names
    /// are joined with [`REF_DELIMITER`] in input order minus skipped entries.
    /// Returns `None` when nothing was accepted, without touching the backend.
    ///
    /// Uploads run concurrently (bounded by the store's upload limit) and the
    /// call returns only once all of them finish. There is no partial-success
    /// signal: if any upload fails, the whole call fails.
    pub async fn write(&self, files: Vec<Attachment>) -> Result<Option<String>, StoreError> {
        let accepted: Vec<Attachment> = files.into_iter().filter(|f| !f.content.is_empty()).collect();
        if accepted.is_empty() {
            return Ok(None);
        }

        let names: Vec<String> = accepted.iter().map(|f| f.name.clone()).collect();

        let mut uploads = JoinSet::new();
        for file in accepted {
            let backend = self.backend.clone();
            let limit = self.upload_limit.clone();
            uploads.spawn(async move {
                let _permit = limit
                    .acquire_owned()
                    .await
                    .map_err(|_| StoreError::Unavailable("upload limiter closed".into()))?;
                backend.put(&file.name, file.content).await
            });
        }

        while let Some(res) = uploads.join_next().await {
            res??;
        }

        Ok(Some(collate(&names)))
    }

    /// Download a single named blob into `dest_dir`.
    pub async fn read(&self, name: &str, dest_dir: &Path) -> Result<PathBuf, StoreError> {
        self.backend.fetch(name, dest_dir).await
    }
}

/// Join blob names into a single reference string.
///
/// `collate(["a.txt", "b.png"]) == "a.txt,b.png"`. The inverse is
/// [`split_refs`].
fn collate(names: &[String]) -> String {
    names.join(&REF_DELIMITER.to_string())
}

/// Split a collated reference string back into blob names.
pub(crate) fn split_refs(refs: &str) -> impl Iterator<Item = &str> {
    refs.split(REF_DELIMITER).filter(|s| !s.is_empty())
}

/// Directory-backed [`BlobStore`].
///
/// Each blob is one file under the root, named by the blob name. The root is
/// created lazily on the first write.
#[derive(Clone)]
pub struct FsBlobStore {
    root: Arc<PathBuf>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // Strip any directory components so a blob name cannot escape the root.
        let file_name = Path::new(name)
            .file_name()
            .map(|f| f.to_os_string())
            .unwrap_or_else(|| name.into());
        self.root.join(file_name)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, name: &str, content: Vec<u8>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.root.as_ref()).await?;
        tokio::fs::write(self.path_for(name), content).await?;
        Ok(())
    }

    async fn fetch(&self, name: &str, dest_dir: &Path) -> Result<PathBuf, StoreError> {
        let src = self.path_for(name);
        let content = match tokio::fs::read(&src).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let dest = dest_dir.join(src.file_name().unwrap_or_else(|| name.as_ref()));
        tokio::fs::write(&dest, content).await?;
        Ok(dest)
    }
}

/// In-memory [`BlobStore`] for development and testing. Not durable.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, content: Vec<u8>) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().await;
        blobs.insert(name.to_string(), content);
        Ok(())
    }

    async fn fetch(&self, name: &str, dest_dir: &Path) -> Result<PathBuf, StoreError> {
        let content = {
            let blobs = self.blobs.lock().await;
            blobs
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?
        };
        let dest = dest_dir.join(name);
        tokio::fs::write(&dest, content).await?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AttachmentStore<MemoryBlobStore> {
        AttachmentStore::new(MemoryBlobStore::new())
    }

    #[tokio::test]
    async fn write_collates_in_input_order() {
        let refs = store()
            .write(vec![
                Attachment::new("a.txt", b"aaa".to_vec()),
                Attachment::new("b.txt", b"bbb".to_vec()),
                Attachment::new("c.txt", b"ccc".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(refs.as_deref(), Some("a.txt,b.txt,c.txt"));
    }

    #[tokio::test]
    async fn write_skips_empty_files() {
        let refs = store()
            .write(vec![
                Attachment::new("a.txt", b"0123456789".to_vec()),
                Attachment::new("b.txt", Vec::new()),
            ])
            .await
            .unwrap();

        assert_eq!(refs.as_deref(), Some("a.txt"));
    }

    #[tokio::test]
    async fn write_empty_batch_returns_none() {
        let backend = MemoryBlobStore::new();
        let store = AttachmentStore::new(backend.clone());

        assert!(store.write(Vec::new()).await.unwrap().is_none());
        assert!(store
            .write(vec![Attachment::new("empty", Vec::new())])
            .await
            .unwrap()
            .is_none());
        // No upload happened for either call.
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn read_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store().read("nope.txt", dir.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "nope.txt"));
    }

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(FsBlobStore::new(root.path()));

        let refs = store
            .write(vec![Attachment::new("hello.txt", b"hello world".to_vec())])
            .await
            .unwrap();
        assert_eq!(refs.as_deref(), Some("hello.txt"));

        let path = store.read("hello.txt", scratch.path()).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello world");
    }

    #[test]
    fn split_refs_inverts_collation() {
        let parts: Vec<&str> = split_refs("a.txt,b.png").collect();
        assert_eq!(parts, vec!["a.txt", "b.png"]);
    }
}
