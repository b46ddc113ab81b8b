//! Upload and download directories: two opaque byte stores keyed by file
//! name, consumed (not owned) by the bulk transfer sub-protocol.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io;

/// The local node's upload and download directories.
///
/// The upload directory holds files this node makes available to FETCH
/// requests (including replicas received via PUSH); the download directory
/// is where files fetched on this node's own behalf land.
#[derive(Clone, Debug)]
pub struct FileStore {
    upload_dir: PathBuf,
    download_dir: PathBuf,
}

impl FileStore {
    /// Open (creating on demand) a file store rooted at the given
    /// directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either directory cannot be created.
    pub async fn open(upload_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let upload_dir = upload_dir.into();
        let download_dir = download_dir.into();
        fs::create_dir_all(&upload_dir).await?;
        fs::create_dir_all(&download_dir).await?;
        Ok(Self {
            upload_dir,
            download_dir,
        })
    }

    /// Read a file from the upload area by name.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if no such file exists, or any
    /// other I/O error from the underlying read.
    pub async fn read_upload(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.upload_path(name)).await
    }

    /// Write `bytes` into the upload area under `name`: used when a PUSH
    /// replicates a file onto this node, making it a provider.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying write.
    pub async fn write_upload(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.upload_path(name), bytes).await
    }

    /// Write `bytes` into the download area under `name`: the destination
    /// for a file this node fetched for its own use.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying write.
    pub async fn write_download(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.download_path(name), bytes).await
    }

    /// Whether `name` is present in the upload area.
    #[must_use]
    pub fn has_upload(&self, name: &str) -> bool {
        self.upload_path(name).is_file()
    }

    fn upload_path(&self, name: &str) -> PathBuf {
        self.upload_dir.join(sanitize(name))
    }

    fn download_path(&self, name: &str) -> PathBuf {
        self.download_dir.join(sanitize(name))
    }

    /// The configured download directory, for callers that need to locate
    /// a fetched file directly.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

/// Strip path separators from a requested name so a malicious `GET
/// /../../etc/passwd` cannot escape the store's directory.
fn sanitize(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_upload_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("up"), dir.path().join("down"))
            .await
            .unwrap();
        store.write_upload("hello.txt", b"hello world\n").await.unwrap();
        assert!(store.has_upload("hello.txt"));
        let bytes = store.read_upload("hello.txt").await.unwrap();
        assert_eq!(bytes, b"hello world\n");

        store.write_download("hello.txt", b"hello world\n").await.unwrap();
        let on_disk = fs::read(store.download_dir().join("hello.txt")).await.unwrap();
        assert_eq!(on_disk, b"hello world\n");
    }

    #[tokio::test]
    async fn missing_upload_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("up"), dir.path().join("down"))
            .await
            .unwrap();
        assert!(!store.has_upload("nope.txt"));
        assert!(store.read_upload("nope.txt").await.is_err());
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("plain.txt"), "plain.txt");
    }

    proptest::proptest! {
        #[test]
        fn sanitize_never_yields_a_path_separator(name: String) {
            let sanitized = sanitize(&name);
            prop_assert!(!sanitized.contains('/') && !sanitized.contains('\\'));
        }
    }
}
