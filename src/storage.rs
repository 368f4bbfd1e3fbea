use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{self, File};
use tracing::debug;

use crate::config::STAGING_DIR;
use crate::dto::StoredFile;
use crate::validation::is_plain_component;

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(self.staging_dir()).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn display_path(&self, name: &str) -> String {
        self.root.join(name).to_string_lossy().to_string()
    }

    /// 在根目录内解析 `name`（跟随符号链接）；规范化后的目标不在规范化根目录下时一律拒绝。
    pub async fn resolve_checked(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !is_plain_component(name) {
            return Err(StorageError::InvalidPath);
        }
        let root = fs::canonicalize(&self.root)
            .await
            .map_err(StorageError::RootUnavailable)?;
        let candidate = root.join(name);

        match fs::canonicalize(&candidate).await {
            Ok(resolved) if resolved.starts_with(&root) => Ok(resolved),
            Ok(resolved) => {
                debug!(name = %name, resolved = ?resolved, "resolved path escapes storage root");
                Err(StorageError::InvalidPath)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                match fs::symlink_metadata(&candidate).await {
                    Err(missing) if missing.kind() == ErrorKind::NotFound => {
                        Err(StorageError::Io(missing))
                    }
                    _ => Err(StorageError::InvalidPath),
                }
            }
            Err(_) => Err(StorageError::InvalidPath),
        }
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(StorageError::RootUnavailable)?;
        let mut files = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == STAGING_DIR {
                continue;
            }
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                // removed between enumeration and stat
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Io(err)),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(self.describe(name, &metadata));
        }

        Ok(files)
    }

    pub async fn stat(&self, name: &str) -> Result<StoredFile, StorageError> {
        let target = self.resolve_checked(name).await?;
        let metadata = regular_file_metadata(&target).await?;
        Ok(self.describe(name.to_string(), &metadata))
    }

    pub async fn open(&self, name: &str) -> Result<(File, Metadata), StorageError> {
        let target = self.resolve_checked(name).await?;
        let metadata = regular_file_metadata(&target).await?;
        let file = File::open(&target).await?;
        Ok((file, metadata))
    }

    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let target = self.resolve_checked(name).await?;
        regular_file_metadata(&target).await?;
        // 删除目录项本身，而不是符号链接指向的文件
        fs::remove_file(self.root.join(name)).await?;
        Ok(())
    }

    /// 检查存储根目录是否存在且可读。
    pub async fn check_ready(&self) -> io::Result<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(io::Error::other("storage root is not a directory"));
        }
        fs::read_dir(&self.root).await?;
        Ok(())
    }

    fn describe(&self, name: String, metadata: &Metadata) -> StoredFile {
        let modified = metadata.modified().ok();
        let created = metadata.created().ok().or(modified);
        StoredFile {
            path: self.display_path(&name),
            file_name: name,
            size: metadata.len(),
            created_at: to_utc(created),
            modified_at: to_utc(modified),
        }
    }
}

async fn regular_file_metadata(target: &Path) -> Result<Metadata, StorageError> {
    let metadata = fs::metadata(target).await?;
    if !metadata.is_file() {
        return Err(StorageError::Io(io::Error::new(
            ErrorKind::NotFound,
            "not a regular file",
        )));
    }
    Ok(metadata)
}

fn to_utc(time: Option<SystemTime>) -> DateTime<Utc> {
    time.unwrap_or(UNIX_EPOCH).into()
}

/// 进程内单调递增的毫秒时间戳，同一毫秒内的重复请求顺延到下一毫秒。
pub fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

pub fn stored_name(stamp: u64, original: &str) -> String {
    format!("{stamp}-{original}")
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    RootUnavailable(io::Error),
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    async fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("uploads"));
        storage.ensure_root().await.expect("ensure root");
        (temp, storage)
    }

    #[tokio::test]
    async fn resolve_rejects_traversal() {
        let (_temp, storage) = make_storage().await;
        for name in ["../../etc/passwd", "..", "a/../../b.csv", "/etc/passwd", ""] {
            let result = storage.resolve_checked(name).await;
            assert!(
                matches!(result, Err(StorageError::InvalidPath)),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn resolve_missing_file_is_not_found() {
        let (_temp, storage) = make_storage().await;
        let result = storage.resolve_checked("missing.csv").await;
        assert!(matches!(result, Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink_escaping_root() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = make_storage().await;
        let outside = temp.path().join("outside.csv");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, storage.root_path().join("link.csv")).expect("symlink");

        let result = storage.resolve_checked("link.csv").await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_dangling_symlink() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = make_storage().await;
        symlink(temp.path().join("gone.csv"), storage.root_path().join("dangling.csv"))
            .expect("symlink");

        let result = storage.resolve_checked("dangling.csv").await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn list_skips_staging_and_directories() {
        let (_temp, storage) = make_storage().await;
        std::fs::write(storage.root_path().join("1-a.csv"), b"a,b\n").expect("write");
        std::fs::create_dir(storage.root_path().join("nested")).expect("mkdir");
        std::fs::write(storage.staging_dir().join("x.part"), b"partial").expect("write");

        let files = storage.list_files().await.expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "1-a.csv");
        assert_eq!(files[0].size, 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delete_symlink_removes_the_link_only() {
        use std::os::unix::fs::symlink;

        let (_temp, storage) = make_storage().await;
        let real = storage.root_path().join("1-real.csv");
        let link = storage.root_path().join("2-link.csv");
        std::fs::write(&real, b"a,b\n").expect("write real file");
        symlink(&real, &link).expect("symlink");

        storage.delete("2-link.csv").await.expect("delete link");
        assert!(std::fs::symlink_metadata(&link).is_err());
        assert_eq!(std::fs::read(&real).expect("real file kept"), b"a,b\n");
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let (_temp, storage) = make_storage().await;
        let result = storage.delete("nope.csv").await;
        assert!(matches!(result, Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn stat_directory_is_not_found() {
        let (_temp, storage) = make_storage().await;
        let result = storage.stat(STAGING_DIR).await;
        assert!(matches!(result, Err(StorageError::Io(err)) if err.kind() == ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn check_ready_fails_without_root() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("missing"));
        assert!(storage.check_ready().await.is_err());
        storage.ensure_root().await.expect("ensure root");
        assert!(storage.check_ready().await.is_ok());
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let stamps: Vec<u64> = (0..1000).map(|_| next_stamp()).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
        let unique: HashSet<_> = stamps.iter().collect();
        assert_eq!(unique.len(), stamps.len());
    }

    #[test]
    fn stored_name_prefixes_stamp() {
        assert_eq!(stored_name(1700000000000, "sales.csv"), "1700000000000-sales.csv");
    }
}
