//! 上传暂存文件：先写入 `.incoming`，完成后以唯一名称原子落盘。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::storage::{Storage, next_stamp, stored_name};

const UPLOAD_FAILED: &str = "Failed to upload file";
const MAX_NAME_ATTEMPTS: usize = 16;

/// 暂存中的上传文件。
pub struct StagedUpload {
    temp_path: PathBuf,
    file: File,
    written: u64,
}

/// 落盘后的文件名、路径与字节数。
pub struct Committed {
    pub saved_as: String,
    pub path: PathBuf,
    pub size: u64,
}

impl StagedUpload {
    /// 在暂存目录中创建临时文件。
    pub async fn create(storage: &Storage) -> Result<Self, ApiError> {
        let staging = storage.staging_dir();
        fs::create_dir_all(&staging)
            .await
            .map_err(|err| ApiError::storage(UPLOAD_FAILED, err))?;
        let temp_path = staging.join(format!("{}.part", Uuid::new_v4()));
        let file = File::create(&temp_path)
            .await
            .map_err(|err| ApiError::storage(UPLOAD_FAILED, err))?;
        Ok(Self {
            temp_path,
            file,
            written: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), ApiError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|err| ApiError::storage(UPLOAD_FAILED, err))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        remove_quietly(&self.temp_path).await;
    }

    /// 同步数据，预占 `{时间戳}-{原始名}` 并把暂存文件重命名过去。
    pub async fn commit(self, storage: &Storage, original: &str) -> Result<Committed, ApiError> {
        let Self {
            temp_path,
            file,
            written,
        } = self;
        if let Err(err) = file.sync_all().await {
            remove_quietly(&temp_path).await;
            return Err(ApiError::storage(UPLOAD_FAILED, err));
        }
        drop(file);

        let (saved_as, target) = match reserve_name(storage, original).await {
            Ok(reserved) => reserved,
            Err(err) => {
                remove_quietly(&temp_path).await;
                return Err(err);
            }
        };

        if let Err(err) = replace(&temp_path, &target).await {
            remove_quietly(&temp_path).await;
            remove_quietly(&target).await;
            return Err(ApiError::storage(UPLOAD_FAILED, err));
        }

        Ok(Committed {
            saved_as,
            path: target,
            size: written,
        })
    }
}

async fn reserve_name(storage: &Storage, original: &str) -> Result<(String, PathBuf), ApiError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = stored_name(next_stamp(), original);
        let target = storage.root_path().join(&name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(_) => return Ok((name, target)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                warn!(name = %name, "stored name already taken, retrying");
            }
            Err(err) => return Err(ApiError::storage(UPLOAD_FAILED, err)),
        }
    }
    Err(ApiError::storage(
        UPLOAD_FAILED,
        "could not reserve a unique file name",
    ))
}

async fn replace(from: &Path, to: &Path) -> std::io::Result<()> {
    #[cfg(windows)]
    {
        fs::remove_file(to).await?;
    }
    fs::rename(from, to).await
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path).await
        && err.kind() != ErrorKind::NotFound
    {
        warn!(path = ?path, error = %err, "failed to remove upload artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().join("uploads"));
        storage.ensure_root().await.expect("ensure root");
        (temp, storage)
    }

    async fn staging_entries(storage: &Storage) -> usize {
        let mut dir = fs::read_dir(storage.staging_dir()).await.expect("read staging");
        let mut count = 0;
        while dir.next_entry().await.expect("entry").is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn commit_moves_bytes_under_unique_name() {
        let (_temp, storage) = make_storage().await;
        let mut staged = StagedUpload::create(&storage).await.expect("create");
        staged.write(b"a,b\n1,2\n").await.expect("write");
        let committed = staged.commit(&storage, "sales.csv").await.expect("commit");

        assert!(committed.saved_as.ends_with("-sales.csv"));
        assert_eq!(committed.size, 8);
        let contents = fs::read(&committed.path).await.expect("read");
        assert_eq!(contents, b"a,b\n1,2\n");
        assert_eq!(staging_entries(&storage).await, 0);
    }

    #[tokio::test]
    async fn same_name_twice_gets_distinct_names() {
        let (_temp, storage) = make_storage().await;
        let mut names = Vec::new();
        for body in [b"one".as_slice(), b"two".as_slice()] {
            let mut staged = StagedUpload::create(&storage).await.expect("create");
            staged.write(body).await.expect("write");
            names.push(staged.commit(&storage, "dup.csv").await.expect("commit").saved_as);
        }
        assert_ne!(names[0], names[1]);
    }

    #[tokio::test]
    async fn failed_reservation_removes_temp_file() {
        let (temp, storage) = make_storage().await;
        let mut staged = StagedUpload::create(&storage).await.expect("create");
        staged.write(b"a\n").await.expect("write");

        let missing_root = Storage::new(temp.path().join("gone"));
        let result = staged.commit(&missing_root, "lost.csv").await;
        assert!(matches!(result, Err(ApiError::StorageFailure { .. })));
        assert_eq!(staging_entries(&storage).await, 0);
        assert!(!temp.path().join("gone").exists());
    }

    #[tokio::test]
    async fn cleanup_removes_temp_file() {
        let (_temp, storage) = make_storage().await;
        let mut staged = StagedUpload::create(&storage).await.expect("create");
        staged.write(b"partial").await.expect("write");
        assert_eq!(staging_entries(&storage).await, 1);
        staged.cleanup().await;
        assert_eq!(staging_entries(&storage).await, 0);
    }
}
