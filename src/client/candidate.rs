//! 待上传文件：选中时校验，上传成功或重新选择后丢弃。

use std::path::{Path, PathBuf};
use tokio::fs;

use super::ClientError;
use crate::validation::{is_csv_name, within_size_limit};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadCandidate {
    pub name: String,
    pub size: u64,
    pub source: PathBuf,
}

impl UploadCandidate {
    /// 读取本地文件元数据并套用扩展名与大小规则。
    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let metadata = fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(ClientError::InvalidType(name));
        }
        let candidate = Self {
            name,
            size: metadata.len(),
            source: path.to_path_buf(),
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !is_csv_name(&self.name) {
            return Err(ClientError::InvalidType(self.name.clone()));
        }
        if !within_size_limit(self.size) {
            return Err(ClientError::OversizedFile {
                name: self.name.clone(),
                size: self.size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::MAX_UPLOAD_SIZE;
    use tempfile::tempdir;

    #[tokio::test]
    async fn accepts_csv_within_limit() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("sales.csv");
        std::fs::write(&path, b"a,b\n1,2\n").expect("write");

        let candidate = UploadCandidate::from_path(&path).await.expect("candidate");
        assert_eq!(candidate.name, "sales.csv");
        assert_eq!(candidate.size, 8);
    }

    #[tokio::test]
    async fn rejects_other_extensions() {
        let temp = tempdir().expect("tempdir");
        for name in ["data.txt", "data.CSV", "data.csv.bak"] {
            let path = temp.path().join(name);
            std::fs::write(&path, b"x").expect("write");
            let result = UploadCandidate::from_path(&path).await;
            assert!(matches!(result, Err(ClientError::InvalidType(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("big.csv");
        let file = std::fs::File::create(&path).expect("create");
        file.set_len(MAX_UPLOAD_SIZE + 1).expect("set_len");

        let result = UploadCandidate::from_path(&path).await;
        assert!(matches!(result, Err(ClientError::OversizedFile { .. })));
    }

    #[test]
    fn limit_is_inclusive() {
        let candidate = UploadCandidate {
            name: "edge.csv".into(),
            size: MAX_UPLOAD_SIZE,
            source: PathBuf::from("edge.csv"),
        };
        assert!(candidate.validate().is_ok());
    }
}
