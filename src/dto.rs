//! 服务端响应与客户端解析共用的 JSON 结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 存储目录中一个文件的描述。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub file_name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    pub file_name: String,
    pub saved_as: String,
    pub size: u64,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub success: bool,
    pub files: Vec<StoredFile>,
    pub file_count: usize,
    pub directory: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileDetail {
    pub success: bool,
    pub file: StoredFile,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteReceipt {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Liveness {
    pub live: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Readiness {
    pub ready: bool,
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 失败响应的统一信封。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(kind: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: Some(kind.to_string()),
            error: error.into(),
            message: None,
            path: None,
            method: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
