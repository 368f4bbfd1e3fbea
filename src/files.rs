//! 文件列表、元数据、下载与删除处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::dto::{DeleteReceipt, FileDetail, FileListing};
use crate::error::ApiError;
use crate::storage::{Storage, StorageError};

/// 列出存储目录中的文件（非递归，按目录枚举顺序）。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<FileListing>, ApiError> {
    let files = storage.list_files().await.map_err(|err| {
        error!(error = ?err, "failed to read storage directory");
        match ApiError::from(err) {
            ApiError::StorageFailure { detail, .. } => ApiError::StorageFailure {
                context: "Failed to list files",
                detail,
            },
            other => other,
        }
    })?;
    info!(count = files.len(), "list files");
    Ok(JsonResponse(FileListing {
        success: true,
        file_count: files.len(),
        files,
        directory: storage.root_path().to_string_lossy().to_string(),
    }))
}

pub async fn get_file(
    Path(file_name): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<FileDetail>, ApiError> {
    let file = storage
        .stat(&file_name)
        .await
        .map_err(|err| rejected(&file_name, "stat", err))?;
    Ok(JsonResponse(FileDetail {
        success: true,
        file,
    }))
}

/// 以附件形式流式返回文件内容。
pub async fn download_file(
    Path(file_name): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let (file, metadata) = storage
        .open(&file_name)
        .await
        .map_err(|err| rejected(&file_name, "download", err))?;
    let mime = mime_guess::from_path(&file_name).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    headers.insert(
        header::CONTENT_LENGTH,
        header_value(&metadata.len().to_string())?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&content_disposition(&file_name))?,
    );
    if let Ok(modified) = metadata.modified() {
        headers.insert(header::LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
    }

    info!(file_name = %file_name, size = metadata.len(), "download file");
    Ok((
        StatusCode::OK,
        headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub async fn delete_file(
    Path(file_name): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<DeleteReceipt>, ApiError> {
    storage
        .delete(&file_name)
        .await
        .map_err(|err| rejected(&file_name, "delete", err))?;
    info!(file_name = %file_name, "delete file");
    Ok(JsonResponse(DeleteReceipt {
        success: true,
        message: "File deleted successfully".into(),
    }))
}

fn rejected(file_name: &str, operation: &'static str, err: StorageError) -> ApiError {
    match &err {
        StorageError::InvalidPath => {
            warn!(file_name = %file_name, operation, "access outside storage root denied")
        }
        StorageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            info!(file_name = %file_name, operation, "file not found")
        }
        _ => error!(file_name, operation, error = ?err, "storage operation failed"),
    }
    ApiError::from(err)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|err| ApiError::storage("Failed to build response", err))
}

/// 生成 `attachment` 头，非 ASCII 或特殊字符走 RFC 5987 编码。
fn content_disposition(file_name: &str) -> String {
    let plain = file_name.is_ascii()
        && !file_name
            .chars()
            .any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("attachment; filename=\"{file_name}\"");
    }
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}
