//! 单文件 multipart 上传处理器。

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::response::Json as JsonResponse;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::atomic::StagedUpload;
use crate::config::UPLOAD_FIELD;
use crate::dto::UploadReceipt;
use crate::error::ApiError;
use crate::storage::Storage;
use crate::validation::{base_file_name, is_csv_name};

/// 接收 `csv` 字段中的单个文件并以唯一名称保存。
pub async fn upload_file(
    Extension(storage): Extension<Arc<Storage>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadReceipt>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(error = %rejection, "upload without multipart body");
        ApiError::MissingFile
    })?;

    let mut staged: Option<(String, StagedUpload)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                discard(staged).await;
                warn!(error = %err, "malformed multipart body");
                return Err(ApiError::BadRequest("Invalid multipart data".into()));
            }
        };
        if field.name() != Some(UPLOAD_FIELD) || field.file_name().is_none() {
            continue;
        }
        if staged.is_some() {
            discard(staged).await;
            warn!("upload carried more than one file part");
            return Err(ApiError::BadRequest("Only one file may be uploaded".into()));
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        let Some(original) = base_file_name(&raw_name).map(str::to_string) else {
            warn!(file_name = %raw_name, "upload rejected: unusable file name");
            return Err(ApiError::InvalidType);
        };
        if !is_csv_name(&original) {
            warn!(file_name = %original, "upload rejected: not a csv file");
            return Err(ApiError::InvalidType);
        }

        let pending = StagedUpload::create(&storage).await?;
        staged = Some((original, stream_field(field, pending).await?));
    }

    let Some((original, pending)) = staged else {
        warn!("upload without a csv file part");
        return Err(ApiError::MissingFile);
    };

    let committed = match pending.commit(&storage, &original).await {
        Ok(committed) => committed,
        Err(err) => {
            error!(file_name = %original, error = ?err, "failed to persist upload");
            return Err(err);
        }
    };

    info!(
        file_name = %original,
        saved_as = %committed.saved_as,
        size = committed.size,
        "upload stored"
    );
    Ok(JsonResponse(UploadReceipt {
        success: true,
        file_name: original,
        path: committed.path.to_string_lossy().to_string(),
        saved_as: committed.saved_as,
        size: committed.size,
        uploaded_at: Utc::now(),
    }))
}

async fn stream_field(
    mut field: Field<'_>,
    mut pending: StagedUpload,
) -> Result<StagedUpload, ApiError> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(err) = pending.write(&chunk).await {
                    error!(error = ?err, "failed to write upload chunk");
                    pending.cleanup().await;
                    return Err(err);
                }
            }
            Ok(None) => return Ok(pending),
            Err(err) => {
                warn!(error = %err, written = pending.written(), "upload stream interrupted");
                pending.cleanup().await;
                return Err(ApiError::BadRequest("Invalid multipart data".into()));
            }
        }
    }
}

async fn discard(staged: Option<(String, StagedUpload)>) {
    if let Some((_, pending)) = staged {
        pending.cleanup().await;
    }
}
