//! 健康检查、存活与就绪探针。

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::config::SERVICE_NAME;
use crate::dto::{HealthStatus, Liveness, Readiness};
use crate::storage::Storage;

pub async fn health() -> JsonResponse<HealthStatus> {
    JsonResponse(HealthStatus {
        status: "healthy".into(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

pub async fn liveness() -> JsonResponse<Liveness> {
    JsonResponse(Liveness { live: true })
}

/// 存储目录可访问时返回 200，否则 503。
pub async fn readiness(
    Extension(storage): Extension<Arc<Storage>>,
) -> (StatusCode, JsonResponse<Readiness>) {
    let storage_path = storage.root_path().to_string_lossy().to_string();
    match storage.check_ready().await {
        Ok(()) => (
            StatusCode::OK,
            JsonResponse(Readiness {
                ready: true,
                storage: storage_path,
                error: None,
            }),
        ),
        Err(err) => {
            warn!(storage = %storage_path, error = %err, "storage not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                JsonResponse(Readiness {
                    ready: false,
                    storage: storage_path,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}
