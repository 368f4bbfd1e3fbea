//! HTTP 辅助工具：CORS、安全头、客户端 IP、404 回退与 panic 响应。

use axum::Json;
use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use axum::{middleware, response::IntoResponse};
use std::any::Any;
use std::net::IpAddr;
use tower_http::catch_panic::ResponseForPanic;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tracing::{error, warn};

use crate::dto::ErrorEnvelope;
use crate::error::ApiError;

/// 构建 CORS Layer（支持逗号分隔的来源列表）。
pub fn build_cors_layer(cors_origins: Option<&str>) -> Option<CorsLayer> {
    let origins = cors_origins?
        .split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "invalid cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(AnyOrigin),
    )
}

/// 从 `x-forwarded-for` 解析客户端 IP。
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// 综合转发头与连接信息计算客户端 IP。
pub fn resolve_client_ip(headers: &HeaderMap, connect_ip: Option<IpAddr>) -> Option<IpAddr> {
    extract_forwarded_ip(headers).or(connect_ip)
}

/// 添加基础安全响应头。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<axum::response::Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        axum::http::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}

/// 未匹配路由的 JSON 404。
pub async fn route_not_found(method: Method, uri: Uri) -> ApiError {
    warn!(method = %method, path = uri.path(), "route not found");
    ApiError::RouteNotFound {
        path: uri.path().to_string(),
        method,
    }
}

/// 把处理器中的 panic 转为 500 JSON；仅开发模式下附带 panic 信息。
#[derive(Clone, Copy, Debug)]
pub struct PanicResponder {
    pub expose_details: bool,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = AxumBody;

    fn response_for_panic(
        &mut self,
        err: Box<dyn Any + Send + 'static>,
    ) -> Response<Self::ResponseBody> {
        let detail = if let Some(message) = err.downcast_ref::<String>() {
            message.clone()
        } else if let Some(message) = err.downcast_ref::<&str>() {
            message.to_string()
        } else {
            "unknown panic".to_string()
        };
        error!(panic = %detail, "handler panicked");

        let mut envelope = ErrorEnvelope::new("Internal", "Internal server error");
        if self.expose_details {
            envelope = envelope.with_message(detail);
        }
        (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::storage::Storage;
    use crate::upload::tests::json_of;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[test]
    fn forwarded_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.7, 172.16.0.1"),
        );
        let fallback: IpAddr = "127.0.0.1".parse().expect("ip");
        assert_eq!(
            resolve_client_ip(&headers, Some(fallback)),
            "10.0.0.7".parse().ok()
        );
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), Some(fallback)),
            Some(fallback)
        );
    }

    #[test]
    fn cors_layer_requires_valid_origins() {
        assert!(build_cors_layer(None).is_none());
        assert!(build_cors_layer(Some(" , ")).is_none());
        assert!(build_cors_layer(Some("http://localhost:8080")).is_some());
    }

    #[tokio::test]
    async fn panic_details_hidden_outside_development() {
        let mut responder = PanicResponder {
            expose_details: false,
        };
        let response = responder.response_for_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_of(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn panic_details_shown_in_development() {
        let mut responder = PanicResponder {
            expose_details: true,
        };
        let response = responder.response_for_panic(Box::new(String::from("boom")));
        let json = json_of(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
    }

    #[tokio::test]
    async fn unknown_routes_and_wrong_methods_get_json_404() {
        let temp = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(Storage::new(temp.path().join("uploads")));
        storage.ensure_root().await.expect("ensure root");

        for (method, path) in [
            (Method::GET, "/nope"),
            (Method::DELETE, "/files"),
            (Method::GET, "/delete/x.csv"),
            (Method::PUT, "/upload"),
        ] {
            let request = Request::builder()
                .method(method.clone())
                .uri(path)
                .body(AxumBody::empty())
                .expect("request");
            let response = build_router(storage.clone(), false)
                .oneshot(request)
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {path}");
            let json = json_of(response).await;
            assert_eq!(json["success"], false);
            assert_eq!(json["kind"], "RouteNotFound");
            assert_eq!(json["error"], "Not found");
            assert_eq!(json["path"], path);
            assert_eq!(json["method"], method.as_str());
        }
    }
}
