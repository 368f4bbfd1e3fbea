//! csv-drop：CSV 文件上传服务及其命令行客户端。
//!
//! `serve` 启动文件存储服务（上传、列表、元数据、下载、删除与健康检查）；
//! 其余子命令是驱动同一套 HTTP 接口的上传客户端。

mod atomic;
mod client;
mod config;
mod dto;
mod error;
mod files;
mod health;
mod http;
mod logging;
mod storage;
mod upload;
mod validation;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, info_span};

use crate::client::{ClientError, TerminalView, UploadClient};
use crate::config::{Cli, ClientArgs, Command, SHUTDOWN_GRACE_SECS, ServeArgs};
use crate::http::{PanicResponder, build_cors_layer, resolve_client_ip};
use crate::storage::Storage;

/// 解析命令行并分派到服务端或客户端。
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            logging::init_logging("info");
            match serve(args).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!(error = %err, "server stopped with error");
                    ExitCode::FAILURE
                }
            }
        }
        command => {
            logging::init_logging("warn");
            match run_client(command).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::debug!(error = ?err, "client command failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// 组装全部路由与中间件。
pub(crate) fn build_router(storage: Arc<Storage>, development: bool) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/files", get(files::list_files))
        .route("/files/{file_name}", get(files::get_file))
        .route("/download/{file_name}", get(files::download_file))
        .route("/delete/{file_name}", delete(files::delete_file))
        .fallback(http::route_not_found)
        .method_not_allowed_fallback(http::route_not_found)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(CatchPanicLayer::custom(PanicResponder {
            expose_details: development,
        }))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
}

async fn serve(args: ServeArgs) -> Result<(), std::io::Error> {
    let storage = Arc::new(Storage::new(args.upload_dir.clone()));
    storage.ensure_root().await?;

    let mut app = build_router(storage, args.is_development());
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(
        %addr,
        upload_dir = %args.upload_dir.display(),
        development = args.is_development(),
        "🚀 Starting csv-drop"
    );

    tokio::spawn(shutdown_signal(handle.clone()));
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
}

async fn run_client(command: Command) -> Result<(), ClientError> {
    match command {
        Command::Upload { client, files } => {
            let mut app = connect(&client, TerminalView::new(".".into(), false))?;
            app.select_file(&files).await?;
            app.submit_upload().await?;
        }
        Command::List { client } => {
            let app = connect(&client, TerminalView::new(".".into(), false))?;
            app.start().await?;
        }
        Command::Download {
            client,
            name,
            out_dir,
        } => {
            let app = connect(&client, TerminalView::new(out_dir, false))?;
            app.request_download(&name).await?;
        }
        Command::Delete { client, name, yes } => {
            let app = connect(&client, TerminalView::new(".".into(), yes))?;
            app.request_delete(&name).await?;
        }
        Command::Health { client } => {
            let app = connect(&client, TerminalView::new(".".into(), false))?;
            if !app.check_health().await {
                return Err(ClientError::Server {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    kind: None,
                    message: "service unreachable".into(),
                });
            }
        }
        Command::Serve(_) => unreachable!("serve is dispatched before the client"),
    }
    Ok(())
}

fn connect(
    args: &ClientArgs,
    view: TerminalView,
) -> Result<UploadClient<TerminalView>, ClientError> {
    UploadClient::new(&args.server, view).map_err(|err| {
        eprintln!("✖ {err}");
        err
    })
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
