//! 上传客户端：选择与校验文件、带进度上传、刷新列表、下载与删除。
//!
//! 所有界面副作用都经由 [`View`]，客户端只持有一份 [`UiState`]。

mod candidate;
mod format;
mod progress;
mod view;

pub use candidate::UploadCandidate;
pub use view::{Connection, FileRow, Notice, TerminalView, View};

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::config::UPLOAD_FIELD;
use crate::dto::{ErrorEnvelope, FileListing, StoredFile, UploadReceipt};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("only CSV files are allowed: {0}")]
    InvalidType(String),
    #[error("{name} is {size} bytes, larger than the 100 MB limit")]
    OversizedFile { name: String, size: u64 },
    #[error("please select a file first")]
    MissingFile,
    #[error("no usable download location for {0}")]
    NoDownloadTarget(String),
    #[error("network error: {0}")]
    NetworkFailure(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Server {
        status: StatusCode,
        kind: Option<String>,
        message: String,
    },
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 客户端界面状态：待上传文件与是否有上传在进行。
#[derive(Debug, Default)]
pub struct UiState {
    pub pending: Option<UploadCandidate>,
    /// 只反映提交按钮的禁用状态；`submit_upload` 借用 `&mut self`，不会并发上传。
    pub uploading: bool,
}

pub struct UploadClient<V: View> {
    http: Client,
    base: Url,
    view: V,
    state: UiState,
}

impl<V: View> UploadClient<V> {
    pub fn new(server: &str, view: V) -> Result<Self, ClientError> {
        let base = Url::parse(server).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(server.to_string()));
        }
        Ok(Self {
            http: Client::builder().build()?,
            base,
            view,
            state: UiState::default(),
        })
    }

    /// 页面加载：健康检查与列表刷新并发进行，互不等待。
    pub async fn start(&self) -> Result<Vec<StoredFile>, ClientError> {
        let (_, files) = tokio::join!(self.check_health(), self.refresh_file_list());
        files
    }

    /// 取选择中的第一个文件；空选择直接忽略。
    pub async fn select_file(&mut self, selection: &[PathBuf]) -> Result<(), ClientError> {
        let Some(first) = selection.first() else {
            return Ok(());
        };
        match UploadCandidate::from_path(first).await {
            Ok(candidate) => {
                self.view.show_selection(Some(&candidate));
                self.state.pending = Some(candidate);
                Ok(())
            }
            Err(err) => {
                self.state.pending = None;
                self.view.show_selection(None);
                self.view.notify(Notice::error(selection_message(&err)));
                Err(err)
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.state.pending = None;
        self.view.show_selection(None);
    }

    /// 上传待上传文件；无论成败都会复位进度与提交按钮。
    pub async fn submit_upload(&mut self) -> Result<UploadReceipt, ClientError> {
        let Some(candidate) = self.state.pending.clone() else {
            self.view.notify(Notice::error("Please select a file first"));
            return Err(ClientError::MissingFile);
        };

        self.state.uploading = true;
        self.view.set_submit_enabled(false);
        self.view.set_progress(Some(0));
        let result = self.send_upload(&candidate).await;
        self.view.set_progress(None);
        self.view.set_submit_enabled(true);
        self.state.uploading = false;

        match result {
            Ok(receipt) => {
                self.view.notify(Notice::success(format!(
                    "Uploaded {} as {}",
                    receipt.file_name, receipt.saved_as
                )));
                self.clear_selection();
                let _ = self.refresh_file_list().await;
                Ok(receipt)
            }
            Err(err) => {
                warn!(file = %candidate.name, error = %err, "upload failed");
                self.view
                    .notify(Notice::error(format!("Upload failed: {err}")));
                Err(err)
            }
        }
    }

    async fn send_upload(&self, candidate: &UploadCandidate) -> Result<UploadReceipt, ClientError> {
        let file = File::open(&candidate.source).await?;
        let total = candidate.size;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = reqwest::Body::wrap_stream(progress::counting(ReaderStream::new(file), tx));
        let part = Part::stream_with_length(body, total)
            .file_name(candidate.name.clone())
            .mime_str("text/csv")?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let send = self
            .http
            .post(self.endpoint(&["upload"])?)
            .multipart(form)
            .send();
        tokio::pin!(send);
        let response = loop {
            tokio::select! {
                response = &mut send => break response?,
                Some(sent) = rx.recv() => {
                    self.view.set_progress(Some(progress::percent(sent, total)));
                }
            }
        };
        while let Ok(sent) = rx.try_recv() {
            self.view.set_progress(Some(progress::percent(sent, total)));
        }

        let response = expect_ok(response).await?;
        Ok(response.json::<UploadReceipt>().await?)
    }

    /// 拉取文件列表并渲染；失败时提示错误并显示空状态。
    pub async fn refresh_file_list(&self) -> Result<Vec<StoredFile>, ClientError> {
        self.view.set_loading(true);
        let result = self.fetch_listing().await;
        self.view.set_loading(false);

        match result {
            Ok(files) => {
                if files.is_empty() {
                    self.view.render_empty();
                } else {
                    let rows: Vec<FileRow> = files.iter().map(file_row).collect();
                    self.view.render_files(&rows);
                }
                Ok(files)
            }
            Err(err) => {
                self.view
                    .notify(Notice::error(format!("Failed to load files: {err}")));
                self.view.render_empty();
                Err(err)
            }
        }
    }

    async fn fetch_listing(&self) -> Result<Vec<StoredFile>, ClientError> {
        let response = self.http.get(self.endpoint(&["files"])?).send().await?;
        let listing = expect_ok(response).await?.json::<FileListing>().await?;
        Ok(listing.files)
    }

    /// 下载文件并保存到视图给出的位置。
    pub async fn request_download(&self, name: &str) -> Result<PathBuf, ClientError> {
        match self.fetch_download(name).await {
            Ok(saved) => {
                self.view
                    .notify(Notice::success(format!("Downloaded {name}")));
                Ok(saved)
            }
            Err(err) => {
                self.view
                    .notify(Notice::error(format!("Download failed: {err}")));
                Err(err)
            }
        }
    }

    async fn fetch_download(&self, name: &str) -> Result<PathBuf, ClientError> {
        let target = self
            .view
            .download_path(name)
            .ok_or_else(|| ClientError::NoDownloadTarget(name.to_string()))?;
        let response = self
            .http
            .get(self.endpoint(&["download", name])?)
            .send()
            .await?;
        let response = expect_ok(response).await?;

        let mut file = File::create(&target).await?;
        match save_body(response, &mut file).await {
            Ok(written) => {
                debug!(name = %name, bytes = written, target = ?target, "download saved");
                Ok(target)
            }
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&target).await;
                Err(err)
            }
        }
    }

    /// 确认后删除；只有成功时才刷新列表。返回是否真的删除了。
    pub async fn request_delete(&self, name: &str) -> Result<bool, ClientError> {
        if !self.view.confirm(&format!("Delete {name}?")) {
            return Ok(false);
        }
        let result = async {
            let response = self
                .http
                .delete(self.endpoint(&["delete", name])?)
                .send()
                .await?;
            expect_ok(response).await
        }
        .await;

        match result {
            Ok(_) => {
                self.view.notify(Notice::success(format!("Deleted {name}")));
                let _ = self.refresh_file_list().await;
                Ok(true)
            }
            Err(err) => {
                self.view
                    .notify(Notice::error(format!("Delete failed: {err}")));
                Err(err)
            }
        }
    }

    pub async fn check_health(&self) -> bool {
        let healthy = match self.endpoint(&["health"]) {
            Ok(url) => match self.http.get(url).send().await {
                Ok(response) => response.status() == StatusCode::OK,
                Err(err) => {
                    debug!(error = %err, "health check failed");
                    false
                }
            },
            Err(_) => false,
        };
        self.view.set_connection(if healthy {
            Connection::Connected
        } else {
            Connection::Disconnected
        });
        healthy
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// 非 200 响应转为 `ClientError::Server`，尽量带上服务端错误信封的内容。
async fn expect_ok(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let message = match envelope.message {
                Some(detail) => format!("{}: {detail}", envelope.error),
                None => envelope.error,
            };
            (envelope.kind, message)
        }
        Err(_) => (
            None,
            status.canonical_reason().unwrap_or("request failed").to_string(),
        ),
    };
    Err(ClientError::Server {
        status,
        kind,
        message,
    })
}

/// 把响应体分块写入文件，返回写入的字节数。
async fn save_body(response: Response, file: &mut File) -> Result<u64, ClientError> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn selection_message(err: &ClientError) -> String {
    match err {
        ClientError::InvalidType(_) => "Please select a CSV file".to_string(),
        ClientError::OversizedFile { .. } => "File size must be less than 100MB".to_string(),
        other => other.to_string(),
    }
}

fn file_row(file: &StoredFile) -> FileRow {
    FileRow {
        name: file.file_name.clone(),
        size: format::human_size(file.size),
        modified: format::local_time(file.modified_at),
    }
}
