//! 客户端界面抽象与终端实现。

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use super::candidate::UploadCandidate;
use super::format::kilobytes;
use crate::validation::base_file_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 短暂显示给用户的通知。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
}

/// 文件列表中的一行，字段均已格式化。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRow {
    pub name: String,
    pub size: String,
    pub modified: String,
}

/// 客户端驱动的界面；除 `confirm` 与 `download_path` 外都只产生副作用。
pub trait View {
    fn notify(&self, notice: Notice);
    fn show_selection(&self, candidate: Option<&UploadCandidate>);
    /// `None` 表示隐藏进度条。
    fn set_progress(&self, percent: Option<u8>);
    fn set_submit_enabled(&self, enabled: bool);
    fn set_loading(&self, loading: bool);
    fn render_files(&self, rows: &[FileRow]);
    fn render_empty(&self);
    fn set_connection(&self, status: Connection);
    fn confirm(&self, prompt: &str) -> bool;
    fn download_path(&self, name: &str) -> Option<PathBuf>;
}

/// 命令行界面：结果写 stdout，进度与提示写 stderr。
pub struct TerminalView {
    out_dir: PathBuf,
    assume_yes: bool,
}

impl TerminalView {
    pub fn new(out_dir: PathBuf, assume_yes: bool) -> Self {
        Self {
            out_dir,
            assume_yes,
        }
    }
}

impl View for TerminalView {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => eprintln!("✔ {}", notice.text),
            NoticeLevel::Error => eprintln!("✖ {}", notice.text),
        }
    }

    fn show_selection(&self, candidate: Option<&UploadCandidate>) {
        if let Some(candidate) = candidate {
            eprintln!("Selected {} ({})", candidate.name, kilobytes(candidate.size));
        }
    }

    fn set_progress(&self, percent: Option<u8>) {
        match percent {
            Some(percent) => eprint!("\rUploading... {percent:>3}%"),
            None => eprintln!(),
        }
    }

    fn set_submit_enabled(&self, _enabled: bool) {}

    fn set_loading(&self, _loading: bool) {}

    fn render_files(&self, rows: &[FileRow]) {
        let width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0);
        for row in rows {
            println!(
                "{:<width$}  {:>10}  {}",
                row.name,
                row.size,
                row.modified,
                width = width
            );
        }
    }

    fn render_empty(&self) {
        println!("No files uploaded yet");
    }

    fn set_connection(&self, status: Connection) {
        match status {
            Connection::Connected => eprintln!("● connected"),
            Connection::Disconnected => eprintln!("○ disconnected"),
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{prompt} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes" | "YES")
    }

    fn download_path(&self, name: &str) -> Option<PathBuf> {
        base_file_name(name).map(|name| self.out_dir.join(name))
    }
}
