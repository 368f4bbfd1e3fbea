//! 命令行参数、环境变量与服务默认值。

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEVELOPMENT_ENV: &str = "development";
pub const SERVICE_NAME: &str = "csv-drop";
pub const UPLOAD_FIELD: &str = "csv";
pub const STAGING_DIR: &str = ".incoming";
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// 顶层命令行入口。
#[derive(Parser, Debug)]
#[command(name = "csv-drop", version, about = "CSV upload service and client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the file store service.
    Serve(ServeArgs),
    /// Upload a CSV file (the first path is used).
    Upload {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(required = true, help = "Files to choose from")]
        files: Vec<PathBuf>,
    },
    /// List stored files.
    List {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Download a stored file.
    Download {
        #[command(flatten)]
        client: ClientArgs,
        name: String,
        #[arg(short = 'o', long, default_value = ".", help = "Output directory")]
        out_dir: PathBuf,
    },
    /// Delete a stored file.
    Delete {
        #[command(flatten)]
        client: ClientArgs,
        name: String,
        #[arg(short = 'y', long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
    /// Check service connectivity.
    Health {
        #[command(flatten)]
        client: ClientArgs,
    },
}

/// 服务端配置。
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        short = 'd',
        long,
        env = "UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Storage directory for uploaded files"
    )]
    pub upload_dir: PathBuf,
    #[arg(
        short = 'b',
        long,
        env = "HOST",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(long, env = "CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "APP_ENV",
        default_value = "production",
        help = "Runtime environment (development exposes error details)"
    )]
    pub app_env: String,
}

impl ServeArgs {
    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case(DEVELOPMENT_ENV)
    }
}

/// 客户端子命令共享的配置。
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    #[arg(
        short = 's',
        long,
        env = "CSV_DROP_SERVER",
        default_value = DEFAULT_SERVER_URL,
        help = "Base URL of the file store service"
    )]
    pub server: String,
}
