//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qrpass")]
#[command(version)]
#[command(about = "Single-use check-in QR token issuer and validator")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },

    /// Generate a fresh 32-byte secret key (64 hex chars)
    GenKey,

    /// Issue a single token offline with the configured secret key
    Issue {
        /// Event the token is bound to
        #[arg(short, long)]
        event: String,

        /// Token lifetime in seconds (defaults to services.qr.default_ttl_seconds)
        #[arg(short, long)]
        ttl: Option<i64>,
    },
}
