//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Issue HTTP transfers from a fixed-rate tick loop.
///
/// Every request is queued up front; the loop then calls the transfer
/// manager once per tick until all transfers finish or the deadline passes.
#[derive(Parser, Debug)]
#[command(name = "tick-transfer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/tick-transfer/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Main loop tick in milliseconds (1-10000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    pub tick_ms: Option<u64>,

    /// Give up and shut down after this many seconds
    #[arg(long, global = true, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub deadline_secs: u64,

    /// Print one JSON object per finished transfer
    #[arg(long, global = true)]
    pub json: bool,

    /// Max connections across all transfers (1-64)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub max_connections: Option<u64>,

    /// Max connections to a single host (1-64)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub max_host_connections: Option<u64>,

    /// Upload pacing in bytes per second (0 to disable)
    #[arg(long, global = true)]
    pub upload_rate: Option<u64>,

    /// Download pacing in bytes per second (0 to disable)
    #[arg(long, global = true)]
    pub download_rate: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Request kinds.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// GET one or more URLs
    Get {
        /// URLs to fetch
        #[arg(required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        headers: HeaderArgs,
    },

    /// POST a flat body
    Post {
        /// Target URL
        url: String,

        /// Request body
        #[arg(short, long, default_value = "")]
        data: String,

        /// Discard the response instead of printing it
        #[arg(long)]
        no_result: bool,

        #[command(flatten)]
        headers: HeaderArgs,
    },

    /// POST a multipart form
    Multipart {
        /// Target URL
        url: String,

        /// Text field as NAME=VALUE (repeatable)
        #[arg(short = 'F', long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,

        /// File part as NAME=PATH, read into memory before sending (repeatable)
        #[arg(long = "file", value_parser = parse_key_path)]
        files: Vec<(String, PathBuf)>,

        /// Discard the response instead of printing it
        #[arg(long)]
        no_result: bool,

        #[command(flatten)]
        headers: HeaderArgs,
    },
}

/// Optional request headers shared by every request kind.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct HeaderArgs {
    /// Accept header
    #[arg(long)]
    pub accept: Option<String>,

    /// Content-Type header
    #[arg(long)]
    pub content_type: Option<String>,

    /// Do not append a terminating nul byte to response buffers
    #[arg(long)]
    pub no_null_terminate: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

fn parse_key_path(raw: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = parse_key_value(raw)?;
    if path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{raw}'"));
    }
    Ok((name, PathBuf::from(path)))
}
