//! CLI entry point for the tick-transfer tool.

use std::fs;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tick_transfer::{
    FormPart, RequestOptions, ResultCallback, TransferConfig, TransferHandle, TransferManager,
    TransferResult,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod exit_handler;

use app_config::FileConfig;
use cli::{Args, Command, HeaderArgs};

const DEFAULT_TICK_MS: u64 = 50;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Failure,
    Partial,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

/// One finished transfer, as printed.
#[derive(Debug, Serialize)]
struct Outcome {
    handle: u64,
    url: String,
    code: i32,
    error: String,
    status: u16,
    bytes: usize,
    body: String,
}

impl Outcome {
    fn from_result(url: &str, result: &TransferResult<'_>) -> Self {
        let body = result.body();
        Self {
            handle: result.handle.get(),
            url: url.to_string(),
            code: result.error.code(),
            error: result.error.description().to_string(),
            status: result.response_code,
            bytes: body.len(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
        } else if self.code == 0 {
            println!(
                "[{}] {} HTTP {} ({} bytes)\n{}",
                self.handle, self.url, self.status, self.bytes, self.body
            );
        } else {
            println!(
                "[{}] {} failed: {} (code {})",
                self.handle, self.url, self.error, self.code
            );
        }
        Ok(())
    }
}

fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file resolved");
    }
    let file_config = loaded.config.unwrap_or_default();

    let config = build_transfer_config(&args, &file_config)?;
    let tick = Duration::from_millis(args.tick_ms.or(file_config.tick_ms).unwrap_or(DEFAULT_TICK_MS));

    let mut manager = TransferManager::with_config(config)?;
    manager.init()?;

    let (sender, receiver) = mpsc::channel::<Outcome>();
    let mut failed = submit_command(&mut manager, &args.command, &sender)?;
    drop(sender);

    let deadline = Instant::now() + Duration::from_secs(args.deadline_secs);
    let mut completed = 0;
    let mut report_outcomes = |receiver: &mpsc::Receiver<Outcome>| -> Result<()> {
        for outcome in receiver.try_iter() {
            if outcome.code == 0 {
                completed += 1;
            } else {
                failed += 1;
            }
            outcome.print(args.json)?;
        }
        Ok(())
    };

    // server main loop
    while manager.active_transfers() > 0 {
        if Instant::now() >= deadline {
            warn!(
                active = manager.active_transfers(),
                deadline_secs = args.deadline_secs,
                "deadline reached, shutting down"
            );
            break;
        }
        let tick_started = Instant::now();
        manager.run_pending();
        report_outcomes(&receiver)?;
        thread::sleep(tick.saturating_sub(tick_started.elapsed()));
    }

    let unfinished = manager.active_transfers();
    if let Some(report) = manager.shutdown() {
        debug!(?report, "drain finished");
    }
    report_outcomes(&receiver)?;
    failed += unfinished;

    info!(completed, failed, "transfers finished");
    let outcome = exit_handler::determine_exit_outcome(completed, failed);
    Ok(ExitCode::from(outcome.code()))
}

/// Layers the config file and then CLI flags over the library defaults.
fn build_transfer_config(args: &Args, file: &FileConfig) -> Result<TransferConfig> {
    let mut config = TransferConfig::default();

    if let Some(total) = args.max_connections {
        config.max_total_connections = usize::try_from(total)?;
    } else if let Some(total) = file.max_connections {
        config.max_total_connections = total;
    }
    if let Some(host) = args.max_host_connections {
        config.max_host_connections = usize::try_from(host)?;
    } else if let Some(host) = file.max_host_connections {
        config.max_host_connections = host;
    }
    if let Some(secs) = file.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.drain_budget_secs {
        config.drain_budget = Duration::from_secs(secs);
    }
    if let Some(rate) = args.upload_rate.or(file.upload_rate) {
        config.upload_rate_limit = rate;
    }
    if let Some(rate) = args.download_rate.or(file.download_rate) {
        config.download_rate_limit = rate;
    }
    if let Some(user_agent) = &file.user_agent {
        config.user_agent.clone_from(user_agent);
    }

    config.validate().context("Invalid transfer configuration")?;
    Ok(config)
}

fn request_options(headers: &HeaderArgs) -> RequestOptions {
    RequestOptions {
        accept: headers.accept.clone(),
        content_type: headers.content_type.clone(),
        null_terminate: !headers.no_null_terminate,
    }
}

fn reporting_callback(url: &str, sender: &mpsc::Sender<Outcome>) -> ResultCallback {
    let url = url.to_string();
    let sender = sender.clone();
    Box::new(move |result| {
        // the receiver only goes away after the manager shut down
        let _ = sender.send(Outcome::from_result(&url, result));
    })
}

/// Queues every request the command describes. Returns how many submissions
/// were refused.
fn submit_command(
    manager: &mut TransferManager,
    command: &Command,
    sender: &mpsc::Sender<Outcome>,
) -> Result<usize> {
    let mut refused = 0;
    let mut record = |url: &str, submitted: Result<TransferHandle, tick_transfer::SubmitError>| {
        match submitted {
            Ok(handle) => debug!(handle = %handle, url, "request submitted"),
            Err(error) => {
                warn!(url, error = %error, "request refused");
                refused += 1;
            }
        }
    };

    match command {
        Command::Get { urls, headers } => {
            let options = request_options(headers);
            for url in urls {
                let submitted = manager.submit_get(url, reporting_callback(url, sender), &options);
                record(url, submitted);
            }
        }
        Command::Post {
            url,
            data,
            no_result,
            headers,
        } => {
            let callback = (!no_result).then(|| reporting_callback(url, sender));
            let submitted = manager.submit_post(
                url,
                data.clone().into_bytes(),
                callback,
                &request_options(headers),
            );
            record(url, submitted);
        }
        Command::Multipart {
            url,
            fields,
            files,
            no_result,
            headers,
        } => {
            let mut parts: Vec<FormPart> = fields
                .iter()
                .map(|(name, value)| FormPart::field(name.clone(), value.clone().into_bytes()))
                .collect();
            for (name, path) in files {
                let data = fs::read(path)
                    .with_context(|| format!("Failed to read form file '{}'", path.display()))?;
                let filename = path
                    .file_name()
                    .map_or_else(|| name.clone(), |file_name| file_name.to_string_lossy().into_owned());
                parts.push(FormPart::file(name.clone(), filename, data));
            }

            let callback = (!no_result).then(|| reporting_callback(url, sender));
            let submitted =
                manager.submit_multipart_post(url, parts, callback, &request_options(headers));
            record(url, submitted);
        }
    }

    Ok(refused)
}
