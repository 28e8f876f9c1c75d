//! Non-blocking HTTP transfers driven from a server main loop.
//!
//! A [`TransferManager`] accepts GET, POST and multipart POST requests,
//! runs them concurrently under fixed connection caps, and hands each
//! completion to its callback on the caller's thread during
//! [`TransferManager::run_pending`].
//!
//! # Features
//!
//! - At most 5 connections in total and 2 per host
//! - Upload and download pacing at 1 MB/s per transfer
//! - Optional null-terminated response buffers for C-string consumers
//! - Bounded shutdown that never invokes callbacks of aborted transfers
//!
//! Transfers run as tasks on a current-thread tokio runtime owned by the
//! manager; the runtime only makes progress while the manager is polled.

pub mod constants;
mod config;
mod engine;
mod error;
mod handle;
mod manager;
mod multiplexer;
mod registry;
mod request;
mod result;
mod throttle;
#[allow(clippy::module_inception)]
mod transfer;
mod vm;

pub use config::{ConfigError, TransferConfig};
pub use constants::{MAX_HOST_CONNECTIONS, MAX_PARALLEL_CONNECTIONS};
pub use error::{AttachError, InitError, SubmitError, TransferCode, TransferError};
pub use handle::TransferHandle;
pub use manager::TransferManager;
pub use multiplexer::DrainReport;
pub use request::{FormPart, Method, PartSource, RequestBody, RequestOptions, TransferRequest};
pub use result::{ErrorInfo, ResponsePayload, ResultCallback, TransferResult};
pub use vm::{VmResultSink, VmTransferBridge};
