//! Tick Transfer Library
//!
//! Non-blocking HTTP transfers for programs built around a fixed-rate main
//! loop (game servers, simulation hosts, embedded script VMs). Requests are
//! submitted from the loop thread, progress while the loop polls, and report
//! back through callbacks invoked on that same thread.
//!
//! # Architecture
//!
//! - [`transfer`] - transfer manager, engine and request/result types
//! - [`TransferManager`] - the per-context entry point
//! - [`VmTransferBridge`] - request submission on behalf of a script VM

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod transfer;
mod user_agent;

// Re-export commonly used types
pub use transfer::{
    AttachError, ConfigError, DrainReport, ErrorInfo, FormPart, InitError, MAX_HOST_CONNECTIONS,
    MAX_PARALLEL_CONNECTIONS, Method, PartSource, RequestBody, RequestOptions, ResponsePayload,
    ResultCallback, SubmitError, TransferCode, TransferConfig, TransferError, TransferHandle,
    TransferManager, TransferRequest, TransferResult, VmResultSink, VmTransferBridge,
};
