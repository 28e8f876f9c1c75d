//! Public surface: lifecycle, per-tick polling and request submission.
//!
//! # Example
//!
//! ```no_run
//! use tick_transfer::{RequestOptions, TransferManager};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = TransferManager::new();
//! manager.init()?;
//!
//! manager.submit_get(
//!     "https://example.com/motd.txt",
//!     Box::new(|result| {
//!         if result.error.is_ok() {
//!             println!("{}: {:?}", result.response_code, result.payload.and_then(|p| p.as_str()));
//!         }
//!     }),
//!     &RequestOptions::default(),
//! )?;
//!
//! // server main loop
//! while manager.active_transfers() > 0 {
//!     manager.run_pending();
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//!
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use tracing::{debug, error, info, instrument};

use super::config::{ConfigError, TransferConfig};
use super::error::{InitError, SubmitError};
use super::handle::TransferHandle;
use super::multiplexer::{DrainReport, Multiplexer};
use super::request::{FormPart, Method, RequestBody, RequestOptions, TransferRequest};
use super::result::ResultCallback;
use super::transfer::Transfer;

/// Non-blocking HTTP transfer manager for a server main loop.
///
/// One manager is one independent transfer context. All methods are meant to
/// be called from the thread that runs the main loop, and never from inside
/// an async runtime: [`run_pending`](Self::run_pending) and
/// [`shutdown`](Self::shutdown) drive the manager's own runtime.
///
/// # Lifecycle
///
/// - [`init`](Self::init) brings the engine up (idempotent)
/// - `submit_*` queue requests and return a [`TransferHandle`] immediately
/// - [`run_pending`](Self::run_pending), once per tick, advances every
///   transfer and fires callbacks for the ones that finished
/// - [`shutdown`](Self::shutdown) aborts what is left without calling back;
///   `init` may be called again afterwards
#[derive(Debug, Default)]
pub struct TransferManager {
    config: TransferConfig,
    multiplexer: Option<Multiplexer>,
}

impl TransferManager {
    /// Creates an uninitialized manager with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an uninitialized manager with custom limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_config(config: TransferConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            multiplexer: None,
        })
    }

    /// Returns the limits this manager runs with.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Brings the engine up. Does nothing if already initialized.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the engine cannot be created; the manager then
    /// stays uninitialized and every submission fails fast.
    #[instrument(level = "debug", skip(self))]
    pub fn init(&mut self) -> Result<(), InitError> {
        if self.multiplexer.is_some() {
            return Ok(());
        }

        match Multiplexer::new(&self.config) {
            Ok(multiplexer) => {
                self.multiplexer = Some(multiplexer);
                info!(
                    user_agent = %self.config.user_agent,
                    max_total_connections = self.config.max_total_connections,
                    max_host_connections = self.config.max_host_connections,
                    "transfer manager initialized (reqwest over tokio)"
                );
                Ok(())
            }
            Err(error) => {
                error!(error = %error, "failed to initialize transfer manager");
                Err(error)
            }
        }
    }

    /// Returns true between a successful `init` and `shutdown`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.multiplexer.is_some()
    }

    /// Number of submitted transfers that have not completed yet.
    #[must_use]
    pub fn active_transfers(&self) -> usize {
        self.multiplexer.as_ref().map_or(0, Multiplexer::active)
    }

    /// Advances every transfer without blocking and fires callbacks for the
    /// ones that finished. Meant to be called once per server tick.
    ///
    /// Does nothing when uninitialized or when no transfer is active.
    /// Returns the number of transfers that completed during this call.
    pub fn run_pending(&mut self) -> usize {
        match self.multiplexer.as_mut() {
            Some(multiplexer) => multiplexer.run_pending(),
            None => 0,
        }
    }

    /// Aborts all in-flight transfers and releases the engine.
    ///
    /// Callbacks of aborted transfers never fire. Waits at most the configured
    /// drain budget. Returns `None` if the manager was not initialized.
    #[instrument(level = "debug", skip(self))]
    pub fn shutdown(&mut self) -> Option<DrainReport> {
        let multiplexer = self.multiplexer.take()?;
        let active = multiplexer.active();
        let report = multiplexer.drain();
        info!(
            active,
            cancelled = report.cancelled,
            abandoned = report.abandoned,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed.as_millis(),
            "transfer manager shut down"
        );
        Some(report)
    }

    /// Queues a request.
    ///
    /// GET requests must carry a callback; POST requests may omit it, in which
    /// case the result is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the manager is not initialized, the request
    /// is malformed, or the engine refuses it. Nothing stays allocated and no
    /// callback will fire.
    #[instrument(skip(self, request), fields(url = %request.url(), method = %request.method()))]
    pub fn submit(&mut self, request: TransferRequest) -> Result<TransferHandle, SubmitError> {
        let Some(multiplexer) = self.multiplexer.as_mut() else {
            return Err(SubmitError::NotInitialized);
        };

        let (url, body, callback, options) = request.into_parts();
        if body.method() == Method::Get && callback.is_none() {
            return Err(SubmitError::missing_callback(url));
        }

        let mut transfer = Transfer::create(&url)?;
        if let Some(callback) = callback {
            transfer.set_result_callback(callback, options.null_terminate);
        }
        transfer.configure_http(options.accept.as_deref(), options.content_type.as_deref())?;

        let kind = match body {
            RequestBody::Empty => "GET",
            RequestBody::Bytes(body) => {
                transfer.set_post_body(body);
                "POST"
            }
            RequestBody::Multipart(parts) => {
                transfer.configure_multipart(parts);
                "POST multipart"
            }
        };

        let handle = transfer.handle();
        multiplexer
            .attach(transfer)
            .map_err(|reason| SubmitError::attach(handle, reason))?;

        info!(handle = %handle, "{kind} request handle {handle} queued [{url}]");
        debug!(active = multiplexer.active(), "transfer submitted");
        Ok(handle)
    }

    /// Queues a GET request. The callback is mandatory.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub fn submit_get(
        &mut self,
        url: &str,
        callback: ResultCallback,
        options: &RequestOptions,
    ) -> Result<TransferHandle, SubmitError> {
        self.submit(
            TransferRequest::get(url)
                .with_callback(callback)
                .with_options(options.clone()),
        )
    }

    /// Queues a POST request with a flat body. Without a callback the result
    /// is discarded.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub fn submit_post(
        &mut self,
        url: &str,
        body: impl Into<Bytes>,
        callback: Option<ResultCallback>,
        options: &RequestOptions,
    ) -> Result<TransferHandle, SubmitError> {
        let request = TransferRequest::post(url, body).with_options(options.clone());
        self.submit(match callback {
            Some(callback) => request.with_callback(callback),
            None => request,
        })
    }

    /// Queues a multipart POST request. Without a callback the result is
    /// discarded. Disk-sourced parts are skipped.
    ///
    /// A `content_type` in `options` is ignored: the request always carries
    /// the `multipart/form-data` type with the form's boundary.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub fn submit_multipart_post(
        &mut self,
        url: &str,
        parts: Vec<FormPart>,
        callback: Option<ResultCallback>,
        options: &RequestOptions,
    ) -> Result<TransferHandle, SubmitError> {
        let request = TransferRequest::multipart(url, parts).with_options(options.clone());
        self.submit(match callback {
            Some(callback) => request.with_callback(callback),
            None => request,
        })
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
