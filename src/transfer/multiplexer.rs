//! The multiplexer: engine plus the transfers attached to it.
//!
//! Steady state is [`Multiplexer::run_pending`], one non-blocking step per
//! server tick. [`Multiplexer::drain`] is the shutdown path: raise the abort
//! flag, wait in bounded slices for every transfer to report in, and destroy
//! them without calling back.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use super::config::TransferConfig;
use super::engine::{EngineEvent, TransferEngine};
use super::error::{AttachError, InitError, TransferError};
use super::handle::TransferHandle;
use super::registry::TransferRegistry;
use super::result::ErrorInfo;
use super::transfer::Transfer;

/// Summary of a shutdown drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Transfers that reported in after the abort and were destroyed.
    pub cancelled: usize,
    /// Transfers still outstanding when the drain gave up; force-cancelled.
    pub abandoned: usize,
    /// Whether the wall-clock budget ran out.
    pub timed_out: bool,
    /// Time spent draining.
    pub elapsed: Duration,
}

#[derive(Debug)]
pub(crate) struct Multiplexer {
    engine: TransferEngine,
    registry: TransferRegistry,
    drain_wait: Duration,
    drain_budget: Duration,
}

impl Multiplexer {
    pub(crate) fn new(config: &TransferConfig) -> Result<Self, InitError> {
        Ok(Self {
            engine: TransferEngine::new(config)?,
            registry: TransferRegistry::new(),
            drain_wait: config.drain_wait,
            drain_budget: config.drain_budget,
        })
    }

    /// Number of transfers attached and not yet completed.
    pub(crate) fn active(&self) -> usize {
        self.registry.len()
    }

    /// Hands a configured transfer to the engine and takes ownership of it.
    ///
    /// On failure the transfer is dropped here, releasing everything it owned.
    pub(crate) fn attach(&mut self, mut transfer: Transfer) -> Result<TransferHandle, AttachError> {
        let handle = transfer.handle();
        if transfer.is_attached() || self.registry.contains(handle) {
            return Err(AttachError::AlreadyAttached);
        }
        self.engine.attach(transfer.job())?;
        transfer.mark_attached();
        self.registry.insert(transfer);
        Ok(handle)
    }

    /// Performs one multiplex step and dispatches everything it produced.
    /// Returns the number of transfers that completed.
    pub(crate) fn run_pending(&mut self) -> usize {
        if self.registry.is_empty() {
            return 0;
        }

        self.engine.perform();

        let mut completed = 0;
        while let Some(event) = self.engine.try_next_event() {
            match event {
                EngineEvent::Data { handle, chunk } => match self.registry.get_mut(handle) {
                    Some(transfer) => transfer.append_response(&chunk),
                    None => error!(handle = %handle, "engine delivered data for an unknown transfer"),
                },
                EngineEvent::Done {
                    handle,
                    response_code,
                    result,
                    elapsed,
                } => {
                    if self.complete(handle, response_code, &result, elapsed) {
                        completed += 1;
                    }
                }
            }
        }
        completed
    }

    /// Calls back, detaches, logs and destroys a finished transfer.
    fn complete(
        &mut self,
        handle: TransferHandle,
        response_code: u16,
        result: &Result<(), TransferError>,
        elapsed: Duration,
    ) -> bool {
        let Some(mut transfer) = self.registry.remove(handle) else {
            error!(handle = %handle, "engine reported completion for an unknown transfer");
            return false;
        };

        let error_info = ErrorInfo::from_result(result);
        transfer.invoke_callback(&error_info, response_code);
        self.detach(&mut transfer);

        let seconds = elapsed.as_secs_f64();
        if error_info.is_ok() {
            info!(
                handle = %handle,
                method = %transfer.method(),
                url = %transfer.url(),
                response_code,
                "transfer handle {handle} completed in {seconds:.3} seconds"
            );
        } else {
            warn!(
                handle = %handle,
                method = %transfer.method(),
                url = %transfer.url(),
                code = error_info.code(),
                error = error_info.description(),
                "transfer handle {handle} failed after {seconds:.3} seconds"
            );
        }
        // dropping the transfer invalidates anything handed to the callback
        true
    }

    fn detach(&mut self, transfer: &mut Transfer) {
        if !self.engine.detach(transfer.handle()) {
            debug!(handle = %transfer.handle(), "transfer was not attached to the engine");
        }
        transfer.mark_detached();
    }

    /// Aborts everything in flight and tears the engine down.
    ///
    /// Completions seen while draining are destroyed without invoking their
    /// callbacks. Gives up after the drain budget; whatever is left is
    /// cancelled with the runtime.
    #[instrument(level = "debug", skip(self), fields(active = self.registry.len()))]
    pub(crate) fn drain(mut self) -> DrainReport {
        self.engine.raise_abort();

        let started = Instant::now();
        let mut report = DrainReport::default();

        while !self.registry.is_empty() {
            self.engine.perform();

            if let Some(event) = self.engine.wait_event(self.drain_wait) {
                report.cancelled += usize::from(self.cancel(event));
            }
            while let Some(event) = self.engine.try_next_event() {
                report.cancelled += usize::from(self.cancel(event));
            }

            if started.elapsed() > self.drain_budget {
                warn!(
                    remaining = self.registry.len(),
                    attached = self.engine.attached(),
                    budget_secs = self.drain_budget.as_secs(),
                    "transfer cleanup took too long, giving up"
                );
                report.timed_out = true;
                break;
            }
        }

        for mut transfer in self.registry.drain() {
            transfer.mark_detached();
            report.abandoned += 1;
            debug!(handle = %transfer.handle(), "transfer abandoned at shutdown");
        }

        let still_attached = self.engine.shutdown();
        if still_attached > 0 {
            debug!(still_attached, "engine torn down with transfers still attached");
        }

        report.elapsed = started.elapsed();
        report
    }

    /// Destroys a transfer that reported in while draining. Never calls back.
    fn cancel(&mut self, event: EngineEvent) -> bool {
        let EngineEvent::Done { handle, .. } = event else {
            return false;
        };
        let Some(mut transfer) = self.registry.remove(handle) else {
            error!(handle = %handle, "engine reported completion for an unknown transfer");
            return false;
        };
        self.detach(&mut transfer);
        info!(handle = %handle, url = %transfer.url(), "transfer handle {handle} cancelled");
        true
    }
}
