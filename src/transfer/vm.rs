//! Bridge for an embedded script VM.
//!
//! Script-facing requests always null-terminate their response and route
//! every result through one [`VmResultSink`], the single notification entry
//! point the VM exposes. GET results are always delivered; POST results only
//! when the script asked for them.

use std::sync::Arc;

use bytes::Bytes;

use super::error::SubmitError;
use super::handle::TransferHandle;
use super::manager::TransferManager;
use super::request::{FormPart, RequestOptions};
use super::result::{ResultCallback, TransferResult};

/// The VM's notification entry point for finished transfers.
///
/// Called on the main-loop thread from inside
/// [`TransferManager::run_pending`]. The result borrows the transfer's
/// buffers and is only valid for the duration of the call.
pub trait VmResultSink: Send + Sync {
    /// Receives one finished transfer.
    fn transfer_result(&self, result: &TransferResult<'_>);
}

/// Submits script requests against a [`TransferManager`].
#[derive(Clone)]
pub struct VmTransferBridge {
    sink: Arc<dyn VmResultSink>,
}

impl std::fmt::Debug for VmTransferBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmTransferBridge").finish_non_exhaustive()
    }
}

impl VmTransferBridge {
    #[must_use]
    pub fn new(sink: Arc<dyn VmResultSink>) -> Self {
        Self { sink }
    }

    fn callback(&self) -> ResultCallback {
        let sink = Arc::clone(&self.sink);
        Box::new(move |result| sink.transfer_result(result))
    }

    fn options(accept: Option<&str>, content_type: Option<&str>) -> RequestOptions {
        RequestOptions {
            accept: accept.map(str::to_owned),
            content_type: content_type.map(str::to_owned),
            null_terminate: true,
        }
    }

    /// GET on behalf of a script. The result is always delivered.
    ///
    /// # Errors
    ///
    /// See [`TransferManager::submit`].
    pub fn get(
        &self,
        manager: &mut TransferManager,
        url: &str,
        accept: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<TransferHandle, SubmitError> {
        manager.submit_get(url, self.callback(), &Self::options(accept, content_type))
    }

    /// POST on behalf of a script. The result is delivered only if
    /// `receive_result` is set.
    ///
    /// # Errors
    ///
    /// See [`TransferManager::submit`].
    pub fn post(
        &self,
        manager: &mut TransferManager,
        url: &str,
        data: impl Into<Bytes>,
        accept: Option<&str>,
        content_type: Option<&str>,
        receive_result: bool,
    ) -> Result<TransferHandle, SubmitError> {
        let callback = receive_result.then(|| self.callback());
        manager.submit_post(url, data, callback, &Self::options(accept, content_type))
    }

    /// Multipart POST on behalf of a script. The result is delivered only if
    /// `receive_result` is set.
    ///
    /// # Errors
    ///
    /// See [`TransferManager::submit`].
    pub fn multipart(
        &self,
        manager: &mut TransferManager,
        url: &str,
        parts: Vec<FormPart>,
        accept: Option<&str>,
        content_type: Option<&str>,
        receive_result: bool,
    ) -> Result<TransferHandle, SubmitError> {
        let callback = receive_result.then(|| self.callback());
        manager.submit_multipart_post(url, parts, callback, &Self::options(accept, content_type))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::transfer::result::{ErrorInfo, ResponsePayload};

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(TransferHandle, u16, Option<Vec<u8>>)>>,
    }

    impl VmResultSink for RecordingSink {
        fn transfer_result(&self, result: &TransferResult<'_>) {
            self.seen.lock().unwrap().push((
                result.handle,
                result.response_code,
                result.payload.and_then(|p| p.bytes_with_nul()).map(<[u8]>::to_vec),
            ));
        }
    }

    #[test]
    fn test_callback_routes_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = VmTransferBridge::new(sink.clone());

        let handle = crate::transfer::transfer::Transfer::create("http://example.com/")
            .unwrap()
            .handle();
        let error = ErrorInfo::ok();
        let data = *b"OK\0";
        let result = TransferResult {
            handle,
            error: &error,
            response_code: 200,
            payload: Some(ResponsePayload::new(&data, true)),
        };

        (bridge.callback())(&result);

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (handle, 200, Some(b"OK\0".to_vec())));
    }

    #[test]
    fn test_options_always_null_terminate() {
        let options = VmTransferBridge::options(Some("text/plain"), None);
        assert!(options.null_terminate);
        assert_eq!(options.accept.as_deref(), Some("text/plain"));
        assert!(options.content_type.is_none());
    }

    #[test]
    fn test_submission_before_init_fails() {
        let bridge = VmTransferBridge::new(Arc::new(RecordingSink::default()));
        let mut manager = TransferManager::new();
        let result = bridge.post(&mut manager, "http://example.com/", "a=1", None, None, true);
        assert!(matches!(result, Err(SubmitError::NotInitialized)));
    }
}
