//! Result delivery: what a completion callback receives.

use std::ffi::CStr;

use super::error::{TransferCode, TransferError};
use super::handle::TransferHandle;

/// Completion callback. Boxed `FnOnce`, so it can fire at most once.
///
/// Any context the caller needs is captured by the closure. Everything the
/// callback receives is borrowed for the duration of the call only.
pub type ResultCallback = Box<dyn FnOnce(&TransferResult<'_>) + Send>;

/// Transport-level outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    code: TransferCode,
    description: String,
}

impl ErrorInfo {
    /// Outcome of a transfer that completed at the transport level.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: TransferCode::Ok,
            description: TransferCode::Ok.description().to_string(),
        }
    }

    /// Builds the outcome reported for a finished transfer.
    #[must_use]
    pub fn from_result(result: &Result<(), TransferError>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(error) => Self {
                code: error.code(),
                description: error.to_string(),
            },
        }
    }

    /// Returns the numeric result code (zero means success).
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code.as_i32()
    }

    /// Returns the typed result code.
    #[must_use]
    pub fn transfer_code(&self) -> TransferCode {
        self.code
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true if the transfer completed at the transport level.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == TransferCode::Ok
    }
}

/// Response bytes handed to a callback.
///
/// When null termination was requested the terminator sits right after the
/// logical payload, so [`as_c_str`](Self::as_c_str) and
/// [`bytes_with_nul`](Self::bytes_with_nul) work without copying.
#[derive(Debug, Clone, Copy)]
pub struct ResponsePayload<'a> {
    data: &'a [u8],
    null_terminated: bool,
}

impl<'a> ResponsePayload<'a> {
    pub(crate) fn new(data: &'a [u8], null_terminated: bool) -> Self {
        Self {
            data,
            null_terminated,
        }
    }

    /// Returns the payload without any terminator.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        match self.data.split_last() {
            Some((_, body)) if self.null_terminated => body,
            _ => self.data,
        }
    }

    /// Returns the payload length without the terminator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Returns true if the payload holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a terminator follows the payload.
    #[must_use]
    pub fn is_null_terminated(&self) -> bool {
        self.null_terminated
    }

    /// Returns the payload followed by its terminator, if one was requested.
    #[must_use]
    pub fn bytes_with_nul(&self) -> Option<&'a [u8]> {
        self.null_terminated.then_some(self.data)
    }

    /// Returns the payload as a C string, stopping at the first interior nul.
    #[must_use]
    pub fn as_c_str(&self) -> Option<&'a CStr> {
        self.bytes_with_nul()
            .and_then(|data| CStr::from_bytes_until_nul(data).ok())
    }

    /// Returns the payload as UTF-8 text, if it is valid.
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.bytes()).ok()
    }
}

/// Everything a callback learns about a finished transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferResult<'a> {
    /// Handle returned at submission.
    pub handle: TransferHandle,
    /// Transport outcome; valid only during the call.
    pub error: &'a ErrorInfo,
    /// Protocol response code (HTTP status), or 0 if no response was received.
    pub response_code: u16,
    /// Response bytes, or `None` if nothing was received or nobody buffered them.
    pub payload: Option<ResponsePayload<'a>>,
}

impl TransferResult<'_> {
    /// Returns the payload bytes, or an empty slice when there are none.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.payload.map_or(&[][..], |payload| payload.bytes())
    }
}
