//! Error types for the transfer module.
//!
//! Two families of failures exist. [`SubmitError`] is returned synchronously by
//! the submission calls: no handle is produced and no callback will ever fire.
//! [`TransferError`] describes a transfer that started and failed; it is only
//! ever seen through the result callback, flattened into an
//! [`ErrorInfo`](super::ErrorInfo).

use std::error::Error as _;
use std::fmt;

use thiserror::Error;

use super::handle::TransferHandle;

/// Transport-level result codes reported to callbacks.
///
/// The numeric values are stable and are what [`ErrorInfo::code`](super::ErrorInfo::code)
/// returns; zero always means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TransferCode {
    /// The transfer completed.
    Ok = 0,
    /// The URL scheme is not supported by the engine.
    UnsupportedProtocol = 1,
    /// The URL could not be turned into a request.
    UrlMalformed = 3,
    /// DNS lookup failed.
    CouldntResolveHost = 6,
    /// The connection could not be established.
    CouldntConnect = 7,
    /// A timeout fired (connect phase).
    OperationTimedOut = 28,
    /// The transfer was aborted because the manager is shutting down.
    AbortedByCallback = 42,
    /// The redirect limit was exceeded.
    TooManyRedirects = 47,
    /// Sending the request failed.
    SendError = 55,
    /// Receiving the response failed.
    RecvError = 56,
    /// The response body could not be decoded.
    BadContentEncoding = 61,
}

impl TransferCode {
    /// Returns the stable numeric value of this code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns a short human-readable description of this code.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "No error",
            Self::UnsupportedProtocol => "Unsupported protocol",
            Self::UrlMalformed => "URL using bad/illegal format or missing URL",
            Self::CouldntResolveHost => "Couldn't resolve host name",
            Self::CouldntConnect => "Couldn't connect to server",
            Self::OperationTimedOut => "Timeout was reached",
            Self::AbortedByCallback => "Operation was aborted by an application callback",
            Self::TooManyRedirects => "Number of redirects hit maximum amount",
            Self::SendError => "Failed sending data to the peer",
            Self::RecvError => "Failure when receiving data from the peer",
            Self::BadContentEncoding => "Unrecognized or bad HTTP Content or Transfer-Encoding",
        }
    }

    /// Maps a reqwest error onto the closest transport code.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_builder() {
            if chain_mentions(error, "scheme") {
                Self::UnsupportedProtocol
            } else {
                Self::UrlMalformed
            }
        } else if error.is_redirect() {
            Self::TooManyRedirects
        } else if error.is_timeout() {
            Self::OperationTimedOut
        } else if error.is_connect() {
            if chain_mentions(error, "dns") {
                Self::CouldntResolveHost
            } else {
                Self::CouldntConnect
            }
        } else if error.is_decode() {
            Self::BadContentEncoding
        } else if error.is_request() {
            Self::SendError
        } else {
            Self::RecvError
        }
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Walks the source chain looking for a keyword; reqwest only exposes coarse kinds.
fn chain_mentions(error: &reqwest::Error, needle: &str) -> bool {
    if error.to_string().to_lowercase().contains(needle) {
        return true;
    }
    let mut source = error.source();
    while let Some(inner) = source {
        if inner.to_string().to_lowercase().contains(needle) {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Failure of a transfer that was accepted and started.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The engine reported a transport or protocol failure.
    #[error("{code} ({url}): {source}")]
    Transport {
        /// The mapped transport code.
        code: TransferCode,
        /// The URL being transferred.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The shutdown abort flag was raised while the transfer was in flight.
    #[error("{} ({url})", TransferCode::AbortedByCallback)]
    Aborted {
        /// The URL being transferred.
        url: String,
    },

    /// Connection slots were closed while the transfer was queued.
    #[error("connection slots closed while {url} was queued")]
    SlotsClosed {
        /// The URL being transferred.
        url: String,
    },
}

impl TransferError {
    /// Creates a transport error from a reqwest error.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            code: TransferCode::from_reqwest(&source),
            url: url.into(),
            source,
        }
    }

    /// Creates an abort error.
    pub fn aborted(url: impl Into<String>) -> Self {
        Self::Aborted { url: url.into() }
    }

    /// Creates a closed-slots error.
    pub fn slots_closed(url: impl Into<String>) -> Self {
        Self::SlotsClosed { url: url.into() }
    }

    /// Returns the transport code reported to callbacks for this failure.
    #[must_use]
    pub fn code(&self) -> TransferCode {
        match self {
            Self::Transport { code, .. } => *code,
            Self::Aborted { .. } => TransferCode::AbortedByCallback,
            Self::SlotsClosed { .. } => TransferCode::CouldntConnect,
        }
    }
}

/// Reasons the engine refuses to take a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachError {
    /// The manager is draining for shutdown and accepts no new transfers.
    #[error("engine is draining for shutdown")]
    Draining,

    /// A transfer with this handle is already attached.
    #[error("transfer is already attached")]
    AlreadyAttached,
}

/// Synchronous submission failures. No handle is produced and no callback fires.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// `init` was never called, failed, or `shutdown` already ran.
    #[error("transfer manager is not initialized")]
    NotInitialized,

    /// GET requests must have somebody interested in the result.
    #[error("GET request to {url} requires a result callback")]
    MissingCallback {
        /// The requested URL.
        url: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
        /// The parse failure.
        #[source]
        source: url::ParseError,
    },

    /// A header override contains characters not allowed in HTTP headers.
    #[error("invalid {header} header value for {url}")]
    InvalidHeader {
        /// The requested URL.
        url: String,
        /// Which header was rejected.
        header: &'static str,
    },

    /// The engine refused to attach the transfer.
    #[error("failed to attach transfer handle {handle}: {reason}")]
    Attach {
        /// The handle allocated for the rejected transfer.
        handle: TransferHandle,
        /// Why the engine refused it.
        reason: AttachError,
    },
}

impl SubmitError {
    /// Creates a missing-callback error.
    pub fn missing_callback(url: impl Into<String>) -> Self {
        Self::MissingCallback { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(url: impl Into<String>, header: &'static str) -> Self {
        Self::InvalidHeader {
            url: url.into(),
            header,
        }
    }

    /// Creates an attach error.
    pub fn attach(handle: TransferHandle, reason: AttachError) -> Self {
        Self::Attach { handle, reason }
    }
}

/// Failures bringing the engine up. The manager stays uninitialized and every
/// submission fails fast until a later `init` succeeds.
#[derive(Debug, Error)]
pub enum InitError {
    /// The multiplexing runtime could not be created.
    #[error("failed to create transfer runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
