//! Constants for the transfer module (connection caps, timeouts, rate limits).

use std::time::Duration;

/// Max active connections across all transfers; the rest stay queued until a slot frees up.
pub const MAX_PARALLEL_CONNECTIONS: usize = 5;

/// Max active connections to a single host so we don't hammer it.
pub const MAX_HOST_CONNECTIONS: usize = 2;

/// Timeout for the connection phase alone (there is no total transfer timeout).
pub const CONNECT_TIMEOUT_SECS: u64 = 60;

/// Upload rate limit in bytes/second.
pub const UPLOAD_RATE_LIMIT: u64 = 1_000_000;

/// Download rate limit in bytes/second.
pub const DOWNLOAD_RATE_LIMIT: u64 = 1_000_000;

/// Maximum number of redirects followed before the transfer fails.
pub const MAX_REDIRECTS: usize = 30;

/// Longest single wait for engine activity while draining at shutdown.
pub const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// Wall-clock budget for the whole shutdown drain.
pub const DRAIN_BUDGET: Duration = Duration::from_secs(10);

/// Upload bodies are paced in chunks of this size.
pub(crate) const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;
