//! Byte-rate pacing for uploads and downloads.
//!
//! Each transfer gets its own [`RateThrottle`] per direction. The throttle
//! tracks how many bytes went through since the first chunk and sleeps
//! whenever the transfer runs ahead of `rate` bytes per second.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use reqwest::Body;
use tokio::time::Instant;

use super::constants::UPLOAD_CHUNK_SIZE;

/// Paces a byte stream to a fixed rate.
#[derive(Debug)]
pub(crate) struct RateThrottle {
    /// Bytes per second; 0 disables pacing.
    rate: u64,
    /// Set when the first chunk goes through.
    started: Option<Instant>,
    consumed: u64,
}

impl RateThrottle {
    pub(crate) fn new(rate: u64) -> Self {
        Self {
            rate,
            started: None,
            consumed: 0,
        }
    }

    /// Records `bytes` and returns how long to wait before the next chunk.
    pub(crate) fn record(&mut self, bytes: usize) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        self.consumed = self.consumed.saturating_add(bytes as u64);

        #[allow(clippy::cast_precision_loss)]
        let target = Duration::from_secs_f64(self.consumed as f64 / self.rate as f64);
        target.saturating_sub(started.elapsed())
    }

    /// Records `bytes` and sleeps if the stream is ahead of its rate.
    pub(crate) async fn consume(&mut self, bytes: usize) {
        let delay = self.record(bytes);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wraps an upload payload in a body that is sent no faster than `rate`.
///
/// Payloads that fit in one chunk (or an unlimited rate) are sent as-is.
pub(crate) fn throttled_body(payload: Bytes, rate: u64) -> Body {
    if rate == 0 || payload.len() <= UPLOAD_CHUNK_SIZE {
        return Body::from(payload);
    }

    let chunks = stream::unfold(
        (payload, RateThrottle::new(rate)),
        |(mut rest, mut throttle)| async move {
            if rest.is_empty() {
                return None;
            }
            let chunk = rest.split_to(rest.len().min(UPLOAD_CHUNK_SIZE));
            throttle.consume(chunk.len()).await;
            Some((Ok::<Bytes, std::io::Error>(chunk), (rest, throttle)))
        },
    );
    Body::wrap_stream(chunks)
}
