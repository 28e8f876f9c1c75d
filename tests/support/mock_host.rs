use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tick_transfer::{ResultCallback, TransferHandle, TransferManager};
use tokio::runtime::{Builder, Runtime};
use wiremock::{Mock, MockServer, Request};

use super::socket_guard::should_skip_socket_bound_test;

/// A wiremock server running on its own multi-thread runtime.
pub struct MockHost {
    // dropped before the runtime that serves it
    server: MockServer,
    runtime: Runtime,
}

impl MockHost {
    /// Starts a mock server, or returns `None` when localhost sockets are
    /// unavailable.
    #[track_caller]
    pub fn start_or_skip() -> Option<Self> {
        if should_skip_socket_bound_test() {
            return None;
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("mock runtime");
        let server = runtime.block_on(MockServer::start());
        Some(Self { server, runtime })
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn received_requests(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Runs the manager like a server main loop until nothing is active or the
/// timeout passes. Returns true if every transfer completed.
pub fn pump(manager: &mut TransferManager, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while manager.active_transfers() > 0 {
        if Instant::now() >= deadline {
            return false;
        }
        manager.run_pending();
        thread::sleep(Duration::from_millis(5));
    }
    true
}

/// What a callback observed, copied out of the borrowed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub handle: TransferHandle,
    pub code: i32,
    pub status: u16,
    pub body: Option<Vec<u8>>,
    pub body_with_nul: Option<Vec<u8>>,
}

/// Collects callback invocations.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> ResultCallback {
        let seen = Arc::clone(&self.seen);
        Box::new(move |result| {
            let payload = result.payload;
            seen.lock().expect("recorder lock").push(Seen {
                handle: result.handle,
                code: result.error.code(),
                status: result.response_code,
                body: payload.map(|p| p.bytes().to_vec()),
                body_with_nul: payload.and_then(|p| p.bytes_with_nul()).map(<[u8]>::to_vec),
            });
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("recorder lock").clone()
    }

    pub fn only(&self) -> Seen {
        let seen = self.seen();
        assert_eq!(seen.len(), 1, "expected exactly one callback, got {seen:?}");
        seen.into_iter().next().expect("one callback")
    }
}
