//! Transfer engine: non-blocking HTTP over a runtime stepped by the caller.
//!
//! The engine owns a current-thread Tokio runtime that only makes progress
//! when the manager drives it, so no transfer work happens outside
//! `run_pending` (or the shutdown drain). Each attached transfer runs as one
//! spawned task that reports back through an event channel, keyed by handle.
//!
//! # Concurrency Model
//!
//! - At most `max_total_connections` transfers hold a connection at once; the
//!   rest wait dormant on a semaphore and start as slots free up
//! - At most `max_host_connections` transfers talk to the same host
//! - Upload and download are paced per transfer by [`RateThrottle`]
//! - Every task watches the shared abort flag and fails fast once it is raised

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, redirect};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};
use url::Url;

use super::config::TransferConfig;
use super::error::{AttachError, InitError, TransferError};
use super::handle::TransferHandle;
use super::throttle::{RateThrottle, throttled_body};

/// Content type curl-style clients send with a flat POST body unless overridden.
const DEFAULT_POST_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Owned request payload handed to a transfer task.
#[derive(Debug, Clone)]
pub(crate) enum JobPayload {
    Empty,
    Bytes(Bytes),
    Form(Vec<FormEntry>),
}

/// One sendable multipart form part.
#[derive(Debug, Clone)]
pub(crate) struct FormEntry {
    pub(crate) name: String,
    /// Present for file uploads.
    pub(crate) filename: Option<String>,
    pub(crate) data: Bytes,
}

/// Everything a task needs to run one transfer.
#[derive(Debug)]
pub(crate) struct TransferJob {
    pub(crate) handle: TransferHandle,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) payload: JobPayload,
    /// Whether response bytes should be reported back at all.
    pub(crate) collect_response: bool,
}

/// Notifications from transfer tasks, delivered in the order they happened.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    /// A chunk of response body arrived.
    Data {
        handle: TransferHandle,
        chunk: Bytes,
    },
    /// The transfer finished, successfully or not. Always the last event for a handle.
    Done {
        handle: TransferHandle,
        /// HTTP status, or 0 if no response was received.
        response_code: u16,
        result: Result<(), TransferError>,
        /// Total time spent on the transfer, queueing included.
        elapsed: Duration,
    },
}

/// Per-host and total connection caps.
#[derive(Debug)]
pub(crate) struct ConnectionSlots {
    total: Arc<Semaphore>,
    host_limit: usize,
    /// Uses Arc so the `DashMap` shard lock is released before awaiting a permit.
    per_host: DashMap<String, Arc<Semaphore>>,
}

/// Permits held for the lifetime of one transfer's connection.
#[derive(Debug)]
pub(crate) struct SlotGuard {
    _host: HostSlot,
    _total: OwnedSemaphorePermit,
}

/// A held per-host permit. Releasing it forgets the host once nobody else
/// holds or waits on its semaphore, so the map only tracks hosts in use.
#[derive(Debug)]
struct HostSlot {
    slots: Arc<ConnectionSlots>,
    key: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for HostSlot {
    fn drop(&mut self) {
        drop(self.permit.take());
        // holders and waiters each keep a clone of the semaphore
        self.slots
            .per_host
            .remove_if(&self.key, |_, host| Arc::strong_count(host) == 1);
    }
}

impl ConnectionSlots {
    pub(crate) fn new(total_limit: usize, host_limit: usize) -> Self {
        Self {
            total: Arc::new(Semaphore::new(total_limit)),
            host_limit,
            per_host: DashMap::new(),
        }
    }

    /// Waits for a free slot on `host` and then for a free global slot.
    ///
    /// The host permit is taken first so one busy host cannot park transfers
    /// on global slots they are not allowed to use yet.
    pub(crate) async fn acquire(self: &Arc<Self>, url: &Url) -> Result<SlotGuard, TransferError> {
        let key = host_key(url);
        let host = Arc::clone(
            self.per_host
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.host_limit)))
                .value(),
        );

        let permit = host
            .acquire_owned()
            .await
            .map_err(|_| TransferError::slots_closed(url.as_str()))?;
        let host = HostSlot {
            slots: Arc::clone(self),
            key,
            permit: Some(permit),
        };
        let total = Arc::clone(&self.total)
            .acquire_owned()
            .await
            .map_err(|_| TransferError::slots_closed(url.as_str()))?;
        Ok(SlotGuard {
            _host: host,
            _total: total,
        })
    }

    /// Number of hosts with a connection held or awaited.
    #[cfg(test)]
    pub(crate) fn tracked_hosts(&self) -> usize {
        self.per_host.len()
    }
}

/// Connection caps apply per scheme-independent host and port.
fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

/// Shared state cloned into every transfer task.
#[derive(Debug, Clone)]
struct TaskContext {
    client: Client,
    slots: Arc<ConnectionSlots>,
    events: mpsc::UnboundedSender<EngineEvent>,
    upload_rate: u64,
    download_rate: u64,
}

/// The multiplexing engine behind the manager.
#[derive(Debug)]
pub(crate) struct TransferEngine {
    runtime: Runtime,
    context: TaskContext,
    abort: watch::Sender<bool>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    tasks: HashMap<TransferHandle, AbortHandle>,
}

impl TransferEngine {
    /// Builds the runtime and HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if either the runtime or the client cannot be created.
    #[instrument(level = "debug", skip_all)]
    pub(crate) fn new(config: &TransferConfig) -> Result<Self, InitError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("tick-transfer")
            .build()
            .map_err(InitError::Runtime)?;

        let client = {
            let _guard = runtime.enter();
            Client::builder()
                .user_agent(config.user_agent.as_str())
                .connect_timeout(config.connect_timeout)
                .redirect(redirect::Policy::limited(config.max_redirects))
                .build()
                .map_err(InitError::Client)?
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (abort, _) = watch::channel(false);

        debug!(
            max_total_connections = config.max_total_connections,
            max_host_connections = config.max_host_connections,
            connect_timeout_secs = config.connect_timeout.as_secs(),
            "transfer engine created"
        );

        Ok(Self {
            runtime,
            context: TaskContext {
                client,
                slots: Arc::new(ConnectionSlots::new(
                    config.max_total_connections,
                    config.max_host_connections,
                )),
                events: events_tx,
                upload_rate: config.upload_rate_limit,
                download_rate: config.download_rate_limit,
            },
            abort,
            events: events_rx,
            tasks: HashMap::new(),
        })
    }

    /// Queues a transfer. It starts moving on the next [`perform`](Self::perform).
    pub(crate) fn attach(&mut self, job: TransferJob) -> Result<(), AttachError> {
        if *self.abort.borrow() {
            return Err(AttachError::Draining);
        }
        if self.tasks.contains_key(&job.handle) {
            return Err(AttachError::AlreadyAttached);
        }

        let handle = job.handle;
        let task = self.runtime.spawn(run_transfer(
            self.context.clone(),
            self.abort.subscribe(),
            job,
        ));
        self.tasks.insert(handle, task.abort_handle());
        trace!(handle = %handle, "transfer attached");
        Ok(())
    }

    /// Removes a transfer from the engine, cancelling its task if still running.
    /// Returns false if the handle was not attached.
    pub(crate) fn detach(&mut self, handle: TransferHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Number of attached transfers.
    pub(crate) fn attached(&self) -> usize {
        self.tasks.len()
    }

    /// One non-blocking multiplex step: runs every task that is ready, polls
    /// sockets and timers once without waiting, and returns.
    pub(crate) fn perform(&self) {
        self.runtime.block_on(tokio::task::yield_now());
    }

    /// Drives the engine until an event arrives or `timeout` elapses.
    pub(crate) fn wait_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        let events = &mut self.events;
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, events.recv()).await })
            .ok()
            .flatten()
    }

    /// Pops the next pending event without driving the engine.
    pub(crate) fn try_next_event(&mut self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    /// Queues an event as if a task had reported it.
    #[cfg(test)]
    pub(crate) fn push_event(&self, event: EngineEvent) {
        let _ = self.context.events.send(event);
    }

    /// Raises the abort flag: every running or queued transfer fails on its
    /// next progress check, and new attaches are refused.
    pub(crate) fn raise_abort(&self) {
        self.abort.send_replace(true);
    }

    /// Tears the runtime down, cancelling whatever is still attached.
    /// Returns how many transfers were still attached.
    pub(crate) fn shutdown(self) -> usize {
        let remaining = self.tasks.len();
        self.runtime.shutdown_background();
        remaining
    }
}

async fn run_transfer(ctx: TaskContext, mut abort: watch::Receiver<bool>, job: TransferJob) {
    let started = Instant::now();
    let handle = job.handle;
    let url = job.url.to_string();

    let (response_code, result) = tokio::select! {
        biased;
        () = wait_for_abort(&mut abort) => (0, Err(TransferError::aborted(url))),
        outcome = execute(&ctx, job) => outcome,
    };

    // receiver is gone only if the engine was torn down
    let _ = ctx.events.send(EngineEvent::Done {
        handle,
        response_code,
        result,
        elapsed: started.elapsed(),
    });
}

async fn wait_for_abort(abort: &mut watch::Receiver<bool>) {
    // a dropped sender means the engine is gone, which counts as an abort too
    let _ = abort.wait_for(|aborted| *aborted).await;
}

async fn execute(ctx: &TaskContext, job: TransferJob) -> (u16, Result<(), TransferError>) {
    let _slots = match ctx.slots.acquire(&job.url).await {
        Ok(slots) => slots,
        Err(error) => return (0, Err(error)),
    };

    let handle = job.handle;
    let collect_response = job.collect_response;
    let url = job.url.to_string();

    let mut response = match build_request(ctx, job).send().await {
        Ok(response) => response,
        Err(error) => return (0, Err(TransferError::transport(url, error))),
    };
    let response_code = response.status().as_u16();
    trace!(handle = %handle, response_code, "response headers received");

    let mut throttle = RateThrottle::new(ctx.download_rate);
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let len = chunk.len();
                if collect_response {
                    let _ = ctx.events.send(EngineEvent::Data { handle, chunk });
                }
                throttle.consume(len).await;
            }
            Ok(None) => return (response_code, Ok(())),
            Err(error) => return (response_code, Err(TransferError::transport(url, error))),
        }
    }
}

fn build_request(ctx: &TaskContext, job: TransferJob) -> RequestBuilder {
    let TransferJob {
        url,
        mut headers,
        payload,
        ..
    } = job;

    match payload {
        JobPayload::Empty => ctx.client.get(url).headers(headers),
        JobPayload::Bytes(body) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(DEFAULT_POST_CONTENT_TYPE),
                );
            }
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
            ctx.client
                .post(url)
                .headers(headers)
                .body(throttled_body(body, ctx.upload_rate))
        }
        JobPayload::Form(entries) => {
            // the form supplies its own boundary-carrying content type
            if let Some(dropped) = headers.remove(CONTENT_TYPE) {
                debug!(
                    url = %url,
                    content_type = ?dropped,
                    "multipart request ignores the content type override"
                );
            }
            ctx.client
                .post(url)
                .headers(headers)
                .multipart(build_form(entries, ctx.upload_rate))
        }
    }
}

fn build_form(entries: Vec<FormEntry>, upload_rate: u64) -> Form {
    entries.into_iter().fold(Form::new(), |form, entry| {
        let len = entry.data.len() as u64;
        let part = Part::stream_with_length(throttled_body(entry.data, upload_rate), len);
        let part = match entry.filename {
            Some(filename) => part.file_name(filename),
            None => part,
        };
        form.part(entry.name, part)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_host_key_includes_default_port() {
        assert_eq!(host_key(&url("http://example.com/a")), "example.com:80");
        assert_eq!(host_key(&url("https://example.com/a")), "example.com:443");
        assert_eq!(
            host_key(&url("http://example.com:8080/a")),
            "example.com:8080"
        );
    }

    #[tokio::test]
    async fn test_slots_cap_connections_per_host() {
        let slots = Arc::new(ConnectionSlots::new(5, 2));
        let a = url("http://a.example/");

        let _first = slots.acquire(&a).await.unwrap();
        let _second = slots.acquire(&a).await.unwrap();
        let third = tokio::time::timeout(Duration::from_millis(50), slots.acquire(&a)).await;
        assert!(third.is_err(), "third connection to the same host must wait");

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            slots.acquire(&url("http://b.example/")),
        )
        .await;
        assert!(other.is_ok(), "a different host must not wait");
    }

    #[tokio::test]
    async fn test_slots_cap_total_connections() {
        let slots = Arc::new(ConnectionSlots::new(2, 2));
        let _a = slots.acquire(&url("http://a.example/")).await.unwrap();
        let _b = slots.acquire(&url("http://b.example/")).await.unwrap();

        let c = tokio::time::timeout(
            Duration::from_millis(50),
            slots.acquire(&url("http://c.example/")),
        )
        .await;
        assert!(c.is_err(), "total cap must hold across hosts");
    }

    #[tokio::test]
    async fn test_released_slot_promotes_waiting_transfer() {
        let slots = Arc::new(ConnectionSlots::new(1, 1));
        let a = url("http://a.example/");

        let first = slots.acquire(&a).await.unwrap();
        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), slots.acquire(&a)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_idle_hosts_are_forgotten() {
        let slots = Arc::new(ConnectionSlots::new(5, 2));
        let a = url("http://a.example/");

        let first = slots.acquire(&a).await.unwrap();
        let second = slots.acquire(&a).await.unwrap();
        let other = slots.acquire(&url("http://b.example/")).await.unwrap();
        assert_eq!(slots.tracked_hosts(), 2);

        drop(first);
        assert_eq!(slots.tracked_hosts(), 2, "a.example still has a connection");
        drop(other);
        assert_eq!(slots.tracked_hosts(), 1);
        drop(second);
        assert_eq!(slots.tracked_hosts(), 0);

        let _again = slots.acquire(&a).await.unwrap();
        assert_eq!(slots.tracked_hosts(), 1);
    }

    #[tokio::test]
    async fn test_waiting_transfer_keeps_host_tracked() {
        let slots = Arc::new(ConnectionSlots::new(5, 1));
        let a = url("http://a.example/");

        let first = slots.acquire(&a).await.unwrap();
        let waiter = {
            let slots = Arc::clone(&slots);
            let a = a.clone();
            tokio::spawn(async move { slots.acquire(&a).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(slots.tracked_hosts(), 1, "a waiter still needs the semaphore");
        waiter.await.unwrap().unwrap();
        assert_eq!(slots.tracked_hosts(), 0);
    }

    #[tokio::test]
    async fn test_multipart_replaces_content_type_override() {
        let (events, _rx) = mpsc::unbounded_channel();
        let ctx = TaskContext {
            client: Client::new(),
            slots: Arc::new(ConnectionSlots::new(1, 1)),
            events,
            upload_rate: 0,
            download_rate: 0,
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let request = build_request(
            &ctx,
            TransferJob {
                handle: TransferHandle::next(),
                url: url("http://example.com/upload"),
                headers,
                payload: JobPayload::Form(vec![FormEntry {
                    name: "title".to_string(),
                    filename: None,
                    data: Bytes::from_static(b"hello"),
                }]),
                collect_response: false,
            },
        )
        .build()
        .unwrap();

        let content_types: Vec<_> = request.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(content_types.len(), 1);
        assert!(
            content_types[0]
                .to_str()
                .unwrap()
                .starts_with("multipart/form-data"),
            "got: {content_types:?}"
        );
    }

    #[test]
    fn test_attach_refused_while_draining() {
        let mut engine = TransferEngine::new(&TransferConfig::default()).unwrap();
        engine.raise_abort();

        let job = TransferJob {
            handle: TransferHandle::next(),
            url: url("http://127.0.0.1:9/"),
            headers: HeaderMap::new(),
            payload: JobPayload::Empty,
            collect_response: false,
        };
        assert_eq!(engine.attach(job), Err(AttachError::Draining));
        assert_eq!(engine.attached(), 0);
        assert_eq!(engine.shutdown(), 0);
    }

    #[test]
    fn test_attach_twice_is_refused() {
        let mut engine = TransferEngine::new(&TransferConfig::default()).unwrap();
        let handle = TransferHandle::next();
        let job = || TransferJob {
            handle,
            url: url("http://127.0.0.1:9/"),
            headers: HeaderMap::new(),
            payload: JobPayload::Empty,
            collect_response: false,
        };

        assert_eq!(engine.attach(job()), Ok(()));
        assert_eq!(engine.attach(job()), Err(AttachError::AlreadyAttached));
        assert!(engine.detach(handle));
        assert!(!engine.detach(handle));
        assert_eq!(engine.shutdown(), 0);
    }

    #[test]
    fn test_aborted_task_reports_done_with_abort_code() {
        // accepts connections at the kernel level but never answers
        let Ok(silent) = std::net::TcpListener::bind("127.0.0.1:0") else {
            eprintln!("cannot bind localhost socket; skipping");
            return;
        };
        let addr = silent.local_addr().unwrap();

        let mut engine = TransferEngine::new(&TransferConfig::default()).unwrap();
        let handle = TransferHandle::next();
        engine
            .attach(TransferJob {
                handle,
                url: url(&format!("http://{addr}/never")),
                headers: HeaderMap::new(),
                payload: JobPayload::Empty,
                collect_response: true,
            })
            .unwrap();

        engine.perform();
        engine.raise_abort();

        let event = engine.wait_event(Duration::from_secs(1));
        match event {
            Some(EngineEvent::Done {
                handle: done,
                response_code,
                result,
                ..
            }) => {
                assert_eq!(done, handle);
                assert_eq!(response_code, 0);
                assert_eq!(
                    result.unwrap_err().code(),
                    crate::transfer::TransferCode::AbortedByCallback
                );
            }
            other => panic!("expected Done event, got {other:?}"),
        }
        engine.detach(handle);
        engine.shutdown();
    }
}
