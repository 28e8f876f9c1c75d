//! A single transfer: request state, owned payloads, response sink and callback.

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use super::engine::{FormEntry, JobPayload, TransferJob};
use super::error::SubmitError;
use super::handle::TransferHandle;
use super::request::{FormPart, Method, PartSource};
use super::result::{ErrorInfo, ResponsePayload, ResultCallback, TransferResult};

/// What happens to response bytes as the engine delivers them.
#[derive(Debug)]
enum ResponseSink {
    /// Bytes are dropped; the callback (if any) sees no payload.
    Discard,
    /// Bytes accumulate in memory and are handed to the callback at completion.
    /// There is no size cap, so this is not meant for large downloads.
    Buffered { buf: Vec<u8>, null_terminate: bool },
}

/// One outstanding request.
///
/// Owned exclusively by the registry; outside code only ever sees its
/// [`TransferHandle`]. Headers, bodies and form parts are owned copies and are
/// released with the transfer whatever the outcome.
pub(crate) struct Transfer {
    handle: TransferHandle,
    url: Url,
    method: Method,
    headers: HeaderMap,
    payload: JobPayload,
    sink: ResponseSink,
    callback: Option<ResultCallback>,
    attached: bool,
}

impl Transfer {
    /// Creates a GET transfer for `url` with a fresh handle and no response handling.
    pub(crate) fn create(url: &str) -> Result<Self, SubmitError> {
        let parsed = Url::parse(url).map_err(|source| SubmitError::invalid_url(url, source))?;
        Ok(Self {
            handle: TransferHandle::next(),
            url: parsed,
            method: Method::Get,
            headers: HeaderMap::new(),
            payload: JobPayload::Empty,
            sink: ResponseSink::Discard,
            callback: None,
            attached: false,
        })
    }

    pub(crate) fn handle(&self) -> TransferHandle {
        self.handle
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn method(&self) -> Method {
        self.method
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    /// Installs the completion callback and switches to buffered response handling.
    pub(crate) fn set_result_callback(&mut self, callback: ResultCallback, null_terminate: bool) {
        self.callback = Some(callback);
        self.sink = ResponseSink::Buffered {
            buf: Vec::new(),
            null_terminate,
        };
    }

    /// Adds the optional `Accept` and `Content-Type` overrides.
    ///
    /// Redirect following and the user agent are applied by the engine's client.
    pub(crate) fn configure_http(
        &mut self,
        accept: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<(), SubmitError> {
        self.append_header(ACCEPT, "Accept", accept)?;
        self.append_header(CONTENT_TYPE, "Content-Type", content_type)
    }

    fn append_header(
        &mut self,
        name: HeaderName,
        label: &'static str,
        value: Option<&str>,
    ) -> Result<(), SubmitError> {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        let value = HeaderValue::from_str(value)
            .map_err(|_| SubmitError::invalid_header(self.url.as_str(), label))?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Turns the transfer into a POST with a flat body.
    pub(crate) fn set_post_body(&mut self, body: Bytes) {
        self.method = Method::Post;
        self.payload = JobPayload::Bytes(body);
    }

    /// Turns the transfer into a multipart POST.
    ///
    /// Disk-sourced parts are not supported and are left out of the form; the
    /// remaining parts are sent as given.
    pub(crate) fn configure_multipart(&mut self, parts: Vec<FormPart>) {
        let mut entries = Vec::with_capacity(parts.len());
        for part in parts {
            let (name, source) = part.into_parts();
            match source {
                PartSource::Field(data) => entries.push(FormEntry {
                    name,
                    filename: None,
                    data,
                }),
                PartSource::FileBuffer { filename, data } => entries.push(FormEntry {
                    name,
                    filename: Some(filename),
                    data,
                }),
                PartSource::FieldFromDisk(path) | PartSource::FileFromDisk(path) => {
                    warn!(
                        handle = %self.handle,
                        part = %name,
                        path = %path.display(),
                        "disk-sourced form parts are not supported; part skipped"
                    );
                }
            }
        }
        self.method = Method::Post;
        self.payload = JobPayload::Form(entries);
    }

    /// Snapshot of everything the engine needs to run this transfer.
    pub(crate) fn job(&self) -> TransferJob {
        TransferJob {
            handle: self.handle,
            url: self.url.clone(),
            headers: self.headers.clone(),
            payload: self.payload.clone(),
            collect_response: matches!(self.sink, ResponseSink::Buffered { .. }),
        }
    }

    pub(crate) fn mark_attached(&mut self) {
        self.attached = true;
    }

    pub(crate) fn mark_detached(&mut self) {
        self.attached = false;
    }

    /// Feeds response bytes delivered by the engine into the sink.
    pub(crate) fn append_response(&mut self, chunk: &[u8]) {
        if let ResponseSink::Buffered { buf, .. } = &mut self.sink {
            buf.extend_from_slice(chunk);
        }
    }

    /// Hands the outcome to the callback. No-op without a callback; a second
    /// call is a no-op too since the callback is consumed.
    pub(crate) fn invoke_callback(&mut self, error: &ErrorInfo, response_code: u16) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let handle = self.handle;

        match &mut self.sink {
            ResponseSink::Discard => callback(&TransferResult {
                handle,
                error,
                response_code,
                payload: None,
            }),
            ResponseSink::Buffered { buf, .. } if buf.is_empty() => callback(&TransferResult {
                handle,
                error,
                response_code,
                payload: None,
            }),
            ResponseSink::Buffered {
                buf,
                null_terminate,
            } => {
                let null_terminate = *null_terminate;
                // terminator lives only for the duration of the call
                if null_terminate {
                    buf.push(0);
                }
                callback(&TransferResult {
                    handle,
                    error,
                    response_code,
                    payload: Some(ResponsePayload::new(buf, null_terminate)),
                });
                if null_terminate {
                    buf.pop();
                }
            }
        }
        debug!(handle = %handle, response_code, "result callback invoked");
    }

    #[cfg(test)]
    pub(crate) fn response_len(&self) -> usize {
        match &self.sink {
            ResponseSink::Discard => 0,
            ResponseSink::Buffered { buf, .. } => buf.len(),
        }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("handle", &self.handle)
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("attached", &self.attached)
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// What a test callback saw: code, status, payload, payload with terminator.
    type Seen = (i32, u16, Option<Vec<u8>>, Option<Vec<u8>>);

    fn recording_callback() -> (ResultCallback, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ResultCallback = Box::new(move |result| {
            sink.lock().unwrap().push((
                result.error.code(),
                result.response_code,
                result.payload.map(|p| p.bytes().to_vec()),
                result
                    .payload
                    .and_then(|p| p.bytes_with_nul())
                    .map(<[u8]>::to_vec),
            ));
        });
        (callback, seen)
    }

    #[test]
    fn test_create_defaults_to_get_without_callback() {
        let transfer = Transfer::create("http://example.com/a").unwrap();
        assert_eq!(transfer.method(), Method::Get);
        assert!(!transfer.is_attached());
        assert!(!transfer.job().collect_response);
        assert!(matches!(transfer.job().payload, JobPayload::Empty));
    }

    #[test]
    fn test_create_rejects_invalid_url() {
        let error = Transfer::create("not a url").unwrap_err();
        assert!(matches!(error, SubmitError::InvalidUrl { .. }));
    }

    #[test]
    fn test_configure_http_adds_only_present_headers() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        transfer
            .configure_http(Some("application/json"), Some(""))
            .unwrap();
        let job = transfer.job();
        assert_eq!(job.headers.get(ACCEPT).unwrap(), "application/json");
        assert!(job.headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_configure_http_noop_when_both_absent() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        transfer.configure_http(None, None).unwrap();
        assert!(transfer.job().headers.is_empty());
    }

    #[test]
    fn test_configure_http_rejects_header_injection() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        let error = transfer
            .configure_http(Some("text/plain\r\nX-Evil: 1"), None)
            .unwrap_err();
        assert!(matches!(
            error,
            SubmitError::InvalidHeader {
                header: "Accept",
                ..
            }
        ));
    }

    #[test]
    fn test_multipart_skips_disk_parts() {
        let mut transfer = Transfer::create("http://example.com/upload").unwrap();
        transfer.configure_multipart(vec![
            FormPart::field("name", "value"),
            FormPart::file_from_disk("skipped", "/tmp/does-not-matter"),
            FormPart::file("upload", "a.txt", b"abc".to_vec()),
            FormPart::field_from_disk("also-skipped", "/tmp/other"),
        ]);
        assert_eq!(transfer.method(), Method::Post);

        let JobPayload::Form(entries) = transfer.job().payload else {
            panic!("expected multipart payload");
        };
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["name", "upload"]);
        assert_eq!(entries[1].filename.as_deref(), Some("a.txt"));
        assert_eq!(entries[1].data, Bytes::from_static(b"abc"));
    }

    #[test]
    fn test_buffered_callback_sees_terminator_but_length_is_unchanged() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        let (callback, seen) = recording_callback();
        transfer.set_result_callback(callback, true);

        transfer.append_response(b"O");
        transfer.append_response(b"K");
        transfer.invoke_callback(&ErrorInfo::ok(), 200);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            (0, 200, Some(b"OK".to_vec()), Some(b"OK\0".to_vec()))
        );
        assert_eq!(transfer.response_len(), 2);
    }

    #[test]
    fn test_buffered_callback_without_terminator() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        let (callback, seen) = recording_callback();
        transfer.set_result_callback(callback, false);

        transfer.append_response(&[1, 2, 3]);
        transfer.invoke_callback(&ErrorInfo::ok(), 200);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].2, Some(vec![1, 2, 3]));
        assert_eq!(seen[0].3, None);
    }

    #[test]
    fn test_empty_buffer_delivers_no_payload() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        let (callback, seen) = recording_callback();
        transfer.set_result_callback(callback, true);

        transfer.invoke_callback(&ErrorInfo::ok(), 204);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (0, 204, None, None));
    }

    #[test]
    fn test_callback_fires_at_most_once() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        let (callback, seen) = recording_callback();
        transfer.set_result_callback(callback, true);

        transfer.invoke_callback(&ErrorInfo::ok(), 200);
        transfer.invoke_callback(&ErrorInfo::ok(), 200);

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_discard_sink_ignores_response_bytes() {
        let mut transfer = Transfer::create("http://example.com/a").unwrap();
        transfer.set_post_body(Bytes::from_static(b"a=1"));
        transfer.append_response(b"ignored");
        assert_eq!(transfer.response_len(), 0);
        // no callback registered: silent no-op
        transfer.invoke_callback(&ErrorInfo::ok(), 200);
    }
}
