//! Request descriptions accepted by the manager.
//!
//! Every payload handed to a request is an owned copy taken at submission, so
//! callers never need to keep their buffers alive until the transfer completes.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;

use super::result::ResultCallback;

/// HTTP method of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Plain GET (the default for a new transfer).
    Get,
    /// POST with either a flat body or a multipart form.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Per-request header overrides and response delivery preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Value of the `Accept` header, if any. Empty strings are ignored.
    pub accept: Option<String>,
    /// Value of the `Content-Type` header, if any. Empty strings are ignored.
    pub content_type: Option<String>,
    /// Append a terminator byte after the delivered response bytes.
    ///
    /// On by default; callers expecting non-textual payloads should opt out.
    pub null_terminate: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            accept: None,
            content_type: None,
            null_terminate: true,
        }
    }
}

impl RequestOptions {
    /// Sets the `Accept` header override.
    #[must_use]
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Sets the `Content-Type` header override.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets whether delivered response bytes are null terminated.
    #[must_use]
    pub fn null_terminate(mut self, null_terminate: bool) -> Self {
        self.null_terminate = null_terminate;
        self
    }
}

/// Where the content of a multipart form part comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartSource {
    /// A regular form field whose content is an in-memory buffer.
    Field(Bytes),
    /// A file upload whose content is an in-memory buffer.
    FileBuffer {
        /// File name reported to the server.
        filename: String,
        /// File content.
        data: Bytes,
    },
    /// A regular form field loaded from disk. Not supported; skipped when sent.
    FieldFromDisk(PathBuf),
    /// A file upload loaded from disk. Not supported; skipped when sent.
    FileFromDisk(PathBuf),
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    name: String,
    source: PartSource,
}

impl FormPart {
    /// Creates a regular field from an in-memory buffer.
    pub fn field(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: PartSource::Field(data.into()),
        }
    }

    /// Creates a file upload from an in-memory buffer.
    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: PartSource::FileBuffer {
                filename: filename.into(),
                data: data.into(),
            },
        }
    }

    /// Creates a regular field whose content would be read from disk.
    ///
    /// Disk-sourced parts are accepted but omitted from the sent form.
    pub fn field_from_disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: PartSource::FieldFromDisk(path.into()),
        }
    }

    /// Creates a file upload whose content would be read from disk.
    ///
    /// Disk-sourced parts are accepted but omitted from the sent form.
    pub fn file_from_disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: PartSource::FileFromDisk(path.into()),
        }
    }

    /// Returns the form field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns where the content comes from.
    #[must_use]
    pub fn source(&self) -> &PartSource {
        &self.source
    }

    /// Returns true if the part is a file upload.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(
            self.source,
            PartSource::FileBuffer { .. } | PartSource::FileFromDisk(_)
        )
    }

    /// Returns true if the content would be read from disk.
    #[must_use]
    pub fn is_from_disk(&self) -> bool {
        matches!(
            self.source,
            PartSource::FieldFromDisk(_) | PartSource::FileFromDisk(_)
        )
    }

    pub(crate) fn into_parts(self) -> (String, PartSource) {
        (self.name, self.source)
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No payload (GET).
    Empty,
    /// Flat POST body.
    Bytes(Bytes),
    /// Multipart POST form.
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    /// Returns the HTTP method implied by this payload.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Empty => Method::Get,
            Self::Bytes(_) | Self::Multipart(_) => Method::Post,
        }
    }
}

/// A complete transfer request ready to be submitted.
///
/// # Example
///
/// ```
/// use tick_transfer::{RequestOptions, TransferRequest};
///
/// let request = TransferRequest::post("https://example.com/report", "a=1")
///     .with_options(RequestOptions::default().accept("application/json"));
/// assert!(request.callback().is_none());
/// ```
pub struct TransferRequest {
    url: String,
    body: RequestBody,
    callback: Option<ResultCallback>,
    options: RequestOptions,
}

impl TransferRequest {
    /// Creates a GET request. A callback must be attached before submitting.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, RequestBody::Empty)
    }

    /// Creates a POST request with a flat body.
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(url, RequestBody::Bytes(body.into()))
    }

    /// Creates a multipart POST request.
    pub fn multipart(url: impl Into<String>, parts: Vec<FormPart>) -> Self {
        Self::new(url, RequestBody::Multipart(parts))
    }

    fn new(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            url: url.into(),
            body,
            callback: None,
            options: RequestOptions::default(),
        }
    }

    /// Sets the callback that receives the result.
    #[must_use]
    pub fn with_callback(mut self, callback: ResultCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Replaces the request options.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.body.method()
    }

    /// Returns the payload.
    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Returns the callback, if one was set.
    #[must_use]
    pub fn callback(&self) -> Option<&ResultCallback> {
        self.callback.as_ref()
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub(crate) fn into_parts(self) -> (String, RequestBody, Option<ResultCallback>, RequestOptions) {
        (self.url, self.body, self.callback, self.options)
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("url", &self.url)
            .field("body", &self.body)
            .field("callback", &self.callback.is_some())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_requests_null_termination() {
        let options = RequestOptions::default();
        assert!(options.null_terminate);
        assert!(options.accept.is_none());
        assert!(options.content_type.is_none());
    }

    #[test]
    fn test_body_implies_method() {
        assert_eq!(TransferRequest::get("http://a/").method(), Method::Get);
        assert_eq!(TransferRequest::post("http://a/", "x").method(), Method::Post);
        assert_eq!(
            TransferRequest::multipart("http://a/", Vec::new()).method(),
            Method::Post
        );
    }

    #[test]
    fn test_form_part_flags() {
        let field = FormPart::field("name", "value");
        assert!(!field.is_file());
        assert!(!field.is_from_disk());

        let file = FormPart::file("upload", "a.txt", b"abc".to_vec());
        assert!(file.is_file());
        assert!(!file.is_from_disk());

        let disk_file = FormPart::file_from_disk("upload", "/tmp/a.txt");
        assert!(disk_file.is_file());
        assert!(disk_file.is_from_disk());

        let disk_field = FormPart::field_from_disk("name", "/tmp/value");
        assert!(!disk_field.is_file());
        assert!(disk_field.is_from_disk());
    }

    #[test]
    fn test_post_body_is_an_owned_copy() {
        let mut caller_buffer = b"a=1".to_vec();
        let request = TransferRequest::post("http://a/", Bytes::copy_from_slice(&caller_buffer));
        caller_buffer.clear();
        assert_eq!(request.body(), &RequestBody::Bytes(Bytes::from_static(b"a=1")));
    }

    #[test]
    fn test_debug_hides_callback() {
        let request = TransferRequest::get("http://a/").with_callback(Box::new(|_| {}));
        let debug = format!("{request:?}");
        assert!(debug.contains("callback: true"), "got: {debug}");
    }
}
