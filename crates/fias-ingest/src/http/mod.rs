//! HTTP transport abstraction
//!
//! The downloader and the version informer only ever talk to [`HttpTransport`],
//! so tests can swap the network for an in-memory fake.

mod reqwest_transport;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tokio::io::AsyncWrite;

use crate::error::{IngestError, Result};
pub use reqwest_transport::ReqwestTransport;

/// Inclusive byte range for a `Range` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub from: u64,
    /// Last byte, or `None` for "until the end"
    pub to: Option<u64>,
}

impl ByteRange {
    pub fn new(from: u64, to: Option<u64>) -> Self {
        Self { from, to }
    }

    pub fn header_value(&self) -> String {
        match self.to {
            Some(to) => format!("bytes={}-{}", self.from, to),
            None => format!("bytes={}-", self.from),
        }
    }
}

/// Status, lower-cased headers and (for non-streamed calls) the body
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new<I, K, V>(status: u16, headers: I, body: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// True when the server advertises `Accept-Ranges: bytes`
    pub fn supports_ranges(&self) -> bool {
        self.header("accept-ranges")
            .is_some_and(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| IngestError::Remote(format!("response is not the expected JSON: {}", e)))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn head(&self, url: &str) -> Result<HttpResponse>;

    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// Stream the body into `sink`.
    ///
    /// Nothing is written unless the response status is 2xx. Errors raised
    /// midway leave the bytes already written in the sink.
    async fn download(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        range: Option<ByteRange>,
    ) -> Result<HttpResponse>;
}
