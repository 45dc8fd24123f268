use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{ByteRange, HttpResponse, HttpTransport};
use crate::error::{IngestError, Result};

const USER_AGENT: &str = concat!("fias-ingest/", env!("CARGO_PKG_VERSION"));

/// [`HttpTransport`] over a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `timeout` bounds each whole request, including streamed bodies
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn head_of(response: &Response) -> (u16, Vec<(String, String)>) {
    (response.status().as_u16(), collect_headers(response.headers()))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn head(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| IngestError::transport(url, e))?;

        let (status, headers) = head_of(&response);
        Ok(HttpResponse::new(status, headers, Vec::new()))
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::transport(url, e))?;

        let (status, headers) = head_of(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::transport(url, e))?;
        Ok(HttpResponse::new(status, headers, body.to_vec()))
    }

    async fn download(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        range: Option<ByteRange>,
    ) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::transport(url, e))?;

        let (status, headers) = head_of(&response);
        let result = HttpResponse::new(status, headers, Vec::new());
        if !result.is_ok() {
            return Ok(result);
        }

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestError::transport(url, e))?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        debug!(url = %url, status = status, bytes = written, "Streamed response body");
        Ok(result)
    }
}
