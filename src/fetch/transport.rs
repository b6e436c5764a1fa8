use std::{error::Error, io::Read, time::Duration};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT},
};
use thiserror::Error;

use crate::config::Settings;

/// The CQC site serves the export to browsers only.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";
pub const CSV_ACCEPT: &str = "text/csv,application/csv,application/octet-stream;q=0.9,*/*;q=0.8";

/// Connection level failure: DNS, refused connection, TLS, timeout, ...
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        // the Display of reqwest errors hides the cause, e.g. "connection refused"
        let mut msg = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportError(msg)
    }
}

/// Status line and headers have arrived, the body has not been read yet.
pub struct Response {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Box<dyn Read + Send>,
}

/// Issues one streaming GET.  No retries, that's the fetcher's job.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Response, TransportError>;
}

/// Blocking reqwest client with browser like headers.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(CSV_ACCEPT));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(ReqwestTransport { client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        ReqwestTransport::new(settings.timeout, settings.connect_timeout)
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<Response, TransportError> {
        let response = self.client.get(url).send()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        Ok(Response {
            status: response.status().as_u16(),
            content_type,
            body: Box::new(response),
        })
    }
}
