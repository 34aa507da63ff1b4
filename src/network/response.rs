//! Buffered HTTP response

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{StatusCode, Url, Version};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::io::Cursor;

use super::error::Error;

/// Represents an HTTP response whose body has been read into memory.
///
/// The body is owned by the response, so it can be read any number of
/// times: every call to [`Response::reader`] starts from the first byte.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub url: Url,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, url: Url, body: Vec<u8>) -> Self {
        Self {
            status,
            version,
            headers,
            url,
            body,
        }
    }

    /// Check if the response was successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Value of the Content-Type header, if present and readable
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Check if the content type is JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    /// Get the body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// A fresh reader over the buffered body.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.body)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Error::Decode)
    }

    /// Get the content length
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}
