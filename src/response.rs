//! HTTP response decomposition.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// A completed HTTP response.
///
/// Built once from the raw transfer result (header block concatenated with
/// the body) and the header block size, then immutable.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    /// Decompose a raw transfer buffer.
    ///
    /// `raw` is the header block followed by the body; `header_size` is the
    /// length of the header block. Header lines are split on the first colon;
    /// lines without one (status line, blank terminator) are skipped. Names
    /// keep their case, values are trimmed.
    pub fn from_raw(raw: Vec<u8>, header_size: usize, status: u16) -> Self {
        let split = header_size.min(raw.len());
        let header_block = String::from_utf8_lossy(&raw[..split]).into_owned();
        let body = Bytes::from(raw).slice(split..);

        let mut headers = Vec::new();
        for line in header_block.split("\r\n") {
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the response body as bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::Json(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Json(e.to_string()))
    }

    /// Get a header value by name (ASCII case insensitive).
    ///
    /// When a name occurred more than once in the header block, the last
    /// occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All parsed headers, in header-block order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the content type if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Get the content length if present and well formed.
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }

    /// Check if the status is 2xx.
    pub fn successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the status is exactly 200.
    pub fn ok(&self) -> bool {
        self.status == 200
    }

    /// Check if the status is 3xx.
    pub fn redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Check if the status is 4xx.
    pub fn client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the status is 500 or above.
    pub fn server_error(&self) -> bool {
        self.status >= 500
    }

    /// Check if the status indicates a client or server error.
    pub fn failed(&self) -> bool {
        self.client_error() || self.server_error()
    }

    fn status_error(&self) -> Error {
        Error::Status {
            status: self.status,
            body: self.text().unwrap_or_default(),
        }
    }

    /// Return an error when the response failed, otherwise the response.
    pub fn error_for_status(self) -> Result<Self> {
        if self.failed() {
            Err(self.status_error())
        } else {
            Ok(self)
        }
    }

    /// Like [`error_for_status`](Self::error_for_status), but lets a handler
    /// inspect the failed response and the error it would raise. Returning
    /// `Some(err)` substitutes the error; returning `None` suppresses it and
    /// yields the response.
    pub fn error_for_status_with<F>(self, handler: F) -> Result<Self>
    where
        F: FnOnce(&Response, Error) -> Option<Error>,
    {
        if !self.failed() {
            return Ok(self);
        }
        let err = self.status_error();
        match handler(&self, err) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
