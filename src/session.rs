//! Transfer sessions.
//!
//! A [`Session`] owns one native transfer handle for the whole
//! open → configure → execute → read → close lifecycle. The same descriptor
//! model backs both the blocking single-request path and pooled execution
//! through the [`Multiplexer`](crate::Multiplexer).

use curl::easy::{Easy2, Form, Handler, List, ReadError, WriteError};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::request::{BodyEncoding, RequestDescriptor};
use crate::response::Response;
use crate::{options, Error, Result, TransportError};

/// Write/read handler accumulating the raw transfer result.
///
/// Header lines and body chunks land in one buffer, headers first, with the
/// header block size tracked separately so the response can be split the way
/// the transport reports it.
#[derive(Default)]
pub struct Collector {
    buf: Vec<u8>,
    header_size: usize,
    upload: Option<File>,
}

impl Handler for Collector {
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, WriteError> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn header(&mut self, data: &[u8]) -> bool {
        self.buf.extend_from_slice(data);
        self.header_size += data.len();
        true
    }

    fn read(&mut self, data: &mut [u8]) -> std::result::Result<usize, ReadError> {
        match &mut self.upload {
            Some(file) => file.read(data).map_err(|_| ReadError::Abort),
            None => Ok(0),
        }
    }
}

/// Transport-level facts about a completed transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferInfo {
    /// HTTP status code.
    pub status: u16,
    /// Size of the header block within the raw result.
    pub header_size: usize,
    /// Total transfer time.
    pub total_time: Duration,
}

/// One native transfer handle and its lifecycle.
pub struct Session {
    handle: Option<Easy2<Collector>>,
    last_error: Option<TransportError>,
}

impl Session {
    /// Open a handle and configure it from `descriptor`, applying the full
    /// merged option set atomically: the first rejected option aborts with
    /// [`Error::Config`] (or [`Error::Io`] for a missing file) and nothing
    /// further is applied.
    pub fn new(descriptor: &RequestDescriptor, config: &ClientConfig) -> Result<Self> {
        let mut easy = Easy2::new(Collector::default());

        let url = descriptor.build_url(config)?;
        easy.url(url.as_str()).map_err(config_err)?;

        configure_method(&mut easy, descriptor)?;
        configure_body(&mut easy, descriptor)?;
        configure_headers(&mut easy, descriptor, config)?;

        easy.useragent(&config.user_agent).map_err(config_err)?;

        let mut merged = config.transport_options.clone();
        options::deep_merge(&mut merged, descriptor.transport_options().clone());
        apply_transport_options(&mut easy, &merged)?;

        Ok(Self {
            handle: Some(easy),
            last_error: None,
        })
    }

    /// Rewrap a handle that came back from a multiplexer.
    pub(crate) fn from_handle(handle: Easy2<Collector>) -> Self {
        Self {
            handle: Some(handle),
            last_error: None,
        }
    }

    /// Take the native handle for multiplexer registration.
    pub(crate) fn into_handle(mut self) -> Result<Easy2<Collector>> {
        self.handle
            .take()
            .ok_or_else(|| Error::Config("session already closed".to_string()))
    }

    /// Perform the blocking transfer.
    pub fn execute(&mut self) -> Result<()> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::Config("session already closed".to_string()))?;
        match handle.perform() {
            Ok(()) => {
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let err = TransportError::from(e);
                self.last_error = Some(err.clone());
                Err(Error::Transport(err))
            }
        }
    }

    /// Native error code of the last execute; 0 means success.
    pub fn errno(&self) -> i32 {
        self.last_error.as_ref().map_or(0, |e| e.code)
    }

    /// Native error message of the last execute; empty means success.
    pub fn error(&self) -> &str {
        self.last_error.as_ref().map_or("", |e| e.message.as_str())
    }

    /// Transport facts for the completed transfer.
    pub fn info(&mut self) -> Result<TransferInfo> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::Config("session already closed".to_string()))?;
        let status = handle
            .response_code()
            .map_err(|e| Error::Transport(e.into()))? as u16;
        let total_time = handle.total_time().unwrap_or_default();
        Ok(TransferInfo {
            status,
            header_size: handle.get_ref().header_size,
            total_time,
        })
    }

    /// Read the buffered result into a [`Response`]. The buffer is drained;
    /// a session is read exactly once.
    pub fn take_response(&mut self) -> Result<Response> {
        let info = self.info()?;
        let handle = self.handle.as_mut().expect("handle checked by info");
        let collector = handle.get_mut();
        let raw = std::mem::take(&mut collector.buf);
        collector.header_size = 0;
        Ok(Response::from_raw(raw, info.header_size, info.status))
    }

    /// Close the session and every stream it owns. Idempotent; safe on an
    /// unexecuted session.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.get_mut().upload = None;
        }
        self.last_error = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn config_err(e: curl::Error) -> Error {
    Error::Config(e.to_string())
}

fn configure_method(easy: &mut Easy2<Collector>, descriptor: &RequestDescriptor) -> Result<()> {
    match descriptor.method().as_str() {
        "GET" => easy.get(true).map_err(config_err)?,
        "POST" => easy.post(true).map_err(config_err)?,
        // nobody keeps the transport from waiting on a body the server
        // advertises but never sends
        "HEAD" => easy.nobody(true).map_err(config_err)?,
        _ => {}
    }
    easy.custom_request(descriptor.method().as_str())
        .map_err(config_err)
}

fn configure_body(easy: &mut Easy2<Collector>, descriptor: &RequestDescriptor) -> Result<()> {
    match descriptor.encoding() {
        BodyEncoding::None => Ok(()),
        BodyEncoding::Form => {
            let body = descriptor.encode_form_fields()?;
            easy.post_fields_copy(&body).map_err(config_err)
        }
        BodyEncoding::Raw => {
            let body = descriptor
                .raw_body()
                .map(<[u8]>::to_vec)
                .unwrap_or_default();
            easy.post_fields_copy(&body).map_err(config_err)
        }
        BodyEncoding::Multipart => {
            let form = build_multipart(descriptor)?;
            easy.httppost(form).map_err(config_err)
        }
        BodyEncoding::Upload => {
            let path = descriptor.upload().expect("upload encoding implies path");
            let file = File::open(path)?;
            let size = file.metadata()?.len();
            easy.upload(true).map_err(config_err)?;
            easy.in_filesize(size).map_err(config_err)?;
            easy.get_mut().upload = Some(file);
            Ok(())
        }
    }
}

/// Merge fields and attachments into one multipart form. Attachment files
/// are opened, read and closed here; a missing file fails the build before
/// anything is sent.
fn build_multipart(descriptor: &RequestDescriptor) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in descriptor.fields() {
        form.part(name)
            .contents(value.as_bytes())
            .add()
            .map_err(|e| Error::Config(e.to_string()))?;
    }
    for attachment in descriptor.attachments() {
        let mut file = File::open(&attachment.path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        form.part(&attachment.field)
            .buffer(&attachment.file_name, contents)
            .content_type(&attachment.mime_type)
            .add()
            .map_err(|e| Error::Config(e.to_string()))?;
    }
    Ok(form)
}

fn configure_headers(
    easy: &mut Easy2<Collector>,
    descriptor: &RequestDescriptor,
    config: &ClientConfig,
) -> Result<()> {
    let mut list = List::new();
    for (name, value) in &config.default_headers {
        if descriptor.header(name).is_none() {
            list.append(&format!("{name}: {value}")).map_err(config_err)?;
        }
    }
    for (name, value) in descriptor.headers() {
        // multipart needs the transport's own boundary-carrying header
        if descriptor.encoding() == BodyEncoding::Multipart
            && name.eq_ignore_ascii_case("Content-Type")
        {
            continue;
        }
        list.append(&format!("{name}: {value}")).map_err(config_err)?;
    }
    if descriptor.encoding() == BodyEncoding::None && descriptor.method().as_str() != "GET" {
        list.append("Content-Length: 0").map_err(config_err)?;
    }
    easy.http_headers(list).map_err(config_err)
}

fn apply_transport_options(easy: &mut Easy2<Collector>, tree: &Value) -> Result<()> {
    let map = match tree.as_object() {
        Some(map) => map,
        None => return Err(Error::Config("transport options must be a map".to_string())),
    };

    for (key, value) in map {
        match key.as_str() {
            "timeout_ms" => easy
                .timeout(Duration::from_millis(expect_u64(key, value)?))
                .map_err(config_err)?,
            "connect_timeout_ms" => easy
                .connect_timeout(Duration::from_millis(expect_u64(key, value)?))
                .map_err(config_err)?,
            "follow_redirects" => easy
                .follow_location(expect_bool(key, value)?)
                .map_err(config_err)?,
            "max_redirects" => easy
                .max_redirections(expect_u64(key, value)? as u32)
                .map_err(config_err)?,
            "verbose" => easy.verbose(expect_bool(key, value)?).map_err(config_err)?,
            "accept_encoding" => easy
                .accept_encoding(expect_str(key, value)?)
                .map_err(config_err)?,
            "user_agent" => easy.useragent(expect_str(key, value)?).map_err(config_err)?,
            "ssl" => apply_ssl_options(easy, key, value)?,
            "proxy" => apply_proxy_options(easy, key, value)?,
            other => {
                debug!(option = other, "rejecting unknown transport option");
                return Err(Error::Config(format!("unknown transport option `{other}`")));
            }
        }
    }
    Ok(())
}

fn apply_ssl_options(easy: &mut Easy2<Collector>, key: &str, value: &Value) -> Result<()> {
    for (nested, value) in expect_map(key, value)? {
        match nested.as_str() {
            "verify_peer" => easy
                .ssl_verify_peer(expect_bool(nested, value)?)
                .map_err(config_err)?,
            "verify_host" => easy
                .ssl_verify_host(expect_bool(nested, value)?)
                .map_err(config_err)?,
            other => {
                return Err(Error::Config(format!(
                    "unknown transport option `ssl.{other}`"
                )))
            }
        }
    }
    Ok(())
}

fn apply_proxy_options(easy: &mut Easy2<Collector>, key: &str, value: &Value) -> Result<()> {
    for (nested, value) in expect_map(key, value)? {
        match nested.as_str() {
            "url" => easy.proxy(expect_str(nested, value)?).map_err(config_err)?,
            other => {
                return Err(Error::Config(format!(
                    "unknown transport option `proxy.{other}`"
                )))
            }
        }
    }
    Ok(())
}

fn expect_u64(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::Config(format!("transport option `{key}` must be an integer")))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::Config(format!("transport option `{key}` must be a boolean")))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::Config(format!("transport option `{key}` must be a string")))
}

fn expect_map<'a>(
    key: &str,
    value: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::Config(format!("transport option `{key}` must be a map")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_close_is_idempotent() {
        let descriptor = RequestDescriptor::new(Method::GET, "http://127.0.0.1/");
        let mut session = Session::new(&descriptor, &ClientConfig::default()).unwrap();
        session.close();
        session.close();
        assert!(session.execute().is_err());
    }

    #[test]
    fn test_unknown_transport_option_rejected() {
        let mut descriptor = RequestDescriptor::new(Method::GET, "http://127.0.0.1/");
        descriptor.set_transport_option("warp_speed", json!(9));
        let err = match Session::new(&descriptor, &ClientConfig::default()) {
            Err(err) => err,
            Ok(_) => panic!("unknown option must be rejected"),
        };
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("warp_speed"));
    }

    #[test]
    fn test_option_type_mismatch_rejected() {
        let mut descriptor = RequestDescriptor::new(Method::GET, "http://127.0.0.1/");
        descriptor.set_transport_option("timeout_ms", json!("soon"));
        assert!(matches!(
            Session::new(&descriptor, &ClientConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_upload_file_is_io_error() {
        let mut descriptor = RequestDescriptor::new(Method::PUT, "http://127.0.0.1/");
        descriptor.set_upload_file("/nonexistent/volley-upload.bin");
        assert!(matches!(
            Session::new(&descriptor, &ClientConfig::default()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_missing_attachment_file_is_io_error() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "http://127.0.0.1/");
        descriptor.push_attachment("doc", "/nonexistent/volley-attach.bin", None, None);
        assert!(matches!(
            Session::new(&descriptor, &ClientConfig::default()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_fresh_session_reports_no_error() {
        let descriptor = RequestDescriptor::new(Method::GET, "http://127.0.0.1/");
        let session = Session::new(&descriptor, &ClientConfig::default()).unwrap();
        assert_eq!(session.errno(), 0);
        assert_eq!(session.error(), "");
    }
}
