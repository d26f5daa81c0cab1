//! Request composition.
//!
//! A [`RequestDescriptor`] is the composed, not-yet-sent form of one HTTP
//! request. Setters are order independent and mergeable: headers replace per
//! name, transport options deep-merge, and the body encoding is decided by
//! the `Content-Type` header at send time.

use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::{options, Error, Result};

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded; charset=utf-8";
const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// How the request body is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// No body; `Content-Length: 0` is sent.
    None,
    /// Fields url-encoded as `application/x-www-form-urlencoded`.
    Form,
    /// Fields and attachments merged into a multipart form.
    Multipart,
    /// Pre-encoded bytes passed through unmodified (JSON and unknown
    /// content types alike).
    Raw,
    /// Whole-body file upload streamed through the transfer's read callback.
    Upload,
}

/// One multipart file attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Form field name.
    pub field: String,
    /// Path of the file to attach.
    pub path: PathBuf,
    /// MIME type, resolved from the path when not given.
    pub mime_type: String,
    /// File name presented to the server.
    pub file_name: String,
}

/// The composed, unsent representation of one HTTP request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    fields: Vec<(String, String)>,
    raw_body: Option<Vec<u8>>,
    attachments: Vec<Attachment>,
    upload: Option<PathBuf>,
    transport_options: Value,
}

impl RequestDescriptor {
    /// Create a descriptor for `method` and `url`.
    ///
    /// New descriptors default to a JSON content type and JSON accept
    /// header; the sugar methods below override them.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let mut descriptor = Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            fields: Vec::new(),
            raw_body: None,
            attachments: Vec::new(),
            upload: None,
            transport_options: Value::Object(serde_json::Map::new()),
        };
        descriptor.set_header("Content-Type", CONTENT_TYPE_JSON);
        descriptor.set_header("Accept", "application/json; charset=utf-8");
        descriptor
    }

    /// Set a header, replacing any existing value for the same name
    /// (ASCII case insensitive) while keeping its position.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Set several headers; each merges like [`set_header`](Self::set_header).
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.set_header(name, value);
        }
    }

    /// Look up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.set_header("Content-Type", content_type);
    }

    /// Append a query parameter.
    pub fn push_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Append a body field (form or multipart).
    pub fn push_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Body fields in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Set a pre-encoded body.
    pub fn set_raw_body(&mut self, body: Vec<u8>) {
        self.raw_body = Some(body);
    }

    /// Serialize `value` as the JSON body and mark the content type.
    pub fn set_json_body<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Json(e.to_string()))?;
        self.set_content_type(CONTENT_TYPE_JSON);
        self.raw_body = Some(bytes);
        Ok(())
    }

    /// The pre-encoded body, if any.
    pub fn raw_body(&self) -> Option<&[u8]> {
        self.raw_body.as_deref()
    }

    /// Attach a file as a multipart part, resolving the MIME type and file
    /// name from the path when not supplied. The file is opened when the
    /// session is built; a missing file surfaces there as an I/O error.
    pub fn push_attachment(
        &mut self,
        field: impl Into<String>,
        path: impl Into<PathBuf>,
        mime_type: Option<String>,
        file_name: Option<String>,
    ) {
        let path = path.into();
        let mime_type = mime_type
            .unwrap_or_else(|| mime_guess::from_path(&path).first_or_octet_stream().to_string());
        let file_name = file_name.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        self.set_content_type(CONTENT_TYPE_MULTIPART);
        self.attachments.push(Attachment {
            field: field.into(),
            path,
            mime_type,
            file_name,
        });
    }

    /// Registered attachments.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Upload one file as the entire request body. Switches the method to
    /// PUT; the session streams the file and owns its handle.
    pub fn set_upload_file(&mut self, path: impl Into<PathBuf>) {
        self.method = Method::PUT;
        self.upload = Some(path.into());
    }

    /// The whole-body upload path, if any.
    pub fn upload(&self) -> Option<&Path> {
        self.upload.as_deref()
    }

    /// Deep-merge a transport option tree; later leaves win.
    pub fn merge_transport_options(&mut self, tree: Value) {
        options::deep_merge(&mut self.transport_options, tree);
    }

    /// Set one transport option by dotted path.
    pub fn set_transport_option(&mut self, path: &str, value: Value) {
        options::set(&mut self.transport_options, path, value);
    }

    /// Per-request transport options.
    pub fn transport_options(&self) -> &Value {
        &self.transport_options
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Override the request method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Request URL as composed (before base-URL joining).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Set the request URL.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Set the per-transfer timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.set_transport_option("timeout_ms", Value::from(timeout.as_millis() as u64));
    }

    /// The body encoding implied by the current content type and
    /// attachments. Unknown content types fall back to pass-through.
    pub fn encoding(&self) -> BodyEncoding {
        if self.upload.is_some() {
            return BodyEncoding::Upload;
        }
        if !self.attachments.is_empty() {
            return BodyEncoding::Multipart;
        }
        let content_type = self.header("Content-Type").unwrap_or("");
        if content_type.starts_with("application/x-www-form-urlencoded") {
            if self.fields.is_empty() && self.raw_body.is_none() {
                return BodyEncoding::None;
            }
            return BodyEncoding::Form;
        }
        if content_type.starts_with("multipart/form-data") {
            return BodyEncoding::Multipart;
        }
        if self.raw_body.is_none() && self.fields.is_empty() {
            return BodyEncoding::None;
        }
        BodyEncoding::Raw
    }

    /// Resolve the effective URL: join against the config base URL when the
    /// request URL is relative, then append query parameters.
    pub fn build_url(&self, config: &ClientConfig) -> Result<url::Url> {
        let mut url = match &config.base_url {
            Some(base) => {
                let base =
                    url::Url::parse(base).map_err(|e| Error::InvalidUrl(e.to_string()))?;
                base.join(&self.url)
                    .map_err(|e| Error::InvalidUrl(e.to_string()))?
            }
            None => url::Url::parse(&self.url).map_err(|e| Error::InvalidUrl(e.to_string()))?,
        };

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Url-encode the accumulated fields.
    pub fn encode_form_fields(&self) -> Result<Vec<u8>> {
        let encoded =
            serde_urlencoded::to_string(&self.fields).map_err(|e| Error::Json(e.to_string()))?;
        Ok(encoded.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_to_json() {
        let descriptor = RequestDescriptor::new(Method::GET, "https://x/");
        assert_eq!(descriptor.header("Content-Type"), Some(CONTENT_TYPE_JSON));
        assert_eq!(
            descriptor.header("accept"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(descriptor.encoding(), BodyEncoding::None);
    }

    #[test]
    fn test_header_replace_preserves_position() {
        let mut descriptor = RequestDescriptor::new(Method::GET, "https://x/");
        descriptor.set_header("X-One", "1");
        descriptor.set_header("X-Two", "2");
        descriptor.set_header("x-one", "updated");

        let names: Vec<_> = descriptor.headers().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Content-Type", "Accept", "X-One", "X-Two"]);
        assert_eq!(descriptor.header("X-One"), Some("updated"));
    }

    #[test]
    fn test_content_type_decides_encoding() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "https://x/");
        descriptor.push_field("a", "1");
        assert_eq!(descriptor.encoding(), BodyEncoding::Raw);

        descriptor.set_content_type(CONTENT_TYPE_FORM);
        assert_eq!(descriptor.encoding(), BodyEncoding::Form);

        descriptor.set_content_type("application/vnd.custom+weird");
        assert_eq!(descriptor.encoding(), BodyEncoding::Raw);
    }

    #[test]
    fn test_json_body_sets_header_and_bytes() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "https://x/");
        descriptor.set_content_type(CONTENT_TYPE_FORM);
        descriptor.set_json_body(&json!({"k": "v"})).unwrap();
        assert_eq!(descriptor.header("Content-Type"), Some(CONTENT_TYPE_JSON));
        assert_eq!(descriptor.raw_body(), Some(br#"{"k":"v"}"#.as_slice()));
        assert_eq!(descriptor.encoding(), BodyEncoding::Raw);
    }

    #[test]
    fn test_attachment_forces_multipart_and_resolves_mime() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "https://x/");
        descriptor.push_attachment("doc", "/tmp/report.json", None, None);

        assert_eq!(descriptor.encoding(), BodyEncoding::Multipart);
        let attachment = &descriptor.attachments()[0];
        assert_eq!(attachment.mime_type, "application/json");
        assert_eq!(attachment.file_name, "report.json");
        assert!(descriptor
            .header("Content-Type")
            .unwrap()
            .starts_with("multipart/form-data"));
    }

    #[test]
    fn test_upload_switches_method_to_put() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "https://x/");
        descriptor.set_upload_file("/tmp/blob.bin");
        assert_eq!(descriptor.method(), &Method::PUT);
        assert_eq!(descriptor.encoding(), BodyEncoding::Upload);
    }

    #[test]
    fn test_transport_option_merge() {
        let mut descriptor = RequestDescriptor::new(Method::GET, "https://x/");
        descriptor.set_transport_option("ssl.verify_peer", json!(false));
        descriptor.merge_transport_options(json!({"ssl": {"verify_host": false}}));
        assert_eq!(
            descriptor.transport_options(),
            &json!({"ssl": {"verify_peer": false, "verify_host": false}})
        );
    }

    #[test]
    fn test_build_url_with_base_and_query() {
        let config = ClientConfig::builder().base_url("https://api.example.com/v1/").build();
        let mut descriptor = RequestDescriptor::new(Method::GET, "users");
        descriptor.push_query("page", "2");
        descriptor.push_query("sort", "name asc");

        let url = descriptor.build_url(&config).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/users?page=2&sort=name+asc"
        );
    }

    #[test]
    fn test_build_url_rejects_garbage() {
        let config = ClientConfig::default();
        let descriptor = RequestDescriptor::new(Method::GET, "not a url");
        assert!(matches!(
            descriptor.build_url(&config),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_encode_form_fields() {
        let mut descriptor = RequestDescriptor::new(Method::POST, "https://x/");
        descriptor.push_field("a", "1");
        descriptor.push_field("b", "two words");
        assert_eq!(descriptor.encode_form_fields().unwrap(), b"a=1&b=two+words");
    }
}
