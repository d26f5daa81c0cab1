//! HTTP client: the synchronous single-request surface.

use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::pool::Pool;
use crate::request::RequestDescriptor;
use crate::response::Response;
use crate::session::Session;
use crate::Result;

/// HTTP client.
///
/// Holds an explicit immutable [`ClientConfig`]; there is no shared
/// process-wide state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a client with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with the given configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::HEAD, url)
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            descriptor: RequestDescriptor::new(method, url),
        }
    }

    /// Create a request pool bound to this client's configuration.
    pub fn pool(&self) -> Pool {
        Pool::new(self.config.clone())
    }
}

/// Builder for one request.
///
/// Accumulates into an owned [`RequestDescriptor`] and finalizes on
/// [`send`](Self::send). For pooled or deferred execution,
/// [`into_session`](Self::into_session) yields the configured, unexecuted
/// session instead.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    descriptor: RequestDescriptor,
}

impl RequestBuilder<'_> {
    /// Add a header (replaces an existing value for the same name).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.set_header(name, value);
        self
    }

    /// Add several headers.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.descriptor.set_headers(headers);
        self
    }

    /// Set the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.descriptor.set_content_type(content_type);
        self
    }

    /// Send the body as url-encoded form fields.
    pub fn as_form(self) -> Self {
        self.content_type("application/x-www-form-urlencoded; charset=utf-8")
    }

    /// Send the body as JSON.
    pub fn as_json(self) -> Self {
        self.content_type("application/json; charset=utf-8")
    }

    /// Send the body as a multipart form.
    pub fn as_multipart(self) -> Self {
        self.content_type("multipart/form-data")
    }

    /// Accept a JSON response.
    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json; charset=utf-8")
    }

    /// Set a bearer token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_token_type(token, "Bearer")
    }

    /// Set an authorization token with an explicit scheme.
    pub fn with_token_type(self, token: impl Into<String>, scheme: impl Into<String>) -> Self {
        let value = format!("{} {}", scheme.into(), token.into());
        self.header("Authorization", value.trim().to_string())
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {encoded}"))
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.push_query(key, value);
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.descriptor.push_query(key, value);
        }
        self
    }

    /// Add a body field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.push_field(key, value);
        self
    }

    /// Set a JSON body. A value that cannot be serialized is logged and
    /// skipped.
    pub fn json<B: Serialize>(mut self, body: &B) -> Self {
        if let Err(e) = self.descriptor.set_json_body(body) {
            tracing::error!(error = %e, "failed to serialize JSON body");
        }
        self
    }

    /// Set a pre-encoded body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.descriptor.set_raw_body(body.into());
        self
    }

    /// Attach a file as a multipart part, resolving MIME type and file name
    /// from the path.
    pub fn attach(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.descriptor.push_attachment(field, path, None, None);
        self
    }

    /// Attach a file with an explicit MIME type and presented file name.
    pub fn attach_as(
        mut self,
        field: impl Into<String>,
        path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        self.descriptor
            .push_attachment(field, path, Some(mime_type.into()), Some(file_name.into()));
        self
    }

    /// Upload one file as the entire request body (switches to PUT).
    pub fn upload_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor.set_upload_file(path);
        self
    }

    /// Set a transport option by dotted path.
    pub fn transport_option(mut self, path: &str, value: Value) -> Self {
        self.descriptor.set_transport_option(path, value);
        self
    }

    /// Deep-merge a transport option tree.
    pub fn transport_options(mut self, tree: Value) -> Self {
        self.descriptor.merge_transport_options(tree);
        self
    }

    /// Set the per-transfer timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.set_timeout(timeout);
        self
    }

    /// The composed descriptor.
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Finalize into a configured, unexecuted [`Session`] for deferred or
    /// pooled execution.
    pub fn into_session(self) -> Result<Session> {
        Session::new(&self.descriptor, &self.client.config)
    }

    /// Send the request and block until the response is read.
    ///
    /// A transport failure raises [`Error::Transport`](crate::Error::Transport);
    /// HTTP-level failures (4xx/5xx) yield an ordinary [`Response`], which
    /// [`Response::error_for_status`] can escalate.
    pub fn send(self) -> Result<Response> {
        debug!(method = %self.descriptor.method(), url = self.descriptor.url(), "sending request");
        let mut session = self.into_session()?;
        session.execute()?;
        let response = session.take_response()?;
        session.close();
        Ok(response)
    }
}
