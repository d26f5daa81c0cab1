//! Concurrent request pooling.
//!
//! A [`Pool`] issues many requests through one [`Multiplexer`] on a single
//! thread: sessions are built and registered in insertion order, a drive
//! loop advances them without per-transfer blocking, completions are
//! classified through caller-supplied hooks, and the aggregate result is
//! restored to registration order regardless of network timing.

use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::multi::{Multiplexer, Token};
use crate::request::RequestDescriptor;
use crate::response::Response;
use crate::session::Session;
use crate::{Error, MultiplexerError, Result, TransportError};

/// Key of one pooled request: explicit (`named`) or sequential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolKey {
    /// Auto-assigned position for unnamed registrations.
    Index(usize),
    /// Caller-chosen name.
    Named(String),
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Default hook output: the classified result of one pooled transfer.
#[derive(Debug)]
pub enum PoolOutcome {
    /// The transfer completed; HTTP-level failures (4xx/5xx) still land here.
    Fulfilled(Response),
    /// The transfer failed at the transport level.
    Rejected(TransportError),
}

impl PoolOutcome {
    /// The response, when fulfilled.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Fulfilled(response) => Some(response),
            Self::Rejected(_) => None,
        }
    }

    /// The transport error, when rejected.
    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(err) => Some(err),
        }
    }

    /// Whether the transfer completed.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Whether the transfer failed at the transport level.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Convert into a `Result`, raising the transport error when rejected.
    pub fn into_response(self) -> Result<Response> {
        match self {
            Self::Fulfilled(response) => Ok(response),
            Self::Rejected(err) => Err(Error::Transport(err)),
        }
    }
}

/// Caller policy for a failed multiplexer wait.
#[derive(Debug)]
pub enum WaitPolicy {
    /// Back off for one timeout interval and keep driving (the default).
    Retry,
    /// Abort the whole pool run with this error.
    Abort(Error),
}

type FulfilledHook<T> = Box<dyn FnMut(Response, &PoolKey) -> T>;
type RejectedHook<T> = Box<dyn FnMut(TransportError, &PoolKey) -> T>;
type RuntimeHook = Box<dyn FnMut(MultiplexerError) -> WaitPolicy>;

/// Options for one pool run.
///
/// The hooks convert each completed or failed transfer into the caller's
/// result type; the defaults are identity passthroughs producing
/// [`PoolOutcome`], which makes the pool a plain batch executor.
pub struct PoolOptions<T> {
    timeout: Duration,
    sort: bool,
    fulfilled: FulfilledHook<T>,
    rejected: RejectedHook<T>,
    runtime_rejected: RuntimeHook,
}

impl Default for PoolOptions<PoolOutcome> {
    fn default() -> Self {
        Self::with_hooks(
            |response, _| PoolOutcome::Fulfilled(response),
            |err, _| PoolOutcome::Rejected(err),
        )
    }
}

impl<T> PoolOptions<T> {
    /// Build options around custom fulfilled/rejected hooks.
    pub fn with_hooks<F, R>(fulfilled: F, rejected: R) -> Self
    where
        F: FnMut(Response, &PoolKey) -> T + 'static,
        R: FnMut(TransportError, &PoolKey) -> T + 'static,
    {
        Self {
            timeout: Duration::from_millis(100),
            sort: true,
            fulfilled: Box::new(fulfilled),
            rejected: Box::new(rejected),
            runtime_rejected: Box::new(|_| WaitPolicy::Retry),
        }
    }

    /// Set the per-`wait` timeout (not an aggregate deadline).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the final re-sort to registration order. When
    /// disabled, results are returned in completion order.
    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Set the policy hook for multiplexer wait failures.
    pub fn runtime_rejected<F>(mut self, hook: F) -> Self
    where
        F: FnMut(MultiplexerError) -> WaitPolicy + 'static,
    {
        self.runtime_rejected = Box::new(hook);
        self
    }
}

/// Aggregate result of a pool run: an insertion-ordered key/value map.
#[derive(Debug)]
pub struct PoolResults<T> {
    entries: Vec<(PoolKey, T)>,
}

impl<T> PoolResults<T> {
    /// Look up a result by key.
    pub fn get(&self, key: &PoolKey) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a result registered under a name.
    pub fn named(&self, name: &str) -> Option<&T> {
        self.get(&PoolKey::Named(name.to_string()))
    }

    /// Look up a result registered under a sequential index.
    pub fn index(&self, index: usize) -> Option<&T> {
        self.get(&PoolKey::Index(index))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the run produced no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in result order.
    pub fn keys(&self) -> impl Iterator<Item = &PoolKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Key/value pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&PoolKey, &T)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl<T> IntoIterator for PoolResults<T> {
    type Item = (PoolKey, T);
    type IntoIter = std::vec::IntoIter<(PoolKey, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Orchestrates many requests against one multiplexer.
///
/// A pool exclusively owns its multiplexer and every session it creates for
/// the duration of one [`run`](Pool::run); consuming `self` keeps two runs
/// from ever sharing them.
pub struct Pool {
    config: ClientConfig,
    requests: Vec<(PoolKey, RequestDescriptor)>,
    next_index: usize,
}

impl Pool {
    /// Create a pool with explicit configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            requests: Vec::new(),
            next_index: 0,
        }
    }

    /// Start a keyed registration.
    pub fn named(&mut self, key: impl Into<String>) -> PoolRequest<'_> {
        PoolRequest::new(self, Some(key.into()))
    }

    /// Start an unnamed registration, keyed by the next sequential index.
    pub fn prepare(&mut self) -> PoolRequest<'_> {
        PoolRequest::new(self, None)
    }

    /// Register an unnamed GET request.
    pub fn get(&mut self, url: impl Into<String>) {
        self.prepare().get(url);
    }

    /// Register an unnamed POST request.
    pub fn post(&mut self, url: impl Into<String>) {
        self.prepare().post(url);
    }

    /// Register an unnamed PUT request.
    pub fn put(&mut self, url: impl Into<String>) {
        self.prepare().put(url);
    }

    /// Register an unnamed PATCH request.
    pub fn patch(&mut self, url: impl Into<String>) {
        self.prepare().patch(url);
    }

    /// Register an unnamed DELETE request.
    pub fn delete(&mut self, url: impl Into<String>) {
        self.prepare().delete(url);
    }

    fn register(&mut self, key: Option<String>, descriptor: RequestDescriptor) {
        let key = match key {
            Some(name) => PoolKey::Named(name),
            None => {
                let key = PoolKey::Index(self.next_index);
                self.next_index += 1;
                key
            }
        };
        // registering the same named key again replaces the earlier request,
        // keeping its position
        match self.requests.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = descriptor,
            None => self.requests.push((key, descriptor)),
        }
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no requests are registered.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Run the pool: build and register a session per request, drive the
    /// multiplexer until every transfer finishes, classify completions
    /// through the hooks and return the keyed results.
    ///
    /// `build` registers the requests. A configuration or file error while
    /// building sessions aborts the run immediately. A per-request transport
    /// failure never does: it is reported through the `rejected` hook in its
    /// slot only.
    pub fn run<T, F>(mut self, build: F, mut options: PoolOptions<T>) -> Result<PoolResults<T>>
    where
        F: FnOnce(&mut Pool),
    {
        build(&mut self);
        debug!(requests = self.requests.len(), "starting pool run");

        let mut multiplexer = Multiplexer::new();
        let mut tokens: HashMap<Token, PoolKey> = HashMap::new();
        for (key, descriptor) in &self.requests {
            let session = Session::new(descriptor, &self.config)?;
            let token = multiplexer.add(session)?;
            tokens.insert(token, key.clone());
        }

        self.drive(&multiplexer, &mut options)?;

        let mut entries = self.drain(&mut multiplexer, &mut tokens, &mut options)?;
        multiplexer.close();

        if options.sort {
            entries = self.sort_entries(entries);
        }

        Ok(PoolResults { entries })
    }

    /// The drive loop: advance all transfers, block on the multiplexer's
    /// wait while any remain in flight. A wait failure is routed to the
    /// `runtime_rejected` policy; only an explicit abort ends the run early.
    fn drive<T>(&self, multiplexer: &Multiplexer, options: &mut PoolOptions<T>) -> Result<()> {
        loop {
            let active = match multiplexer.perform() {
                Ok(active) => active,
                Err(e) => {
                    // mirror of the wait-failure path is deliberate: a failed
                    // advance stops driving and lets draining classify
                    // whatever did complete
                    warn!(error = %e, "multiplexer perform failed; stopping drive loop");
                    return Ok(());
                }
            };
            if active == 0 {
                return Ok(());
            }
            if let Err(e) = multiplexer.wait(options.timeout) {
                warn!(error = %e, "multiplexer wait failed");
                handle_wait_failure(options, e)?;
            }
        }
    }

    /// Pop every completion, resolve its key by token, deregister the
    /// session and classify it through the hooks, in completion order.
    /// Registered keys that never produced a completion are reported as
    /// rejected with a code-0 sentinel rather than silently dropped.
    fn drain<T>(
        &self,
        multiplexer: &mut Multiplexer,
        tokens: &mut HashMap<Token, PoolKey>,
        options: &mut PoolOptions<T>,
    ) -> Result<Vec<(PoolKey, T)>> {
        let mut entries = Vec::with_capacity(self.requests.len());

        while let Some(completion) = multiplexer.next_completion() {
            let key = match tokens.remove(&completion.token) {
                Some(key) => key,
                None => {
                    debug!(token = completion.token, "completion for unknown token");
                    continue;
                }
            };
            let mut session = multiplexer.remove(completion.token)?;
            let value = match completion.result {
                Ok(()) => {
                    let response = session.take_response()?;
                    session.close();
                    (options.fulfilled)(response, &key)
                }
                Err(err) => {
                    debug!(key = %key, code = err.code, "transfer failed");
                    session.close();
                    (options.rejected)(err, &key)
                }
            };
            entries.push((key, value));
        }

        for (token, key) in tokens.drain() {
            warn!(key = %key, "transfer never completed");
            let mut session = multiplexer.remove(token)?;
            session.close();
            let err = TransportError::new(0, "transfer never completed");
            let value = (options.rejected)(err, &key);
            entries.push((key, value));
        }

        Ok(entries)
    }

    /// Rebuild the results in registration-key order.
    fn sort_entries<T>(&self, entries: Vec<(PoolKey, T)>) -> Vec<(PoolKey, T)> {
        let mut by_key: HashMap<PoolKey, T> = entries.into_iter().collect();
        let mut sorted = Vec::with_capacity(self.requests.len());
        for (key, _) in &self.requests {
            if let Some(value) = by_key.remove(key) {
                sorted.push((key.clone(), value));
            }
        }
        // anything not among the registered keys keeps completion order
        for (key, value) in by_key {
            sorted.push((key, value));
        }
        sorted
    }
}

/// Apply the caller's wait-failure policy: back off for one timeout
/// interval and keep driving, or abort the run with the chosen error.
fn handle_wait_failure<T>(options: &mut PoolOptions<T>, err: MultiplexerError) -> Result<()> {
    match (options.runtime_rejected)(err) {
        WaitPolicy::Retry => {
            std::thread::sleep(options.timeout);
            Ok(())
        }
        WaitPolicy::Abort(err) => Err(err),
    }
}

/// Fluent registration of one pooled request.
///
/// Composition methods mirror the single-request builder; the HTTP-method
/// call is terminal and registers the request under the pool key.
pub struct PoolRequest<'p> {
    pool: &'p mut Pool,
    key: Option<String>,
    descriptor: RequestDescriptor,
}

impl<'p> PoolRequest<'p> {
    fn new(pool: &'p mut Pool, key: Option<String>) -> Self {
        Self {
            pool,
            key,
            descriptor: RequestDescriptor::new(Method::GET, ""),
        }
    }

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

    /// Set a bearer token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.push_query(key, value);
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

    /// Attach a file as a multipart part.
    pub fn attach(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.descriptor.push_attachment(field, path, None, None);
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

    /// Set the per-transfer timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.set_timeout(timeout);
        self
    }

    /// Register a GET request.
    pub fn get(self, url: impl Into<String>) {
        self.register(Method::GET, url);
    }

    /// Register a POST request.
    pub fn post(self, url: impl Into<String>) {
        self.register(Method::POST, url);
    }

    /// Register a PUT request.
    pub fn put(self, url: impl Into<String>) {
        self.register(Method::PUT, url);
    }

    /// Register a PATCH request.
    pub fn patch(self, url: impl Into<String>) {
        self.register(Method::PATCH, url);
    }

    /// Register a DELETE request.
    pub fn delete(self, url: impl Into<String>) {
        self.register(Method::DELETE, url);
    }

    /// Register a HEAD request.
    pub fn head(self, url: impl Into<String>) {
        self.register(Method::HEAD, url);
    }

    /// Register a request with an explicit method.
    pub fn request(mut self, method: Method, url: impl Into<String>) {
        // a whole-body upload already pinned the method to PUT
        if self.descriptor.upload().is_none() {
            self.descriptor.set_method(method);
        }
        self.descriptor.set_url(url);
        self.pool.register(self.key, self.descriptor);
    }

    fn register(self, method: Method, url: impl Into<String>) {
        self.request(method, url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_and_keys() {
        let mut pool = Pool::new(ClientConfig::default());
        pool.named("first").get("http://a/");
        pool.get("http://b/");
        pool.named("second").get("http://c/");
        pool.get("http://d/");

        let keys: Vec<_> = pool.requests.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            [
                PoolKey::Named("first".into()),
                PoolKey::Index(0),
                PoolKey::Named("second".into()),
                PoolKey::Index(1),
            ]
        );
    }

    #[test]
    fn test_duplicate_named_key_replaces_in_place() {
        let mut pool = Pool::new(ClientConfig::default());
        pool.named("dup").get("http://old/");
        pool.get("http://other/");
        pool.named("dup").post("http://new/");

        assert_eq!(pool.len(), 2);
        let (key, descriptor) = &pool.requests[0];
        assert_eq!(key, &PoolKey::Named("dup".into()));
        assert_eq!(descriptor.url(), "http://new/");
        assert_eq!(descriptor.method(), &Method::POST);
    }

    #[test]
    fn test_pool_key_display() {
        assert_eq!(PoolKey::Index(3).to_string(), "3");
        assert_eq!(PoolKey::Named("users".into()).to_string(), "users");
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = PoolOutcome::Rejected(TransportError::new(7, "no route"));
        assert!(outcome.is_rejected());
        assert!(outcome.response().is_none());
        assert_eq!(outcome.error().unwrap().code, 7);
        assert!(outcome.into_response().is_err());
    }

    #[test]
    fn test_empty_run_yields_empty_results() {
        let pool = Pool::new(ClientConfig::default());
        let results = pool.run(|_| {}, PoolOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_config_error_aborts_run() {
        let pool = Pool::new(ClientConfig::default());
        let result = pool.run(
            |p| {
                p.prepare()
                    .transport_option("warp_speed", serde_json::json!(9))
                    .get("http://127.0.0.1/");
            },
            PoolOptions::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_wait_failure_retry_backs_off_and_continues() {
        let mut options = PoolOptions::default().timeout(Duration::from_millis(10));
        let started = std::time::Instant::now();
        let result = handle_wait_failure(&mut options, MultiplexerError::new(1, "bad socket"));
        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_wait_failure_abort_raises_policy_error() {
        let mut options = PoolOptions::default()
            .runtime_rejected(|e| WaitPolicy::Abort(Error::Multiplexer(e)));
        let result = handle_wait_failure(&mut options, MultiplexerError::new(7, "select failed"));
        assert!(matches!(
            result,
            Err(Error::Multiplexer(ref e)) if e.code == 7
        ));
    }

    #[test]
    fn test_unobserved_transfer_rejected_as_incomplete() {
        let pool = Pool::new(ClientConfig::default());
        let mut multiplexer = Multiplexer::new();

        // registered but never driven, so no completion is ever reported
        let descriptor = RequestDescriptor::new(Method::GET, "http://127.0.0.1/");
        let session = Session::new(&descriptor, &ClientConfig::default()).unwrap();
        let token = multiplexer.add(session).unwrap();
        let mut tokens = HashMap::new();
        tokens.insert(token, PoolKey::Named("stuck".into()));

        let mut options = PoolOptions::default();
        let entries = pool
            .drain(&mut multiplexer, &mut tokens, &mut options)
            .unwrap();

        assert_eq!(entries.len(), 1);
        let (key, outcome) = &entries[0];
        assert_eq!(key, &PoolKey::Named("stuck".into()));
        assert!(outcome.error().unwrap().is_incomplete());
        assert!(multiplexer.is_empty());
    }

    #[test]
    fn test_upload_method_survives_terminal_verb() {
        let mut pool = Pool::new(ClientConfig::default());
        pool.prepare()
            .upload_file("/tmp/whatever.bin")
            .request(Method::POST, "http://x/");
        assert_eq!(pool.requests[0].1.method(), &Method::PUT);
    }
}
