//! The transfer multiplexer.
//!
//! Wraps one native multi handle: many registered sessions advance together
//! through non-blocking [`perform`](Multiplexer::perform) steps, with
//! [`wait`](Multiplexer::wait) as the only blocking point and completed
//! transfers reported one at a time through
//! [`next_completion`](Multiplexer::next_completion).

use curl::multi::{Easy2Handle, Multi};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

use crate::session::{Collector, Session};
use crate::{Error, MultiplexerError, Result, TransportError};

/// Opaque registration token resolving a completion back to its session.
pub type Token = usize;

/// One completed-transfer notification.
#[derive(Debug)]
pub struct Completion {
    /// Token of the session the notification belongs to.
    pub token: Token,
    /// Per-transfer outcome; `Err` carries the native failure.
    pub result: std::result::Result<(), TransportError>,
}

/// Drives many sessions concurrently without per-session blocking.
pub struct Multiplexer {
    multi: Option<Multi>,
    handles: HashMap<Token, Easy2Handle<Collector>>,
    pending: VecDeque<Completion>,
    next_token: Token,
}

impl Multiplexer {
    /// Acquire a multi handle.
    ///
    /// Multi-level options are best-effort: a transport that rejects one is
    /// logged and otherwise ignored.
    pub fn new() -> Self {
        let mut multi = Multi::new();
        if let Err(e) = multi.pipelining(false, true) {
            debug!(error = %e, "multiplexer rejected http multiplexing option");
        }
        Self {
            multi: Some(multi),
            handles: HashMap::new(),
            pending: VecDeque::new(),
            next_token: 0,
        }
    }

    fn multi(&self) -> std::result::Result<&Multi, MultiplexerError> {
        self.multi
            .as_ref()
            .ok_or_else(|| MultiplexerError::new(0, "multiplexer closed"))
    }

    /// Register a session, tagging its native handle with a token.
    pub fn add(&mut self, session: Session) -> Result<Token> {
        let easy = session.into_handle()?;
        let token = self.next_token;
        self.next_token += 1;

        let mut handle = self
            .multi()
            .map_err(Error::Multiplexer)?
            .add2(easy)
            .map_err(|e| Error::Multiplexer(e.into()))?;
        handle
            .set_token(token)
            .map_err(|e| Error::Transport(e.into()))?;
        self.handles.insert(token, handle);
        Ok(token)
    }

    /// Deregister a session and hand it back for reading and closing.
    /// Legal mid-flight; the underlying transfer merely stops being tracked.
    pub fn remove(&mut self, token: Token) -> Result<Session> {
        let handle = self
            .handles
            .remove(&token)
            .ok_or_else(|| Error::Config(format!("no session registered for token {token}")))?;
        let easy = self
            .multi()
            .map_err(Error::Multiplexer)?
            .remove2(handle)
            .map_err(|e| Error::Multiplexer(e.into()))?;
        Ok(Session::from_handle(easy))
    }

    /// Number of sessions currently registered.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Advance every registered transfer one non-blocking step, returning
    /// the number still in flight.
    pub fn perform(&self) -> std::result::Result<u32, MultiplexerError> {
        self.multi()?.perform().map_err(MultiplexerError::from)
    }

    /// Block until a handle is ready or `timeout` elapses, returning the
    /// number of ready handles. An `Err` here is a failure of the wait
    /// mechanism itself, not of any transfer.
    pub fn wait(&self, timeout: Duration) -> std::result::Result<u32, MultiplexerError> {
        self.multi()?
            .wait(&mut [], timeout)
            .map_err(MultiplexerError::from)
    }

    /// Pop one completed-transfer notification, or `None` when no more are
    /// pending.
    pub fn next_completion(&mut self) -> Option<Completion> {
        if self.pending.is_empty() {
            let multi = self.multi.as_ref()?;
            let pending = &mut self.pending;
            multi.messages(|message| {
                let token = match message.token() {
                    Ok(token) => token,
                    Err(e) => {
                        debug!(error = %e, "discarding completion with unreadable token");
                        return;
                    }
                };
                if let Some(result) = message.result() {
                    pending.push_back(Completion {
                        token,
                        result: result.map_err(TransportError::from),
                    });
                }
            });
        }
        self.pending.pop_front()
    }

    /// Release the multi handle and drop every still-registered session.
    /// Idempotent.
    pub fn close(&mut self) {
        self.handles.clear();
        self.pending.clear();
        self.multi = None;
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.close();
    }
}
