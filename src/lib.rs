//! # Volley
//!
//! A synchronous HTTP client on libcurl with fluent request composition and
//! a pooled mode that dispatches many requests concurrently through one
//! multiplexer, where a single thread drives every in-flight transfer
//! through one non-blocking poll.
//!
//! ## Single request
//!
//! ```rust,no_run
//! use volley::Client;
//!
//! fn main() -> volley::Result<()> {
//!     let client = Client::new();
//!
//!     let response = client
//!         .get("https://api.example.com/users")
//!         .query("page", "2")
//!         .send()?;
//!
//!     println!("status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Pooled requests
//!
//! ```rust,no_run
//! use volley::{Client, PoolOptions};
//!
//! fn main() -> volley::Result<()> {
//!     let client = Client::new();
//!
//!     let results = client.pool().run(
//!         |pool| {
//!             pool.named("users").get("https://api.example.com/users");
//!             pool.named("orders").get("https://api.example.com/orders");
//!             pool.get("https://api.example.com/health");
//!         },
//!         PoolOptions::default(),
//!     )?;
//!
//!     for (key, outcome) in results {
//!         match outcome.response() {
//!             Some(response) => println!("{key}: {}", response.status()),
//!             None => println!("{key}: {}", outcome.error().unwrap()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! A transport failure of one pooled request never aborts its siblings; it
//! surfaces only in that request's slot. Results come back keyed and in
//! registration order regardless of completion timing.

mod client;
mod config;
mod error;
mod multi;
pub mod options;
mod pool;
mod request;
mod response;
mod session;

pub use client::{Client, RequestBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, MultiplexerError, Result, TransportError};
pub use multi::{Completion, Multiplexer, Token};
pub use pool::{Pool, PoolKey, PoolOptions, PoolOutcome, PoolRequest, PoolResults, WaitPolicy};
pub use request::{Attachment, BodyEncoding, RequestDescriptor};
pub use response::Response;
pub use session::{Session, TransferInfo};

// Re-export common types
pub use http::Method;
pub use url::Url;
pub use bytes::Bytes;

/// Prelude for common imports.
///
/// ```
/// use volley::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{Client, RequestBuilder};
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::error::{Error, MultiplexerError, Result, TransportError};
    pub use crate::pool::{Pool, PoolKey, PoolOptions, PoolOutcome, PoolResults, WaitPolicy};
    pub use crate::request::{BodyEncoding, RequestDescriptor};
    pub use crate::response::Response;
    pub use http::Method;
}
