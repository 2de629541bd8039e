//! Typed JSON-over-HTTP client.
//!
//! # Overview
//! `JsonClient<T>` is bound to a base URL and a result type `T`. `get` and
//! `delete` decode a 200 response body into `T`; `post` serializes a `T` as
//! the request body. All three share one execution path and never retry.
//!
//! # Design
//! - Configuration (transport, context, headers) is fixed by
//!   `JsonClientBuilder::build`; the client is `Clone + Send + Sync`.
//! - The network sits behind the `Transport` trait. `UreqTransport` is the
//!   default; any matching closure works as a test double.
//! - A `Context` carries cancellation and a deadline into every request.
//! - Anything but status 200 is an error carrying URL, status line and body.

pub mod client;
pub mod context;
pub mod error;
pub mod http;
pub mod query;
pub mod transport;

pub use client::{ClientConfig, JsonClient, JsonClientBuilder};
pub use context::{CancelHandle, Context, ContextError};
pub use error::{BoxError, ClientError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use query::{QueryConfig, QueryOption, QueryParams};
pub use transport::{Transport, UreqTransport};
