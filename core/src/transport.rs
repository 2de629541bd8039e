//! The pluggable "execute a request, return a response" seam.
//!
//! # Design
//! `JsonClient` never talks to the network itself. It hands an
//! `HttpRequest` and its bound `Context` to a `Transport`, which must return
//! the response with the body fully read. Any `Fn(HttpRequest, &Context)`
//! closure is a transport, which keeps test doubles to a few lines.
//! `UreqTransport` is the default.

use std::fmt;

use tracing::debug;

use crate::context::Context;
use crate::error::BoxError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one HTTP round-trip.
///
/// Implementations must be safe to call from several threads at once and
/// should stop waiting once `ctx` is done.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest, ctx: &Context) -> Result<HttpResponse, BoxError>;
}

impl<F> Transport for F
where
    F: Fn(HttpRequest, &Context) -> Result<HttpResponse, BoxError> + Send + Sync,
{
    fn execute(&self, request: HttpRequest, ctx: &Context) -> Result<HttpResponse, BoxError> {
        self(request, ctx)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
///
/// 4xx/5xx answers come back as responses, not errors, so the client can
/// report them with their body. The ureq call runs on a blocking thread and
/// is raced against the context: a cancel or an elapsed deadline returns
/// at once and abandons the in-flight call. Each call is also bounded by
/// the context's remaining time. Response bodies are read up to
/// `body_limit` bytes, unbounded by default.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    body_limit: u64,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self::with_agent(agent)
    }

    /// Use a caller-configured agent. Its `http_status_as_error` setting is
    /// left as is.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self {
            agent,
            body_limit: u64::MAX,
        }
    }

    /// Fail responses whose body exceeds `limit` bytes.
    pub fn with_body_limit(mut self, limit: u64) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn body_limit(&self) -> u64 {
        self.body_limit
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest, ctx: &Context) -> Result<HttpResponse, BoxError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let agent = self.agent.clone();
        let body_limit = self.body_limit;
        let timeout = ctx.remaining();
        let result = runtime.block_on(async {
            let call = tokio::task::spawn_blocking(move || {
                send(&agent, request, timeout, body_limit)
            });
            tokio::select! {
                joined = call => joined.map_err(BoxError::from).and_then(|result| result),
                err = ctx.done() => Err(BoxError::from(err)),
            }
        });

        // An abandoned call finishes on its own; don't wait for it.
        runtime.shutdown_background();
        result
    }
}

/// Run one request on `agent` and read the full response.
fn send(
    agent: &ureq::Agent,
    request: HttpRequest,
    timeout: Option<std::time::Duration>,
    body_limit: u64,
) -> Result<HttpResponse, BoxError> {
    let url = request.url.as_str();

    let mut response = match (request.method, request.body) {
        (HttpMethod::Get, _) => {
            let mut builder = agent.get(url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.config().timeout_global(timeout).build().call()?
        }
        (HttpMethod::Delete, body) => {
            let mut builder = agent.delete(url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let builder = builder.config().timeout_global(timeout).build();
            match body {
                Some(body) => builder.force_send_body().send(&body[..])?,
                None => builder.call()?,
            }
        }
        (HttpMethod::Post, body) => {
            let mut builder = agent.post(url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let builder = builder.config().timeout_global(timeout).build();
            match body {
                Some(body) => builder.send(&body[..])?,
                None => builder.send_empty()?,
            }
        }
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(body_limit)
        .read_to_vec()?;
    debug!(status, bytes = body.len(), "response body read");

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
