//! Typed JSON client bound to a base URL and a result type.
//!
//! # Design
//! `JsonClient<T>` holds only configuration fixed at `build()` time: the
//! parsed base URL, a shared transport, a cancellation context and the
//! headers sent on every request. Each verb runs the same linear path:
//! join path, encode query (GET only), build request, execute, require
//! 200, decode.
//! There is no retry and no per-call mutable state, so one client can be
//! shared across threads.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::context::Context;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::{QueryConfig, QueryOption, QueryParams};
use crate::transport::{Transport, UreqTransport};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Settings shared by every request a client issues.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub transport: Arc<dyn Transport>,
    pub context: Context,
    pub headers: BTreeMap<String, String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("context", &self.context)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Collects options for a `JsonClient`. Options apply in call order; the
/// base URL is parsed by `build()`.
pub struct JsonClientBuilder<T> {
    base_url: String,
    transport: Option<Arc<dyn Transport>>,
    context: Option<Context>,
    headers: BTreeMap<String, String>,
    _result: PhantomData<fn() -> T>,
}

impl<T> JsonClientBuilder<T> {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            transport: None,
            context: None,
            headers: BTreeMap::new(),
            _result: PhantomData,
        }
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Replace the header set sent with every request.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<JsonClient<T>, ClientError> {
        let base_url = Url::parse(&self.base_url).map_err(|source| ClientError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })?;
        let config = ClientConfig {
            base_url,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(UreqTransport::new())),
            context: self.context.unwrap_or_default(),
            headers: self.headers,
        };
        Ok(JsonClient {
            config,
            _result: PhantomData,
        })
    }
}

/// Client issuing JSON requests and decoding 200 responses into `T`.
pub struct JsonClient<T> {
    config: ClientConfig,
    _result: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonClient")
            .field("config", &self.config)
            .finish()
    }
}

impl<T> JsonClient<T> {
    /// Client with the default transport and a background context.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: &str) -> JsonClientBuilder<T> {
        JsonClientBuilder::new(base_url)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// Resolve `path` against the base URL and write `query` into it.
    pub fn resolve(&self, path: &str, query: &QueryParams) -> Result<Url, ClientError> {
        let mut url = join_path(&self.config.base_url, path)?;
        query.apply_to(&mut url);
        Ok(url)
    }

    /// Build the request for `method` without sending it. Configured
    /// headers are applied last and override the JSON content type.
    pub fn build_request(
        &self,
        method: HttpMethod,
        url: &Url,
        body: Option<Vec<u8>>,
        json_body: bool,
    ) -> HttpRequest {
        let mut request = HttpRequest {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body,
        };
        if json_body {
            request.set_header("content-type", JSON_CONTENT_TYPE);
        }
        for (name, value) in &self.config.headers {
            request.set_header(name, value);
        }
        request
    }
}

impl<T: DeserializeOwned> JsonClient<T> {
    /// GET `path` and decode the 200 response into `T`.
    pub fn get(&self, path: &str, options: &[QueryOption]) -> Result<T, ClientError> {
        let query = QueryConfig::from_options(options);
        self.execute(HttpMethod::Get, path, &query.params, None, false)
    }

    /// DELETE `path` with an optional raw body. As with every verb but GET,
    /// `params` are not written into the URL.
    pub fn delete(
        &self,
        path: &str,
        params: &QueryParams,
        body: Option<Vec<u8>>,
    ) -> Result<T, ClientError> {
        self.execute(HttpMethod::Delete, path, params, body, false)
    }

    fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        query: &QueryParams,
        body: Option<Vec<u8>>,
        json_body: bool,
    ) -> Result<T, ClientError> {
        // Only GET carries a query string; other verbs go to the bare path.
        let url = match method {
            HttpMethod::Get => self.resolve(path, query)?,
            _ => self.resolve(path, &QueryParams::new())?,
        };
        let context = &self.config.context;
        if let Some(source) = context.err() {
            return Err(ClientError::Cancelled {
                url: url.to_string(),
                source,
            });
        }

        let request = self.build_request(method, &url, body, json_body);
        info!(%method, url = %url, "sending request");

        let result = self.config.transport.execute(request, context);

        // Once the context has ended the call reports a cancellation, whatever
        // the transport surfaced.
        if let Some(source) = context.err() {
            return Err(ClientError::Cancelled {
                url: url.to_string(),
                source,
            });
        }
        let response = result.map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })?;

        decode(&url, response)
    }
}

impl<T: Serialize + DeserializeOwned> JsonClient<T> {
    /// POST `obj` as JSON to `path`. The response must be 200 and decode as
    /// `T`; the decoded value is discarded. Query options are accepted but
    /// only GET writes a query string.
    pub fn post(&self, path: &str, obj: &T, options: &[QueryOption]) -> Result<(), ClientError> {
        let body = serde_json::to_vec(obj).map_err(ClientError::Serialization)?;
        let query = QueryConfig::from_options(options);
        self.execute(HttpMethod::Post, path, &query.params, Some(body), true)
            .map(drop)
    }
}

/// Check for exactly 200 and decode the body.
fn decode<T: DeserializeOwned>(url: &Url, response: HttpResponse) -> Result<T, ClientError> {
    if response.status != 200 {
        warn!(url = %url, status = response.status, "unexpected status");
        return Err(ClientError::Status {
            url: url.to_string(),
            status: response.status,
            status_line: response.status_line(),
            body: response.body_text(),
        });
    }
    debug!(url = %url, bytes = response.body.len(), "decoding response");
    serde_json::from_slice(&response.body).map_err(|source| ClientError::Deserialization {
        url: url.to_string(),
        source,
    })
}

/// Append the segments of `path` to the base URL's path. Empty segments are
/// dropped; a trailing `/` on `path` is kept.
fn join_path(base: &Url, path: &str) -> Result<Url, ClientError> {
    let mut url = base.clone();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok(url);
    }
    {
        let mut parts = url.path_segments_mut().map_err(|()| {
            ClientError::RequestBuild(format!("cannot join path {path:?} onto {base}"))
        })?;
        parts.pop_if_empty().extend(segments);
        if path.ends_with('/') {
            parts.push("");
        }
    }
    Ok(url)
}
