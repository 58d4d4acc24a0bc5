//! Routes and handlers
//!
//! | Method          | Path               | Effect                                   |
//! |-----------------|--------------------|------------------------------------------|
//! | `GET`           | `/latest`, `/`     | current document as `{"record": {...}}`  |
//! | `PUT`, `POST`   | `/update`          | replace the whole document               |
//! | `PUT`           | `/upsert`          | merge one `{key, record}` into it        |
//! | `OPTIONS`       | any                | CORS preflight                           |
//!
//! Every request is checked against the origin allow-list first.

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use flashsync_store::{Document, DocumentStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warp::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection};

const ALLOWED_METHODS: &str = "GET, PUT, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
const PREFLIGHT_MAX_AGE: &str = "86400";

#[derive(Debug, Deserialize)]
struct UpsertRequest {
    key: String,
    #[serde(default)]
    record: Value,
}

/// Shared proxy state
pub struct ProxyState<S> {
    config: ProxyConfig,
    store: Arc<S>,
    // Serializes writes so an upsert's read-merge-write is not interleaved
    // with another write through this proxy.
    write_lock: Mutex<()>,
}

impl<S: DocumentStore> ProxyState<S> {
    /// Create new proxy state over `store`
    #[must_use]
    pub fn new(config: ProxyConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Current document wrapped in the upstream envelope
    ///
    /// # Errors
    /// - `ProxyError::Store` when the backing store fails
    pub async fn latest(&self) -> Result<Value> {
        let document = self.store.fetch_document().await?;
        Ok(json!({ "record": document.into_value() }))
    }

    /// Replace the whole document with `body`
    ///
    /// Accepts either a bare object or one wrapped as `{"record": {...}}`.
    ///
    /// # Errors
    /// - `ProxyError::BadRequest` when `body` is not a JSON object
    /// - `ProxyError::Store` when the backing store fails
    pub async fn update(&self, body: &[u8]) -> Result<Value> {
        let value: Value = serde_json::from_slice(body).map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        let document = Document::from_body(value).map_err(|e| ProxyError::BadRequest(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        self.store.replace_document(&document).await?;
        info!(records = document.len(), "Replaced document");
        Ok(json!({ "record": document.into_value() }))
    }

    /// Merge one `{key, record}` into the document
    ///
    /// # Errors
    /// - `ProxyError::BadRequest` for a malformed body or empty key
    /// - `ProxyError::Store` when the backing store fails
    pub async fn upsert(&self, body: &[u8]) -> Result<Value> {
        let request: UpsertRequest =
            serde_json::from_slice(body).map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        if request.key.is_empty() {
            return Err(ProxyError::BadRequest("key must not be empty".into()));
        }

        let _guard = self.write_lock.lock().await;
        let stored = self.store.upsert_key(&request.key, request.record).await?;
        debug!(key = %request.key, "Upserted record");
        Ok(json!({ "key": request.key, "record": stored }))
    }
}

/// All proxy routes over `state`
pub fn routes<S: DocumentStore>(
    state: Arc<ProxyState<S>>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone + Send + Sync + 'static {
    let with_state = warp::any().map(move || Arc::clone(&state));
    let origin = warp::header::optional::<String>("origin");

    let preflight = warp::options()
        .and(origin.clone())
        .and(with_state.clone())
        .map(|origin: Option<String>, state: Arc<ProxyState<S>>| handle_preflight(state.config(), origin.as_deref()));

    let latest = warp::get()
        .and(warp::path!("latest").or(warp::path::end()).unify())
        .and(origin.clone())
        .and(with_state.clone())
        .and_then(handle_latest::<S>);

    let update = warp::put()
        .or(warp::post())
        .unify()
        .and(warp::path!("update"))
        .and(origin.clone())
        .and(with_state.clone())
        .and(warp::body::bytes())
        .and_then(handle_update::<S>);

    let upsert = warp::put()
        .and(warp::path!("upsert"))
        .and(origin.clone())
        .and(with_state.clone())
        .and(warp::body::bytes())
        .and_then(handle_upsert::<S>);

    let fallback = warp::any()
        .and(origin)
        .and(with_state)
        .map(|origin: Option<String>, state: Arc<ProxyState<S>>| {
            if !state.config().admits(origin.as_deref()) {
                return forbidden();
            }
            error_reply(StatusCode::NOT_FOUND, "Invalid path", origin.as_deref())
        });

    preflight
        .or(latest)
        .unify()
        .or(update)
        .unify()
        .or(upsert)
        .unify()
        .or(fallback)
        .unify()
}

/// Bind the proxy and return its address with the server future
///
/// The server stops once `shutdown` resolves.
///
/// # Errors
/// - `ProxyError::Config` when the listen address cannot be bound
pub fn bind<S: DocumentStore>(
    state: Arc<ProxyState<S>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()> + Send)> {
    let listen = state.config().listen;
    warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(listen, shutdown)
        .map_err(|e| ProxyError::Config(format!("bind {listen}: {e}")))
}

fn handle_preflight(config: &ProxyConfig, origin: Option<&str>) -> Response {
    if !config.admits(origin) {
        return forbidden();
    }
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    if let Some(origin) = origin {
        apply_cors(response.headers_mut(), origin);
    }
    response
}

async fn handle_latest<S: DocumentStore>(
    origin: Option<String>,
    state: Arc<ProxyState<S>>,
) -> std::result::Result<Response, Infallible> {
    if !state.config().admits(origin.as_deref()) {
        return Ok(forbidden());
    }
    Ok(respond(state.latest().await, origin.as_deref()))
}

async fn handle_update<S: DocumentStore>(
    origin: Option<String>,
    state: Arc<ProxyState<S>>,
    body: Bytes,
) -> std::result::Result<Response, Infallible> {
    if !state.config().admits(origin.as_deref()) {
        return Ok(forbidden());
    }
    Ok(respond(state.update(&body).await, origin.as_deref()))
}

async fn handle_upsert<S: DocumentStore>(
    origin: Option<String>,
    state: Arc<ProxyState<S>>,
    body: Bytes,
) -> std::result::Result<Response, Infallible> {
    if !state.config().admits(origin.as_deref()) {
        return Ok(forbidden());
    }
    Ok(respond(state.upsert(&body).await, origin.as_deref()))
}

fn respond(result: Result<Value>, origin: Option<&str>) -> Response {
    match result {
        Ok(body) => json_reply(StatusCode::OK, &body, origin),
        Err(err) => {
            let status = err.status();
            warn!(status = status.as_u16(), error = %err, "Request failed");
            error_reply(status, &err.to_string(), origin)
        }
    }
}

fn forbidden() -> Response {
    error_reply(StatusCode::FORBIDDEN, "Origin not allowed", None)
}

fn error_reply(status: StatusCode, message: &str, origin: Option<&str>) -> Response {
    json_reply(status, &json!({ "error": message }), origin)
}

fn json_reply(status: StatusCode, body: &Value, origin: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(origin) = origin {
        apply_cors(response.headers_mut(), origin);
    }
    response
}

fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    let Ok(origin) = HeaderValue::from_str(origin) else {
        return;
    };
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));
}
