//! End-to-end: HTTP store client -> proxy -> fake JSON-bin upstream

use flashsync_proxy::{bind, ProxyConfig, ProxyState};
use flashsync_store::{DocumentStore, HttpDocumentStore, HttpStoreConfig, StoreError};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

const BIN: &str = "bin1";
const KEY: &str = "upstream-secret";
const ORIGIN: &str = "https://cards.example";

/// Minimal JSON-bin: one bin, master key required
fn spawn_upstream(document: Arc<Mutex<Value>>) -> SocketAddr {
    let authorized = warp::header::optional::<String>("x-master-key").and_then(|key: Option<String>| async move {
        if key.as_deref() == Some(KEY) {
            Ok::<(), warp::Rejection>(())
        } else {
            Err(warp::reject::not_found())
        }
    });
    let read = Arc::clone(&document);
    let latest = warp::get()
        .and(warp::path!("b" / "bin1" / "latest"))
        .and(authorized.clone())
        .map(move |()| warp::reply::json(&json!({"record": read.lock().clone(), "metadata": {"id": BIN}})));
    let replace = warp::put()
        .and(warp::path!("b" / "bin1"))
        .and(authorized)
        .and(warp::body::json())
        .map(move |(), body: Value| {
            *document.lock() = body.clone();
            warp::reply::json(&json!({"record": body, "metadata": {"parentId": BIN}}))
        });
    let denied = warp::any().map(|| {
        warp::reply::with_status(
            warp::reply::json(&json!({"message": "Invalid X-Master-Key"})),
            StatusCode::UNAUTHORIZED,
        )
    });

    let routes = latest.or(replace).unify().or(denied);
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn spawn_proxy(upstream: SocketAddr, key: &str) -> SocketAddr {
    let config = ProxyConfig::new()
        .with_listen(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_allowed_origins([ORIGIN])
        .with_upstream(format!("http://{upstream}"), BIN, key);
    let store = config.upstream_store().unwrap();
    let state = Arc::new(ProxyState::new(config, Arc::new(store)));
    let (addr, server) = bind(state, std::future::pending()).unwrap();
    tokio::spawn(server);
    addr
}

fn client(proxy: SocketAddr) -> HttpDocumentStore {
    HttpDocumentStore::new(HttpStoreConfig::for_proxy(&format!("http://{proxy}"))).unwrap()
}

#[tokio::test]
async fn fetch_passes_through_the_envelope() {
    let upstream = spawn_upstream(Arc::new(Mutex::new(json!({"vocab1-1": {"stars": 3}}))));
    let proxy = spawn_proxy(upstream, KEY);

    let document = client(proxy).fetch_document().await.unwrap();

    assert_eq!(document.len(), 1);
    assert_eq!(document.get("vocab1-1"), Some(&json!({"stars": 3})));
}

#[tokio::test]
async fn upsert_merges_into_upstream_document() {
    let bin = Arc::new(Mutex::new(json!({"other-0": {"stars": 1}})));
    let upstream = spawn_upstream(Arc::clone(&bin));
    let proxy = spawn_proxy(upstream, KEY);

    let stored = client(proxy)
        .upsert_key("vocab1-2", json!({"key": "vocab1-2", "stars": 5}))
        .await
        .unwrap();

    assert_eq!(stored["stars"], json!(5));
    assert_eq!(
        *bin.lock(),
        json!({"other-0": {"stars": 1}, "vocab1-2": {"key": "vocab1-2", "stars": 5}})
    );
}

#[tokio::test]
async fn concurrent_upserts_through_the_proxy_are_not_lost() {
    let bin = Arc::new(Mutex::new(json!({})));
    let upstream = spawn_upstream(Arc::clone(&bin));
    let proxy = spawn_proxy(upstream, KEY);
    let store = Arc::new(client(proxy));

    let writes: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.upsert_key(&format!("k-{i}"), json!({"stars": 1})).await })
        })
        .collect();
    for write in writes {
        write.await.unwrap().unwrap();
    }

    assert_eq!(bin.lock().as_object().map(serde_json::Map::len), Some(8));
}

#[tokio::test]
async fn upstream_rejection_keeps_its_status() {
    let upstream = spawn_upstream(Arc::new(Mutex::new(json!({}))));
    let proxy = spawn_proxy(upstream, "wrong-key");

    let err = client(proxy).fetch_document().await.unwrap_err();

    assert!(matches!(err, StoreError::Client { status: 401, .. }), "{err:?}");
}

#[tokio::test]
async fn unreachable_upstream_is_a_gateway_error() {
    let proxy = spawn_proxy(SocketAddr::from(([127, 0, 0, 1], 9)), KEY);

    let err = client(proxy).fetch_document().await.unwrap_err();

    assert!(matches!(err.status(), Some(502 | 504)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn browser_requests_get_cors_headers() {
    let upstream = spawn_upstream(Arc::new(Mutex::new(json!({}))));
    let proxy = spawn_proxy(upstream, KEY);
    let http = reqwest::Client::new();

    let allowed = http
        .get(format!("http://{proxy}/latest"))
        .header("origin", ORIGIN)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status().as_u16(), 200);
    assert_eq!(allowed.headers()["access-control-allow-origin"], ORIGIN);

    let denied = http
        .get(format!("http://{proxy}/latest"))
        .header("origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);
    assert!(denied.headers().get("access-control-allow-origin").is_none());
}
