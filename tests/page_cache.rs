//! End-to-end behavior of the page cache middleware wrapped around a host router.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use frontcache::cache::{
    CACHE_STATUS_HEADER, CacheConfig, CacheGate, CacheKey, CacheState, Controller,
    ControllerKind, DeviceClass, MaintenanceSwitch, PageStore, SessionState, StoreDriver,
    StoreError, Storefront, build_store, page_cache_layer,
};
use futures::stream;
use tower::ServiceExt;

const CUSTOMER_HEADER: &str = "x-test-customer";
const CART_HEADER: &str = "x-test-cart";
const DEVICE_HEADER: &str = "x-test-device";

struct Harness {
    app: Router,
    gate: CacheState,
    renders: Arc<AtomicUsize>,
    maintenance: Arc<MaintenanceSwitch>,
}

impl Harness {
    fn new(config: CacheConfig) -> Self {
        let store = build_store(&config);
        Self::with_store(config, store)
    }

    fn with_store(config: CacheConfig, store: Arc<dyn PageStore>) -> Self {
        let renders = Arc::new(AtomicUsize::new(0));
        let maintenance = Arc::new(MaintenanceSwitch::default());
        let gate: CacheState = Arc::new(CacheGate::new(config, store, maintenance.clone()));

        let app = Router::new()
            .route("/shoes", get(render_page).post(render_page))
            .route("/order", get(render_page))
            .route("/admin", get(render_page))
            .route("/cart/add", get(add_to_cart))
            .route("/api/stock", get(render_json))
            .route("/lookbook", get(render_broken_stream))
            .route("/catalog", get(render_long_stream))
            .with_state(renders.clone())
            .layer(middleware::from_fn_with_state(gate.clone(), page_cache_layer))
            .layer(middleware::from_fn(attach_host_context));

        Self {
            app,
            gate,
            renders,
            maintenance,
        }
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Resolves locale, shop, device, controller and session the way a host dispatcher would.
async fn attach_host_context(mut request: Request<Body>, next: Next) -> Response {
    let controller = match request.uri().path() {
        "/order" => Controller::front("OrderController"),
        "/admin" => Controller::new("AdminProductsController", ControllerKind::Admin),
        "/cart/add" => Controller::front("CartController"),
        _ => Controller::front("CategoryController"),
    };

    let headers = request.headers();
    let device = match headers.get(DEVICE_HEADER).and_then(|v| v.to_str().ok()) {
        Some("mobile") => Some(DeviceClass::Mobile),
        Some("tablet") => Some(DeviceClass::Tablet),
        _ => Some(DeviceClass::Desktop),
    };
    let session = SessionState {
        principal: headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        cart_items: headers
            .get(CART_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()),
    };

    let extensions = request.extensions_mut();
    extensions.insert(Storefront {
        locale_id: Some("en".to_string()),
        store_id: Some("1".to_string()),
        device,
        debug: false,
    });
    extensions.insert(controller);
    extensions.insert(session);

    next.run(request).await
}

async fn render_page(State(renders): State<Arc<AtomicUsize>>) -> Html<String> {
    let count = renders.fetch_add(1, Ordering::SeqCst) + 1;
    Html(format!("<html><body>render {count}</body></html>"))
}

async fn add_to_cart(State(renders): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    renders.fetch_add(1, Ordering::SeqCst);
    (
        Extension(SessionState {
            principal: None,
            cart_items: Some(1),
        }),
        Html("<html><body>added</body></html>"),
    )
}

async fn render_json(State(renders): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    renders.fetch_add(1, Ordering::SeqCst);
    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        "{\"stock\":3}",
    )
}

async fn render_broken_stream(State(renders): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    renders.fetch_add(1, Ordering::SeqCst);
    let chunks: Vec<Result<&'static str, io::Error>> =
        vec![Ok("<html>"), Err(io::Error::other("template crashed"))];
    (
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from_stream(stream::iter(chunks)),
    )
}

async fn render_long_stream(State(renders): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    renders.fetch_add(1, Ordering::SeqCst);
    let chunks: Vec<Result<&'static str, io::Error>> =
        vec![Ok("<html><body>"), Ok("many products"), Ok("</body></html>")];
    (
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from_stream(stream::iter(chunks)),
    )
}

struct UnreachableStore;

#[async_trait]
impl PageStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::Task("connection refused".to_string()))
    }

    async fn set(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Task("connection refused".to_string()))
    }

    async fn clean(&self) -> Result<(), StoreError> {
        Err(StoreError::Task("connection refused".to_string()))
    }
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn is_hit(response: &Response) -> bool {
    response
        .headers()
        .get(CACHE_STATUS_HEADER)
        .is_some_and(|value| value == "HIT")
}

#[tokio::test]
async fn second_request_is_served_without_rendering() {
    let harness = Harness::new(CacheConfig::default());

    let first = harness.get("/shoes").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(!is_hit(&first));
    assert_eq!(body_text(first).await, "<html><body>render 1</body></html>");

    let second = harness.get("/shoes").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(is_hit(&second));
    let body = body_text(second).await;
    assert!(body.starts_with("<!-- "));
    assert!(body.contains(" from memory on "));
    assert!(body.ends_with("<html><body>render 1</body></html>"));

    assert_eq!(harness.renders(), 1);
}

#[tokio::test]
async fn query_strings_are_cached_separately() {
    let harness = Harness::new(CacheConfig::default());

    harness.get("/shoes?page=1").await;
    harness.get("/shoes?page=2").await;
    assert_eq!(harness.renders(), 2);

    assert!(is_hit(&harness.get("/shoes?page=2").await));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn checkout_pages_are_never_cached() {
    let harness = Harness::new(CacheConfig::default());

    for _ in 0..3 {
        let response = harness.get("/order").await;
        assert!(!is_hit(&response));
    }
    assert_eq!(harness.renders(), 3);
}

#[tokio::test]
async fn back_office_and_non_html_responses_are_not_cached() {
    let harness = Harness::new(CacheConfig::default());

    harness.get("/admin").await;
    harness.get("/admin").await;
    harness.get("/api/stock").await;
    harness.get("/api/stock").await;
    assert_eq!(harness.renders(), 4);
}

#[tokio::test]
async fn personalized_sessions_bypass_the_cache() {
    let harness = Harness::new(CacheConfig::default());
    harness.get("/shoes").await;

    let logged_in = Request::builder()
        .uri("/shoes")
        .header(CUSTOMER_HEADER, "customer-7")
        .body(Body::empty())
        .unwrap();
    let response = harness.send(logged_in).await;
    assert!(!is_hit(&response));
    assert_eq!(body_text(response).await, "<html><body>render 2</body></html>");

    let with_cart = Request::builder()
        .uri("/shoes")
        .header(CART_HEADER, "2")
        .body(Body::empty())
        .unwrap();
    assert!(!is_hit(&harness.send(with_cart).await));
    assert_eq!(harness.renders(), 3);

    // The anonymous entry was never overwritten by a personalized render.
    let anonymous = harness.get("/shoes").await;
    assert!(is_hit(&anonymous));
    assert!(body_text(anonymous).await.ends_with("render 1</body></html>"));
}

#[tokio::test]
async fn empty_cart_is_still_cacheable() {
    let harness = Harness::new(CacheConfig::default());

    let request = || {
        Request::builder()
            .uri("/shoes")
            .header(CART_HEADER, "0")
            .body(Body::empty())
            .unwrap()
    };
    harness.send(request()).await;
    assert!(is_hit(&harness.send(request()).await));
    assert_eq!(harness.renders(), 1);
}

#[tokio::test]
async fn cart_filled_during_render_is_not_recorded() {
    let harness = Harness::new(CacheConfig::default());

    harness.get("/cart/add").await;
    let second = harness.get("/cart/add").await;
    assert!(!is_hit(&second));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn unsafe_methods_bypass_the_cache() {
    let harness = Harness::new(CacheConfig::default());
    harness.get("/shoes").await;

    let post = Request::builder()
        .method(Method::POST)
        .uri("/shoes")
        .body(Body::empty())
        .unwrap();
    assert!(!is_hit(&harness.send(post).await));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn maintenance_mode_bypasses_the_cache() {
    let harness = Harness::new(CacheConfig::default());
    harness.get("/shoes").await;

    harness.maintenance.set(true);
    assert!(!is_hit(&harness.get("/shoes").await));
    assert_eq!(harness.renders(), 2);

    harness.maintenance.set(false);
    assert!(is_hit(&harness.get("/shoes").await));
}

#[tokio::test]
async fn content_mutation_purges_every_page() {
    let harness = Harness::new(CacheConfig::default());
    harness.get("/shoes").await;
    harness.get("/shoes?page=2").await;

    let purged = harness
        .gate
        .listener()
        .content_mutated()
        .await
        .expect("purge succeeds");
    assert!(purged);

    assert!(!is_hit(&harness.get("/shoes").await));
    assert!(!is_hit(&harness.get("/shoes?page=2").await));
    assert_eq!(harness.renders(), 4);
}

#[tokio::test]
async fn deactivation_stops_reads_and_writes_until_reactivated() {
    let harness = Harness::new(CacheConfig::default());
    harness.get("/shoes").await;

    let listener = harness.gate.listener();
    listener.deactivate().await.expect("purge succeeds");

    harness.get("/shoes").await;
    harness.get("/shoes").await;
    assert_eq!(harness.renders(), 3);

    listener.activate();
    harness.get("/shoes").await;
    assert!(is_hit(&harness.get("/shoes").await));
    assert_eq!(harness.renders(), 4);
}

#[tokio::test]
async fn device_classes_are_split_when_configured() {
    let harness = Harness::new(CacheConfig {
        separate_mobile_and_desktop: true,
        ..Default::default()
    });

    let request = |device: &str| {
        Request::builder()
            .uri("/shoes")
            .header(DEVICE_HEADER, device)
            .body(Body::empty())
            .unwrap()
    };

    harness.send(request("desktop")).await;
    let mobile = harness.send(request("mobile")).await;
    assert!(!is_hit(&mobile));
    assert_eq!(harness.renders(), 2);

    assert!(is_hit(&harness.send(request("mobile")).await));
    assert!(is_hit(&harness.send(request("desktop")).await));
}

#[tokio::test]
async fn device_classes_share_entries_by_default() {
    let harness = Harness::new(CacheConfig::default());

    harness.get("/shoes").await;
    let mobile = Request::builder()
        .uri("/shoes")
        .header(DEVICE_HEADER, "mobile")
        .body(Body::empty())
        .unwrap();
    assert!(is_hit(&harness.send(mobile).await));
}

#[tokio::test]
async fn oversized_pages_are_served_but_not_stored() {
    let harness = Harness::new(CacheConfig {
        max_body_bytes: 8,
        ..Default::default()
    });

    let first = harness.get("/shoes").await;
    assert_eq!(body_text(first).await, "<html><body>render 1</body></html>");
    assert!(!is_hit(&harness.get("/shoes").await));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn file_backend_serves_pages_across_gates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CacheConfig {
        driver: StoreDriver::Files,
        directory: dir.path().join("pages"),
        ..Default::default()
    };

    let writer = Harness::new(config.clone());
    writer.get("/shoes").await;

    // A second process sharing the directory sees the page.
    let reader = Harness::new(config);
    let response = reader.get("/shoes").await;
    assert!(is_hit(&response));
    assert!(body_text(response).await.contains(" from files on "));
    assert_eq!(reader.renders(), 0);

    writer.gate.listener().purge("test").await.expect("purge");
    assert!(!is_hit(&reader.get("/shoes").await));
}

#[tokio::test]
async fn huge_ttl_caches_without_failing_the_request() {
    let harness = Harness::new(CacheConfig {
        ttl: Duration::from_secs(u64::MAX),
        ..Default::default()
    });

    let first = harness.get("/shoes").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(is_hit(&harness.get("/shoes").await));
    assert_eq!(harness.renders(), 1);
}

#[tokio::test]
async fn failing_page_body_reaches_the_client_unchanged() {
    let harness = Harness::new(CacheConfig::default());

    let response = harness.get("/lookbook").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());

    assert!(!is_hit(&harness.get("/lookbook").await));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn streamed_pages_over_the_limit_pass_through() {
    let harness = Harness::new(CacheConfig {
        max_body_bytes: 16,
        ..Default::default()
    });

    let response = harness.get("/catalog").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "<html><body>many products</body></html>"
    );
    assert!(!is_hit(&harness.get("/catalog").await));
    assert_eq!(harness.renders(), 2);
}

#[tokio::test]
async fn streamed_pages_within_the_limit_are_cached() {
    let harness = Harness::new(CacheConfig::default());

    harness.get("/catalog").await;
    let second = harness.get("/catalog").await;
    assert!(is_hit(&second));
    assert!(body_text(second).await.ends_with("<html><body>many products</body></html>"));
    assert_eq!(harness.renders(), 1);
}

#[tokio::test]
async fn store_failures_never_reach_the_visitor() {
    let harness = Harness::with_store(CacheConfig::default(), Arc::new(UnreachableStore));

    for expected in 1..=2 {
        let response = harness.get("/shoes").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!is_hit(&response));
        assert_eq!(
            body_text(response).await,
            format!("<html><body>render {expected}</body></html>")
        );
    }
}
