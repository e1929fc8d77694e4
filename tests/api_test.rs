use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use hookbox::api::{AppState, router};
use hookbox::config::{ByteSize, Config};
use hookbox::ledger::{LedgerStore, PolicyStore};
use hookbox::model::{DeliveryKind, DeliveryStatus, HookType, NewDeliveryRecord, Policy, Target};
use hookbox::observability::Metrics;

struct TestApp {
    app: Router,
    store: Arc<LedgerStore>,
    metrics: Arc<Metrics>,
    _dir: TempDir,
}

fn build_test_app() -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());
    let metrics = Arc::new(Metrics::new());

    let mut config = Config::default();
    config.server.max_callback_bytes = ByteSize(256);

    let state = AppState::new(Arc::new(config), store.clone(), metrics.clone());
    TestApp {
        app: router(state),
        store,
        metrics,
        _dir: dir,
    }
}

fn create_record(store: &LedgerStore, kind: DeliveryKind) -> u64 {
    store
        .create_delivery_record(NewDeliveryRecord {
            policy_id: 1,
            hook_type: HookType::PushImage,
            kind,
            target_address: "http://hook.local".into(),
            payload: "{}".into(),
        })
        .unwrap()
}

fn callback(kind: &str, id: u64, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/service/notifications/jobs/{}/{}", kind, id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_hook_applies_update() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    let response = t
        .app
        .clone()
        .oneshot(callback("webhook", id, json!({"job_id": "j-1", "status": "Running"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["status"], "Running");

    let record = t.store.get_delivery_record(id).unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Running);
    assert_eq!(record.correlation_id.as_deref(), Some("j-1"));

    let response = t
        .app
        .clone()
        .oneshot(callback("webhook", id, json!({"job_id": "j-1", "status": "Success"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Success
    );
    assert_eq!(t.metrics.snapshot().callbacks_applied, 2);
}

#[tokio::test]
async fn test_status_hook_ignores_backward_transition() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);
    t.store
        .update_delivery_record_status(id, DeliveryStatus::Success)
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(callback("webhook", id, json!({"status": "Running"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["reason"], "stale_transition");
    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Success
    );
    assert_eq!(t.metrics.snapshot().callbacks_ignored, 1);
}

#[tokio::test]
async fn test_status_hook_kind_mismatch_is_ignored() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    let response = t
        .app
        .clone()
        .oneshot(callback("p2ppreheat", id, json!({"status": "Success"})))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["reason"], "kind_mismatch");
    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Pending
    );
}

#[tokio::test]
async fn test_status_hook_rejects_bad_requests() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    // Unknown status string
    let response = t
        .app
        .clone()
        .oneshot(callback("webhook", id, json!({"status": "Exploded"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_PAYLOAD");

    // Unknown hook kind
    let response = t
        .app
        .clone()
        .oneshot(callback("replication", id, json!({"status": "Success"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Wrong content type
    let request = Request::builder()
        .method("POST")
        .uri(format!("/service/notifications/jobs/webhook/{}", id))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"status":"Success"}"#))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Over the callback size limit
    let padding = "x".repeat(512);
    let response = t
        .app
        .clone()
        .oneshot(callback(
            "webhook",
            id,
            json!({"job_id": padding, "status": "Success"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Pending
    );
}

#[tokio::test]
async fn test_status_hook_caps_streamed_body() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    // Chunked body without Content-Length, 64 chunks of 64 bytes
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = (0..64).map(|_| Ok(vec![b' '; 64])).collect();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/service/notifications/jobs/webhook/{}", id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap();
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_status_hook_caps_decompressed_body() {
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    // Compresses to less than the 256 byte limit, inflates to 128 KiB
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&vec![b' '; 1 << 17]).unwrap();
    let compressed = encoder.finish().unwrap();
    assert!(compressed.len() < 256);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/service/notifications/jobs/webhook/{}", id))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Pending
    );
}

#[tokio::test]
async fn test_status_hook_accepts_small_gzip_body() {
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Webhook);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(json!({"job_id": "j-9", "status": "Running"}).to_string().as_bytes())
        .unwrap();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/service/notifications/jobs/webhook/{}", id))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(encoder.finish().unwrap()))
        .unwrap();

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        t.store.get_delivery_record(id).unwrap().unwrap().status,
        DeliveryStatus::Running
    );
}

#[tokio::test]
async fn test_get_delivery() {
    let t = build_test_app();
    let id = create_record(&t.store, DeliveryKind::Preheat);

    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/deliveries/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], id);
    assert_eq!(body["kind"], "preheat");
    assert_eq!(body["status"], "Pending");

    let response = t.app.clone().oneshot(get("/deliveries/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_policy_never_exposes_secrets() {
    let t = build_test_app();
    let policy = t
        .store
        .create_policy(
            Policy::builder()
                .name("hooks")
                .project_id(1)
                .targets(vec![
                    Target::builder()
                        .address("http://hook.local/endpoint")
                        .secret("s3cret")
                        .build(),
                ])
                .hook_types([HookType::PushImage].into())
                .build(),
        )
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/policies/{}", policy.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "hooks");
    assert_eq!(body["targets"][0]["address"], "http://hook.local/endpoint");
    assert!(body["targets"][0].get("secret").is_none());
    assert!(!body.to_string().contains("s3cret"));

    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/policies/{}/deliveries", policy.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));

    t.store.soft_delete_policy(policy.id).unwrap();
    let response = t
        .app
        .clone()
        .oneshot(get(&format!("/policies/{}", policy.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let t = build_test_app();

    let response = t.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["ledger"], "healthy");
    assert_eq!(body["components"]["runner"], "remote");

    t.metrics.event_published();
    let response = t.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["events_published"], 1);
}
