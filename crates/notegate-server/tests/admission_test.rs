//! End-to-end admission pipeline tests
//!
//! Exercises the full request path: bearer-token identity, rate limiting,
//! daily quotas, mutation locking, cache read-through and event fan-out,
//! all against the in-memory state store.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use config::Config;

use notegate_server::{
    api, identity,
    middleware::admission::Admission,
    model::{
        app_state::AppState,
        config::Configuration,
        note::{Note, NoteListPage},
        response::ApiResult,
    },
    record::{MemoryRecordStore, RecordStore},
    startup,
};
use notegate_store::{MemoryStateStore, StateStore};

const TEST_SECRET: &str = "test-secret";

fn test_configuration(yaml: &str) -> Configuration {
    let config = Config::builder()
        .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
        .set_override("auth.token_secret", TEST_SECRET)
        .unwrap()
        .build()
        .unwrap();
    Configuration::from_config(config)
}

fn test_state(yaml: &str) -> Arc<AppState> {
    let configuration = test_configuration(yaml);
    let state_store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    Arc::new(AppState::new(configuration, state_store, records))
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(Admission)
                .app_data(web::Data::from($state.clone()))
                .service(api::health::health)
                .service(api::notes::routes()),
        )
        .await
    };
}

fn bearer(user_id: &str) -> (&'static str, String) {
    let token = identity::encode_token(user_id, TEST_SECRET, 3600).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

fn create_request(user_id: &str, title: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/notes")
        .insert_header(bearer(user_id))
        .set_json(serde_json::json!({ "title": title, "content": "body" }))
}

#[actix_web::test]
async fn health_bypasses_admission() {
    let state = test_state("{}");
    let app = test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn missing_or_invalid_token_is_unauthorized() {
    let state = test_state("{}");
    let app = test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/notes").to_request()).await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/notes")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_web::test]
async fn rate_limit_rejects_sixth_write_and_refills_after_window() {
    let state = test_state(
        r#"
admission:
  routes:
    /notes:
      capacity: 5
      window_seconds: 60
"#,
    );
    let app = test_app!(state);

    for i in 0..5 {
        let resp = test::call_service(&app, create_request("user-a", &format!("n{i}")).to_request())
            .await;
        assert_eq!(resp.status().as_u16(), 201, "write {i} should be admitted");
    }

    // The 6th write inside the window is rejected with the rate-limit code
    let resp = test::call_service(&app, create_request("user-a", "n6").to_request()).await;
    assert_eq!(resp.status().as_u16(), 429);
    let body: ApiResult<Option<String>> = test::read_body_json(resp).await;
    assert_eq!(body.code, 42900);

    // Back-date the stored bucket a full window: tokens refill to capacity
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    state
        .state_store
        .set(
            "ratelimit:user-a:/notes",
            &format!("{{\"tokens\":0.0,\"last\":{}}}", now - 60.0),
            None,
        )
        .await
        .unwrap();

    let resp = test::call_service(&app, create_request("user-a", "n6").to_request()).await;
    assert_eq!(resp.status().as_u16(), 201);
}

#[actix_web::test]
async fn quota_rejection_is_distinguishable_from_rate_limit() {
    let state = test_state(
        r#"
admission:
  rate_limit:
    capacity: 100
  quota:
    daily_limit: 3
"#,
    );
    let app = test_app!(state);

    for i in 0..3 {
        let resp = test::call_service(&app, create_request("user-a", &format!("n{i}")).to_request())
            .await;
        assert_eq!(resp.status().as_u16(), 201);
    }

    let resp = test::call_service(&app, create_request("user-a", "n4").to_request()).await;
    assert_eq!(resp.status().as_u16(), 429);
    let body: ApiResult<Option<String>> = test::read_body_json(resp).await;
    assert_eq!(body.code, 42901);

    // Reads are not writes: listing still passes the quota stage
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/notes")
            .insert_header(bearer("user-a"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn list_is_served_from_cache_until_invalidated_by_a_write() {
    let state = test_state("admission: { rate_limit: { capacity: 100 } }");
    let app = test_app!(state);

    let resp = test::call_service(&app, create_request("user-a", "first").to_request()).await;
    let created: ApiResult<Note> = test::read_body_json(resp).await;
    let note_id = created.data.id;

    let list_req = || {
        test::TestRequest::get()
            .uri("/notes")
            .insert_header(bearer("user-a"))
            .to_request()
    };

    let listed: ApiResult<NoteListPage> =
        test::read_body_json(test::call_service(&app, list_req()).await).await;
    assert_eq!(listed.data.pagination.total_count, 1);

    // Mutate the record store behind the cache's back: the cached page is
    // returned until a write through the pipeline invalidates it
    state.records.delete(note_id).await.unwrap();
    let cached: ApiResult<NoteListPage> =
        test::read_body_json(test::call_service(&app, list_req()).await).await;
    assert_eq!(cached.data.pagination.total_count, 1);

    let resp = test::call_service(&app, create_request("user-a", "second").to_request()).await;
    assert_eq!(resp.status().as_u16(), 201);
    let fresh: ApiResult<NoteListPage> =
        test::read_body_json(test::call_service(&app, list_req()).await).await;
    assert_eq!(fresh.data.pagination.total_count, 1);
    assert_eq!(fresh.data.notes[0].title, "second");
}

#[actix_web::test]
async fn update_publishes_event_and_respects_ownership() {
    let state = test_state("admission: { rate_limit: { capacity: 100 } }");
    let app = test_app!(state);

    let resp = test::call_service(&app, create_request("user-a", "draft").to_request()).await;
    let created: ApiResult<Note> = test::read_body_json(resp).await;
    let note_id = created.data.id;

    let mut subscription = state.broadcaster.subscribe("notes").await.unwrap();

    // Another user cannot edit the note
    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-b"))
            .set_json(serde_json::json!({ "title": "stolen", "content": "x" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 403);

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .set_json(serde_json::json!({ "title": "final", "content": "y" }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let payload = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("timed out waiting for note event")
        .expect("subscription closed");
    let event: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(event["action"], "updated");
    assert_eq!(event["note_id"], note_id);
}

#[actix_web::test]
async fn concurrent_editor_gets_resource_busy() {
    let state = test_state("admission: { rate_limit: { capacity: 100 } }");
    let app = test_app!(state);

    let resp = test::call_service(&app, create_request("user-a", "contended").to_request()).await;
    let created: ApiResult<Note> = test::read_body_json(resp).await;
    let note_id = created.data.id;

    // First editor holds the mutation lock
    let guard = state
        .mutation_lock
        .acquire(&format!("note:{note_id}"))
        .await
        .unwrap()
        .unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .set_json(serde_json::json!({ "title": "late", "content": "z" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 409);
    let body: ApiResult<Option<String>> = test::read_body_json(resp).await;
    assert_eq!(body.code, 40900);

    // Once the first editor releases, the edit goes through
    guard.release().await;
    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .set_json(serde_json::json!({ "title": "late", "content": "z" }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn delete_invalidates_detail_cache() {
    let state = test_state("admission: { rate_limit: { capacity: 100 } }");
    let app = test_app!(state);

    let resp = test::call_service(&app, create_request("user-a", "short-lived").to_request()).await;
    let created: ApiResult<Note> = test::read_body_json(resp).await;
    let note_id = created.data.id;

    // Warm the detail cache
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/notes/{note_id}"))
            .insert_header(bearer("user-a"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn event_stream_endpoint_responds_with_sse() {
    let state = test_state("admission: { rate_limit: { capacity: 100 } }");
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/notes/events")
            .insert_header(bearer("user-a"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(state.broadcaster.subscriber_count(), 1);
}

#[actix_web::test]
async fn shutdown_signal_fires() {
    let signal = startup::ShutdownSignal::new();
    let mut rx = signal.subscribe();
    signal.shutdown();
    assert!(rx.recv().await.is_ok());
}
