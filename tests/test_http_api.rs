mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::*;
use livedesk::domain::entities::OnlineStatus;
use livedesk::infrastructure::http::router::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    let router = build_router(app_state(&engine));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_create_conversation_assigns_and_reports_routing() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 2, OnlineStatus::Online).await;
    let router = build_router(app_state(&engine));

    let (status, body) = send(
        router,
        json_request(
            "POST",
            "/api/conversations",
            json!({"org_id": "org1", "channel": "web_widget", "priority": "high"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["routing"]["outcome"], "assigned");
    assert_eq!(body["routing"]["agent_id"], "agent-1");
    assert_eq!(body["conversation"]["priority"], "high");
    assert_eq!(body["conversation"]["status"], "pending");

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_queue_position_endpoint() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    let router = build_router(app_state(&engine));

    let (_, created) = send(
        router.clone(),
        json_request(
            "POST",
            "/api/conversations",
            json!({"org_id": "org1", "channel": "email"}),
        ),
    )
    .await;
    assert_eq!(created["routing"]["outcome"], "queued");
    assert_eq!(created["routing"]["position"], 1);

    let id = created["conversation"]["id"].as_str().unwrap().to_string();
    let request = Request::builder()
        .uri(format!("/api/conversations/{}/queue-position", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);

    let request = Request::builder()
        .uri("/api/conversations/missing/queue-position")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_validation_errors_map_to_bad_request() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 2, OnlineStatus::Offline).await;
    let router = build_router(app_state(&engine));

    let (status, _) = send(
        router.clone(),
        json_request("POST", "/api/conversations", json!({"org_id": "", "channel": "email"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, created) = send(
        router.clone(),
        json_request(
            "POST",
            "/api/conversations",
            json!({"org_id": "org1", "channel": "email"}),
        ),
    )
    .await;
    let id = created["conversation"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        router.clone(),
        json_request(
            "POST",
            &format!("/api/conversations/{}/release", id),
            json!({"status": "active"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        router,
        json_request(
            "POST",
            &format!("/api/conversations/{}/release", id),
            json!({"status": "resolved"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_status_and_presence_endpoints() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 2, OnlineStatus::Offline).await;
    let router = build_router(app_state(&engine));

    let (status, body) = send(
        router.clone(),
        json_request("PUT", "/api/agents/agent-1/status", json!({"status": "busy"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "busy");
    assert_eq!(body["connections"], 0);

    let request = Request::builder()
        .uri("/api/agents/agent-1/presence")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "busy");

    let request = Request::builder()
        .uri("/api/agents/nobody/presence")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_priority_and_message_endpoints() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 2, OnlineStatus::Online).await;
    let router = build_router(app_state(&engine));

    let (_, created) = send(
        router.clone(),
        json_request(
            "POST",
            "/api/conversations",
            json!({"org_id": "org1", "channel": "web_widget"}),
        ),
    )
    .await;
    let id = created["conversation"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        router.clone(),
        json_request(
            "PUT",
            &format!("/api/conversations/{}/priority", id),
            json!({"priority": "urgent"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority"], "urgent");

    let (status, _) = send(
        router.clone(),
        json_request(
            "POST",
            &format!("/api/conversations/{}/messages", id),
            json!({"sender": "agent"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let stored = tokio_test::assert_ok!(
        livedesk::domain::ports::conversation_store::ConversationStore::get_conversation(
            &db, &id
        )
        .await
    );
    let stored = stored.unwrap();
    assert_eq!(stored.status, livedesk::domain::entities::ConversationStatus::Active);
    assert!(stored.first_response_at.is_some());

    teardown_test_db(db).await;
}
