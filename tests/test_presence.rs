mod helpers;

use helpers::*;
use livedesk::application::services::RoutingOutcome;
use livedesk::domain::entities::{OnlineStatus, Priority, RoutingContext};
use livedesk::domain::events::RealtimeEvent;
use livedesk::domain::ports::agent_directory::AgentDirectory;
use livedesk::domain::ports::conversation_store::ConversationStore;

async fn stored_status(db: &livedesk::infrastructure::persistence::Database, id: &str) -> OnlineStatus {
    db.get_agent(id).await.unwrap().unwrap().online_status
}

#[tokio::test]
async fn test_multiple_connections_keep_agent_online() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    for _ in 0..3 {
        engine.presence.on_connect("agent-1", "org1").await.unwrap();
    }
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Online);

    for _ in 0..2 {
        engine.presence.on_disconnect("agent-1", "org1").await.unwrap();
    }
    let snapshot = engine.presence.snapshot("agent-1").await.unwrap();
    assert_eq!(snapshot.status, OnlineStatus::Online);
    assert_eq!(snapshot.connections, 1);

    engine.presence.on_disconnect("agent-1", "org1").await.unwrap();
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Offline);

    let transitions: Vec<OnlineStatus> = engine
        .gateway
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            RealtimeEvent::PresenceChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(transitions, vec![OnlineStatus::Online, OnlineStatus::Offline]);

    teardown_test_db(db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_and_disconnects_balance_out() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let presence = engine.presence.clone();
        handles.push(tokio::spawn(async move {
            presence.on_connect("agent-1", "org1").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(engine.presence.snapshot("agent-1").await.unwrap().connections, 10);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let presence = engine.presence.clone();
        handles.push(tokio::spawn(async move {
            presence.on_disconnect("agent-1", "org1").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let snapshot = engine.presence.snapshot("agent-1").await.unwrap();
    assert_eq!(snapshot.connections, 0);
    assert_eq!(snapshot.status, OnlineStatus::Offline);
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Offline);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_away_override_survives_reconnect() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    engine.presence.on_connect("agent-1", "org1").await.unwrap();
    engine
        .presence
        .on_explicit_status("agent-1", OnlineStatus::Away)
        .await
        .unwrap();
    engine.presence.on_disconnect("agent-1", "org1").await.unwrap();
    engine.presence.on_connect("agent-1", "org1").await.unwrap();

    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Away);

    engine
        .presence
        .on_explicit_status("agent-1", OnlineStatus::Online)
        .await
        .unwrap();
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Online);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_explicit_offline_rejected_while_connected() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    engine.presence.on_connect("agent-1", "org1").await.unwrap();
    let result = engine
        .presence
        .on_explicit_status("agent-1", OnlineStatus::Offline)
        .await;
    assert!(result.is_err());
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Online);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_connect_rejects_foreign_org_and_unknown_agent() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    assert!(engine.presence.on_connect("agent-1", "org2").await.is_err());
    assert!(engine.presence.on_connect("ghost", "org1").await.is_err());
    assert_eq!(engine.presence.snapshot("agent-1").await.unwrap().connections, 0);

    // Stray disconnects are ignored
    engine.presence.on_disconnect("ghost", "org1").await.unwrap();
    engine.presence.on_disconnect("agent-1", "org1").await.unwrap();

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_coming_online_drains_queue() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Offline).await;

    let (conversation, outcome) = engine
        .routing
        .create_conversation("org1", RoutingContext::new("web_widget", None), Priority::Medium)
        .await
        .unwrap();
    assert_eq!(outcome, RoutingOutcome::Queued { position: 1 });

    engine.presence.on_connect("agent-1", "org1").await.unwrap();
    settle().await;

    let stored = db.get_conversation(&conversation.id).await.unwrap().unwrap();
    assert_eq!(stored.agent_id.as_deref(), Some("agent-1"));
    assert_eq!(engine.queue.position(&conversation.id).await.unwrap(), None);

    teardown_test_db(db).await;
}

#[tokio::test]
async fn test_stored_online_status_from_previous_run_is_reset() {
    let db = setup_test_db().await;
    let engine = build_engine(db.clone());
    create_test_agent(&db, "agent-1", "org1", 3, OnlineStatus::Online).await;
    create_test_agent(&db, "agent-2", "org1", 3, OnlineStatus::Away).await;

    for _ in 0..3 {
        engine.presence.on_connect("agent-1", "org1").await.unwrap();
    }
    for _ in 0..3 {
        engine.presence.on_disconnect("agent-1", "org1").await.unwrap();
    }

    let transitions: Vec<OnlineStatus> = engine
        .gateway
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            RealtimeEvent::PresenceChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(transitions, vec![OnlineStatus::Online, OnlineStatus::Offline]);

    let snapshot = engine.presence.snapshot("agent-1").await.unwrap();
    assert_eq!(snapshot.status, OnlineStatus::Offline);
    assert_eq!(snapshot.connections, 0);
    assert_eq!(stored_status(&db, "agent-1").await, OnlineStatus::Offline);

    assert_eq!(engine.presence.reset_all().await.unwrap(), 1);
    assert_eq!(stored_status(&db, "agent-2").await, OnlineStatus::Offline);

    teardown_test_db(db).await;
}
