use crate::infrastructure::http::controllers::{conversations, health, presence};
use crate::infrastructure::http::middleware::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/orgs/:org_id/agents/:agent_id/stream",
            get(presence::event_stream),
        )
        .route("/api/agents/:agent_id/status", put(presence::set_status))
        .route("/api/agents/:agent_id/presence", get(presence::get_presence))
        .route(
            "/api/conversations",
            post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/:id/route",
            post(conversations::route_conversation),
        )
        .route(
            "/api/conversations/:id/queue-position",
            get(conversations::get_queue_position),
        )
        .route(
            "/api/conversations/:id/priority",
            put(conversations::update_priority),
        )
        .route(
            "/api/conversations/:id/messages",
            post(conversations::record_message),
        )
        .route(
            "/api/conversations/:id/release",
            post(conversations::release_conversation),
        );

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
