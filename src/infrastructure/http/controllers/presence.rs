use crate::{
    application::services::{PresenceService, PresenceSnapshot},
    domain::entities::OnlineStatus,
    infrastructure::http::middleware::{ApiResult, AppState},
    infrastructure::providers::ConnectionHub,
};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

/// Per-connection buffer; a full buffer drops events for that connection only.
const CONNECTION_BUFFER: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: OnlineStatus,
}

/// Unregisters the connection when the SSE stream is dropped.
struct ConnectionGuard {
    hub: ConnectionHub,
    presence: PresenceService,
    connection_id: u64,
    org_id: String,
    agent_id: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let presence = self.presence.clone();
        let connection_id = self.connection_id;
        let org_id = std::mem::take(&mut self.org_id);
        let agent_id = std::mem::take(&mut self.agent_id);

        tokio::spawn(async move {
            hub.remove_connection(connection_id).await;
            tracing::info!("SSE connection closed for agent {}", agent_id);
            if let Err(e) = presence.on_disconnect(&agent_id, &org_id).await {
                tracing::error!("Failed to record disconnect for agent {}: {}", agent_id, e);
            }
        });
    }
}

/// GET /api/orgs/:org_id/agents/:agent_id/stream - Real-time event stream
pub async fn event_stream(
    State(state): State<AppState>,
    Path((org_id, agent_id)): Path<(String, String)>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

    let connection_id = state
        .connection_hub
        .add_connection(&org_id, &agent_id, tx)
        .await;

    if let Err(e) = state.presence_service.on_connect(&agent_id, &org_id).await {
        state.connection_hub.remove_connection(connection_id).await;
        return Err(e.into());
    }

    tracing::info!("SSE connection established for agent {} in org {}", agent_id, org_id);

    let guard = ConnectionGuard {
        hub: state.connection_hub.clone(),
        presence: state.presence_service.clone(),
        connection_id,
        org_id,
        agent_id,
    };

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _guard = &guard;
        let json_data = serde_json::to_string(&event).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize realtime event: {}", e);
            "{}".to_string()
        });

        Ok(Event::default().event(event.name()).data(json_data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// PUT /api/agents/:agent_id/status - Explicit status change
pub async fn set_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(request): Json<SetStatusRequest>,
) -> ApiResult<Json<PresenceSnapshot>> {
    state
        .presence_service
        .on_explicit_status(&agent_id, request.status)
        .await?;

    let snapshot = state.presence_service.snapshot(&agent_id).await?;
    Ok(Json(snapshot))
}

/// GET /api/agents/:agent_id/presence - Current status and open connections
pub async fn get_presence(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<PresenceSnapshot>> {
    let snapshot = state.presence_service.snapshot(&agent_id).await?;
    Ok(Json(snapshot))
}
