use crate::{
    application::services::RoutingOutcome,
    domain::entities::{Conversation, ConversationStatus, Priority, RoutingContext},
    infrastructure::http::middleware::{ApiError, ApiResult, AppState},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub org_id: String,
    pub channel: String,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct ConversationRoutedResponse {
    pub conversation: Conversation,
    pub routing: RoutingOutcome,
}

#[derive(Debug, Serialize)]
pub struct QueuePositionResponse {
    pub conversation_id: String,
    /// `None` once the conversation is assigned or no longer pending
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Customer,
    Agent,
}

#[derive(Debug, Deserialize)]
pub struct RecordMessageRequest {
    pub sender: MessageSender,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseConversationRequest {
    pub status: ConversationStatus,
}

/// POST /api/conversations - Intake and route a new conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationRoutedResponse>)> {
    if request.org_id.trim().is_empty() {
        return Err(ApiError::BadRequest("org_id is required".to_string()));
    }
    if request.channel.trim().is_empty() {
        return Err(ApiError::BadRequest("channel is required".to_string()));
    }

    let context = RoutingContext::new(request.channel, request.page_url);
    let (conversation, routing) = state
        .routing_service
        .create_conversation(&request.org_id, context, request.priority)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationRoutedResponse {
            conversation,
            routing,
        }),
    ))
}

/// POST /api/conversations/:id/route - Route a pending conversation again
pub async fn route_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<RoutingOutcome>> {
    let outcome = state
        .routing_service
        .assign_conversation(&conversation_id)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/conversations/:id/queue-position
pub async fn get_queue_position(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<QueuePositionResponse>> {
    let position = state.queue_service.position(&conversation_id).await?;
    Ok(Json(QueuePositionResponse {
        conversation_id,
        position,
    }))
}

/// PUT /api/conversations/:id/priority - Change priority and recompute SLA deadlines
pub async fn update_priority(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<UpdatePriorityRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .sla_service
        .change_priority(&conversation_id, request.priority)
        .await?;
    Ok(Json(conversation))
}

/// POST /api/conversations/:id/messages - Record who wrote last
pub async fn record_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<RecordMessageRequest>,
) -> ApiResult<StatusCode> {
    match request.sender {
        MessageSender::Customer => {
            state
                .sla_service
                .record_customer_message(&conversation_id)
                .await?
        }
        MessageSender::Agent => state.sla_service.record_agent_reply(&conversation_id).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/conversations/:id/release - Resolve or close, then drain the queue
pub async fn release_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ReleaseConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .routing_service
        .release_conversation(&conversation_id, request.status)
        .await?;
    Ok(Json(conversation))
}
