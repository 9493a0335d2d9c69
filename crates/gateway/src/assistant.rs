//! Assistant endpoints.
//!
//! - `GET  /api/assistant/actions`              action catalog
//! - `POST /api/assistant/chat`                 one run, streamed as SSE
//! - `GET  /api/assistant/conversations/{id}`   stored conversation

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use clinicdesk_agent::{ChannelObserver, ConversationUpdate};
use clinicdesk_core::action::ActionSpec;
use clinicdesk_core::message::{ConversationId, ConversationState};

use crate::{ApiError, MAX_CONVERSATIONS, SharedState, api_error};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/assistant/actions", get(list_actions_handler))
        .route("/api/assistant/chat", post(chat_handler))
        .route(
            "/api/assistant/conversations/{id}",
            get(get_conversation_handler),
        )
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatStarted {
    conversation_id: String,
}

#[derive(Serialize)]
struct ActionListResponse {
    actions: Vec<ActionSpec>,
    count: usize,
}

async fn list_actions_handler(State(state): State<SharedState>) -> Json<ActionListResponse> {
    let actions = state.orchestrator.registry().specs();
    let count = actions.len();
    Json(ActionListResponse { actions, count })
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationState>, ApiError> {
    state
        .conversations
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Conversation not found"))
}

fn sse_event(update: &ConversationUpdate) -> SseEvent {
    let data = serde_json::to_string(update).unwrap_or_default();
    SseEvent::default().event(update.event_type()).data(data)
}

/// `POST /api/assistant/chat` runs one user message through the
/// orchestrator and streams every update.
///
/// The first event (`conversation`) carries the conversation id to send
/// back on the next message. A conversation accepts one run at a time.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message must not be empty"));
    }

    let conv_id = payload
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ConversationId::new().to_string());

    if !state.active.lock().await.insert(conv_id.clone()) {
        warn!(conversation_id = %conv_id, "Rejected message for busy conversation");
        return Err(api_error(
            StatusCode::CONFLICT,
            "A response is already in progress for this conversation",
        ));
    }

    let conversation = state
        .conversations
        .read()
        .await
        .get(&conv_id)
        .cloned()
        .unwrap_or_else(|| ConversationState::with_id(ConversationId(conv_id.clone())));

    info!(
        conversation_id = %conv_id,
        message_len = payload.message.len(),
        "Assistant chat request"
    );

    let (observer, rx) = ChannelObserver::channel();
    let run_state = state.clone();
    let run_id = conv_id.clone();
    tokio::spawn(async move {
        let outcome = run_state
            .orchestrator
            .submit(conversation, payload.message, &observer)
            .await;

        let mut conversations = run_state.conversations.write().await;
        if conversations.len() >= MAX_CONVERSATIONS
            && !conversations.contains_key(&run_id)
            && let Some(oldest) = conversations
                .iter()
                .min_by_key(|(_, c)| c.updated_at)
                .map(|(k, _)| k.clone())
        {
            conversations.remove(&oldest);
        }
        conversations.insert(run_id.clone(), outcome.conversation);
        drop(conversations);

        run_state.active.lock().await.remove(&run_id);
    });

    let started = serde_json::to_string(&ChatStarted {
        conversation_id: conv_id,
    })
    .unwrap_or_default();
    let head = tokio_stream::once(Ok::<_, Infallible>(
        SseEvent::default().event("conversation").data(started),
    ));
    let updates = UnboundedReceiverStream::new(rx).map(|update| Ok(sse_event(&update)));

    Ok(Sse::new(head.chain(updates)))
}
