use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Chat, ChatMessage, OperationKind, Payload, Role};
use crate::services::conversation;
use crate::services::dispatcher::IntentDispatcher;
use crate::state::AppState;

// POST /chats
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Chat>), AppError> {
    let chat = {
        let mut db = state.conn()?;
        queries::create_chat(&mut db)?
    };
    tracing::info!(chat_id = chat.id, "chat created");
    Ok((StatusCode::CREATED, Json(chat)))
}

// GET /chats
pub async fn list_chats(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Chat>>, AppError> {
    let chats = {
        let db = state.conn()?;
        queries::list_chats(&db)?
    };
    Ok(Json(chats))
}

// POST /chats/:chat_id/messages
#[derive(Deserialize)]
pub struct MessageCreate {
    #[serde(default)]
    pub role: Option<Role>,
    pub content: String,
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
    Json(body): Json<MessageCreate>,
) -> Result<(StatusCode, Json<ChatMessage>), AppError> {
    if body.role.is_some_and(|role| role != Role::User) {
        return Err(AppError::InvalidInput(
            "only user messages can be posted".to_string(),
        ));
    }

    let reply = conversation::process_message(&state, chat_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

// GET /chats/:chat_id/messages
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let db = state.conn()?;
    if queries::get_chat(&db, chat_id)?.is_none() {
        return Err(AppError::ChatNotFound(chat_id));
    }
    Ok(Json(queries::get_messages(&db, chat_id)?))
}

// GET /chats/:chat_id/state
#[derive(Serialize)]
pub struct StateResponse {
    pub state: crate::models::State,
    pub payload: Payload,
    pub legal_operations: Vec<OperationKind>,
}

pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
) -> Result<Json<StateResponse>, AppError> {
    let conv = {
        let db = state.conn()?;
        if queries::get_chat(&db, chat_id)?.is_none() {
            return Err(AppError::ChatNotFound(chat_id));
        }
        queries::get_conversation(&db, chat_id)?
    };

    Ok(Json(StateResponse {
        state: conv.state,
        legal_operations: IntentDispatcher::legal_operations(conv.state).to_vec(),
        payload: conv.payload,
    }))
}
