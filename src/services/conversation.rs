use std::sync::Arc;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ChatMessage, ConversationState, Interpretation, Operation};
use crate::services::ai::interpreter::interpret;
use crate::services::dispatcher::IntentDispatcher;
use crate::services::machine::{ConversationMachine, Outcome};
use crate::services::prompts::render_prompt;
use crate::state::AppState;

/// Runs one user turn: interpret, apply at most one operation, persist the
/// turn, return the assistant's reply. Nothing is written when the
/// interpreter fails, so the turn can be retried as-is.
pub async fn process_message(
    state: &Arc<AppState>,
    chat_id: i64,
    message: &str,
) -> Result<ChatMessage, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::InvalidInput(
            "message content must not be empty".to_string(),
        ));
    }

    {
        let db = state.conn()?;
        if queries::get_chat(&db, chat_id)?.is_none() {
            return Err(AppError::ChatNotFound(chat_id));
        }
    }

    let lock = state.chat_lock(chat_id);
    let result = {
        let _turn = lock.lock().await;
        run_turn(state, chat_id, message).await
    };
    drop(lock);
    state.release_chat_lock(chat_id);

    result
}

async fn run_turn(
    state: &Arc<AppState>,
    chat_id: i64,
    message: &str,
) -> Result<ChatMessage, AppError> {
    let (mut conv, history) = {
        let db = state.conn()?;
        (
            queries::get_conversation(&db, chat_id)?,
            queries::get_messages(&db, chat_id)?,
        )
    };

    let interpretation = interpret(
        state.llm.as_ref(),
        conv.state,
        &conv.payload,
        &history,
        message,
    )
    .await
    .map_err(|e| {
        tracing::error!(chat_id, error = %e, "interpreter failed");
        AppError::Ai(e.to_string())
    })?;

    let outcome = apply_interpretation(state, chat_id, &mut conv, &interpretation);
    let reply = reply_text(&conv, outcome, &interpretation);

    let assistant = {
        let mut db = state.conn()?;
        queries::record_turn(&mut db, chat_id, message, &conv, &reply)?
    };

    Ok(assistant)
}

fn apply_interpretation(
    state: &AppState,
    chat_id: i64,
    conv: &mut ConversationState,
    interpretation: &Interpretation,
) -> Option<Outcome> {
    let name = interpretation.operation.as_deref()?;

    let op = match Operation::from_call(name, &interpretation.arguments) {
        Ok(op) => op,
        Err(e) => {
            tracing::warn!(chat_id, state = %conv.state, error = %e, "dropping undecodable operation");
            return None;
        }
    };

    let machine = ConversationMachine::new(state.slots.as_ref(), state.config.slot_policy());
    let dispatcher = IntentDispatcher::new(machine);

    match dispatcher.dispatch(conv, &op) {
        Ok(outcome) => {
            match outcome {
                Outcome::Applied { from, to } => tracing::info!(
                    chat_id,
                    operation = %op.kind(),
                    from = %from,
                    to = %to,
                    "operation applied"
                ),
                Outcome::Rejected | Outcome::Ignored => tracing::info!(
                    chat_id,
                    operation = %op.kind(),
                    state = %conv.state,
                    "operation arguments rejected"
                ),
            }
            Some(outcome)
        }
        Err(e) => {
            tracing::warn!(chat_id, error = %e, "interpreter chose an illegal operation");
            None
        }
    }
}

fn reply_text(
    conv: &ConversationState,
    outcome: Option<Outcome>,
    interpretation: &Interpretation,
) -> String {
    let applied = outcome.map(|o| o.is_applied()).unwrap_or(false);
    if applied || interpretation.reply.trim().is_empty() {
        render_prompt(conv.state, &conv.payload)
    } else {
        interpretation.reply.trim().to_string()
    }
}
