use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Chat, ChatMessage, ConversationState, Payload, Role, State};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap_or_else(|_| now())
}

// ── Chats ──

/// Creates a chat together with its conversation row in the `start` state.
pub fn create_chat(conn: &mut Connection) -> anyhow::Result<Chat> {
    let created_at = now();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO chats (created_at) VALUES (?1)",
        params![format_ts(&created_at)],
    )?;
    let id = tx.last_insert_rowid();
    upsert_conversation(&tx, id, &ConversationState::new())?;

    tx.commit()?;
    Ok(Chat { id, created_at })
}

pub fn list_chats(conn: &Connection) -> anyhow::Result<Vec<Chat>> {
    let mut stmt = conn.prepare("SELECT id, created_at FROM chats ORDER BY created_at ASC, id ASC")?;

    let rows = stmt.query_map([], |row| {
        let created_at: String = row.get(1)?;
        Ok(Chat {
            id: row.get(0)?,
            created_at: parse_ts(&created_at),
        })
    })?;

    let mut chats = vec![];
    for row in rows {
        chats.push(row?);
    }
    Ok(chats)
}

pub fn get_chat(conn: &Connection, id: i64) -> anyhow::Result<Option<Chat>> {
    let chat = conn
        .query_row(
            "SELECT id, created_at FROM chats WHERE id = ?1",
            params![id],
            |row| {
                let created_at: String = row.get(1)?;
                Ok(Chat {
                    id: row.get(0)?,
                    created_at: parse_ts(&created_at),
                })
            },
        )
        .optional()?;
    Ok(chat)
}

// ── Messages ──

pub fn add_message(
    conn: &Connection,
    chat_id: i64,
    role: Role,
    content: &str,
) -> anyhow::Result<ChatMessage> {
    let timestamp = now();
    conn.execute(
        "INSERT INTO messages (chat_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![chat_id, role.as_str(), content, format_ts(&timestamp)],
    )?;

    Ok(ChatMessage {
        id: conn.last_insert_rowid(),
        chat_id,
        role,
        content: content.to_string(),
        timestamp,
    })
}

pub fn get_messages(conn: &Connection, chat_id: i64) -> anyhow::Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, role, content, timestamp FROM messages
         WHERE chat_id = ?1 ORDER BY timestamp ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![chat_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut messages = vec![];
    for row in rows {
        let (id, chat_id, role, content, timestamp) = row?;
        let role = Role::parse(&role).with_context(|| format!("unknown message role: {role}"))?;
        messages.push(ChatMessage {
            id,
            chat_id,
            role,
            content,
            timestamp: parse_ts(&timestamp),
        });
    }
    Ok(messages)
}

// ── Conversations ──

/// Loads the machine state for a chat. A chat without a row yet is at `start`.
pub fn get_conversation(conn: &Connection, chat_id: i64) -> anyhow::Result<ConversationState> {
    let row = conn
        .query_row(
            "SELECT state, payload FROM conversations WHERE chat_id = ?1",
            params![chat_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let Some((state, payload)) = row else {
        return Ok(ConversationState::new());
    };

    let state = State::parse(&state).with_context(|| format!("unknown conversation state: {state}"))?;
    let payload = Payload::from_json(&payload).context("corrupt conversation payload")?;

    Ok(ConversationState { state, payload })
}

pub fn save_conversation(
    conn: &Connection,
    chat_id: i64,
    conv: &ConversationState,
) -> anyhow::Result<()> {
    upsert_conversation(conn, chat_id, conv)
}

fn upsert_conversation(
    conn: &Connection,
    chat_id: i64,
    conv: &ConversationState,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO conversations (chat_id, state, payload, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chat_id) DO UPDATE SET
           state = excluded.state,
           payload = excluded.payload,
           updated_at = excluded.updated_at",
        params![
            chat_id,
            conv.state.as_str(),
            conv.payload.to_json()?,
            format_ts(&now()),
        ],
    )?;
    Ok(())
}

/// Stores one complete turn atomically: the user message, the new machine
/// state and the assistant reply. Returns the stored assistant message.
pub fn record_turn(
    conn: &mut Connection,
    chat_id: i64,
    user_text: &str,
    conv: &ConversationState,
    reply: &str,
) -> anyhow::Result<ChatMessage> {
    let tx = conn.transaction()?;

    add_message(&tx, chat_id, Role::User, user_text)?;
    upsert_conversation(&tx, chat_id, conv)?;
    let assistant = add_message(&tx, chat_id, Role::Assistant, reply)?;

    tx.commit()?;
    Ok(assistant)
}
