use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::slots::SlotProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub slots: Box<dyn SlotProvider>,
    chat_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        conn: Connection,
        config: AppConfig,
        llm: Box<dyn LlmProvider>,
        slots: Box<dyn SlotProvider>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            llm,
            slots,
            chat_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    /// Per-chat turn lock. Turns on the same chat run one at a time; other
    /// chats are unaffected.
    pub fn chat_lock(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.chat_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(chat_id).or_default())
    }

    /// Drops the chat's lock entry once no turn holds or awaits it.
    pub fn release_chat_lock(&self, chat_id: i64) {
        let mut locks = self.chat_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&chat_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&chat_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_chat_locks(&self) -> usize {
        self.chat_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
