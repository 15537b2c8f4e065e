use std::env;

use crate::services::machine::SlotPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub slot_days: i64,
    pub slots_per_day: i64,
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "vaxbook.db".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            slot_days: env::var("SLOT_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            slots_per_day: env::var("SLOTS_PER_DAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string()),
        }
    }

    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            days: self.slot_days,
            per_day: self.slots_per_day,
        }
    }
}
