use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vaxbook::config::AppConfig;
use vaxbook::db;
use vaxbook::handlers;
use vaxbook::services::ai::groq::GroqProvider;
use vaxbook::services::ai::ollama::OllamaProvider;
use vaxbook::services::ai::LlmProvider;
use vaxbook::services::slots::CalendarSlots;
use vaxbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Box::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    tracing::info!(
        days = config.slot_days,
        per_day = config.slots_per_day,
        "slot policy"
    );

    let state = Arc::new(AppState::new(
        conn,
        config.clone(),
        llm,
        Box::new(CalendarSlots::default()),
    ));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
