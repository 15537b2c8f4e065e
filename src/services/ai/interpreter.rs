use crate::models::operation::yes_no_vocabulary;
use crate::models::{ChatMessage, Interpretation, Payload, State};
use crate::services::ai::{LlmProvider, Message};
use crate::services::dispatcher::IntentDispatcher;
use crate::services::prompts::render_prompt;

const SYSTEM_PROMPT: &str = r#"You are the language front end of a flu vaccination booking assistant. A fixed state machine drives the conversation; your only job is to read the user's latest message and decide which ONE of the allowed operations it corresponds to, if any.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "operation": "one of the allowed operation names, or null",
  "arguments": { },
  "reply": "a short friendly message for the user"
}

Rules:
- Only choose an operation listed under "Allowed operations". Never invent one.
- Fill "arguments" exactly as the operation's signature shows; use {} for operations without arguments.
- provide_name: only when the user gave a first and last name.
- provide_age: only with a whole number between 0 and 120. Otherwise choose invalid_age.
- answer_allergy: pass the user's answer word as "allergy", only when it clearly means yes or no. Otherwise choose unclear_allergy.
- select_slot: pass the number the user picked as "choice".
- finish_booking: "yes" is true when the user confirms, false when they decline.
- early_cancel: the user wants to stop.
- When the message does not fit any allowed operation, set "operation" to null and use "reply" to ask again.
"#;

fn build_system_prompt(state: State, payload: &Payload) -> String {
    let operations: Vec<String> = IntentDispatcher::legal_operations(state)
        .iter()
        .map(|kind| {
            format!(
                "- {} {}: {}",
                kind.as_str(),
                kind.argument_schema(),
                kind.description()
            )
        })
        .collect();

    let operations = if operations.is_empty() {
        "(none: the conversation is over, set \"operation\" to null)".to_string()
    } else {
        operations.join("\n")
    };

    let (yes, no) = yes_no_vocabulary();
    let collected = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());

    format!(
        "{SYSTEM_PROMPT}\nCurrent step: {state}\nWhat the assistant last asked: {}\nCollected so far: {collected}\n\nAllowed operations:\n{operations}\n\nWords meaning yes: {}\nWords meaning no: {}",
        render_prompt(state, payload),
        yes.join(", "),
        no.join(", "),
    )
}

/// Asks the model which operation the latest user message maps to. Provider
/// failures propagate; unparseable output becomes "no operation".
pub async fn interpret(
    llm: &dyn LlmProvider,
    state: State,
    payload: &Payload,
    history: &[ChatMessage],
    latest_message: &str,
) -> anyhow::Result<Interpretation> {
    let mut messages: Vec<Message> = history
        .iter()
        .map(|m| Message {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    messages.push(Message {
        role: "user".to_string(),
        content: latest_message.to_string(),
    });

    let system = build_system_prompt(state, payload);

    let response = llm.chat(&system, &messages).await?;

    Ok(parse_interpretation(&response))
}

fn parse_interpretation(response: &str) -> Interpretation {
    if let Ok(parsed) = serde_json::from_str::<Interpretation>(response) {
        return normalize(parsed);
    }

    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(parsed) = serde_json::from_str::<Interpretation>(cleaned) {
        return normalize(parsed);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(parsed) = serde_json::from_str::<Interpretation>(&cleaned[start..=end]) {
                return normalize(parsed);
            }
        }
    }

    tracing::warn!("failed to parse LLM response as operation JSON, using fallback");
    Interpretation::none(response.trim())
}

// Models like to answer "none" or "" instead of null.
fn normalize(mut parsed: Interpretation) -> Interpretation {
    if let Some(op) = &parsed.operation {
        let op = op.trim();
        if op.is_empty() || op.eq_ignore_ascii_case("null") || op.eq_ignore_ascii_case("none") {
            parsed.operation = None;
        }
    }
    parsed
}
