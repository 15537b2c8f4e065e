use serde::{Deserialize, Deserializer, Serialize};

/// Oldest age the booking flow accepts.
pub const MAX_AGE: u8 = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Start,
    AwaitingIntent,
    AskedName,
    GotName,
    GotAge,
    AwaitingAllergyResponse,
    Eligible,
    Ineligible,
    OfferedSlots,
    AwaitingSelection,
    Confirming,
    Completed,
    Abort,
    Fallback,
}

impl State {
    pub const ALL: [State; 14] = [
        State::Start,
        State::AwaitingIntent,
        State::AskedName,
        State::GotName,
        State::GotAge,
        State::AwaitingAllergyResponse,
        State::Eligible,
        State::Ineligible,
        State::OfferedSlots,
        State::AwaitingSelection,
        State::Confirming,
        State::Completed,
        State::Abort,
        State::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::AwaitingIntent => "awaiting_intent",
            State::AskedName => "asked_name",
            State::GotName => "got_name",
            State::GotAge => "got_age",
            State::AwaitingAllergyResponse => "awaiting_allergy_response",
            State::Eligible => "eligible",
            State::Ineligible => "ineligible",
            State::OfferedSlots => "offered_slots",
            State::AwaitingSelection => "awaiting_selection",
            State::Confirming => "confirming",
            State::Completed => "completed",
            State::Abort => "abort",
            State::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        State::ALL.into_iter().find(|state| state.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Abort)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured data collected over the course of a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "age_in_range"
    )]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<String>>,
    #[serde(default)]
    pub selected_slot: Option<String>,
}

fn age_in_range<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<u8>::deserialize(deserializer)? {
        Some(age) if age > MAX_AGE => Err(serde::de::Error::custom(format!(
            "age {age} is outside 0..={MAX_AGE}"
        ))),
        age => Ok(age),
    }
}

impl Payload {
    pub fn slots(&self) -> &[String] {
        self.slots.as_deref().unwrap_or(&[])
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// The persisted state+payload pair for one chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationState {
    pub state: State,
    #[serde(default)]
    pub payload: Payload,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            state: State::Start,
            payload: Payload::default(),
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
