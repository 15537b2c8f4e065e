use serde::{Deserialize, Serialize};
use serde_json::Value;

const AFFIRMATIVE: &[&str] = &[
    "yes",
    "y",
    "true",
    "yeah",
    "yep",
    "sure",
    "absolutely",
    "of course",
];

const NEGATIVE: &[&str] = &["no", "n", "false", "nah", "nope", "not really"];

/// Maps a free-form yes/no answer onto a boolean. Anything outside both
/// vocabularies is `None`.
pub fn normalize_yes_no(answer: &str) -> Option<bool> {
    let answer = answer.trim().to_lowercase();
    if AFFIRMATIVE.contains(&answer.as_str()) {
        Some(true)
    } else if NEGATIVE.contains(&answer.as_str()) {
        Some(false)
    } else {
        None
    }
}

pub fn yes_no_vocabulary() -> (&'static [&'static str], &'static [&'static str]) {
    (AFFIRMATIVE, NEGATIVE)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AskIntent,
    AffirmIntent,
    DenyIntent,
    UnclearIntent,
    ProvideName,
    InvalidName,
    ProvideAge,
    InvalidAge,
    AskAllergy,
    AnswerAllergy,
    UnclearAllergy,
    SelectSlot,
    InvalidSlot,
    ConfirmSelection,
    FinishBooking,
    EarlyCancel,
    RestartAfterFallback,
}

impl OperationKind {
    pub const ALL: [OperationKind; 17] = [
        OperationKind::AskIntent,
        OperationKind::AffirmIntent,
        OperationKind::DenyIntent,
        OperationKind::UnclearIntent,
        OperationKind::ProvideName,
        OperationKind::InvalidName,
        OperationKind::ProvideAge,
        OperationKind::InvalidAge,
        OperationKind::AskAllergy,
        OperationKind::AnswerAllergy,
        OperationKind::UnclearAllergy,
        OperationKind::SelectSlot,
        OperationKind::InvalidSlot,
        OperationKind::ConfirmSelection,
        OperationKind::FinishBooking,
        OperationKind::EarlyCancel,
        OperationKind::RestartAfterFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AskIntent => "ask_intent",
            OperationKind::AffirmIntent => "affirm_intent",
            OperationKind::DenyIntent => "deny_intent",
            OperationKind::UnclearIntent => "unclear_intent",
            OperationKind::ProvideName => "provide_name",
            OperationKind::InvalidName => "invalid_name",
            OperationKind::ProvideAge => "provide_age",
            OperationKind::InvalidAge => "invalid_age",
            OperationKind::AskAllergy => "ask_allergy",
            OperationKind::AnswerAllergy => "answer_allergy",
            OperationKind::UnclearAllergy => "unclear_allergy",
            OperationKind::SelectSlot => "select_slot",
            OperationKind::InvalidSlot => "invalid_slot",
            OperationKind::ConfirmSelection => "confirm_selection",
            OperationKind::FinishBooking => "finish_booking",
            OperationKind::EarlyCancel => "early_cancel",
            OperationKind::RestartAfterFallback => "restart_after_fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        OperationKind::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Argument signature shown to the interpreter, e.g. `{"age": integer}`.
    pub fn argument_schema(&self) -> &'static str {
        match self {
            OperationKind::ProvideName => r#"{"name": string}"#,
            OperationKind::ProvideAge => r#"{"age": integer}"#,
            OperationKind::AnswerAllergy => r#"{"allergy": string}"#,
            OperationKind::SelectSlot => r#"{"choice": integer}"#,
            OperationKind::FinishBooking => r#"{"yes": boolean}"#,
            _ => "{}",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperationKind::AskIntent => "greet the user and ask whether they want to book a flu vaccination",
            OperationKind::AffirmIntent => "the user wants to book",
            OperationKind::DenyIntent => "the user does not want to book",
            OperationKind::UnclearIntent => "the answer about booking was neither yes nor no",
            OperationKind::ProvideName => "the user gave their full name",
            OperationKind::InvalidName => "no usable name could be extracted",
            OperationKind::ProvideAge => "the user gave their age as a whole number between 0 and 120",
            OperationKind::InvalidAge => "the age was not a number or out of range",
            OperationKind::AskAllergy => "ask the user about egg allergy",
            OperationKind::AnswerAllergy => "the user answered the egg allergy question with a clear yes or no",
            OperationKind::UnclearAllergy => "the allergy answer was ambiguous",
            OperationKind::SelectSlot => "the user picked a slot by its 1-based number",
            OperationKind::InvalidSlot => "the slot answer was not a number at all",
            OperationKind::ConfirmSelection => "move on to confirming the picked slot",
            OperationKind::FinishBooking => "the user confirmed (yes=true) or declined (yes=false) the slot",
            OperationKind::EarlyCancel => "the user wants to stop the conversation",
            OperationKind::RestartAfterFallback => "start the conversation over",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed request to move the conversation machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    AskIntent,
    AffirmIntent,
    DenyIntent,
    UnclearIntent,
    ProvideName { name: String },
    InvalidName,
    ProvideAge { age: i64 },
    InvalidAge,
    AskAllergy,
    AnswerAllergy { allergy: String },
    UnclearAllergy,
    SelectSlot { choice: i64 },
    InvalidSlot,
    ConfirmSelection,
    FinishBooking { yes: bool },
    EarlyCancel,
    RestartAfterFallback,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("unknown operation: {0}")]
    Unknown(String),

    #[error("{operation}: missing argument `{argument}`")]
    MissingArgument {
        operation: OperationKind,
        argument: &'static str,
    },

    #[error("{operation}: argument `{argument}` has the wrong type")]
    WrongType {
        operation: OperationKind,
        argument: &'static str,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::AskIntent => OperationKind::AskIntent,
            Operation::AffirmIntent => OperationKind::AffirmIntent,
            Operation::DenyIntent => OperationKind::DenyIntent,
            Operation::UnclearIntent => OperationKind::UnclearIntent,
            Operation::ProvideName { .. } => OperationKind::ProvideName,
            Operation::InvalidName => OperationKind::InvalidName,
            Operation::ProvideAge { .. } => OperationKind::ProvideAge,
            Operation::InvalidAge => OperationKind::InvalidAge,
            Operation::AskAllergy => OperationKind::AskAllergy,
            Operation::AnswerAllergy { .. } => OperationKind::AnswerAllergy,
            Operation::UnclearAllergy => OperationKind::UnclearAllergy,
            Operation::SelectSlot { .. } => OperationKind::SelectSlot,
            Operation::InvalidSlot => OperationKind::InvalidSlot,
            Operation::ConfirmSelection => OperationKind::ConfirmSelection,
            Operation::FinishBooking { .. } => OperationKind::FinishBooking,
            Operation::EarlyCancel => OperationKind::EarlyCancel,
            Operation::RestartAfterFallback => OperationKind::RestartAfterFallback,
        }
    }

    /// Decodes an operation name plus a JSON argument object, as produced by
    /// the interpreter, into a typed operation.
    pub fn from_call(name: &str, arguments: &Value) -> Result<Self, OperationError> {
        let kind = OperationKind::parse(name.trim())
            .ok_or_else(|| OperationError::Unknown(name.to_string()))?;

        let op = match kind {
            OperationKind::AskIntent => Operation::AskIntent,
            OperationKind::AffirmIntent => Operation::AffirmIntent,
            OperationKind::DenyIntent => Operation::DenyIntent,
            OperationKind::UnclearIntent => Operation::UnclearIntent,
            OperationKind::ProvideName => Operation::ProvideName {
                name: string_arg(kind, arguments, "name")?,
            },
            OperationKind::InvalidName => Operation::InvalidName,
            OperationKind::ProvideAge => Operation::ProvideAge {
                age: integer_arg(kind, arguments, "age")?,
            },
            OperationKind::InvalidAge => Operation::InvalidAge,
            OperationKind::AskAllergy => Operation::AskAllergy,
            OperationKind::AnswerAllergy => {
                let allergy = match field(kind, arguments, "allergy")? {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(OperationError::WrongType {
                            operation: kind,
                            argument: "allergy",
                        })
                    }
                };
                Operation::AnswerAllergy { allergy }
            }
            OperationKind::UnclearAllergy => Operation::UnclearAllergy,
            OperationKind::SelectSlot => Operation::SelectSlot {
                choice: integer_arg(kind, arguments, "choice")?,
            },
            OperationKind::InvalidSlot => Operation::InvalidSlot,
            OperationKind::ConfirmSelection => Operation::ConfirmSelection,
            OperationKind::FinishBooking => {
                let yes = match field(kind, arguments, "yes")? {
                    Value::Bool(b) => *b,
                    Value::String(s) => normalize_yes_no(s).ok_or(OperationError::WrongType {
                        operation: kind,
                        argument: "yes",
                    })?,
                    _ => {
                        return Err(OperationError::WrongType {
                            operation: kind,
                            argument: "yes",
                        })
                    }
                };
                Operation::FinishBooking { yes }
            }
            OperationKind::EarlyCancel => Operation::EarlyCancel,
            OperationKind::RestartAfterFallback => Operation::RestartAfterFallback,
        };

        Ok(op)
    }
}

fn field<'a>(
    kind: OperationKind,
    arguments: &'a Value,
    argument: &'static str,
) -> Result<&'a Value, OperationError> {
    match arguments.get(argument) {
        Some(Value::Null) | None => Err(OperationError::MissingArgument {
            operation: kind,
            argument,
        }),
        Some(v) => Ok(v),
    }
}

fn string_arg(
    kind: OperationKind,
    arguments: &Value,
    argument: &'static str,
) -> Result<String, OperationError> {
    field(kind, arguments, argument)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or(OperationError::WrongType {
            operation: kind,
            argument,
        })
}

// Integers may arrive as JSON numbers or as numeric strings ("2").
fn integer_arg(
    kind: OperationKind,
    arguments: &Value,
    argument: &'static str,
) -> Result<i64, OperationError> {
    let wrong_type = OperationError::WrongType {
        operation: kind,
        argument,
    };
    match field(kind, arguments, argument)? {
        Value::Number(n) => n.as_i64().ok_or(wrong_type),
        Value::String(s) => s.trim().parse().map_err(|_| wrong_type),
        _ => Err(wrong_type),
    }
}

/// What the interpreter decided for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interpretation {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub reply: String,
}

impl Interpretation {
    pub fn none(reply: impl Into<String>) -> Self {
        Self {
            operation: None,
            arguments: Value::Null,
            reply: reply.into(),
        }
    }
}
