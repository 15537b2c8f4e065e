pub mod chat;
pub mod conversation;
pub mod operation;

pub use chat::{Chat, ChatMessage, Role};
pub use conversation::{ConversationState, Payload, State};
pub use operation::{normalize_yes_no, Interpretation, Operation, OperationError, OperationKind};
