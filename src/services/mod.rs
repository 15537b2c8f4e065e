pub mod ai;
pub mod conversation;
pub mod dispatcher;
pub mod machine;
pub mod prompts;
pub mod slots;
