mod api;
mod context;
mod prompt;
mod tools;

pub use api::{run_chat_turn, validate_history};
pub use context::TurnContext;
pub use prompt::Instructions;
