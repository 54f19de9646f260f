pub mod chat;
pub mod types;

pub use chat::{ChatMessage, ChatSession, HighlightRetry, MessageSource, Role};
pub use types::{HighlightOutcome, HighlightResult, Match, MatchMethod, Reference};
