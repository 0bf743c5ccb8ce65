//! Grant recommendation pipeline
//!
//! Candidate selection → prompt composition → chat model → reply parsing.

pub mod candidates;
pub mod chat;
pub mod matcher;
pub mod parser;
pub mod prompt;

pub use candidates::{CandidateSelector, DateWindow, Urgency};
pub use chat::{ChatClient, ChatError, ChatMessage, ChatModel, ChatReply, ChatResult};
pub use matcher::{GrantMatcher, MatchError, RecommendationOutcome, RecommendationStatus};
pub use parser::{GrantRecommendation, ParseError};
