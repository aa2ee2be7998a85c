//! Application layer - orchestrates domain logic over the ports.

mod prompt_source;
mod reply_service;

pub use prompt_source::PromptSource;
pub use reply_service::{ReplyService, ReplySettings};
