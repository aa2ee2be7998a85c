//! Message assembly: persona prompt, JSON format instruction and history.

use super::emotion::EmotionSet;
use super::message::{ChatRole, ConversationMessage};

/// Instruction appended to the persona prompt so that even providers without
/// structured output answer with the reply object.
pub fn format_instruction(emotions: &EmotionSet) -> String {
    format!(
        "Respond ONLY with valid JSON and no extra text. The JSON must have keys 'emotion' and 'reply' in that order. 'emotion' must be one of: {}.",
        emotions.joined()
    )
}

/// Builds the message list sent to the provider.
///
/// The system message comes first. Only user and assistant turns of `history`
/// are forwarded, keeping at most the `max_history` most recent (0 keeps all).
pub fn build_messages(
    persona_prompt: &str,
    emotions: &EmotionSet,
    history: &[ConversationMessage],
    max_history: usize,
) -> Vec<ConversationMessage> {
    let system = format!("{}\n\n{}", persona_prompt.trim(), format_instruction(emotions));

    let turns: Vec<&ConversationMessage> = history
        .iter()
        .filter(|m| m.role.is_conversational())
        .collect();
    let skip = if max_history == 0 {
        0
    } else {
        turns.len().saturating_sub(max_history)
    };

    let mut messages = Vec::with_capacity(turns.len() - skip + 1);
    messages.push(ConversationMessage::new(ChatRole::System, system.trim()));
    messages.extend(turns.into_iter().skip(skip).cloned());
    messages
}
