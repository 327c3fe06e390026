use crate::gemini::{Content, Part};
use core_types::{ChatMessage, MessageRole};

/// Prepended to system messages, which Gemini has no role for.
pub const SYSTEM_PREFIX: &str = "System instructions: ";

/// Converts a conversation into Gemini `contents`, preserving order.
///
/// `assistant` turns become `model` turns and `system` turns are sent as
/// `user` turns with [`SYSTEM_PREFIX`]. Everything before the last element is
/// the history; the last element is the outbound turn and is always sent with
/// the `user` role, whatever role it carried.
pub fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    let mut contents: Vec<Content> = messages.iter().map(to_content).collect();
    if let Some(outbound) = contents.last_mut() {
        outbound.role = "user".to_string();
    }
    contents
}

fn to_content(message: &ChatMessage) -> Content {
    let (role, text) = match message.role {
        MessageRole::Assistant | MessageRole::Model => ("model", message.content.clone()),
        MessageRole::System => ("user", format!("{SYSTEM_PREFIX}{}", message.content)),
        MessageRole::User => ("user", message.content.clone()),
    };
    Content {
        role: role.to_string(),
        parts: vec![Part { text }],
    }
}
