//! Bridge module for converting claim transcript turns into rig::completion::Message

use claim_draft::{ChatMessage, MessageRole};
use rig::completion::Message;

/// Text the model sees for one turn. Drafts are inlined so revisions can build on them.
pub fn turn_text(msg: &ChatMessage) -> String {
    match msg.draft() {
        Some(draft) => format!("{}\n\n[DRAFT]\n{}", msg.content, draft.document()),
        None => msg.content.clone(),
    }
}

/// Convert a ChatMessage to a rig::completion::Message
pub fn to_rig_message(msg: &ChatMessage) -> Message {
    match msg.role {
        MessageRole::User => Message::user(turn_text(msg)),
        MessageRole::Assistant => Message::assistant(turn_text(msg)),
    }
}

/// Convert a transcript to rig::completion::Message vector
pub fn to_rig_messages(messages: &[ChatMessage]) -> Vec<Message> {
    messages.iter().map(to_rig_message).collect()
}
