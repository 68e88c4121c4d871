use crate::llm::types::{ChatMessage, ContentPart, MessageContent};

pub const IMAGE_PLACEHOLDER: &str = "[earlier screenshot omitted]";

/// Conversation of one task. Only the newest screenshot is kept; older image
/// parts become a placeholder as soon as a new one arrives.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything and starts over with a system message.
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(ChatMessage::system(system_prompt));
    }

    /// Replaces the leading system message, keeping the rest.
    pub fn set_system(&mut self, system_prompt: impl Into<String>) {
        match self.messages.first_mut() {
            Some(first) if first.role == crate::llm::types::Role::System => {
                *first = ChatMessage::system(system_prompt);
            }
            _ => self.messages.insert(0, ChatMessage::system(system_prompt)),
        }
    }

    /// Appends a message. A new screenshot replaces the image parts of every
    /// earlier message with a placeholder, so at most one image is held.
    pub fn push(&mut self, message: ChatMessage) {
        if message.has_image() {
            for earlier in self.messages.iter_mut().filter(|m| m.has_image()) {
                strip_images(earlier);
            }
        }
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages to send to the model.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}

fn strip_images(message: &mut ChatMessage) {
    if let MessageContent::Parts(parts) = &mut message.content {
        for part in parts.iter_mut() {
            if matches!(part, ContentPart::ImageUrl { .. }) {
                *part = ContentPart::Text {
                    text: IMAGE_PLACEHOLDER.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;

    #[test]
    fn only_latest_image_is_kept() {
        let mut t = Transcript::new();
        t.reset("sys");
        t.push(ChatMessage::user_with_image("first", "data:image/png;base64,AAA"));
        t.push(ChatMessage::assistant("ok"));
        t.push(ChatMessage::user_with_image("second", "data:image/png;base64,BBB"));

        let stored = t.messages();
        assert_eq!(stored.len(), 4);
        assert!(!stored[1].has_image());
        assert_eq!(stored[1].text(), format!("first\n{IMAGE_PLACEHOLDER}"));
        assert!(stored[3].has_image());
        assert_eq!(stored.iter().filter(|m| m.has_image()).count(), 1);

        // text-only turns leave the latest image alone
        t.push(ChatMessage::user("Tool execution results:\nok"));
        assert!(t.messages()[3].has_image());
        assert_eq!(t.request_messages().len(), 5);
    }

    #[test]
    fn reset_starts_with_system() {
        let mut t = Transcript::new();
        t.push(ChatMessage::user("stale"));
        t.reset("rules");
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].role, Role::System);
        t.set_system("new rules");
        assert_eq!(t.messages()[0].text(), "new rules");
        assert_eq!(t.len(), 1);
    }
}
