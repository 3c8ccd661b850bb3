//! Token-bounded chat memory
//!
//! Every message is kept. [`ChatMemoryBuffer::get`] returns the newest
//! suffix of the conversation that fits the token ceiling, so eviction is a
//! view-time truncation.

use parking_lot::Mutex;

use crate::{Message, Role};

/// Default ceiling, in tokens
pub const DEFAULT_TOKEN_LIMIT: usize = 15000;

#[derive(Debug)]
pub struct ChatMemoryBuffer {
    token_limit: usize,
    messages: Mutex<Vec<Message>>,
}

impl ChatMemoryBuffer {
    pub fn new(token_limit: usize) -> Self {
        Self {
            token_limit,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    /// Append a message
    pub fn put(&self, message: Message) {
        self.messages.lock().push(message);
    }

    /// Newest messages that fit the ceiling
    ///
    /// `initial_token_count` is reserved for whatever the caller sends ahead
    /// of the history (system message, pending user turn). The window never
    /// starts with an assistant message; if nothing fits, it is empty.
    pub fn get(&self, initial_token_count: usize) -> Vec<Message> {
        let messages = self.messages.lock();

        if initial_token_count > self.token_limit {
            return Vec::new();
        }
        let budget = self.token_limit - initial_token_count;

        // suffix_tokens[i] = tokens of messages[i..]
        let mut suffix_tokens = vec![0usize; messages.len() + 1];
        for i in (0..messages.len()).rev() {
            suffix_tokens[i] = suffix_tokens[i + 1] + messages[i].estimated_tokens();
        }

        let mut start = 0;
        while start < messages.len() {
            if messages[start].role == Role::Assistant {
                start += 1;
                continue;
            }
            if suffix_tokens[start] <= budget {
                return messages[start..].to_vec();
            }
            start += 1;
        }

        Vec::new()
    }

    /// Cut the newest reply down to the part that was actually heard
    ///
    /// An empty `heard` removes the reply. Does nothing unless the newest
    /// message is an assistant message.
    pub fn truncate_last_reply(&self, heard: &str) {
        let mut messages = self.messages.lock();
        let Some(last) = messages.last_mut().filter(|m| m.role == Role::Assistant) else {
            return;
        };
        if heard.trim().is_empty() {
            messages.pop();
        } else {
            last.content = heard.to_string();
        }
    }

    /// Every stored message
    pub fn get_all(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn reset(&self) {
        self.messages.lock().clear();
    }
}

impl Default for ChatMemoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(messages: &[Message]) -> usize {
        messages.iter().map(Message::estimated_tokens).sum()
    }

    #[test]
    fn test_everything_fits() {
        let memory = ChatMemoryBuffer::default();
        memory.put(Message::user("Do you deliver to Pune?"));
        memory.put(Message::assistant("Yes, within two days."));

        let window = memory.get(0);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
    }

    #[test]
    fn test_window_respects_ceiling() {
        // each message: 40 chars -> 10 tokens + 4 overhead = 14
        let memory = ChatMemoryBuffer::new(50);
        for i in 0..10 {
            let text = format!("{:0>40}", i);
            if i % 2 == 0 {
                memory.put(Message::user(text));
            } else {
                memory.put(Message::assistant(text));
            }
        }

        let window = memory.get(0);
        assert!(tokens(&window) <= 50);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
        assert!(window[0].content.ends_with('8'));

        // nothing is deleted
        assert_eq!(memory.len(), 10);
    }

    #[test]
    fn test_initial_tokens_shrink_window() {
        let memory = ChatMemoryBuffer::new(50);
        for i in 0..4 {
            memory.put(Message::user(format!("{:0>40}", i)));
        }

        assert_eq!(memory.get(0).len(), 3);
        assert_eq!(memory.get(20).len(), 2);
        assert!(memory.get(51).is_empty());
    }

    #[test]
    fn test_never_starts_with_assistant() {
        let memory = ChatMemoryBuffer::new(20);
        memory.put(Message::user(format!("{:0>40}", "u")));
        memory.put(Message::assistant("short"));
        memory.put(Message::assistant("short again"));

        // user + both replies exceed 20, so the user turn drops; the two
        // assistant messages alone must not form the window
        let window = memory.get(0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_oversized_single_message() {
        let memory = ChatMemoryBuffer::new(5);
        memory.put(Message::user("this message is far longer than five tokens"));
        assert!(memory.get(0).is_empty());
    }

    #[test]
    fn test_truncate_last_reply() {
        let memory = ChatMemoryBuffer::default();
        memory.put(Message::user("What are your hours?"));
        memory.put(Message::assistant("We open at nine. We close at six."));

        memory.truncate_last_reply("We open at nine.");
        assert_eq!(memory.get_all()[1], Message::assistant("We open at nine."));

        memory.truncate_last_reply("");
        assert_eq!(memory.get_all(), vec![Message::user("What are your hours?")]);

        // newest is a user turn now: left alone
        memory.truncate_last_reply("");
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_reset() {
        let memory = ChatMemoryBuffer::new(100);
        memory.put(Message::user("hi"));
        memory.reset();
        assert!(memory.is_empty());
    }
}
