//! In-memory chat history per session.

use deskhand_core::message::{Conversation, Message};
use std::collections::HashMap;
use std::sync::Mutex;

/// Bounded map of session id → conversation. When full, the session that
/// was updated longest ago is evicted.
pub struct SessionStore {
    max_sessions: usize,
    history_limit: usize,
    sessions: Mutex<HashMap<String, Conversation>>,
}

impl SessionStore {
    pub fn new(max_sessions: usize, history_limit: usize) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            history_limit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Messages of `session_id`, oldest first. Empty for unknown sessions.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Append one completed turn.
    pub fn record_turn(&self, session_id: &str, prompt: &str, response: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if sessions.len() >= self.max_sessions && !sessions.contains_key(session_id) {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, c)| c.updated_at)
                .map(|(k, _)| k.clone())
            {
                sessions.remove(&oldest);
            }
        }

        let conversation = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation::new(session_id));
        conversation.push(Message::user(prompt));
        if !response.is_empty() {
            conversation.push(Message::assistant(response));
        }
        conversation.truncate_front(self.history_limit);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::message::Role;

    #[test]
    fn turns_accumulate_per_session() {
        let store = SessionStore::new(4, 10);
        store.record_turn("a", "hi", "hello");
        store.record_turn("a", "again", "yes");
        store.record_turn("b", "other", "ok");

        let history = store.history("a");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[3].content, "yes");
        assert_eq!(store.history("b").len(), 2);
        assert!(store.history("missing").is_empty());
    }

    #[test]
    fn history_is_truncated_from_the_front() {
        let store = SessionStore::new(4, 3);
        store.record_turn("a", "one", "1");
        store.record_turn("a", "two", "2");

        let history = store.history("a");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "1");
        assert_eq!(history[2].content, "2");
    }

    #[test]
    fn oldest_session_is_evicted() {
        let store = SessionStore::new(2, 10);
        store.record_turn("first", "x", "y");
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.record_turn("second", "x", "y");
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.record_turn("third", "x", "y");

        assert_eq!(store.len(), 2);
        assert!(store.history("first").is_empty());
        assert_eq!(store.history("third").len(), 2);
    }

    #[test]
    fn empty_response_records_prompt_only() {
        let store = SessionStore::new(2, 10);
        store.record_turn("a", "hi", "");
        assert_eq!(store.history("a").len(), 1);
    }
}
