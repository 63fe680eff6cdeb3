//! Conversation history
//!
//! Each pipeline owns a [`ConversationLog`]: a bounded window of the most
//! recent user/assistant turns plus its system prompt. All logs share one
//! [`HistoryDocument`] on disk. Persistence failures are logged and never
//! fail the request that triggered them.

mod document;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use document::HistoryDocument;

use crate::engine::ChatMessage;
use crate::{Error, Result};

/// Bounded per-pipeline conversation
#[derive(Debug)]
pub struct ConversationLog {
    name: String,
    system_prompt: String,
    /// Maximum stored messages: two per turn
    capacity: usize,
    turns: Mutex<VecDeque<ChatMessage>>,
    document: Arc<HistoryDocument>,
}

impl ConversationLog {
    /// Open the log for `name`, restoring whatever the document holds
    ///
    /// Restored history is trimmed to the newest whole turns that fit.
    pub fn open(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        max_turns: usize,
        document: Arc<HistoryDocument>,
    ) -> Self {
        let name = name.into();
        let capacity = max_turns.saturating_mul(2);

        let mut restored = match document.load(&name) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(pipeline = %name, error = %e, "could not load history, starting empty");
                Vec::new()
            }
        };
        if restored.len() > capacity {
            restored.drain(..restored.len() - capacity);
        }
        if restored.len() % 2 == 1 {
            restored.remove(0);
        }
        if !restored.is_empty() {
            tracing::info!(pipeline = %name, messages = restored.len(), "restored conversation history");
        }

        Self {
            name,
            system_prompt: system_prompt.into(),
            capacity,
            turns: Mutex::new(restored.into()),
            document,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ChatMessage>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, turns: &VecDeque<ChatMessage>) {
        let snapshot: Vec<ChatMessage> = turns.iter().cloned().collect();
        if let Err(e) = self.document.store(&self.name, &snapshot) {
            tracing::warn!(pipeline = %self.name, error = %e, "failed to save history");
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Maximum number of stored messages
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prompt for a new user utterance: system prompt, history, then the utterance
    ///
    /// Does not modify the log.
    #[must_use]
    pub fn get_messages(&self, user_text: &str) -> Vec<ChatMessage> {
        let turns = self.lock();
        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(turns.iter().cloned());
        messages.push(ChatMessage::user(user_text));
        messages
    }

    /// Record a completed exchange, evicting the oldest turns beyond capacity
    pub fn add_exchange(&self, user_text: &str, assistant_text: &str) {
        let mut turns = self.lock();
        turns.push_back(ChatMessage::user(user_text));
        turns.push_back(ChatMessage::assistant(assistant_text));
        while turns.len() > self.capacity {
            turns.pop_front();
        }
        self.persist(&turns);
    }

    /// Forget the conversation
    pub fn clear(&self) {
        let mut turns = self.lock();
        turns.clear();
        self.persist(&turns);
        tracing::info!(pipeline = %self.name, "conversation history cleared");
    }

    /// Snapshot of the stored turns, oldest first
    #[must_use]
    pub fn turns(&self) -> Vec<ChatMessage> {
        self.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Every pipeline's log over one shared document
#[derive(Debug)]
pub struct ConversationStore {
    document: Arc<HistoryDocument>,
    max_turns: usize,
    logs: HashMap<String, Arc<ConversationLog>>,
}

impl ConversationStore {
    pub fn new(document: HistoryDocument, max_turns: usize) -> Self {
        Self {
            document: Arc::new(document),
            max_turns,
            logs: HashMap::new(),
        }
    }

    /// Open (or return the already open) log for a pipeline
    pub fn open(&mut self, name: &str, system_prompt: &str) -> Arc<ConversationLog> {
        let log = self.logs.entry(name.to_string()).or_insert_with(|| {
            Arc::new(ConversationLog::open(
                name,
                system_prompt,
                self.max_turns,
                Arc::clone(&self.document),
            ))
        });
        Arc::clone(log)
    }

    /// Log registered under `name`
    ///
    /// # Errors
    ///
    /// Returns error if no log was opened under that name
    pub fn get(&self, name: &str) -> Result<&Arc<ConversationLog>> {
        self.logs
            .get(name)
            .ok_or_else(|| Error::UnknownConversation(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns error if no log was opened under `name`
    pub fn get_messages(&self, name: &str, user_text: &str) -> Result<Vec<ChatMessage>> {
        Ok(self.get(name)?.get_messages(user_text))
    }

    /// # Errors
    ///
    /// Returns error if no log was opened under `name`
    pub fn add_exchange(&self, name: &str, user_text: &str, assistant_text: &str) -> Result<()> {
        self.get(name)?.add_exchange(user_text, assistant_text);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns error if no log was opened under `name`
    pub fn clear(&self, name: &str) -> Result<()> {
        self.get(name)?.clear();
        Ok(())
    }

    /// Names of the open logs
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.logs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Role;

    fn memory_log(max_turns: usize) -> ConversationLog {
        ConversationLog::open("robot", "Eres un robot.", max_turns, Arc::new(HistoryDocument::in_memory()))
    }

    #[test]
    fn test_get_messages_layout() {
        let log = memory_log(3);
        log.add_exchange("hola", "buenas");

        let messages = log.get_messages("qué tal");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "Eres un robot.");
        assert_eq!(messages[1], ChatMessage::user("hola"));
        assert_eq!(messages[2], ChatMessage::assistant("buenas"));
        assert_eq!(messages[3], ChatMessage::user("qué tal"));
    }

    #[test]
    fn test_get_messages_is_pure() {
        let log = memory_log(3);
        let _ = log.get_messages("uno");
        let _ = log.get_messages("dos");
        assert!(log.is_empty());
    }

    #[test]
    fn test_bound_keeps_latest_turns() {
        let log = memory_log(2);
        for i in 0..5 {
            log.add_exchange(&format!("u{i}"), &format!("a{i}"));
        }

        assert_eq!(log.len(), 4);
        assert_eq!(
            log.turns(),
            vec![
                ChatMessage::user("u3"),
                ChatMessage::assistant("a3"),
                ChatMessage::user("u4"),
                ChatMessage::assistant("a4"),
            ]
        );
    }

    #[test]
    fn test_zero_turns_keeps_nothing() {
        let log = memory_log(0);
        log.add_exchange("hola", "buenas");
        assert!(log.is_empty());
        assert_eq!(log.get_messages("x").len(), 2);
    }

    #[test]
    fn test_clear() {
        let log = memory_log(2);
        log.add_exchange("hola", "buenas");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_store_unknown_name() {
        let store = ConversationStore::new(HistoryDocument::in_memory(), 5);
        assert!(matches!(
            store.get_messages("robot", "x"),
            Err(Error::UnknownConversation(_))
        ));
    }

    #[test]
    fn test_store_open_is_idempotent() {
        let mut store = ConversationStore::new(HistoryDocument::in_memory(), 5);
        let first = store.open("robot", "prompt");
        first.add_exchange("hola", "buenas");
        let second = store.open("robot", "other prompt");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.get_messages("robot", "x").unwrap().len(), 4);
        store.clear("robot").unwrap();
        assert!(first.is_empty());
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["robot"]);
    }
}
