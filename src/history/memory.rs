use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{ HistoryError, HistoryStore };
use crate::models::chat::{ Conversation, Message };

struct Entry {
    messages: Vec<Message>,
    last_used: Instant,
    /// Replies currently streaming into this conversation.
    in_flight: usize,
}

impl Entry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match ttl {
            Some(ttl) => self.in_flight == 0 && now.duration_since(self.last_used) > ttl,
            None => false,
        }
    }
}

/// Process-local history map behind a single lock.
///
/// Expired entries are dropped in bulk by [`HistoryStore::purge_expired`];
/// `get_or_create` only checks the entry it is asked for.
pub struct MemoryHistoryStore {
    system_prompt: String,
    ttl: Option<Duration>,
    conversations: Mutex<HashMap<String, Entry>>,
}

impl MemoryHistoryStore {
    pub fn new(system_prompt: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ttl,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    fn seeded_entry(&self, now: Instant) -> Entry {
        Entry {
            messages: vec![Message::System(self.system_prompt.clone())],
            last_used: now,
            in_flight: 0,
        }
    }

    async fn with_entry<T>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Entry) -> T
    ) -> Result<T, HistoryError> {
        let mut conversations = self.conversations.lock().await;
        let entry = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        let out = f(entry);
        entry.last_used = Instant::now();
        Ok(out)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_or_create(&self, conversation_id: Option<&str>) -> Conversation {
        let id = match conversation_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let now = Instant::now();
        let mut conversations = self.conversations.lock().await;
        let stale = conversations
            .get(&id)
            .map_or(false, |entry| entry.is_expired(self.ttl, now));
        if stale {
            info!("Conversation {} expired, starting over", id);
            conversations.insert(id.clone(), self.seeded_entry(now));
        }

        let entry = conversations.entry(id.clone()).or_insert_with(|| {
            info!("Starting conversation {}", id);
            self.seeded_entry(now)
        });
        entry.last_used = now;

        Conversation {
            id,
            messages: entry.messages.clone(),
        }
    }

    async fn append_human(&self, conversation_id: &str, text: &str) -> Result<(), HistoryError> {
        let message = Message::Human(text.to_string());
        self.with_entry(conversation_id, |entry| entry.messages.push(message)).await
    }

    async fn append_ai(&self, conversation_id: &str, text: &str) -> Result<(), HistoryError> {
        let message = Message::Ai(text.to_string());
        self.with_entry(conversation_id, |entry| entry.messages.push(message)).await
    }

    async fn begin_reply(&self, conversation_id: &str) -> Result<(), HistoryError> {
        self.with_entry(conversation_id, |entry| {
            entry.in_flight += 1;
        }).await
    }

    async fn finish_reply(&self, conversation_id: &str) -> Result<(), HistoryError> {
        self.with_entry(conversation_id, |entry| {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }).await
    }

    async fn messages(&self, conversation_id: &str) -> Option<Vec<Message>> {
        let conversations = self.conversations.lock().await;
        conversations.get(conversation_id).map(|entry| entry.messages.clone())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut conversations = self.conversations.lock().await;
        let before = conversations.len();
        conversations.retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - conversations.len()
    }

    async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM: &str = "you write n8n workflows";

    #[tokio::test]
    async fn absent_id_generates_seeded_conversation() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        let conv = store.get_or_create(None).await;

        assert!(Uuid::parse_str(&conv.id).is_ok());
        assert_eq!(conv.messages, vec![Message::System(SYSTEM.to_string())]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn empty_id_is_treated_as_absent() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        let conv = store.get_or_create(Some("")).await;
        assert!(Uuid::parse_str(&conv.id).is_ok());
    }

    #[tokio::test]
    async fn client_id_is_kept_verbatim() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        assert_eq!(store.get_or_create(Some(" abc ")).await.id, " abc ");
        assert_eq!(store.get_or_create(Some("   ")).await.id, "   ");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_id_is_adopted() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        let conv = store.get_or_create(Some("client-chosen")).await;

        assert_eq!(conv.id, "client-chosen");
        assert_eq!(conv.messages.len(), 1);
    }

    #[tokio::test]
    async fn known_id_keeps_prior_turns() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        let id = store.get_or_create(None).await.id;
        store.append_human(&id, "make a webhook").await.unwrap();
        store.append_ai(&id, "{}").await.unwrap();

        let again = store.get_or_create(Some(id.as_str())).await;
        assert_eq!(
            again.messages,
            vec![
                Message::System(SYSTEM.to_string()),
                Message::Human("make a webhook".to_string()),
                Message::Ai("{}".to_string())
            ]
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn appending_to_missing_conversation_fails() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        assert_eq!(
            store.append_human("nope", "hi").await,
            Err(HistoryError::NotFound("nope".to_string()))
        );
        assert_eq!(store.messages("nope").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_conversations_expire() {
        let store = MemoryHistoryStore::new(SYSTEM, Some(Duration::from_secs(60)));
        let stale = store.get_or_create(Some("stale")).await.id;
        store.append_human(&stale, "old prompt").await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        let fresh = store.get_or_create(Some("fresh")).await.id;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.messages(&stale).await, None);
        assert!(store.messages(&fresh).await.is_some());

        let reborn = store.get_or_create(Some(stale.as_str())).await;
        assert_eq!(reborn.messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_refreshes_ttl() {
        let store = MemoryHistoryStore::new(SYSTEM, Some(Duration::from_secs(60)));
        let id = store.get_or_create(None).await.id;

        tokio::time::advance(Duration::from_secs(50)).await;
        store.append_human(&id, "still here").await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.messages(&id).await.map(|m| m.len()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_id_restarts_without_a_sweep() {
        let store = MemoryHistoryStore::new(SYSTEM, Some(Duration::from_secs(60)));
        let id = store.get_or_create(Some("old")).await.id;
        store.append_human(&id, "first").await.unwrap();
        store.get_or_create(Some("other")).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        let again = store.get_or_create(Some("old")).await;
        assert_eq!(again.messages, vec![Message::System(SYSTEM.to_string())]);
        // Lookups leave unrelated entries to the sweeper.
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_reply_pins_conversation() {
        let store = MemoryHistoryStore::new(SYSTEM, Some(Duration::from_secs(60)));
        let id = store.get_or_create(None).await.id;
        store.append_human(&id, "slow model").await.unwrap();
        store.begin_reply(&id).await.unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(store.purge_expired().await, 0);
        store.append_ai(&id, "{}").await.unwrap();
        store.finish_reply(&id).await.unwrap();
        assert_eq!(store.messages(&id).await.map(|m| m.len()), Some(3));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_means_no_expiry() {
        let store = MemoryHistoryStore::new(SYSTEM, None);
        store.get_or_create(Some("forever")).await;
        tokio::time::advance(Duration::from_secs(86_400 * 30)).await;
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }
}
