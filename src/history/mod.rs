mod memory;

use async_trait::async_trait;
use log::{ debug, info };
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cli::Args;
use crate::models::chat::{ Conversation, Message };

pub use memory::MemoryHistoryStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("conversation '{0}' does not exist")]
    NotFound(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns the history for `conversation_id`, creating one seeded with the
    /// system prompt when the id is unknown or expired. A missing or empty id
    /// gets a freshly generated one; any other id is used verbatim.
    async fn get_or_create(&self, conversation_id: Option<&str>) -> Conversation;

    async fn append_human(&self, conversation_id: &str, text: &str) -> Result<(), HistoryError>;

    async fn append_ai(&self, conversation_id: &str, text: &str) -> Result<(), HistoryError>;

    /// Marks a reply as streaming; the conversation does not expire until
    /// the matching `finish_reply`.
    async fn begin_reply(&self, conversation_id: &str) -> Result<(), HistoryError>;

    async fn finish_reply(&self, conversation_id: &str) -> Result<(), HistoryError>;

    async fn messages(&self, conversation_id: &str) -> Option<Vec<Message>>;

    /// Drops conversations idle for longer than the configured TTL.
    async fn purge_expired(&self) -> usize;

    async fn len(&self) -> usize;
}

pub fn initialize_history_store(
    args: &Args,
    system_prompt: String
) -> Arc<dyn HistoryStore> {
    let ttl = match args.history_ttl_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    match ttl {
        Some(ttl) => info!("Chat history kept in memory, idle TTL {:?}", ttl),
        None => info!("Chat history kept in memory without expiry"),
    }
    Arc::new(MemoryHistoryStore::new(system_prompt, ttl))
}

/// Periodically purges expired conversations until the task is aborted.
pub fn spawn_sweeper(store: Arc<dyn HistoryStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                info!("Purged {} expired conversation(s)", purged);
            } else {
                debug!("History sweep found nothing to purge");
            }
        }
    })
}
