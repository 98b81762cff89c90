use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::history::HistoryStore;
use crate::llm::chat::Fragment;

pub const JSON_FENCE_OPEN: &str = "```json";
pub const FENCE: &str = "```";

/// Final body fragment sent when the provider stream fails part way.
pub const STREAM_ERROR_PAYLOAD: &str = r#"{"error": "Failed to stream response from AI."}"#;

const RELAY_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Provider stream ended cleanly; holds the full cleaned reply.
    Completed(String),
    /// Provider stream failed; the error payload was sent to the client.
    Failed,
    /// Client went away before the provider finished.
    Abandoned,
}

/// Removes markdown code-fence markers from a single fragment.
///
/// The `json` opener is removed first so that it never degrades into a bare
/// `json` left over after the plain fence is stripped.
pub fn strip_fences(fragment: &str) -> String {
    fragment.replace(JSON_FENCE_OPEN, "").replace(FENCE, "")
}

/// Pulls fragments, forwards each cleaned one to `tx` as soon as it arrives
/// and returns what should happen to the conversation history.
pub async fn forward<S>(mut fragments: S, tx: &mpsc::Sender<String>) -> RelayOutcome
    where S: Stream<Item = Fragment> + Unpin
{
    let mut full_response = String::new();

    loop {
        match fragments.next().await {
            Some(Ok(raw)) => {
                let cleaned = strip_fences(&raw);
                if cleaned.is_empty() {
                    continue;
                }
                full_response.push_str(&cleaned);
                if tx.send(cleaned).await.is_err() {
                    warn!("Client disconnected mid-stream, dropping {} buffered chars", full_response.len());
                    return RelayOutcome::Abandoned;
                }
            }
            Some(Err(e)) => {
                error!("An error occurred during streaming: {}", e);
                debug!("Discarding partial AI response ({} chars)", full_response.len());
                let _ = tx.send(STREAM_ERROR_PAYLOAD.to_string()).await;
                return RelayOutcome::Failed;
            }
            None => {
                return RelayOutcome::Completed(full_response);
            }
        }
    }
}

/// Runs [`forward`] on its own task and records the AI turn once the
/// provider stream completes. The conversation is kept alive for the whole
/// stream. The returned stream is the response body.
pub fn spawn_relay<S>(
    fragments: S,
    store: Arc<dyn HistoryStore>,
    conversation_id: String
) -> (ReceiverStream<String>, JoinHandle<RelayOutcome>)
    where S: Stream<Item = Fragment> + Unpin + Send + 'static
{
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        if let Err(e) = store.begin_reply(&conversation_id).await {
            warn!("Conversation {}: reply not pinned: {}", conversation_id, e);
        }
        let outcome = forward(fragments, &tx).await;
        if let RelayOutcome::Completed(text) = &outcome {
            match store.append_ai(&conversation_id, text).await {
                Ok(()) => info!("Conversation {}: stored AI reply ({} chars)", conversation_id, text.len()),
                Err(e) => error!("Conversation {}: could not store AI reply: {}", conversation_id, e),
            }
        }
        let _ = store.finish_reply(&conversation_id).await;
        outcome
    });

    (ReceiverStream::new(rx), handle)
}
