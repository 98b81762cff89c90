use crate::cli::Args;
use crate::config::prompt::load_system_prompt;
use crate::history::{ initialize_history_store, HistoryError, HistoryStore };
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, FragmentStream };
use crate::llm::LlmConfig;
use crate::models::chat::Message;
use crate::relay::{ spawn_relay, RelayOutcome };

use futures::stream;
use log::{ error, info };
use std::error::Error;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// A prompt that has been recorded in history and is ready to be sent.
#[derive(Debug, Clone)]
pub struct Turn {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

/// Ties the chat client to the conversation store for one request at a time.
#[derive(Clone)]
pub struct WorkflowAgent {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn HistoryStore>,
}

impl WorkflowAgent {
    pub fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let system_prompt = load_system_prompt(args.system_prompt_path.as_deref())?;

        let chat_config = LlmConfig {
            llm_type: args.chat_llm_type
                .parse()
                .map_err(|e| format!("Invalid chat LLM type: {}", e))?,
            api_key: args.chat_api_key.clone(),
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            temperature: args.temperature,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            chat_client.get_llm_type(),
            chat_client.get_model(),
            chat_client.get_base_url()
        );

        let history_store = initialize_history_store(args, system_prompt);
        Ok(Self::with_parts(chat_client, history_store))
    }

    pub fn with_parts(chat_client: Arc<dyn ChatClient>, history_store: Arc<dyn HistoryStore>) -> Self {
        Self {
            chat_client,
            history_store,
        }
    }

    pub fn history_store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history_store)
    }

    /// Resolves the conversation and records the human prompt in it.
    pub async fn start_turn(
        &self,
        conversation_id: Option<&str>,
        prompt: &str
    ) -> Result<Turn, HistoryError> {
        let conversation = self.history_store.get_or_create(conversation_id).await;
        self.history_store.append_human(&conversation.id, prompt).await?;
        let messages = self.history_store
            .messages(&conversation.id).await
            .ok_or_else(|| HistoryError::NotFound(conversation.id.clone()))?;

        Ok(Turn {
            conversation_id: conversation.id,
            messages,
        })
    }

    /// Sends the turn's history to the model and relays the reply.
    pub async fn stream_turn(
        &self,
        turn: Turn
    ) -> (ReceiverStream<String>, JoinHandle<RelayOutcome>) {
        let fragments: FragmentStream = match self.chat_client.stream_chat(&turn.messages).await {
            Ok(fragments) => fragments,
            Err(e) => {
                error!("Conversation {}: could not start model stream: {}", turn.conversation_id, e);
                Box::pin(stream::once(async move { Err::<String, _>(e) }))
            }
        };

        spawn_relay(fragments, self.history_store(), turn.conversation_id)
    }
}
