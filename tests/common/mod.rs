use async_trait::async_trait;
use futures::stream;
use std::sync::{ Arc, Mutex };
use workflow_agent::agent::WorkflowAgent;
use workflow_agent::history::{ HistoryStore, MemoryHistoryStore };
use workflow_agent::llm::chat::{ ChatClient, FragmentStream };
use workflow_agent::llm::{ LlmError, LlmType };
use workflow_agent::models::chat::Message;

pub const SYSTEM_PROMPT: &str = "You are an expert n8n workflow developer.";

/// One scripted reply: text fragments, optionally ending in a provider error.
#[derive(Clone, Default)]
pub struct Reply {
    pub fragments: Vec<String>,
    pub fail_with: Option<String>,
    pub fail_to_start: bool,
}

impl Reply {
    pub fn text(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_after(fragments: &[&str], error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            ..Self::text(fragments)
        }
    }
}

/// Chat client that plays back canned replies and records every history it
/// was asked to complete.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<Vec<Reply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let reply = self.replies.lock().unwrap().pop().unwrap_or_default();

        if reply.fail_to_start {
            return Err(LlmError::Config("provider unreachable".into()));
        }

        let mut items: Vec<Result<String, LlmError>> = reply.fragments.into_iter().map(Ok).collect();
        if let Some(error) = reply.fail_with {
            items.push(Err(LlmError::Decode(error)));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> String {
        "memory://scripted".to_string()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Mistral
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub client: Arc<ScriptedClient>,
    pub store: Arc<dyn HistoryStore>,
}

pub fn test_app(replies: Vec<Reply>) -> TestApp {
    let client = Arc::new(ScriptedClient::new(replies));
    let store: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new(SYSTEM_PROMPT, None));
    let agent = WorkflowAgent::with_parts(client.clone(), Arc::clone(&store));
    TestApp {
        router: workflow_agent::server::api::build_router(Arc::new(agent)),
        client,
        store,
    }
}
