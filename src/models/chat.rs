use serde::{ Serialize, Deserialize };

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content")]
pub enum Message {
    #[serde(rename = "system")] System(String),
    #[serde(rename = "human")] Human(String),
    #[serde(rename = "ai")] Ai(String),
}

impl Message {
    pub fn content(&self) -> &str {
        match self {
            Message::System(text) | Message::Human(text) | Message::Ai(text) => text,
        }
    }

    /// Role name as understood by OpenAI-style chat completion APIs.
    pub fn provider_role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::Human(_) => "user",
            Message::Ai(_) => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}
