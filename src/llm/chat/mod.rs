pub mod mistral;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmError, LlmType };
use self::mistral::MistralChatClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::Message;

/// One step of a streamed completion: a text delta or the terminal failure.
pub type Fragment = Result<String, LlmError>;
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

const STREAM_CHANNEL_CAPACITY: usize = 32;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Streams the model's reply to the full conversation `messages`.
    ///
    /// Transport failures that happen after the request is dispatched arrive
    /// as an `Err` item inside the stream; the outer `Result` only covers
    /// failures to build the request.
    async fn stream_chat(&self, messages: &[Message]) -> Result<FragmentStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
    fn get_llm_type(&self) -> LlmType;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

pub fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.provider_role().to_string(),
            content: m.content().to_string(),
        })
        .collect()
}

#[derive(Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum StreamLine {
    Token(String),
    Done,
    Skip,
}

/// Parses one line of an OpenAI-compatible `text/event-stream` body.
pub fn parse_sse_line(line: &str) -> Result<StreamLine, LlmError> {
    let line = line.trim_end_matches('\r');
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => return Ok(StreamLine::Skip),
    };
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }
    if data.is_empty() {
        return Ok(StreamLine::Skip);
    }

    let chunk: SseChunk = serde_json
        ::from_str(data)
        .map_err(|e| LlmError::Decode(format!("{} in event '{}'", e, data)))?;

    let mut text = String::new();
    let mut finished = false;
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            text.push_str(&content);
        }
        if choice.finish_reason.is_some() {
            finished = true;
        }
    }

    if !text.is_empty() {
        Ok(StreamLine::Token(text))
    } else if finished {
        Ok(StreamLine::Done)
    } else {
        Ok(StreamLine::Skip)
    }
}

pub fn build_http_client(headers: reqwest::header::HeaderMap) -> Result<HttpClient, LlmError> {
    HttpClient::builder()
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(LlmError::from)
}

/// POSTs `payload` and turns the line-oriented response body into a
/// fragment stream, one `line_parser` call per complete line.
pub fn http_stream_generate(
    client: HttpClient,
    url: String,
    payload: impl Serialize + Send + 'static,
    line_parser: fn(&str) -> Result<StreamLine, LlmError>,
) -> FragmentStream {
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let resp = match client.post(&url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(LlmError::Http(e))).await;
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let _ = tx.send(Err(LlmError::Status { status, body })).await;
            return;
        }

        let mut bytes = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.extend_from_slice(&buf);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = pending.drain(..=pos).collect();
                        match forward_line(&raw[..raw.len() - 1], line_parser, &tx).await {
                            LineFlow::Continue => {}
                            LineFlow::Stop => {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(LlmError::Http(e))).await;
                    return;
                }
            }
        }

        if !pending.is_empty() {
            let _ = forward_line(&pending, line_parser, &tx).await;
        }
        debug!("Provider stream from {} finished", url);
    });

    Box::pin(ReceiverStream::new(rx))
}

enum LineFlow {
    Continue,
    Stop,
}

async fn forward_line(
    raw: &[u8],
    line_parser: fn(&str) -> Result<StreamLine, LlmError>,
    tx: &mpsc::Sender<Fragment>
) -> LineFlow {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            let _ = tx.send(Err(LlmError::Decode(format!("invalid UTF-8 in stream: {}", e)))).await;
            return LineFlow::Stop;
        }
    };

    match line_parser(line) {
        Ok(StreamLine::Token(text)) => {
            if tx.send(Ok(text)).await.is_err() {
                return LineFlow::Stop;
            }
            LineFlow::Continue
        }
        Ok(StreamLine::Skip) => LineFlow::Continue,
        Ok(StreamLine::Done) => LineFlow::Stop,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            LineFlow::Stop
        }
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Mistral => {
            let specific_client = MistralChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
