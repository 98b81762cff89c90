use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (mistral, openai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "mistral")]
    pub chat_llm_type: String,

    /// API Key for the Chat LLM provider. Startup fails when it is missing.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    /// Model name for chat completion (e.g., mistral-small-latest, gpt-4o)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Full chat-completions URL of the provider (e.g., https://api.mistral.ai/v1/chat/completions)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// Sampling temperature sent with every completion request.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Optional plain-text file replacing the built-in n8n system prompt.
    #[arg(long, env = "SYSTEM_PROMPT_PATH")]
    pub system_prompt_path: Option<String>,

    // --- History Store Args ---
    /// Idle time-to-live in seconds for in-memory conversations. 0 means no TTL.
    #[arg(long, env = "HISTORY_TTL_SECS", default_value = "3600")]
    pub history_ttl_secs: u64,

    /// Interval in seconds between background sweeps of expired conversations.
    #[arg(long, env = "HISTORY_SWEEP_SECS", default_value = "300")]
    pub history_sweep_secs: u64,

    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:5001")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
