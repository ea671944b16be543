//! Provider adapters: each owns exactly two pure translations — building
//! an upstream HTTP request from a neutral shape, and parsing one raw SSE
//! frame from that same provider's wire format into a neutral event.
//! Dispatched through a closed enum, no dynamic dispatch, mirroring the
//! inherited `ProviderHandlerImpl` + closed-enum design.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::error::{GatewayError, GatewayResult};

pub struct BuildRequestParams<'a> {
    pub system_prompt: &'a str,
    pub user_message: &'a str,
    pub image_base64: Option<&'a str>,
    pub max_tokens: u32,
    pub smart_mode: bool,
}

pub struct HttpRequestSpec {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

pub enum StreamEvent {
    Delta(String),
    Done,
    Ignore,
}

pub trait ProviderAdapter {
    fn name(&self) -> &'static str;
    fn build_request(&self, base_url: &str, model: &str, api_key: &str, params: &BuildRequestParams) -> HttpRequestSpec;
    fn parse_stream_event(&self, raw_frame: &str) -> StreamEvent;
}

pub enum Adapter {
    OpenAi(openai::OpenAiAdapter),
    Anthropic(anthropic::AnthropicAdapter),
    Gemini(gemini::GeminiAdapter),
}

impl Adapter {
    pub fn name(&self) -> &'static str {
        match self {
            Adapter::OpenAi(a) => a.name(),
            Adapter::Anthropic(a) => a.name(),
            Adapter::Gemini(a) => a.name(),
        }
    }

    pub fn build_request(&self, base_url: &str, model: &str, api_key: &str, params: &BuildRequestParams) -> HttpRequestSpec {
        match self {
            Adapter::OpenAi(a) => a.build_request(base_url, model, api_key, params),
            Adapter::Anthropic(a) => a.build_request(base_url, model, api_key, params),
            Adapter::Gemini(a) => a.build_request(base_url, model, api_key, params),
        }
    }

    pub fn parse_stream_event(&self, raw_frame: &str) -> StreamEvent {
        match self {
            Adapter::OpenAi(a) => a.parse_stream_event(raw_frame),
            Adapter::Anthropic(a) => a.parse_stream_event(raw_frame),
            Adapter::Gemini(a) => a.parse_stream_event(raw_frame),
        }
    }
}

/// `openai` and `grok` share the OpenAI-compatible adapter verbatim, each
/// against its own configured base URL and model family.
pub fn for_provider(provider: &str) -> GatewayResult<Adapter> {
    match provider {
        "openai" | "grok" => Ok(Adapter::OpenAi(openai::OpenAiAdapter)),
        "anthropic" => Ok(Adapter::Anthropic(anthropic::AnthropicAdapter)),
        "gemini" => Ok(Adapter::Gemini(gemini::GeminiAdapter)),
        other => Err(GatewayError::UnsupportedProvider(other.to_string())),
    }
}
