//! Anthropic Messages adapter. Grounded on the inherited `AnthropicHandler`,
//! trimmed to the single-provider contract.

use serde_json::{json, Value};

use super::{BuildRequestParams, HttpRequestSpec, ProviderAdapter, StreamEvent};
use crate::sse::parse_sse_data;

pub struct AnthropicAdapter;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn build_request(&self, base_url: &str, model: &str, api_key: &str, params: &BuildRequestParams) -> HttpRequestSpec {
        let user_content = match params.image_base64 {
            Some(b64) => json!([
                { "type": "text", "text": params.user_message },
                { "type": "image", "source": { "type": "base64", "media_type": "image/jpeg", "data": b64 } }
            ]),
            None => json!(params.user_message),
        };

        let mut body = json!({
            "model": model,
            "system": params.system_prompt,
            "messages": [ { "role": "user", "content": user_content } ],
            "max_tokens": params.max_tokens,
            "stream": true,
        });

        let mut headers = vec![
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ];

        if params.smart_mode {
            headers.push(("anthropic-beta".to_string(), INTERLEAVED_THINKING_BETA.to_string()));
            let budget = (params.max_tokens as u64 * 2).min(10_000);
            body.as_object_mut().unwrap().insert(
                "thinking".to_string(),
                json!({ "type": "enabled", "budget_tokens": budget }),
            );
        }

        HttpRequestSpec { url: base_url.to_string(), headers, body }
    }

    fn parse_stream_event(&self, raw_frame: &str) -> StreamEvent {
        let Some(data) = parse_sse_data(raw_frame) else {
            return StreamEvent::Ignore;
        };
        let Ok(parsed) = serde_json::from_str::<Value>(data) else {
            return StreamEvent::Ignore;
        };

        if parsed.get("type").and_then(|t| t.as_str()) == Some("message_stop") {
            return StreamEvent::Done;
        }

        if parsed.get("type").and_then(|t| t.as_str()) != Some("content_block_delta") {
            return StreamEvent::Ignore;
        }
        let delta = parsed.get("delta");
        if delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) != Some("text_delta") {
            // `thinking` deltas are intentionally not surfaced to the client.
            return StreamEvent::Ignore;
        }
        match delta.and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
            Some(text) if !text.is_empty() => StreamEvent::Delta(text.to_string()),
            _ => StreamEvent::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_mode_adds_thinking_budget_and_beta_header() {
        let adapter = AnthropicAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "hi",
            image_base64: None,
            max_tokens: 4000,
            smart_mode: true,
        };
        let req = adapter.build_request("https://api.anthropic.com/v1/messages", "claude-3-7-sonnet-20250219", "sk-ant", &params);
        assert_eq!(req.body["thinking"]["budget_tokens"], 8000);
        assert!(req.headers.iter().any(|(k, v)| k == "anthropic-beta" && v == INTERLEAVED_THINKING_BETA));
    }

    #[test]
    fn thinking_budget_caps_at_10000() {
        let adapter = AnthropicAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "hi",
            image_base64: None,
            max_tokens: 8000,
            smart_mode: true,
        };
        let req = adapter.build_request("https://api.anthropic.com/v1/messages", "claude-3-7-sonnet-20250219", "sk-ant", &params);
        assert_eq!(req.body["thinking"]["budget_tokens"], 10000);
    }

    #[test]
    fn standard_mode_omits_thinking_and_beta_header() {
        let adapter = AnthropicAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "hi",
            image_base64: None,
            max_tokens: 1024,
            smart_mode: false,
        };
        let req = adapter.build_request("https://api.anthropic.com/v1/messages", "claude-3-5-sonnet-20241022", "sk-ant", &params);
        assert!(req.body.get("thinking").is_none());
        assert!(!req.headers.iter().any(|(k, _)| k == "anthropic-beta"));
    }

    #[test]
    fn ignores_thinking_deltas() {
        let adapter = AnthropicAdapter;
        let frame = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"reasoning...\"}}";
        assert!(matches!(adapter.parse_stream_event(frame), StreamEvent::Ignore));
    }

    #[test]
    fn surfaces_text_deltas() {
        let adapter = AnthropicAdapter;
        let frame = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}";
        match adapter.parse_stream_event(frame) {
            StreamEvent::Delta(text) => assert_eq!(text, "hi"),
            _ => panic!("expected delta"),
        }
    }
}
