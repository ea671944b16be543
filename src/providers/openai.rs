//! OpenAI-compatible adapter (OpenAI and Grok). Grounded on the inherited
//! `OpenAIHandler`'s URL/header building and SSE parsing, trimmed to the
//! single-provider contract — no cross-provider translation.

use serde_json::{json, Value};

use super::{BuildRequestParams, HttpRequestSpec, ProviderAdapter, StreamEvent};
use crate::sse::{is_sse_done, parse_sse_data};

pub struct OpenAiAdapter;

/// Model families that take `max_completion_tokens` instead of `max_tokens`.
fn uses_max_completion_tokens(model: &str) -> bool {
    model.starts_with("gpt-5") || model.starts_with("gpt-4.1") || model.starts_with("o4-") || model.starts_with("o1-")
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn build_request(&self, base_url: &str, model: &str, api_key: &str, params: &BuildRequestParams) -> HttpRequestSpec {
        let user_content = match params.image_base64 {
            Some(b64) => json!([
                { "type": "text", "text": params.user_message },
                { "type": "image_url", "image_url": { "url": format!("data:image/jpeg;base64,{b64}") } }
            ]),
            None => json!(params.user_message),
        };

        let mut body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": params.system_prompt },
                { "role": "user", "content": user_content }
            ],
            "temperature": 0.7,
            "stream": true,
        });

        let tokens_key = if uses_max_completion_tokens(model) { "max_completion_tokens" } else { "max_tokens" };
        body.as_object_mut()
            .unwrap()
            .insert(tokens_key.to_string(), json!(params.max_tokens));

        HttpRequestSpec {
            url: base_url.to_string(),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {api_key}")),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body,
        }
    }

    fn parse_stream_event(&self, raw_frame: &str) -> StreamEvent {
        let Some(data) = parse_sse_data(raw_frame) else {
            return StreamEvent::Ignore;
        };
        if is_sse_done(data) {
            return StreamEvent::Done;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(data) else {
            return StreamEvent::Ignore;
        };
        match parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
        {
            Some(text) if !text.is_empty() => StreamEvent::Delta(text.to_string()),
            _ => StreamEvent::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt_4_1_uses_max_completion_tokens() {
        assert!(uses_max_completion_tokens("gpt-4.1"));
        assert!(uses_max_completion_tokens("o1-preview"));
        assert!(!uses_max_completion_tokens("gpt-4o"));
    }

    #[test]
    fn grok_never_uses_max_completion_tokens() {
        assert!(!uses_max_completion_tokens("grok-2-latest"));
    }

    #[test]
    fn parses_content_delta() {
        let adapter = OpenAiAdapter;
        let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}";
        match adapter.parse_stream_event(frame) {
            StreamEvent::Delta(text) => assert_eq!(text, "hi"),
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn recognizes_done() {
        let adapter = OpenAiAdapter;
        assert!(matches!(adapter.parse_stream_event("data: [DONE]"), StreamEvent::Done));
    }

    #[test]
    fn vision_body_includes_image_url() {
        let adapter = OpenAiAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "what is this",
            image_base64: Some("abc123"),
            max_tokens: 100,
            smart_mode: false,
        };
        let req = adapter.build_request("https://api.openai.com/v1/chat/completions", "gpt-4o", "sk-x", &params);
        let content = &req.body["messages"][1]["content"];
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,abc123");
    }
}
