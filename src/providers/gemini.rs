//! Gemini `generateContent` adapter. Grounded on the inherited
//! `GeminiHandler`, trimmed to the single-provider contract. Gemini passes
//! its API key as a URL query parameter rather than a header.

use serde_json::{json, Value};

use super::{BuildRequestParams, HttpRequestSpec, ProviderAdapter, StreamEvent};
use crate::sse::parse_sse_data;

pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn build_request(&self, base_url: &str, model: &str, api_key: &str, params: &BuildRequestParams) -> HttpRequestSpec {
        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse&key={}",
            base_url.trim_end_matches('/'),
            model,
            api_key
        );

        let mut parts = vec![json!({ "text": format!("{}\n\n{}", params.system_prompt, params.user_message) })];
        if let Some(b64) = params.image_base64 {
            parts.push(json!({ "inline_data": { "mime_type": "image/jpeg", "data": b64 } }));
        }

        let body = json!({
            "contents": [ { "role": "user", "parts": parts } ],
            "generationConfig": { "maxOutputTokens": params.max_tokens, "temperature": 0.7 },
        });

        HttpRequestSpec {
            url,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
        }
    }

    fn parse_stream_event(&self, raw_frame: &str) -> StreamEvent {
        let Some(data) = parse_sse_data(raw_frame) else {
            return StreamEvent::Ignore;
        };
        let Ok(parsed) = serde_json::from_str::<Value>(data) else {
            return StreamEvent::Ignore;
        };
        match parsed
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
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
    fn url_carries_api_key_as_query_param() {
        let adapter = GeminiAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "hi",
            image_base64: None,
            max_tokens: 100,
            smart_mode: false,
        };
        let req = adapter.build_request("https://generativelanguage.googleapis.com/v1beta/models", "gemini-1.5-pro", "AIzaSY", &params);
        assert_eq!(
            req.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse&key=AIzaSY"
        );
    }

    #[test]
    fn vision_adds_inline_data_part() {
        let adapter = GeminiAdapter;
        let params = BuildRequestParams {
            system_prompt: "sys",
            user_message: "hi",
            image_base64: Some("b64data"),
            max_tokens: 100,
            smart_mode: false,
        };
        let req = adapter.build_request("https://generativelanguage.googleapis.com/v1beta/models", "gemini-1.5-pro", "key", &params);
        let parts = &req.body["contents"][0]["parts"];
        assert_eq!(parts[1]["inline_data"]["data"], "b64data");
    }

    #[test]
    fn parses_candidate_text_delta() {
        let adapter = GeminiAdapter;
        let frame = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hi\"}]}}]}";
        match adapter.parse_stream_event(frame) {
            StreamEvent::Delta(text) => assert_eq!(text, "hi"),
            _ => panic!("expected delta"),
        }
    }
}
