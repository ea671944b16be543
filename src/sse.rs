//! Shared SSE line framing: buffering partial reads across
//! `bytes_stream()` chunks, splitting on `\n`, stripping the `data: `
//! prefix, and recognizing the `[DONE]` terminator. Reused by every
//! provider adapter and by the cascade orchestrator's outbound stream.

/// Drain complete `\n`-terminated lines out of `buffer`, appending `chunk`
/// first. Any trailing partial line is left in `buffer` for the next call.
pub fn drain_sse_lines(buffer: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    if !chunk.is_empty() {
        buffer.extend_from_slice(chunk);
    }

    let mut lines = Vec::new();
    loop {
        let Some(pos) = buffer.iter().position(|&b| b == b'\n') else {
            break;
        };
        let mut line = buffer.drain(..=pos).collect::<Vec<u8>>();
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(String::from_utf8_lossy(&line).to_string());
    }
    lines
}

pub fn parse_sse_data(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

pub fn is_sse_done(data: &str) -> bool {
    data.trim() == "[DONE]"
}

/// Build one outbound `data: <json>\n\n` event carrying a text delta.
pub fn content_frame(delta: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "content": delta }))
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_lines_split_across_chunks() {
        let mut buf = Vec::new();
        let lines_a = drain_sse_lines(&mut buf, b"data: hel");
        assert!(lines_a.is_empty());
        let lines_b = drain_sse_lines(&mut buf, b"lo\ndata: world\n");
        assert_eq!(lines_b, vec!["data: hello".to_string(), "data: world".to_string()]);
    }

    #[test]
    fn recognizes_done_terminator() {
        assert!(is_sse_done(parse_sse_data("data: [DONE]").unwrap()));
        assert!(!is_sse_done(parse_sse_data("data: {\"x\":1}").unwrap()));
    }

    #[test]
    fn content_frame_shape() {
        let frame = content_frame("hi");
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"content\":\"hi\""));
    }
}
