use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            "sending LLM request"
        );
        tracing::debug!(body = %sanitize_for_log(&body), "request body (sanitized, base64 omitted)");

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            let json: serde_json::Value = response.json().await?;
            let resp = parse_json_response(&json)?;
            tracing::info!(provider = %self.id, content_len = resp.content.len(), "LLM JSON response received");
            Ok(resp)
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Consumes the SSE body and accumulates the full reply.
    async fn handle_stream(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.push(&bytes) {
                break;
            }
        }
        let resp = acc.finish();

        tracing::info!(
            provider = %self.id,
            content_len = resp.content.len(),
            reasoning_len = resp.reasoning.len(),
            "LLM stream complete"
        );
        Ok(resp)
    }
}

/// Line-buffered SSE reader. Bytes are buffered until a newline so
/// multi-byte characters split across network chunks survive.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning: String,
    done: bool,
}

impl StreamAccumulator {
    /// Feeds raw bytes; returns true once the stream signalled completion.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if self.done {
                break;
            }
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.line_buf).trim().to_string();
                self.line_buf.clear();
                self.handle_line(&line);
            } else {
                self.line_buf.push(b);
            }
        }
        self.done
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        match sse_parser::parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.content.push_str(&chunk.content),
                StreamChunkKind::Done => self.done = true,
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
    }

    /// Flushes an unterminated last line; a stream ending without `[DONE]` is accepted.
    pub(crate) fn finish(mut self) -> LlmResponse {
        if !self.done && !self.line_buf.is_empty() {
            let line = String::from_utf8_lossy(&self.line_buf).trim().to_string();
            self.handle_line(&line);
        }
        LlmResponse {
            content: self.content,
            reasoning: self.reasoning,
        }
    }
}

/// Extracts the reply from a non-streaming completion. Content given as an
/// array of text parts is joined.
pub(crate) fn parse_json_response(json: &serde_json::Value) -> DeskPilotResult<LlmResponse> {
    if let Some(err) = json.get("error") {
        return Err(DeskPilotError::LlmProvider(format!("provider returned an error: {err}")));
    }
    let message = &json["choices"][0]["message"];
    if message.is_null() {
        return Err(DeskPilotError::LlmProvider("response has no choices".into()));
    }

    let content = match &message["content"] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };
    let reasoning = message["reasoning_content"].as_str().unwrap_or_default().to_string();
    Ok(LlmResponse { content, reasoning })
}

/// Copy of the request body with image payloads replaced, for logging only.
fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_content_across_chunks() {
        let mut acc = StreamAccumulator::default();
        let part1 = "data: {\"choices\":[{\"delta\":{\"content\":\"mouse_click(x=0.5, \"}}]}\n\ndata: {\"choices\":[{\"del";
        let part2 = "ta\":{\"content\":\"y=0.5)\"}}]}\n: keep-alive\ndata: [DONE]\n";
        assert!(!acc.push(part1.as_bytes()));
        assert!(acc.push(part2.as_bytes()));
        assert_eq!(acc.finish().content, "mouse_click(x=0.5, y=0.5)");
    }

    #[test]
    fn multibyte_text_split_between_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"请输入验证码\"}}]}\n".as_bytes();
        let (a, b) = line.split_at(40);
        let mut acc = StreamAccumulator::default();
        acc.push(a);
        acc.push(b);
        assert_eq!(acc.finish().content, "请输入验证码");
    }

    #[test]
    fn stream_without_done_marker_keeps_last_line() {
        let mut acc = StreamAccumulator::default();
        acc.push(b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"think\"}}]}\n");
        acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}");
        let resp = acc.finish();
        assert_eq!(resp.reasoning, "think");
        assert_eq!(resp.content, "ok");
    }

    #[test]
    fn json_reply_content() {
        let json = serde_json::json!({ "choices": [{ "message": { "content": "wait(seconds=1)" } }] });
        assert_eq!(parse_json_response(&json).unwrap().content, "wait(seconds=1)");

        let parts = serde_json::json!({ "choices": [{ "message": { "content": [{"type":"text","text":"a"},{"type":"text","text":"b"}] } }] });
        assert_eq!(parse_json_response(&parts).unwrap().content, "ab");
    }

    #[test]
    fn json_error_body_is_a_provider_error() {
        let json = serde_json::json!({ "error": { "message": "quota exceeded" } });
        assert!(matches!(parse_json_response(&json), Err(DeskPilotError::LlmProvider(_))));
        assert!(parse_json_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn log_body_omits_images() {
        let body = serde_json::json!({
            "messages": [ChatMessage::user_with_image("screen", "data:image/png;base64,QUJD")]
        });
        let logged = sanitize_for_log(&body);
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(!logged.contains("QUJD"));
    }
}
