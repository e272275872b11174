// feedback-analysis-rs/src/generation/gemini.rs
// Streaming transport for the Gemini generateContent REST API

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChunkStream, GenerationError, GenerationMode, GenerationRequest, GenerationTransport};
use crate::credentials::Credential;
use crate::error::ConfigurationError;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Posts to `{base}/models/{model}:streamGenerateContent?alt=sse`
///
/// No overall request timeout is configured here; the caller's per-attempt
/// ceiling owns the deadline and dropping the stream aborts the request.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiTransport {
    pub fn new(base_url: &str, model: &str) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

/// JSON body for one request
pub fn request_body(request: &GenerationRequest) -> Value {
    let mut config = json!({
        "temperature": request.params.temperature,
        "maxOutputTokens": request.params.max_output_tokens,
        "responseMimeType": "text/plain",
        "thinkingConfig": {
            "thinkingBudget": request.params.reasoning.as_i64(),
        },
    });

    if let GenerationMode::SchemaJson(schema) = &request.mode {
        config["responseMimeType"] = json!("application/json");
        config["responseSchema"] = schema.as_ref().clone();
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }],
        "generationConfig": config,
    })
}

#[async_trait]
impl GenerationTransport for GeminiTransport {
    async fn open_stream(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, GenerationError> {
        debug!(
            model = %self.model,
            prompt_chars = request.prompt.chars().count(),
            schema = request.mode.is_schema(),
            "Sending generation request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", credential.expose())
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(
                status.as_u16(),
                extract_error_message(&body),
            ));
        }

        Ok(sse_chunks(response.bytes_stream()))
    }
}

/// Pull the human-readable message out of an error body
fn extract_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| match v {
        Value::Array(items) => items.first().and_then(|first| first.get("error")),
        other => other.get("error"),
    });

    match error.and_then(|e| e.get("message")).and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => body.chars().take(300).collect(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

/// Text carried by one `data:` payload, if any
fn parse_event(payload: &str) -> Result<Option<String>, GenerationError> {
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|e| GenerationError::Stream(format!("undecodable event: {}", e)))?;

    if let Some(err) = event.error {
        return Err(GenerationError::from_status(err.code, err.message));
    }
    if let Some(reason) = event.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Blocked(reason));
    }

    let mut text = String::new();
    if let Some(candidate) = event.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts.into_iter().filter(|p| !p.thought) {
                if let Some(piece) = part.text {
                    text.push_str(&piece);
                }
            }
        }
        match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => warn!("Generation stopped at the output token ceiling"),
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "RECITATION")) => {
                return Err(GenerationError::Blocked(reason.to_string()));
            }
            _ => {}
        }
    }

    Ok((!text.is_empty()).then_some(text))
}

struct SseDecoder<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    data: Vec<String>,
    ready: VecDeque<Result<String, GenerationError>>,
    finished: bool,
}

impl<S> SseDecoder<S> {
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches(&['\n', '\r'][..]));
        }
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.trim_start().to_string());
        }
        // comments, event names and ids carry nothing we use
    }

    fn dispatch(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        if payload.trim() == "[DONE]" {
            return;
        }
        match parse_event(&payload) {
            Ok(Some(text)) => self.ready.push_back(Ok(text)),
            Ok(None) => {}
            Err(e) => {
                self.ready.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            self.line(rest.trim_end_matches(&['\n', '\r'][..]));
        }
        self.dispatch();
        self.finished = true;
    }
}

/// Decode a server-sent-event byte stream into text chunks
pub fn sse_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<GenerationError> + Send,
{
    let decoder = SseDecoder {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        data: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.ready.pop_front() {
                return Some((item, decoder));
            }
            if decoder.finished {
                return None;
            }
            match decoder.bytes.next().await {
                Some(Ok(chunk)) => decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    decoder.finished = true;
                    let err: GenerationError = e.into();
                    let err = match err {
                        GenerationError::Transport(message) => GenerationError::Stream(message),
                        other => other,
                    };
                    decoder.ready.push_back(Err(err));
                }
                None => decoder.finish(),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationParams, ReasoningBudget};
    use std::sync::Arc;

    fn byte_stream(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, GenerationError>> + Send {
        let items: Vec<Result<Vec<u8>, GenerationError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(items)
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<String, GenerationError>> {
        stream.collect().await
    }

    fn event(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
        )
    }

    #[test]
    fn test_request_body_schema_mode() {
        let request = GenerationRequest {
            prompt: "convert".to_string(),
            mode: GenerationMode::SchemaJson(Arc::new(json!({"type": "OBJECT"}))),
            params: GenerationParams {
                temperature: 0.5,
                max_output_tokens: 1024,
                reasoning: ReasoningBudget::Unlimited,
            },
        };

        let body = request_body(&request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "convert");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], -1);
    }

    #[test]
    fn test_request_body_free_text_has_no_schema() {
        let request = GenerationRequest {
            prompt: "describe".to_string(),
            mode: GenerationMode::FreeText,
            params: GenerationParams::default(),
        };

        let body = request_body(&request);
        assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[tokio::test]
    async fn test_sse_chunks_split_across_reads() {
        let first = event("Hello, ");
        let second = event("world");
        let joined = format!("{}{}", first, second);
        let (a, b) = joined.split_at(first.len() - 7);

        let items = collect(sse_chunks(byte_stream(&[a, b]))).await;
        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hello, ", "world"]);
    }

    #[tokio::test]
    async fn test_sse_skips_thought_parts_and_handles_unterminated_tail() {
        let payload = json!({"candidates": [{"content": {"parts": [
            {"text": "thinking...", "thought": true},
            {"text": "answer"}
        ]}}]});
        let body = format!("data: {}", payload);

        let items = collect(sse_chunks(byte_stream(&[&body]))).await;
        assert_eq!(items, vec![Ok("answer".to_string())]);
    }

    #[tokio::test]
    async fn test_sse_error_event_maps_status() {
        let body = format!(
            "{}data: {}\n\n",
            event("partial"),
            json!({"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}})
        );

        let items = collect(sse_chunks(byte_stream(&[&body]))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            Err(GenerationError::RateLimited {
                status: 429,
                message: "Resource exhausted".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sse_block_reason() {
        let body = format!(
            "data: {}\n\n",
            json!({"promptFeedback": {"blockReason": "SAFETY"}})
        );
        let items = collect(sse_chunks(byte_stream(&[&body]))).await;
        assert_eq!(items, vec![Err(GenerationError::Blocked("SAFETY".to_string()))]);
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"[{"error": {"code": 400, "message": "Invalid schema", "status": "INVALID_ARGUMENT"}}]"#;
        assert_eq!(extract_error_message(body), "Invalid schema");
        assert_eq!(extract_error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
    }

    #[test]
    fn test_endpoint() {
        let transport = GeminiTransport::new("https://example.test/v1beta/", "gemini-2.5-flash").unwrap();
        assert_eq!(
            transport.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
