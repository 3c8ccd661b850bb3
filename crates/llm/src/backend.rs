//! Chat completion backends
//!
//! [`OpenAIBackend`] talks to anything exposing `POST {endpoint}/chat/completions`:
//! the hosted API as well as local servers such as vLLM or Ollama's `/v1`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use room_assistant_config::LlmSettings;
use room_assistant_core::Message;
use tokio::sync::mpsc;

use crate::LlmError;

/// One finished reply plus timing, for logs
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Completion tokens as reported by the server, or deltas seen when streaming
    pub tokens: usize,
    /// Latency until the first text arrived; equals `elapsed_ms` when not streaming
    pub first_token_ms: u64,
    pub elapsed_ms: u64,
    pub finish_reason: FinishReason,
}

/// Why the model stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    #[default]
    Stop,
    /// Hit `max_tokens`
    Length,
    ContentFilter,
}

impl FinishReason {
    fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => Self::Length,
            Some("content_filter") => Self::ContentFilter,
            _ => Self::Stop,
        }
    }
}

/// A chat model the responders can call
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError>;

    /// Like [`generate`](LlmBackend::generate), forwarding each text delta on
    /// `tx` as it arrives. Generation continues if the receiver goes away.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<Completion, LlmError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    /// May be empty for loopback endpoints
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Whole-request timeout, streaming included
    pub timeout: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        LlmSettings::default().into()
    }
}

impl From<&LlmSettings> for OpenAIConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

impl From<LlmSettings> for OpenAIConfig {
    fn from(settings: LlmSettings) -> Self {
        Self::from(&settings)
    }
}

pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    /// Builds the HTTP client. A key is mandatory unless the endpoint is on
    /// the loopback interface.
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        if config.api_key.is_empty() {
            if !is_loopback(&config.endpoint) {
                return Err(LlmError::Configuration(format!(
                    "an API key is required for {}",
                    config.endpoint
                )));
            }
        } else {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|_| LlmError::Configuration("API key is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn request<'a>(&'a self, messages: &'a [Message], stream: bool) -> wire::Request<'a> {
        wire::Request {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| wire::Turn {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        }
    }

    async fn post(&self, request: &wire::Request<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.url("chat/completions"))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::Api(format!("{} from {}: {}", status, self.config.model, body)))
    }
}

fn is_loopback(endpoint: &str) -> bool {
    ["http://localhost", "http://127.0.0.1", "http://[::1]"]
        .iter()
        .any(|prefix| endpoint.starts_with(prefix))
}

fn millis_since(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        let start = Instant::now();
        let body: wire::Response = self
            .post(&self.request(messages, false))
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".into()))?;
        let elapsed_ms = millis_since(start);
        let tokens = body.usage.map_or(0, |u| u.completion_tokens);

        tracing::debug!(model = %self.config.model, tokens, elapsed_ms, "Completion received");

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tokens,
            first_token_ms: elapsed_ms,
            elapsed_ms,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<Completion, LlmError> {
        let start = Instant::now();
        let mut bytes = self.post(&self.request(messages, true)).await?.bytes_stream();

        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        let mut deltas = 0;
        let mut first_token_ms = None;
        let mut finish_reason = FinishReason::default();

        while let Some(chunk) = bytes.next().await {
            for event in decoder.feed(&chunk?) {
                match event {
                    StreamEvent::Text(delta) => {
                        first_token_ms.get_or_insert_with(|| millis_since(start));
                        deltas += 1;
                        text.push_str(&delta);
                        // A dropped receiver only means nobody is listening any more.
                        let _ = tx.send(delta).await;
                    }
                    StreamEvent::Finished(reason) => finish_reason = reason,
                    StreamEvent::Failed(message) => {
                        tracing::warn!(model = %self.config.model, error = %message, "Stream aborted by server");
                        return Err(LlmError::Api(format!(
                            "{} failed mid-stream: {}",
                            self.config.model, message
                        )));
                    }
                    StreamEvent::Done => {}
                }
            }
        }

        let elapsed_ms = millis_since(start);
        let first_token_ms = first_token_ms.unwrap_or(elapsed_ms);
        tracing::debug!(
            model = %self.config.model,
            deltas,
            first_token_ms,
            elapsed_ms,
            "Streamed completion finished"
        );

        Ok(Completion {
            text,
            tokens: deltas,
            first_token_ms,
            elapsed_ms,
            finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StreamEvent {
    Text(String),
    Finished(FinishReason),
    /// Server reported an error inside an already accepted stream
    Failed(String),
    Done,
}

/// Splits a `text/event-stream` body into events
///
/// Holds undecoded bytes until a newline arrives, so a UTF-8 sequence cut
/// between two network reads is never mangled.
#[derive(Default)]
struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            decode_line(String::from_utf8_lossy(&line).trim(), &mut events);
        }
        events
    }
}

fn decode_line(line: &str, events: &mut Vec<StreamEvent>) {
    // Comments, `event:` and `id:` fields carry nothing we use.
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return;
    };
    if payload == "[DONE]" {
        events.push(StreamEvent::Done);
        return;
    }

    let chunk = match serde_json::from_str::<wire::Chunk>(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::trace!(error = %e, payload, "Ignoring undecodable stream line");
            return;
        }
    };
    if let Some(error) = chunk.error {
        events.push(StreamEvent::Failed(error.into_message()));
        return;
    }
    let Some(choice) = chunk.choices.into_iter().next() else {
        return;
    };
    if let Some(content) = choice.delta.and_then(|d| d.content).filter(|c| !c.is_empty()) {
        events.push(StreamEvent::Text(content));
    }
    if let Some(reason) = choice.finish_reason {
        events.push(StreamEvent::Finished(FinishReason::parse(Some(&reason))));
    }
}

/// Request and response bodies of the chat completions endpoint
mod wire {
    use room_assistant_core::Role;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub struct Request<'a> {
        pub model: &'a str,
        pub messages: Vec<Turn<'a>>,
        pub max_tokens: usize,
        pub temperature: f32,
        pub stream: bool,
    }

    #[derive(Serialize)]
    pub struct Turn<'a> {
        pub role: Role,
        pub content: &'a str,
    }

    #[derive(Deserialize)]
    pub struct Response {
        pub choices: Vec<Choice>,
        pub usage: Option<Usage>,
    }

    #[derive(Deserialize)]
    pub struct Choice {
        pub message: Reply,
        pub finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct Reply {
        pub content: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct Usage {
        pub completion_tokens: usize,
    }

    #[derive(Deserialize)]
    pub struct Chunk {
        #[serde(default)]
        pub choices: Vec<ChunkChoice>,
        pub error: Option<ApiError>,
    }

    /// `{"error": {"message": ..}}` from OpenAI, a bare string from some
    /// compatible servers
    #[derive(Deserialize)]
    #[serde(untagged)]
    pub enum ApiError {
        Detailed { message: String },
        Plain(String),
    }

    impl ApiError {
        pub fn into_message(self) -> String {
            match self {
                Self::Detailed { message } | Self::Plain(message) => message,
            }
        }
    }

    #[derive(Deserialize)]
    pub struct ChunkChoice {
        pub delta: Option<Delta>,
        pub finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    pub struct Delta {
        pub content: Option<String>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, key: &str) -> OpenAIConfig {
        OpenAIConfig {
            endpoint: endpoint.to_string(),
            api_key: key.to_string(),
            ..OpenAIConfig::default()
        }
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings {
            model: "gpt-4o".to_string(),
            timeout_secs: 5,
            ..LlmSettings::default()
        };
        let config = OpenAIConfig::from(&settings);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_key_required_off_loopback() {
        assert!(OpenAIBackend::new(config("http://localhost:8000/v1", "")).is_ok());
        assert!(OpenAIBackend::new(config("http://127.0.0.1:11434/v1", "")).is_ok());
        assert!(matches!(
            OpenAIBackend::new(config("https://api.openai.com/v1", "")),
            Err(LlmError::Configuration(_))
        ));
        assert!(OpenAIBackend::new(config("https://api.openai.com/v1", "sk-test")).is_ok());
    }

    #[test]
    fn test_key_with_newline_is_rejected() {
        assert!(matches!(
            OpenAIBackend::new(config("https://api.openai.com/v1", "sk\ntest")),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_url_ignores_trailing_slash() {
        let backend = OpenAIBackend::new(config("http://localhost:11434/v1/", "")).unwrap();
        assert_eq!(
            backend.url("chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body() {
        let mut cfg = config("https://api.openai.com/v1", "sk-test");
        cfg.model = "gpt-4o-mini".to_string();
        let backend = OpenAIBackend::new(cfg).unwrap();
        let messages = [Message::system("Be brief."), Message::user("Hello")];

        let json = serde_json::to_value(backend.request(&messages, true)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_decoder_emits_text_finish_and_done() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"there\"},\"finish_reason\":\"length\"}]}\n\
              data: [DONE]\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hi ".to_string()),
                StreamEvent::Text("there".to_string()),
                StreamEvent::Finished(FinishReason::Length),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_decoder_waits_for_complete_line() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café ☕\"}}]}\n".as_bytes();
        // Cut inside the multi-byte coffee cup.
        let cut = line.len() - 8;
        let (head, tail) = line.split_at(cut);

        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail), vec![StreamEvent::Text("café ☕".to_string())]);
    }

    #[test]
    fn test_decoder_skips_comments_and_garbage() {
        let mut decoder = SseDecoder::default();
        assert!(decoder
            .feed(b": keep-alive\nevent: ping\ndata: not-json\ndata: {\"choices\":[]}\n")
            .is_empty());
    }

    #[test]
    fn test_decoder_reports_error_payloads() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(
            b"data: {\"error\":{\"message\":\"model overloaded\",\"type\":\"server_error\"}}\n\
              data: {\"error\":\"upstream timeout\"}\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Failed("model overloaded".to_string()),
                StreamEvent::Failed("upstream timeout".to_string()),
            ]
        );
    }

    /// Answers one request with `body` as an event stream, returns the endpoint
    async fn serve_once(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://127.0.0.1:{}/v1", port)
    }

    #[tokio::test]
    async fn test_stream_collects_deltas() {
        let endpoint = serve_once(
            "data: {\"choices\":[{\"delta\":{\"content\":\"We open \"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"at nine.\"},\"finish_reason\":\"stop\"}]}\n\n\
             data: [DONE]\n\n",
        )
        .await;
        let backend = OpenAIBackend::new(config(&endpoint, "")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let completion = backend
            .generate_stream(&[Message::user("When do you open?")], tx)
            .await
            .unwrap();
        assert_eq!(completion.text, "We open at nine.");
        assert_eq!(completion.tokens, 2);
        assert_eq!(rx.recv().await.as_deref(), Some("We open "));
    }

    #[tokio::test]
    async fn test_stream_error_payload_fails_the_turn() {
        let endpoint = serve_once(
            "data: {\"choices\":[{\"delta\":{\"content\":\"We \"}}]}\n\n\
             data: {\"error\":{\"message\":\"model overloaded\"}}\n\n",
        )
        .await;
        let backend = OpenAIBackend::new(config(&endpoint, "")).unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let err = backend
            .generate_stream(&[Message::user("When do you open?")], tx)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api(ref message) if message.contains("model overloaded")));
    }

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse(Some("length")), FinishReason::Length);
        assert_eq!(FinishReason::parse(Some("content_filter")), FinishReason::ContentFilter);
        assert_eq!(FinishReason::parse(None), FinishReason::Stop);
    }
}
