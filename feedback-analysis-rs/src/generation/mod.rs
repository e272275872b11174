// feedback-analysis-rs/src/generation/mod.rs
// Single-call abstraction over the upstream generation service
//
// Features:
// - Free-text and schema-constrained JSON response modes
// - Typed transport errors with a closed failure classification
// - Lazy chunk stream from the transport, concatenated by the client

pub mod gemini;
pub mod scripted;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use error_handling_rs::FailureClass;
use futures::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::credentials::Credential;

pub use gemini::GeminiTransport;
pub use scripted::{RecordedCall, ScriptedReply, ScriptedTransport};

/// Transport failure messages that indicate a connectivity problem.
/// Only consulted for errors the transport could not type.
pub const NETWORK_ERROR_PATTERNS: &[&str] = &[
    "fetch failed",
    "network error",
    "connection failed",
    "connection reset",
    "timeout",
    "timed out",
    "econnrefused",
    "econnreset",
    "enotfound",
    "etimedout",
    "socket hang up",
    "dns error",
];

/// Classify an untyped transport error message
pub fn classify_transport_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if NETWORK_ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureClass::Network
    } else {
        FailureClass::Upstream
    }
}

/// Shape of the response the generator is asked for
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    FreeText,
    /// JSON constrained by the given response schema
    SchemaJson(Arc<Value>),
}

impl GenerationMode {
    pub fn is_schema(&self) -> bool {
        matches!(self, GenerationMode::SchemaJson(_))
    }
}

/// How much internal reasoning the generator may spend before answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningBudget {
    Unlimited,
    Disabled,
    Tokens(u32),
}

impl ReasoningBudget {
    /// Negative means unlimited, zero disables reasoning
    pub fn from_i64(value: i64) -> Self {
        match value {
            v if v < 0 => ReasoningBudget::Unlimited,
            0 => ReasoningBudget::Disabled,
            v => ReasoningBudget::Tokens(u32::try_from(v).unwrap_or(u32::MAX)),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            ReasoningBudget::Unlimited => -1,
            ReasoningBudget::Disabled => 0,
            ReasoningBudget::Tokens(n) => i64::from(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub reasoning: ReasoningBudget,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 32_768,
            reasoning: ReasoningBudget::Unlimited,
        }
    }
}

/// Everything the transport needs for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub mode: GenerationMode,
    pub params: GenerationParams,
}

/// Errors at the generation service boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("upstream server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("response stream interrupted: {0}")]
    Stream(String),

    #[error("no response text received from the generation service")]
    EmptyResponse,

    /// Untyped failure text from the transport
    #[error("transport error: {0}")]
    Transport(String),
}

impl GenerationError {
    /// Map an HTTP status from the upstream service
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => GenerationError::RateLimited { status, message },
            500..=599 => GenerationError::Server { status, message },
            _ => GenerationError::Rejected { status, message },
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            GenerationError::Timeout(_)
            | GenerationError::Connection(_)
            | GenerationError::RateLimited { .. }
            | GenerationError::Server { .. }
            | GenerationError::Stream(_)
            | GenerationError::EmptyResponse => FailureClass::Network,
            // A revoked or unauthorised key is cured by moving to the next one
            GenerationError::Rejected { status: 401 | 403, .. } => FailureClass::Network,
            GenerationError::Rejected { .. } | GenerationError::Blocked(_) => FailureClass::Upstream,
            GenerationError::Transport(message) => classify_transport_message(message),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout(err.to_string())
        } else if err.is_connect() {
            GenerationError::Connection(err.to_string())
        } else if err.is_body() || err.is_decode() {
            GenerationError::Stream(err.to_string())
        } else if let Some(status) = err.status() {
            GenerationError::from_status(status.as_u16(), err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Lazy, finite, non-restartable sequence of response text pieces
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Issues one request upstream and exposes the streamed response
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open_stream(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, GenerationError>;
}

/// Assembles streamed responses into complete text
#[derive(Clone)]
pub struct GenerationClient {
    transport: Arc<dyn GenerationTransport>,
}

impl fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationClient").finish_non_exhaustive()
    }
}

impl GenerationClient {
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self { transport }
    }

    /// Generate a complete response for `prompt`
    ///
    /// Consumes the whole chunk stream; any chunk error aborts the call.
    ///
    /// # Errors
    /// `GenerationError::EmptyResponse` if the joined text is blank
    pub async fn generate(
        &self,
        credential: &Credential,
        prompt: &str,
        mode: GenerationMode,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            mode,
            params: *params,
        };

        let mut stream = self.transport.open_stream(credential, &request).await?;
        let mut text = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
            chunks += 1;
        }

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        debug!(
            chunks,
            chars = text.chars().count(),
            schema = request.mode.is_schema(),
            "Assembled streamed response"
        );
        Ok(text)
    }
}
