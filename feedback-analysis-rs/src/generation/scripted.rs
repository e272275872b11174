// feedback-analysis-rs/src/generation/scripted.rs
// Deterministic in-process transport for tests and offline runs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use super::{ChunkStream, GenerationError, GenerationRequest, GenerationTransport};
use crate::credentials::Credential;

const CHUNK_CHARS: usize = 64;

/// Canned outcome for one call
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// Stream these pieces, in order
    Chunks(Vec<String>),
    /// Fail before any chunk is produced
    Fail(GenerationError),
    /// Never answer; only a timeout or cancellation ends the call
    Hang,
}

impl ScriptedReply {
    /// Stream `text` in fixed-size pieces
    pub fn text(text: impl AsRef<str>) -> Self {
        let chars: Vec<char> = text.as_ref().chars().collect();
        ScriptedReply::Chunks(
            chars
                .chunks(CHUNK_CHARS)
                .map(|piece| piece.iter().collect())
                .collect(),
        )
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(value.to_string())
    }
}

/// What a scripted call received
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub credential: String,
    pub prompt: String,
    pub schema_mode: bool,
}

/// Replies are queued separately for free-text and schema requests. Once a
/// queue is down to its last reply, that reply repeats.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    free_text: Mutex<VecDeque<ScriptedReply>>,
    schema: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_free_text(self, reply: ScriptedReply) -> Self {
        push(&self.free_text, reply);
        self
    }

    pub fn on_schema(self, reply: ScriptedReply) -> Self {
        push(&self.schema, reply);
        self
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        match self.recorded.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn schema_calls(&self) -> usize {
        self.recorded().iter().filter(|c| c.schema_mode).count()
    }

    pub fn free_text_calls(&self) -> usize {
        self.recorded().iter().filter(|c| !c.schema_mode).count()
    }
}

fn push(queue: &Mutex<VecDeque<ScriptedReply>>, reply: ScriptedReply) {
    match queue.lock() {
        Ok(mut guard) => guard.push_back(reply),
        Err(poisoned) => poisoned.into_inner().push_back(reply),
    }
}

fn take(queue: &Mutex<VecDeque<ScriptedReply>>) -> Option<ScriptedReply> {
    let mut guard = match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if guard.len() > 1 {
        guard.pop_front()
    } else {
        guard.front().cloned()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let schema_mode = request.mode.is_schema();
        {
            let call = RecordedCall {
                credential: credential.expose().to_string(),
                prompt: request.prompt.clone(),
                schema_mode,
            };
            match self.recorded.lock() {
                Ok(mut guard) => guard.push(call),
                Err(poisoned) => poisoned.into_inner().push(call),
            }
        }

        let queue = if schema_mode { &self.schema } else { &self.free_text };
        match take(queue) {
            Some(ScriptedReply::Chunks(pieces)) => {
                Ok(Box::pin(stream::iter(pieces.into_iter().map(Ok))))
            }
            Some(ScriptedReply::Fail(err)) => Err(err),
            Some(ScriptedReply::Hang) => futures::future::pending().await,
            None => Err(GenerationError::Transport("no scripted reply queued".to_string())),
        }
    }
}
