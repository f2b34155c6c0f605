// src/generation/mod.rs
// THE STREAM PRODUCER
// Anything that turns a prompt into a stream of text chunks. Chunks carry no
// alignment guarantee: a line or even a character may straddle two of them.

pub mod decode;
pub mod gemini;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::FocusError;

pub use gemini::GeminiGenerator;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, FocusError>> + Send>>;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[async_trait]
pub trait TranscriptGenerator: Send + Sync {
    /// Cheap pre-flight check run before a session enters `Streaming`.
    fn ensure_ready(&self) -> Result<(), FocusError> {
        Ok(())
    }

    async fn start_generation(&self, request: GenerationRequest) -> Result<ChunkStream, FocusError>;
}
