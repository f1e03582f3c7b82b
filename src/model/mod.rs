use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A single question/answer exchange within a conversation.
///
/// Turns are immutable once recorded; sessions only ever append them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

impl ChatTurn {
    #[inline]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Maps text to a fixed-dimension dense vector.
///
/// Implementations must be deterministic for a given model configuration. An
/// index built with one embedder must only ever be searched with the same
/// embedder: there is no runtime validation, and mismatched models silently
/// produce meaningless similarity scores.
pub trait Embedder {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order. The result has exactly one
    /// vector per input text.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces text from a prompt via a generative model.
pub trait GenerativeModel {
    /// Generate a response to `user_text`, conditioned on a system instruction
    /// and the prior conversation turns.
    fn generate(&self, system_prompt: &str, history: &[ChatTurn], user_text: &str)
    -> Result<String>;
}
