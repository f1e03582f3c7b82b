#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::index::VectorIndex;
use crate::model::{ChatTurn, Embedder, GenerativeModel};

/// Returned verbatim when retrieval finds nothing relevant; the generative
/// model is not consulted in that case.
pub const FALLBACK_ANSWER: &str =
    "I am sorry, I don't have relevant information about your question.";

const REFORMULATE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can \
be understood without the chat history. Do NOT answer the question, just reformulate it if \
needed and otherwise return it as is.";

const ANSWER_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks. Use \
the pieces of retrieved context provided with the question to answer it. If you don't know \
the answer, just say that you don't know. If the context is irrelevant, just say that you \
don't know the answer. Use five sentences minimum and give detailed answers. Don't mention \
that you got the knowledge from the context.";

/// Retrieval cutoffs applied to every query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Maximum number of chunks fed to the model per question
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to count as relevant
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 4,
            score_threshold: 0.2,
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be greater than zero");
        }
        if !self.score_threshold.is_finite() || !(-1.0..=1.0).contains(&self.score_threshold) {
            bail!(
                "score_threshold must be a cosine similarity in [-1, 1], got {}",
                self.score_threshold
            );
        }
        Ok(())
    }
}

/// Ordered, append-only record of one conversation.
///
/// Turns are never mutated or evicted, so long-running sessions grow without
/// bound; callers that need bounded memory should start a fresh session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    #[inline]
    pub fn append(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatTurn::new(question, answer));
    }

    #[inline]
    pub fn history(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn into_turns(self) -> Vec<ChatTurn> {
        self.turns
    }
}

/// Answers questions over a loaded index, carrying conversation state across
/// turns.
///
/// All dependencies arrive through the constructor; one engine serves one
/// session, strictly sequentially. The index must have been built with the
/// same embedding model this engine queries with.
pub struct ChatEngine<E, G> {
    embedder: E,
    model: G,
    index: VectorIndex,
    retrieval: RetrievalConfig,
    session: ChatSession,
}

impl<E: Embedder, G: GenerativeModel> ChatEngine<E, G> {
    #[inline]
    pub fn new(embedder: E, model: G, index: VectorIndex, retrieval: RetrievalConfig) -> Self {
        Self {
            embedder,
            model,
            index,
            retrieval,
            session: ChatSession::new(),
        }
    }

    /// Seed the engine with prior turns, e.g. from a history file.
    #[inline]
    pub fn with_session(mut self, session: ChatSession) -> Self {
        self.session = session;
        self
    }

    #[inline]
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Rewrite `question` so it can be understood without the conversation
    /// history.
    ///
    /// With an empty history the question is already standalone, so it is
    /// returned unchanged without a model call. This keeps first-turn queries
    /// deterministic and saves a model round trip.
    #[inline]
    pub fn reformulate(&self, question: &str) -> Result<String> {
        if self.session.is_empty() {
            debug!("Empty history, passing question through unchanged");
            return Ok(question.to_string());
        }

        let standalone = self
            .model
            .generate(REFORMULATE_SYSTEM_PROMPT, self.session.history(), question)
            .context("Failed to reformulate question")?;

        debug!("Reformulated question: {}", standalone);
        Ok(standalone)
    }

    /// Retrieve the texts of the chunks most similar to `standalone_question`.
    ///
    /// Similarity scores are an internal retrieval signal and are dropped
    /// here; an empty result means nothing cleared the relevance threshold.
    #[inline]
    pub fn retrieve(&self, standalone_question: &str) -> Result<Vec<String>> {
        let query = self
            .embedder
            .embed(standalone_question)
            .context("Failed to embed question")?;

        let results = self.index.search(
            &query,
            self.retrieval.top_k,
            self.retrieval.score_threshold,
        )?;

        debug!(
            "Retrieved {} chunks for question (k={}, threshold={})",
            results.len(),
            self.retrieval.top_k,
            self.retrieval.score_threshold
        );

        Ok(results.into_iter().map(|result| result.content).collect())
    }

    /// Synthesize an answer to `question` from the retrieved `chunks`.
    ///
    /// With no chunks the fixed fallback is returned and the model is not
    /// invoked. Otherwise the model's output is returned verbatim.
    #[inline]
    pub fn answer(&self, question: &str, chunks: &[String]) -> Result<String> {
        if chunks.is_empty() {
            info!("No relevant chunks retrieved, returning fallback answer");
            return Ok(FALLBACK_ANSWER.to_string());
        }

        let context = chunks.join("\n\n");
        let user_text = format!("Question: {}\n\nContext: {}", question, context);

        self.model
            .generate(ANSWER_SYSTEM_PROMPT, self.session.history(), &user_text)
            .context("Failed to generate answer")
    }

    /// Run one full conversation turn: reformulate, retrieve, answer, and
    /// record the exchange.
    #[inline]
    pub fn ask(&mut self, question: &str) -> Result<String> {
        let standalone = self.reformulate(question)?;
        let chunks = self.retrieve(&standalone)?;
        let answer = self.answer(question, &chunks)?;

        self.session.append(question, &answer);
        Ok(answer)
    }
}
