use super::*;
use crate::index::IndexEntry;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Embeds text as keyword-presence dimensions so similarity is predictable.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let score = |keyword: &str| if lower.contains(keyword) { 1.0 } else { 0.0 };
        // Small constant dimension keeps vectors away from zero magnitude.
        Ok(vec![score("mortgage"), score("weather"), 0.001])
    }

    fn embed_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Record of one generate() invocation: system prompt, history length, user text.
type GenerateCall = (String, usize, String);

#[derive(Clone)]
struct MockModel {
    reply: String,
    calls: Rc<Cell<usize>>,
    seen: Rc<RefCell<Vec<GenerateCall>>>,
}

impl MockModel {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Rc::new(Cell::new(0)),
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.get()
    }
}

impl GenerativeModel for MockModel {
    fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
    ) -> anyhow::Result<String> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push((
            system_prompt.to_string(),
            history.len(),
            user_text.to_string(),
        ));
        Ok(self.reply.clone())
    }
}

fn index_with(chunks: &[&str]) -> VectorIndex {
    let embedder = KeywordEmbedder;
    let mut index = VectorIndex::new();
    for chunk in chunks {
        index
            .add(IndexEntry {
                vector: embedder.embed(chunk).expect("embed should succeed"),
                content: (*chunk).to_string(),
                metadata: BTreeMap::new(),
            })
            .expect("add should succeed");
    }
    index
}

fn engine_over(
    chunks: &[&str],
    model: MockModel,
) -> ChatEngine<KeywordEmbedder, MockModel> {
    ChatEngine::new(
        KeywordEmbedder,
        model,
        index_with(chunks),
        RetrievalConfig::default(),
    )
}

#[test]
fn reformulate_passes_through_on_empty_history() {
    let model = MockModel::new("should not be called");
    let engine = engine_over(&[], model.clone());

    let standalone = engine
        .reformulate("What are recent mortgage rate news?")
        .expect("reformulate should succeed");

    assert_eq!(standalone, "What are recent mortgage rate news?");
    assert_eq!(model.call_count(), 0);
}

#[test]
fn reformulate_invokes_model_with_history() {
    let model = MockModel::new("What factors affected recent mortgage rates?");
    let session = ChatSession::from_turns(vec![ChatTurn::new(
        "What are recent mortgage rate news?",
        "Rates rose to 7 percent.",
    )]);
    let engine = engine_over(&[], model.clone()).with_session(session);

    let standalone = engine
        .reformulate("Can you explain the factors affecting this?")
        .expect("reformulate should succeed");

    assert_eq!(standalone, "What factors affected recent mortgage rates?");
    assert_eq!(model.call_count(), 1);

    let seen = model.seen.borrow();
    assert!(seen[0].0.starts_with("Given a chat history"));
    assert_eq!(seen[0].1, 1);
    assert_eq!(seen[0].2, "Can you explain the factors affecting this?");
}

#[test]
fn answer_returns_fallback_without_model_call() {
    let model = MockModel::new("should not be called");
    let engine = engine_over(&[], model.clone());

    let answer = engine
        .answer("What are recent mortgage rate news?", &[])
        .expect("answer should succeed");

    assert_eq!(answer, FALLBACK_ANSWER);
    assert_eq!(model.call_count(), 0);
}

#[test]
fn answer_sends_question_and_context_to_model() {
    let model = MockModel::new("Rates rose because of inflation.");
    let engine = engine_over(&[], model.clone());

    let chunks = vec![
        "mortgage rates rose this week".to_string(),
        "lenders cite inflation".to_string(),
    ];
    let answer = engine
        .answer("What happened to mortgage rates?", &chunks)
        .expect("answer should succeed");

    assert_eq!(answer, "Rates rose because of inflation.");
    assert_eq!(model.call_count(), 1);

    let seen = model.seen.borrow();
    assert!(seen[0].0.starts_with("You are an assistant"));
    assert!(seen[0].2.contains("Question: What happened to mortgage rates?"));
    assert!(seen[0].2.contains("mortgage rates rose this week"));
    assert!(seen[0].2.contains("lenders cite inflation"));
}

#[test]
fn ask_without_relevant_chunks_falls_back_and_records_turn() {
    // Index holds only weather chunks; a mortgage question clears no threshold.
    let model = MockModel::new("should not be called");
    let mut engine = engine_over(&["the weather was sunny all week"], model.clone());

    let answer = engine
        .ask("What are recent mortgage rate news?")
        .expect("ask should succeed");

    assert_eq!(answer, FALLBACK_ANSWER);
    assert_eq!(model.call_count(), 0);
    assert_eq!(engine.session().len(), 1);
    assert_eq!(
        engine.session().history()[0],
        ChatTurn::new("What are recent mortgage rate news?", FALLBACK_ANSWER)
    );
}

#[test]
fn ask_answers_from_retrieved_chunks() {
    let model = MockModel::new("Mortgage rates rose to 7 percent this week.");
    let mut engine = engine_over(
        &["mortgage rates rose sharply", "weather stayed mild"],
        model.clone(),
    );

    let answer = engine
        .ask("What are recent mortgage rate news?")
        .expect("ask should succeed");

    assert_eq!(answer, "Mortgage rates rose to 7 percent this week.");
    // First turn: no reformulation call, one answer call.
    assert_eq!(model.call_count(), 1);

    let seen = model.seen.borrow();
    assert!(seen[0].2.contains("mortgage rates rose sharply"));
    assert!(!seen[0].2.contains("weather stayed mild"));
}

#[test]
fn second_turn_reformulates_with_prior_turn() {
    let model = MockModel::new("What factors affected recent mortgage rates?");
    let mut engine = engine_over(&["mortgage rates rose sharply"], model.clone());

    engine
        .ask("What are recent mortgage rate news?")
        .expect("first turn should succeed");
    engine
        .ask("Can you explain the factors affecting this?")
        .expect("second turn should succeed");

    // Turn 1: answer only. Turn 2: reformulate + answer.
    assert_eq!(model.call_count(), 3);
    assert_eq!(engine.session().len(), 2);

    let seen = model.seen.borrow();
    let (system, history_len, user_text) = &seen[1];
    assert!(system.starts_with("Given a chat history"));
    assert_eq!(*history_len, 1);
    assert_eq!(user_text, "Can you explain the factors affecting this?");

    // The reformulated question, not the raw follow-up, drove retrieval: the
    // mortgage chunk appears in the final answer prompt.
    assert!(seen[2].2.contains("mortgage rates rose sharply"));
    assert!(seen[2].2.contains("Question: Can you explain the factors affecting this?"));
}

#[test]
fn retrieve_respects_top_k() {
    let model = MockModel::new("unused");
    let chunks: Vec<String> = (0..10)
        .map(|i| format!("mortgage rate update number {}", i))
        .collect();
    let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let engine = engine_over(&chunk_refs, model);

    let retrieved = engine
        .retrieve("mortgage rates")
        .expect("retrieve should succeed");

    assert_eq!(retrieved.len(), RetrievalConfig::default().top_k);
}

#[test]
fn session_accumulates_in_order() {
    let mut session = ChatSession::new();
    assert!(session.is_empty());

    session.append("first question", "first answer");
    session.append("second question", "second answer");

    assert_eq!(session.len(), 2);
    assert_eq!(session.history()[0].question, "first question");
    assert_eq!(session.history()[1].answer, "second answer");

    let turns = session.into_turns();
    assert_eq!(turns.len(), 2);
}

#[test]
fn retrieval_config_validation() {
    assert!(RetrievalConfig::default().validate().is_ok());

    let zero_k = RetrievalConfig {
        top_k: 0,
        score_threshold: 0.2,
    };
    assert!(zero_k.validate().is_err());

    let bad_threshold = RetrievalConfig {
        top_k: 4,
        score_threshold: 2.0,
    };
    assert!(bad_threshold.validate().is_err());

    let nan_threshold = RetrievalConfig {
        top_k: 4,
        score_threshold: f32::NAN,
    };
    assert!(nan_threshold.validate().is_err());
}
