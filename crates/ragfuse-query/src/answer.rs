//! Retrieval-augmented answers over the search façade.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use ragfuse_core::{
    DocumentStore, Embedder, FusedResult, GenerationRequest, RagError, Result, SearchMode,
    SearchQuery, TextGenerator,
};

use crate::engine::SearchEngine;
use crate::prompt::{
    build_context, rag_prompt, summary_prompt, NO_CONTEXT_ANSWER, RAG_SYSTEM_PROMPT,
};

/// Characters of document content echoed back in an answer's context.
const CONTEXT_PREVIEW_CHARS: usize = 500;

/// Model label for answers produced without calling the generator.
const NO_MODEL: &str = "N/A";

/// Per-call answer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    /// Documents retrieved as context (1 to 20).
    pub context_limit: usize,

    /// Retrieval mode for the context.
    pub mode: SearchMode,

    /// Sampling temperature (0 to 2).
    pub temperature: f32,

    /// Maximum answer tokens (1 to 4096).
    pub max_tokens: u32,

    /// Collection to search; the engine default when unset.
    pub collection: Option<String>,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            context_limit: 5,
            mode: SearchMode::Hybrid,
            temperature: 0.7,
            max_tokens: 1024,
            collection: None,
        }
    }
}

impl AnswerOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=20).contains(&self.context_limit) {
            return Err(RagError::invalid_argument("context_limit must be between 1 and 20"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::invalid_argument("temperature must be between 0 and 2"));
        }
        if !(1..=4096).contains(&self.max_tokens) {
            return Err(RagError::invalid_argument("max_tokens must be between 1 and 4096"));
        }
        Ok(())
    }
}

/// One retrieved document as reported with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub title: String,
    /// Content preview, cut at 500 characters.
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<&FusedResult> for ContextEntry {
    fn from(r: &FusedResult) -> Self {
        Self {
            id: r.document.id.clone(),
            title: r.document.title.clone().unwrap_or_default(),
            content: preview(r.document.content.as_deref().unwrap_or("")),
            score: r.score,
            metadata: r.document.metadata.clone(),
        }
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(CONTEXT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// A generated answer and the context it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub question: String,
    pub model: String,
    pub context: Vec<ContextEntry>,
}

/// Earlier exchange in a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// Answer to a follow-up question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationalAnswer {
    #[serde(flatten)]
    pub answer: Answer,
    pub original_question: String,
    pub reformulated_query: String,
}

/// Builds answers from retrieved context and a text generator.
pub struct AnswerEngine<S: ?Sized, E: ?Sized, G: ?Sized> {
    search: Arc<SearchEngine<S, E>>,
    generator: Arc<G>,
    default_collection: String,
}

impl<S, E, G> AnswerEngine<S, E, G>
where
    S: DocumentStore + ?Sized,
    E: Embedder + ?Sized,
    G: TextGenerator + ?Sized,
{
    pub fn new(
        search: Arc<SearchEngine<S, E>>,
        generator: Arc<G>,
        default_collection: &str,
    ) -> Self {
        Self {
            search,
            generator,
            default_collection: default_collection.to_string(),
        }
    }

    /// Retrieve context for `question` and generate an answer from it.
    ///
    /// With no context found the generator is not called and a fixed answer
    /// is returned.
    pub async fn answer(&self, question: &str, options: &AnswerOptions) -> Result<Answer> {
        options.validate()?;
        info!("RAG query: {:?}", question);

        let collection = options
            .collection
            .as_deref()
            .unwrap_or(&self.default_collection);
        let query = SearchQuery::new(question, options.mode, collection, options.context_limit);
        let retrieved = self.search.search(&query).await?.results;

        if retrieved.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                question: question.to_string(),
                model: NO_MODEL.to_string(),
                context: Vec::new(),
            });
        }

        let request = GenerationRequest::new(rag_prompt(question, &build_context(&retrieved)))
            .with_system(RAG_SYSTEM_PROMPT)
            .with_temperature(options.temperature)
            .with_max_tokens(options.max_tokens);
        let answer = self.generator.generate(&request).await?;

        info!("RAG answer generated from {} context documents", retrieved.len());

        Ok(Answer {
            answer,
            question: question.to_string(),
            model: self.generator.model().to_string(),
            context: retrieved.iter().map(ContextEntry::from).collect(),
        })
    }

    /// Answer several questions in order; the first failure aborts.
    pub async fn answer_many(
        &self,
        questions: &[String],
        options: &AnswerOptions,
    ) -> Result<Vec<Answer>> {
        let mut answers = Vec::with_capacity(questions.len());
        for q in questions {
            answers.push(self.answer(q, options).await?);
        }
        Ok(answers)
    }

    /// Answer a follow-up, folding in the previous question.
    pub async fn answer_with_history(
        &self,
        question: &str,
        history: &[HistoryTurn],
        options: &AnswerOptions,
    ) -> Result<ConversationalAnswer> {
        let reformulated = reformulate(question, history);
        let answer = self.answer(&reformulated, options).await?;

        Ok(ConversationalAnswer {
            answer,
            original_question: question.to_string(),
            reformulated_query: reformulated,
        })
    }

    /// Summarize `text` in one generation call.
    pub async fn summarize(&self, text: &str, max_tokens: u32) -> Result<String> {
        if text.trim().is_empty() {
            return Err(RagError::invalid_argument("text to summarize is empty"));
        }
        let request = GenerationRequest::new(summary_prompt(text))
            .with_temperature(0.5)
            .with_max_tokens(max_tokens.max(1));
        self.generator.generate(&request).await
    }
}

fn reformulate(question: &str, history: &[HistoryTurn]) -> String {
    match history.last() {
        Some(last) => format!("{} (context: {})", question, last.question),
        None => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragfuse_core::ErrorKind;
    use ragfuse_embed::HashEmbedder;

    use crate::testing::{candidate, StubGenerator, StubStore};

    type Engine = AnswerEngine<StubStore, HashEmbedder, StubGenerator>;

    fn answer_engine(store: StubStore, generator: StubGenerator) -> (Arc<StubGenerator>, Engine) {
        let search = Arc::new(SearchEngine::new(Arc::new(store), Arc::new(HashEmbedder::new(8))));
        let generator = Arc::new(generator);
        let engine = AnswerEngine::new(search, Arc::clone(&generator), "documents");
        (generator, engine)
    }

    fn populated() -> StubStore {
        StubStore::default()
            .with_vector(vec![candidate("a", 0.9), candidate("b", 0.5)])
            .with_text(vec![candidate("a", 3.0)])
    }

    #[tokio::test]
    async fn test_answer_uses_context() {
        let (generator, engine) =
            answer_engine(populated(), StubGenerator::replying("Fusion mixes scores."));

        let answer = engine
            .answer("What is fusion?", &AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(answer.answer, "Fusion mixes scores.");
        assert_eq!(answer.model, "stub-model");
        assert_eq!(answer.context.len(), 2);
        assert_eq!(answer.context[0].id, "a");

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some(RAG_SYSTEM_PROMPT));
        assert!(requests[0].prompt.contains("[Document 1] Title a\ncontent of a"));
        assert!(requests[0].prompt.contains("Question: What is fusion?"));
        assert_eq!(requests[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_no_context_skips_generator() {
        let (generator, engine) =
            answer_engine(StubStore::default(), StubGenerator::replying("unused"));

        let answer = engine.answer("anything", &AnswerOptions::default()).await.unwrap();

        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert_eq!(answer.model, "N/A");
        assert!(answer.context.is_empty());
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_option_bounds() {
        let (_, engine) = answer_engine(populated(), StubGenerator::replying("x"));

        let bad = [
            AnswerOptions { context_limit: 0, ..AnswerOptions::default() },
            AnswerOptions { context_limit: 21, ..AnswerOptions::default() },
            AnswerOptions { temperature: 2.5, ..AnswerOptions::default() },
            AnswerOptions { max_tokens: 0, ..AnswerOptions::default() },
            AnswerOptions { max_tokens: 5000, ..AnswerOptions::default() },
        ];
        for options in bad {
            let err = engine.answer("q", &options).await.unwrap_err();
            assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        }
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let (_, engine) = answer_engine(populated(), StubGenerator::failing());

        let err = engine.answer("q", &AnswerOptions::default()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Generation);
    }

    #[tokio::test]
    async fn test_answer_many_in_order() {
        let (generator, engine) = answer_engine(populated(), StubGenerator::replying("ok"));
        let questions = vec!["first?".to_string(), "second?".to_string()];

        let answers = engine
            .answer_many(&questions, &AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(answers.len(), 2);
        assert_eq!(answers[1].question, "second?");
        assert_eq!(generator.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_answer_with_history() {
        let (_, engine) = answer_engine(populated(), StubGenerator::replying("ok"));
        let history = vec![
            HistoryTurn {
                question: "What is RAG?".to_string(),
                answer: "Retrieval plus generation.".to_string(),
            },
            HistoryTurn {
                question: "How is context found?".to_string(),
                answer: "Hybrid search.".to_string(),
            },
        ];

        let reply = engine
            .answer_with_history("And the weights?", &history, &AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.original_question, "And the weights?");
        assert_eq!(
            reply.reformulated_query,
            "And the weights? (context: How is context found?)"
        );
        assert_eq!(reply.answer.question, reply.reformulated_query);
    }

    #[test]
    fn test_reformulate_without_history() {
        assert_eq!(reformulate("plain", &[]), "plain");
    }

    #[tokio::test]
    async fn test_summarize() {
        let (generator, engine) =
            answer_engine(StubStore::default(), StubGenerator::replying("short"));

        let summary = engine.summarize("a long text", 256).await.unwrap();

        assert_eq!(summary, "short");
        let request = &generator.requests()[0];
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 256);
        assert!(request.system.is_none());
        assert!(request.prompt.ends_with("a long text"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), 503);
        assert!(cut.ends_with("..."));

        assert_eq!(preview("short"), "short");
    }
}
