//! Prompt templates for answer generation.

use ragfuse_core::FusedResult;

pub(crate) const RAG_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
using only the provided context. If the answer is not in the context, say so clearly. \
Do not make up information.";

pub(crate) const NO_CONTEXT_ANSWER: &str =
    "No relevant documents were found to answer the question.";

const UNTITLED: &str = "Untitled";

/// `[Document i] title\ncontent` blocks separated by blank lines.
pub(crate) fn build_context(results: &[FusedResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Document {}] {}\n{}",
                i + 1,
                r.document.title.as_deref().unwrap_or(UNTITLED),
                r.document.content.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn rag_prompt(question: &str, context: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer based on the context:",
        context, question
    )
}

pub(crate) fn summary_prompt(text: &str) -> String {
    format!("Summarize the following text concisely:\n\n{}", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragfuse_core::Document;

    #[test]
    fn test_build_context_numbers_documents() {
        let results = vec![
            FusedResult::new(Document::with_id("a", Some("Intro"), "first body"), 0.9),
            FusedResult::new(Document::with_id("b", None, "second body"), 0.5),
        ];

        let context = build_context(&results);

        assert_eq!(
            context,
            "[Document 1] Intro\nfirst body\n\n[Document 2] Untitled\nsecond body"
        );
    }

    #[test]
    fn test_rag_prompt_layout() {
        let prompt = rag_prompt("What is fusion?", "[Document 1] X\ny");
        assert!(prompt.starts_with("Context:\n[Document 1] X\ny"));
        assert!(prompt.contains("Question: What is fusion?"));
        assert!(prompt.ends_with("Answer based on the context:"));
    }
}
