//! ragfuse-llm - Text generation over OpenAI-compatible chat APIs
//!
//! [`ChatClient`] implements [`ragfuse_core::TextGenerator`] against any
//! `/chat/completions` endpoint (Groq by default).

mod chat;

pub use chat::ChatClient;
