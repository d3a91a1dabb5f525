//! Test doubles for the store, embedder and generator seams.

use std::sync::Mutex;

use async_trait::async_trait;

use ragfuse_core::{
    Candidate, Collection, Document, DocumentStore, Embedder, GenerationRequest, MetadataFilter,
    RagError, Result, Stats, TextGenerator,
};

pub fn candidate(id: &str, score: f32) -> Candidate {
    Candidate::new(
        Document::with_id(id, Some(&format!("Title {id}")), &format!("content of {id}")),
        score,
    )
}

/// Store returning canned candidates and recording the `k` it was asked for.
pub struct StubStore {
    vector: Vec<Candidate>,
    text: Vec<Candidate>,
    text_index: bool,
    fail_vector: bool,
    fail_text: bool,
    vector_ks: Mutex<Vec<usize>>,
    text_ks: Mutex<Vec<usize>>,
}

impl Default for StubStore {
    fn default() -> Self {
        Self {
            vector: Vec::new(),
            text: Vec::new(),
            text_index: true,
            fail_vector: false,
            fail_text: false,
            vector_ks: Mutex::new(Vec::new()),
            text_ks: Mutex::new(Vec::new()),
        }
    }
}

impl StubStore {
    pub fn with_vector(mut self, hits: Vec<Candidate>) -> Self {
        self.vector = hits;
        self
    }

    pub fn with_text(mut self, hits: Vec<Candidate>) -> Self {
        self.text = hits;
        self
    }

    pub fn without_text_index(mut self) -> Self {
        self.text_index = false;
        self
    }

    pub fn failing_vector(mut self) -> Self {
        self.fail_vector = true;
        self
    }

    pub fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    pub fn vector_ks(&self) -> Vec<usize> {
        self.vector_ks.lock().unwrap().clone()
    }

    pub fn text_ks(&self) -> Vec<usize> {
        self.text_ks.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for StubStore {
    async fn create_collection(&self, _collection: Collection) -> Result<()> {
        Ok(())
    }

    async fn get_collection(&self, _name: &str) -> Result<Option<Collection>> {
        Ok(None)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(Vec::new())
    }

    async fn create_text_index(&self, _collection: &str) -> Result<()> {
        Ok(())
    }

    async fn insert_document(&self, _collection: &str, _doc: Document) -> Result<()> {
        Ok(())
    }

    async fn insert_documents(&self, _collection: &str, _docs: Vec<Document>) -> Result<()> {
        Ok(())
    }

    async fn get_document(&self, _collection: &str, _id: &str) -> Result<Option<Document>> {
        Ok(None)
    }

    async fn set_embedding(&self, _collection: &str, _id: &str, _embedding: &[f32]) -> Result<()> {
        Ok(())
    }

    async fn unembedded_documents(
        &self,
        _collection: &str,
        _limit: usize,
    ) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }

    async fn vector_search(
        &self,
        _embedding: &[f32],
        _collection: &str,
        k: usize,
        _min_score: Option<f32>,
    ) -> Result<Vec<Candidate>> {
        self.vector_ks.lock().unwrap().push(k);
        if self.fail_vector {
            return Err(RagError::backend("vector index unreachable"));
        }
        Ok(self.vector.iter().take(k).cloned().collect())
    }

    async fn text_search(
        &self,
        _query: &str,
        collection: &str,
        k: usize,
    ) -> Result<Vec<Candidate>> {
        self.text_ks.lock().unwrap().push(k);
        if !self.text_index {
            return Err(RagError::TextIndexMissing {
                collection: collection.to_string(),
            });
        }
        if self.fail_text {
            return Err(RagError::backend("text index unreachable"));
        }
        Ok(self.text.iter().take(k).cloned().collect())
    }

    async fn find(
        &self,
        _collection: &str,
        _filter: &MetadataFilter,
        _limit: usize,
    ) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }

    async fn get_stats(&self, collection: Option<&str>) -> Result<Stats> {
        Ok(Stats {
            collections: 0,
            documents: 0,
            embedded: 0,
            text_indexed: 0,
            filter: collection.map(String::from),
        })
    }
}

/// Embedder that is always down.
pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding("provider unreachable"))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::embedding("provider unreachable"))
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Generator echoing a fixed answer and recording every request.
pub struct StubGenerator {
    reply: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StubGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .clone()
            .ok_or_else(|| RagError::generation("model overloaded"))
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}
