//! ONNX sentence-transformer embeddings.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use ragfuse_core::{Embedder, RagError, Result};

/// all-MiniLM-L6-v2 output width.
pub const MINILM_DIMENSION: usize = 384;

/// Positional limit of BERT-style encoders.
const MAX_TOKENS: usize = 256;

const TOKEN_TYPE_IDS: &str = "token_type_ids";

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Embedder running a sentence-transformer through ONNX Runtime.
///
/// Queries and documents share one encoding (symmetric retrieval). Token
/// states are mean pooled under the attention mask and L2 normalized, so
/// cosine similarity reduces to a dot product.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    max_tokens: usize,
    /// Whether the model declares a `token_type_ids` input.
    token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from a model directory.
    pub fn from_dir(model_dir: impl AsRef<Path>, num_threads: usize) -> Result<Self> {
        let dir = model_dir.as_ref();
        Self::new(
            dir.join(MODEL_FILE),
            dir.join(TOKENIZER_FILE),
            MINILM_DIMENSION,
            num_threads,
        )
    }

    /// Load a model with an explicit output dimension.
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            return Err(RagError::embedding(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))?;

        let token_type_ids =
            declares_input(session.inputs().iter().map(|i| i.name()), TOKEN_TYPE_IDS);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}, token_type_ids={}",
            dimension, MAX_TOKENS, token_type_ids
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension,
            max_tokens: MAX_TOKENS,
            token_type_ids,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .clamp(1, self.max_tokens);
        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, seq_len={}", batch_size, seq_len);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            for j in 0..ids.len().min(seq_len) {
                input_ids[i * seq_len + j] = ids[j] as i64;
                attention_mask[i * seq_len + j] = mask[j] as i64;
                type_ids[i * seq_len + j] = types.get(j).copied().unwrap_or(0) as i64;
            }
        }

        let shape = vec![batch_size, seq_len];
        let ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))?;
        let mask_tensor = Tensor::from_array((shape.clone(), attention_mask))
            .map_err(|e| RagError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = if self.token_type_ids {
            let types_tensor = Tensor::from_array((shape, type_ids)).map_err(|e| {
                RagError::embedding(format!("Failed to create token type tensor: {}", e))
            })?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                TOKEN_TYPE_IDS => types_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
        }
        .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // First output is last_hidden_state (or an already pooled sentence vector).
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        match view.ndim() {
            3 => Ok(mean_pool(&view, &encodings, seq_len)),
            2 => {
                let hidden = view.shape()[1];
                Ok((0..batch_size)
                    .map(|i| l2_normalize((0..hidden).map(|k| view[[i, k]]).collect()))
                    .collect())
            }
            _ => Err(RagError::embedding(format!(
                "Unexpected output shape: {:?}",
                view.shape()
            ))),
        }
    }
}

fn declares_input<'a>(mut names: impl Iterator<Item = &'a str>, wanted: &str) -> bool {
    names.any(|name| name == wanted)
}

/// Attention-masked mean over the sequence axis of `[batch, seq, hidden]`.
fn mean_pool(
    tensor: &ArrayViewD<'_, f32>,
    encodings: &[Encoding],
    seq_len: usize,
) -> Vec<Vec<f32>> {
    let hidden = tensor.shape()[2];
    let steps = seq_len.min(tensor.shape()[1]);

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let mut sum = vec![0.0f32; hidden];
            let mut count = 0usize;

            for j in 0..steps.min(mask.len()) {
                if mask[j] == 1 {
                    count += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if count == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / count as f32).collect())
        })
        .collect()
}

pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Session is behind a Mutex; inference runs on the calling task.
        self.run_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
