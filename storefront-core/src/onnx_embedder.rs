//! Local sentence embeddings with all-MiniLM-L6-v2 on ONNX Runtime.
//!
//! A batch is tokenized together, right-padded to its longest text and run as
//! a single `[batch, seq]` inference. Each row of the last hidden state is
//! mean-pooled over its real tokens and scaled to unit length.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use crate::embeddings::{EmbeddingBackend, EmbeddingError, OnnxConfig};

const MODEL_FILE: &str = "all-MiniLM-L6-v2.onnx";
const TOKENIZER_FILE: &str = "all-MiniLM-L6-v2-tokenizer.json";

pub struct OnnxEmbeddingClient {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingClient")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

fn inference_error(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::OnnxInference(e.to_string())
}

impl OnnxEmbeddingClient {
    /// `ModelNotFound` when the model or its tokenizer file is absent.
    pub fn new(config: OnnxConfig) -> Result<Self, EmbeddingError> {
        if let Some(missing) = [&config.model_path, &config.tokenizer_path]
            .into_iter()
            .find(|p| !p.exists())
        {
            return Err(EmbeddingError::ModelNotFound {
                path: missing.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(inference_error)?;
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        tracing::info!(model = %config.model_path.display(), "ONNX embedding model loaded");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let dimensions = self.dimensions;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let encodings = tokenizer
                .encode_batch(texts, true)
                .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
            let batch = PaddedBatch::from_encodings(&encodings);

            let mut session = session
                .lock()
                .map_err(|e| inference_error(format!("session lock poisoned: {e}")))?;
            run_batch(&mut session, &batch, dimensions)
        })
        .await
        .map_err(|e| inference_error(format!("inference task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Token ids, mask and type ids for a batch, row-major, zero-padded to the
/// longest encoding.
#[derive(Debug, PartialEq)]
struct PaddedBatch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

impl PaddedBatch {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let rows: Vec<(&[u32], &[u32], &[u32])> = encodings
            .iter()
            .map(|e| (e.get_ids(), e.get_attention_mask(), e.get_type_ids()))
            .collect();
        Self::from_rows(&rows)
    }

    fn from_rows(rows: &[(&[u32], &[u32], &[u32])]) -> Self {
        let seq_len = rows.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(0);
        let cells = rows.len() * seq_len;
        let mut batch = Self {
            rows: rows.len(),
            seq_len,
            input_ids: Vec::with_capacity(cells),
            attention_mask: Vec::with_capacity(cells),
            token_type_ids: Vec::with_capacity(cells),
        };

        for (ids, mask, types) in rows {
            pad_into(&mut batch.input_ids, ids, seq_len);
            pad_into(&mut batch.attention_mask, mask, seq_len);
            pad_into(&mut batch.token_type_ids, types, seq_len);
        }
        batch
    }

    fn shape(&self) -> Vec<i64> {
        vec![self.rows as i64, self.seq_len as i64]
    }

    fn mask_row(&self, row: usize) -> &[i64] {
        &self.attention_mask[row * self.seq_len..(row + 1) * self.seq_len]
    }
}

fn pad_into(out: &mut Vec<i64>, values: &[u32], width: usize) {
    out.extend(values.iter().map(|&v| i64::from(v)));
    out.extend(std::iter::repeat(0).take(width - values.len()));
}

fn run_batch(
    session: &mut Session,
    batch: &PaddedBatch,
    expected_dims: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let inputs = ort::inputs! {
        "input_ids" => Tensor::from_array((batch.shape(), batch.input_ids.clone())).map_err(inference_error)?,
        "attention_mask" => Tensor::from_array((batch.shape(), batch.attention_mask.clone())).map_err(inference_error)?,
        "token_type_ids" => Tensor::from_array((batch.shape(), batch.token_type_ids.clone())).map_err(inference_error)?,
    };

    let outputs = session.run(inputs).map_err(inference_error)?;
    let (shape, hidden) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(inference_error)?;

    // [batch, seq, hidden]
    if shape.len() != 3 || shape[0] as usize != batch.rows {
        return Err(inference_error(format!(
            "unexpected output shape {:?} for {} inputs",
            &shape[..],
            batch.rows
        )));
    }
    let seq_len = shape[1] as usize;
    let hidden_dim = shape[2] as usize;
    let row_len = seq_len * hidden_dim;

    (0..batch.rows)
        .map(|row| {
            let states = &hidden[row * row_len..(row + 1) * row_len];
            let mut vector = mean_pool(states, batch.mask_row(row), seq_len, hidden_dim);
            l2_normalize(&mut vector);
            if vector.len() != expected_dims {
                return Err(EmbeddingError::InvalidDimensions {
                    expected: expected_dims,
                    actual: vector.len(),
                });
            }
            Ok(vector)
        })
        .collect()
}

/// Average of the token states whose mask is set. All-zero mask gives zeros.
fn mean_pool(states: &[f32], mask: &[i64], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_dim];
    if hidden_dim == 0 {
        return sum;
    }
    let mut tokens = 0.0f32;

    for (token, chunk) in states.chunks_exact(hidden_dim).take(seq_len).enumerate() {
        if mask.get(token).copied().unwrap_or(0) == 0 {
            continue;
        }
        tokens += 1.0;
        for (acc, x) in sum.iter_mut().zip(chunk) {
            *acc += x;
        }
    }

    if tokens > 0.0 {
        sum.iter_mut().for_each(|v| *v /= tokens);
    }
    sum
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// `$XDG_DATA_HOME/storefront/models`, or `~/.local/share/storefront/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("storefront")
        .join("models")
}

/// Model and tokenizer paths. An empty setting means the default model
/// directory; otherwise `~` and `$VARS` are expanded and the tokenizer is
/// expected next to the model as `<stem>-tokenizer.json`.
pub fn resolve_onnx_paths(onnx_model_path: &str) -> (PathBuf, PathBuf) {
    if onnx_model_path.is_empty() {
        let dir = default_model_dir();
        return (dir.join(MODEL_FILE), dir.join(TOKENIZER_FILE));
    }

    let model = match shellexpand::full(onnx_model_path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(onnx_model_path),
    };
    let stem = model
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
    (model, tokenizer)
}
