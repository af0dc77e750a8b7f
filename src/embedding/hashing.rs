//! Feature-hashing embedder.
//!
//! Maps each lower-cased alphanumeric token (and each adjacent token pair)
//! to a signed bucket chosen by SHA-256. Similar wording gives similar
//! vectors; there is no semantic understanding. Useful offline and in tests.

use anyhow::Result;
use async_trait::async_trait;
use docchat_core::embedding::Embedder;
use sha2::{Digest, Sha256};

pub const DEFAULT_DIMS: usize = 256;

const BIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            name: format!("hashing-{}", dims),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add(&mut v, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }
        v
    }

    fn add(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
