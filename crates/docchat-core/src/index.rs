//! In-memory similarity index over chunk embeddings.
//!
//! [`SimilarityIndex`] holds chunks in insertion order alongside their
//! unit-normalized embeddings and the [`Embedder`] that produced them.
//! Search is brute-force cosine similarity (dot product of unit vectors),
//! exact and deterministic: ties keep insertion order.
//!
//! [`LiveIndex`] is the single slot the chat path reads from. Replacing the
//! index swaps an `Arc` under a lock; a query clones the `Arc` first, so a
//! rebuild can never tear a query that is already running.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::embedding::{dot, normalize, Embedder};
use crate::error::IndexError;
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Chunks plus their embeddings, searchable by similarity.
pub struct SimilarityIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("model", &self.embedder.model_name())
            .field("chunks", &self.entries.len())
            .field("dims", &self.dims)
            .finish()
    }
}

impl SimilarityIndex {
    /// An index with no chunks. Every query on it returns nothing.
    pub fn empty(embedder: Arc<dyn Embedder>) -> Self {
        let dims = embedder.dims();
        Self {
            embedder,
            entries: Vec::new(),
            dims,
        }
    }

    /// Embed `chunks` and build an index over them.
    ///
    /// Texts are sent to the embedder in batches of `batch_size`. Chunks
    /// with identical text (same content hash) are embedded once. An empty
    /// chunk list returns an empty index without calling the embedder.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        chunks: Vec<Chunk>,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Ok(Self::empty(embedder));
        }

        let mut unique_texts: Vec<String> = Vec::new();
        let slots: Vec<usize> = {
            let mut slot_by_hash: HashMap<&str, usize> = HashMap::new();
            chunks
                .iter()
                .map(|c| {
                    *slot_by_hash.entry(c.hash.as_str()).or_insert_with(|| {
                        unique_texts.push(c.text.clone());
                        unique_texts.len() - 1
                    })
                })
                .collect()
        };

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(unique_texts.len());
        for batch in unique_texts.chunks(batch_size.max(1)) {
            let embedded = embedder.embed(batch).await.map_err(IndexError::Embedding)?;
            if embedded.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }
            vectors.extend(embedded);
        }

        let dims = match embedder.dims() {
            0 => vectors.first().map(Vec::len).unwrap_or(0),
            d => d,
        };
        for v in vectors.iter_mut() {
            check_dims(dims, v)?;
            normalize(v);
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(slots)
            .map(|(chunk, slot)| IndexEntry {
                chunk,
                vector: vectors[slot].clone(),
            })
            .collect();

        info!(
            model = embedder.model_name(),
            chunks = entries.len(),
            embedded = vectors.len(),
            dims,
            "built similarity index"
        );

        Ok(Self {
            embedder,
            entries,
            dims,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `k` chunks most similar to `text`.
    ///
    /// `text` is embedded with the embedder this index was built with.
    /// `k` larger than the index returns every chunk; `k == 0` or an empty
    /// index returns an empty result without embedding anything.
    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let mut embedded = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .map_err(IndexError::Embedding)?;
        if embedded.len() != 1 {
            return Err(IndexError::CountMismatch {
                expected: 1,
                actual: embedded.len(),
            });
        }
        let mut query_vec = embedded.remove(0);
        check_dims(self.dims, &query_vec)?;
        normalize(&mut query_vec);

        let result = self.rank(&query_vec, k);
        debug!(
            k,
            hits = result.len(),
            top_score = result.top_score().unwrap_or(0.0),
            "similarity query"
        );
        Ok(result)
    }

    /// Rank all chunks against a unit-length query vector.
    ///
    /// Sorted by descending score; equal scores keep insertion order.
    pub fn rank(&self, query_vec: &[f32], k: usize) -> RetrievalResult {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let s = dot(query_vec, &e.vector);
                (i, if s.is_nan() { f32::NEG_INFINITY } else { s })
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        RetrievalResult::new(
            scored
                .into_iter()
                .map(|(i, score)| ScoredChunk {
                    chunk: self.entries[i].chunk.clone(),
                    score,
                })
                .collect(),
        )
    }
}

fn check_dims(expected: usize, v: &[f32]) -> Result<(), IndexError> {
    if v.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            actual: v.len(),
        });
    }
    Ok(())
}

/// The one index the chat path queries.
///
/// Empty until the first upload batch completes. Querying an empty slot
/// returns an empty result, the same as an index with no relevant matches.
#[derive(Debug, Default)]
pub struct LiveIndex {
    current: RwLock<Option<Arc<SimilarityIndex>>>,
}

impl LiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the current index, if one has been built.
    pub fn current(&self) -> Option<Arc<SimilarityIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a freshly built index, returning the one it replaced.
    pub fn replace(&self, index: SimilarityIndex) -> Option<Arc<SimilarityIndex>> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(Arc::new(index))
    }

    /// Drop the current index.
    pub fn clear(&self) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of chunks in the current index (0 when none is built).
    pub fn len(&self) -> usize {
        self.current().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Query the current index, or return an empty result if none exists.
    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult, IndexError> {
        match self.current() {
            Some(index) => index.query(text, k).await,
            None => Ok(RetrievalResult::empty()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chunk::{chunk_pages, ChunkParams};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known texts to fixed vectors; anything else gets `fallback`.
    pub(crate) struct FixedEmbedder {
        pub(crate) table: Vec<(String, Vec<f32>)>,
        pub(crate) fallback: Vec<f32>,
        pub(crate) calls: AtomicUsize,
        pub(crate) texts_embedded: AtomicUsize,
    }

    impl FixedEmbedder {
        pub(crate) fn new(table: Vec<(&str, Vec<f32>)>, fallback: Vec<f32>) -> Self {
            Self {
                table: table
                    .into_iter()
                    .map(|(t, v)| (t.to_string(), v))
                    .collect(),
                fallback,
                calls: AtomicUsize::new(0),
                texts_embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.fallback.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    self.table
                        .iter()
                        .find(|(key, _)| t.contains(key.as_str()))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| self.fallback.clone())
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service unavailable")
        }
    }

    fn pages(texts: &[&str]) -> Vec<Chunk> {
        let pages: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        chunk_pages("doc.pdf", &pages, ChunkParams::new(1000, 100).unwrap())
    }

    fn axis_embedder() -> Arc<FixedEmbedder> {
        Arc::new(FixedEmbedder::new(
            vec![
                ("alpha", vec![1.0, 0.0, 0.0]),
                ("beta", vec![0.0, 1.0, 0.0]),
                ("gamma", vec![0.0, 0.0, 1.0]),
                ("mixed", vec![1.0, 1.0, 0.0]),
            ],
            vec![0.1, 0.1, 0.1],
        ))
    }

    #[tokio::test]
    async fn test_empty_build_returns_nothing_without_embedding() {
        let embedder = axis_embedder();
        let index = SimilarityIndex::build(embedder.clone(), Vec::new(), 8)
            .await
            .unwrap();
        assert!(index.is_empty());
        for k in [0, 1, 5, 100] {
            assert!(index.query("alpha", k).await.unwrap().is_empty());
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = SimilarityIndex::build(
            axis_embedder(),
            pages(&["gamma page", "alpha page", "mixed page", "beta page"]),
            8,
        )
        .await
        .unwrap();

        let result = index.query("alpha", 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].chunk.text, "alpha page");
        assert!((result.hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(result.hits[1].chunk.text, "mixed page");
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_all_descending() {
        let index = SimilarityIndex::build(
            axis_embedder(),
            pages(&["gamma page", "alpha page", "mixed page", "beta page"]),
            3,
        )
        .await
        .unwrap();

        let result = index.query("alpha", 50).await.unwrap();
        assert_eq!(result.len(), 4);
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order_and_query_is_deterministic() {
        let index = SimilarityIndex::build(
            axis_embedder(),
            pages(&["beta one", "gamma two", "beta three", "gamma four"]),
            8,
        )
        .await
        .unwrap();

        let first = index.query("alpha", 4).await.unwrap();
        let order: Vec<&str> = first.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["beta one", "gamma two", "beta three", "gamma four"]);

        for _ in 0..5 {
            assert_eq!(index.query("alpha", 4).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_refund_policy_scenario() {
        let embedder = Arc::new(FixedEmbedder::new(
            vec![
                ("Refund Policy", vec![0.9, 0.1, 0.0]),
                ("refund policy", vec![0.88, 0.12, 0.0]),
                ("Shipping", vec![0.0, 1.0, 0.0]),
                ("Warranty", vec![0.0, 0.2, 1.0]),
            ],
            vec![0.0, 0.0, 0.1],
        ));
        let chunks = pages(&[
            "Shipping\nOrders ship within two business days.",
            "Refund Policy\nRefunds are issued within 30 days of purchase.",
            "Warranty\nAll devices carry a one-year warranty.",
        ]);
        let index = SimilarityIndex::build(embedder, chunks, 2).await.unwrap();

        let result = index.query("What is the refund policy?", 3).await.unwrap();
        assert!(result.hits[0].chunk.text.starts_with("Refund Policy"));
        assert_eq!(result.hits[0].chunk.page, 2);
    }

    #[tokio::test]
    async fn test_identical_chunks_embedded_once() {
        let embedder = axis_embedder();
        let index = SimilarityIndex::build(
            embedder.clone(),
            pages(&["alpha page", "alpha page", "beta page"]),
            1,
        )
        .await
        .unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let embedder = Arc::new(FixedEmbedder::new(
            vec![("short", vec![1.0])],
            vec![0.0, 1.0],
        ));
        let err = SimilarityIndex::build(embedder, pages(&["short text"]), 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_error() {
        let err = SimilarityIndex::build(Arc::new(FailingEmbedder), pages(&["text"]), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_live_index_empty_before_build() {
        let live = LiveIndex::new();
        assert!(live.current().is_none());
        assert!(live.query("anything", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_index_swap_keeps_old_handle_valid() {
        let live = LiveIndex::new();
        let first = SimilarityIndex::build(axis_embedder(), pages(&["alpha old"]), 4)
            .await
            .unwrap();
        live.replace(first);
        let in_flight = live.current().unwrap();

        let second = SimilarityIndex::build(axis_embedder(), pages(&["alpha new", "beta new"]), 4)
            .await
            .unwrap();
        let previous = live.replace(second).unwrap();

        assert!(Arc::ptr_eq(&previous, &in_flight));
        let old = in_flight.query("alpha", 5).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old.hits[0].chunk.text, "alpha old");

        let new = live.query("alpha", 5).await.unwrap();
        assert_eq!(new.len(), 2);
        assert_eq!(new.hits[0].chunk.text, "alpha new");

        live.clear();
        assert!(live.is_empty());
        assert!(live.query("alpha", 5).await.unwrap().is_empty());
    }
}
