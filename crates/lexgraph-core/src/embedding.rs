//! Embedding provider trait, deterministic embedder, and vector utilities.
//!
//! LexGraph does not call a real embedding model. [`DeterministicEmbedder`]
//! maps text to a unit vector with a hash-seeded pseudo-random generator,
//! so identical text always yields a bit-identical vector. That keeps
//! ingestion reproducible and lets tests assert on exact outputs.
//!
//! The module also holds the corpus [`checksum`] used for deduplication and
//! blob addressing, plus helpers to store vectors as SQLite BLOBs.

use sha2::{Digest, Sha256};

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 384;

const DJB2_SEED: i32 = 5381;
const LCG_MULTIPLIER: u64 = 1_103_515_245;
const LCG_INCREMENT: u64 = 12_345;
const LCG_MASK: u64 = 0x7fff_ffff;

/// Trait for embedding providers.
///
/// The pipeline only depends on this trait, so a model-backed provider can
/// replace [`DeterministicEmbedder`] without touching stage code.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier stored alongside vectors.
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a single text.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Hash-seeded pseudo-embedding.
///
/// Seeds a glibc-style linear congruential generator with the djb2 hash of
/// the text, draws `dims` values uniformly in `[-1, 1]`, and L2-normalizes.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicEmbedder {
    dims: usize,
}

impl DeterministicEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingProvider for DeterministicEmbedder {
    fn model_name(&self) -> &str {
        "deterministic-djb2-lcg"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        embed(text, self.dims)
    }
}

/// Embed `text` into a unit vector of length `dimensions`.
///
/// Returns a zero vector if the raw draw has zero magnitude.
pub fn embed(text: &str, dimensions: usize) -> Vec<f32> {
    let mut rng = Lcg::new(djb2(text));
    let raw: Vec<f64> = (0..dimensions).map(|_| rng.next_unit() * 2.0 - 1.0).collect();

    let magnitude = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
    if magnitude == 0.0 {
        return vec![0.0; dimensions];
    }
    raw.iter().map(|v| (v / magnitude) as f32).collect()
}

/// djb2 (xor variant) over UTF-16 code units with 32-bit wrapping, as an
/// unsigned seed.
fn djb2(text: &str) -> u64 {
    let hash = text.encode_utf16().fold(DJB2_SEED, |hash, unit| {
        hash.wrapping_shl(5).wrapping_add(hash) ^ i32::from(unit)
    });
    i64::from(hash).unsigned_abs()
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1]`.
    fn next_unit(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT)
            & LCG_MASK;
        self.state as f64 / LCG_MASK as f64
    }
}

/// SHA-256 hex digest of raw content.
///
/// Used for corpus-level deduplication and as the blob-store address. It is
/// independent of the embedding hash.
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use lexgraph_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Project embeddings onto two seeded random axes for scatter plots.
///
/// Not PCA; only stable, so the same corpus always plots the same way.
pub fn project_to_2d(embeddings: &[Vec<f32>], seed: u64) -> Vec<(f32, f32)> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };
    let mut rng = Lcg::new(seed);
    let mut axis_x = Vec::with_capacity(first.len());
    let mut axis_y = Vec::with_capacity(first.len());
    for _ in 0..first.len() {
        axis_x.push((rng.next_unit() * 2.0 - 1.0) as f32);
        axis_y.push((rng.next_unit() * 2.0 - 1.0) as f32);
    }

    embeddings
        .iter()
        .map(|emb| {
            let x: f32 = emb.iter().zip(&axis_x).map(|(v, a)| v * a).sum();
            let y: f32 = emb.iter().zip(&axis_y).map(|(v, a)| v * a).sum();
            (x, y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(v: &[f32]) -> f64 {
        v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let a = embed("Texas Property Code § 5.003", DEFAULT_DIMENSIONS);
        let b = embed("Texas Property Code § 5.003", DEFAULT_DIMENSIONS);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
        let bits_a: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_embedding_is_unit_length() {
        for text in ["a", "hello world.", "Municipal zoning ordinance", "é ü 中文"] {
            let v = embed(text, DEFAULT_DIMENSIONS);
            assert!((l2(&v) - 1.0).abs() < 1e-5, "norm of {:?} = {}", text, l2(&v));
        }
    }

    #[test]
    fn test_different_texts_differ() {
        let a = embed("short-term rental", 64);
        let b = embed("land use", 64);
        assert_ne!(a, b);
        assert!(cosine_similarity(&a, &b) < 0.99);
    }

    #[test]
    fn test_provider_uses_configured_dims() {
        let provider = DeterministicEmbedder::new(16);
        assert_eq!(provider.dims(), 16);
        assert_eq!(provider.embed("x").len(), 16);
        assert_eq!(provider.embed("x"), embed("x", 16));
    }

    #[test]
    fn test_zero_dimensions() {
        assert!(embed("anything", 0).is_empty());
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_projection_is_stable() {
        let embs = vec![embed("a", 8), embed("b", 8)];
        let p1 = project_to_2d(&embs, 42);
        let p2 = project_to_2d(&embs, 42);
        assert_eq!(p1.len(), 2);
        assert_eq!(p1, p2);
        assert!(project_to_2d(&[], 42).is_empty());
    }
}
