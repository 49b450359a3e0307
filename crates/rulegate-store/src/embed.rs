//! Deterministic hashing embedder for rule text.
//!
//! Tokens are hashed into a fixed-dimension bag-of-words vector which is
//! then l2-normalized, so similarity reduces to a dot product. The same
//! text always produces the same vector, which keeps queries pure and
//! repeatable across processes.

use sha2::{Digest, Sha256};

/// Embedding dimensionality shared by every collection.
pub const EMBEDDING_DIM: usize = 256;

/// Embed text into a normalized fixed-dimension vector.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; EMBEDDING_DIM];
    for token in tokenize(text) {
        let slot = token_slot(&token);
        vec[slot] += 1.0;
    }
    normalize(&mut vec);
    vec
}

/// Cosine similarity of two normalized vectors (plain dot product).
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn token_slot(token: &str) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let word = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
    (word % EMBEDDING_DIM as u64) as usize
}

fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_is_deterministic() {
        let a = embed("never start with a rhetorical question");
        let b = embed("never start with a rhetorical question");
        assert_eq!(a, b);
    }

    #[test]
    fn test_embed_is_normalized() {
        let v = embed("short sentences, active voice");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_identical_text_has_max_similarity() {
        let a = embed("avoid jargon in headlines");
        let b = embed("avoid jargon in headlines");
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_scores_above_unrelated() {
        let query = embed("headline style for the blog");
        let related = embed("blog headline style: sentence case, no clickbait");
        let unrelated = embed("scheduling cadence for quarterly reports");
        assert!(similarity(&query, &related) > similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = embed("");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(similarity(&v, &embed("anything")), 0.0);
    }
}
