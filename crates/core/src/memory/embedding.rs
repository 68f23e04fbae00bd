//! Embedding generation (hashed bag-of-words).
//!
//! Each lowercase word is hashed with FNV-1a into one of `EMBED_DIM`
//! buckets and the counts are L2-normalized. Deterministic across runs and
//! platforms, so stored vectors stay comparable.

/// Embedding dimension.
pub const EMBED_DIM: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

fn words(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Generate an embedding from text content. Empty text yields the zero vector.
pub fn generate(content: &str) -> Vec<f32> {
    let mut embedding = vec![0.0f32; EMBED_DIM];
    for word in words(content) {
        let bucket = (fnv1a(word.as_bytes()) % EMBED_DIM as u64) as usize;
        embedding[bucket] += 1.0;
    }
    let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter_mut().for_each(|v| *v /= norm);
    }
    embedding
}

/// Cosine similarity in [-1, 1]; 0 when either side is all zeros or the
/// lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(generate("hello world"), generate("hello world"));
    }

    #[test]
    fn correct_dimension() {
        assert_eq!(generate("test input").len(), EMBED_DIM);
    }

    #[test]
    fn case_and_punctuation_ignored() {
        assert_eq!(generate("Hello, World!"), generate("hello world"));
    }

    #[test]
    fn empty_input_is_zero() {
        let v = generate("");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&v, &generate("anything")), 0.0);
    }

    #[test]
    fn shared_words_score_higher() {
        let query = generate("Sam likes green tea");
        let close = generate("tea is what Sam likes");
        let far = generate("the weather was cold");
        assert!(cosine(&query, &close) > cosine(&query, &far));
        assert!((cosine(&query, &query) - 1.0).abs() < 1e-5);
    }
}
