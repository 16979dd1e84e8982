//! Near-duplicate detection for harvested Q/A pairs.
//!
//! Text is embedded as a hashed bag of character unigrams and bigrams
//! (signed feature hashing into a fixed-width vector), then compared with
//! cosine similarity. No model weights, no vector store.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const VECTOR_DIM: usize = 256;

/// Default cosine threshold above which two pairs count as the same.
pub const DEFAULT_THRESHOLD: f32 = 0.85;

fn features(text: &str) -> Vec<String> {
    let chars: Vec<char> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let mut out: Vec<String> = chars.iter().map(|c| c.to_string()).collect();
    out.extend(chars.windows(2).map(|w| w.iter().collect::<String>()));
    out
}

/// Unit-length embedding of `text`. Empty text yields the zero vector.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; VECTOR_DIM];
    for feature in features(text) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let idx = (hash as usize) % VECTOR_DIM;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign;
    }
    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity of two unit vectors.
pub fn cosine(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// `true` if any of `existing` is more similar to `candidate` than `threshold`.
pub fn is_similar(candidate: &str, existing: &[String], threshold: f32) -> bool {
    let target = embed(candidate);
    existing.iter().any(|qa| cosine(&target, &embed(qa)) > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_similar() {
        let qa = "Q: 今天好累\nA: 抱抱你，早点休息哦";
        assert!(is_similar(qa, &[qa.to_string()], DEFAULT_THRESHOLD));
    }

    #[test]
    fn unrelated_text_is_not_similar() {
        let existing = vec!["Q: 晚上吃什么\nA: 我们一起去吃火锅吧！".to_string()];
        assert!(!is_similar(
            "Q: 给我讲个故事\nA: 从前有一只小兔子住在森林里",
            &existing,
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn whitespace_and_case_ignored() {
        let a = embed("Hello 小悠");
        let b = embed("hello小悠");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_existing_never_similar() {
        assert!(!is_similar("Q: 你好\nA: 你好呀", &[], DEFAULT_THRESHOLD));
    }

    #[test]
    fn embedding_is_unit_length() {
        let v = embed("我想你了");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embed("").iter().all(|x| *x == 0.0));
    }
}
