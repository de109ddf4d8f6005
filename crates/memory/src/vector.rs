//! Vector similarity and ranking utilities.
//!
//! Pure-Rust implementations shared by every backend that ranks in process:
//! - Cosine similarity
//! - Top-k ranking of [`MemoryRecord`]s against a query vector

use std::cmp::Ordering;

use threadmind_core::store::MemoryRecord;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank already-filtered records by similarity to `query`.
///
/// Returns at most `top_k` records, highest score first, with `score` set.
/// Equal scores fall back to the newer record first.
pub fn rank_by_similarity<I>(records: I, query: &[f32], top_k: usize) -> Vec<MemoryRecord>
where
    I: IntoIterator<Item = MemoryRecord>,
{
    if top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<MemoryRecord> = records
        .into_iter()
        .map(|mut record| {
            record.score = cosine_similarity(&record.vector, query);
            record
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.metadata.timestamp.cmp(&a.metadata.timestamp))
    });
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadmind_core::turn::{Turn, TurnRole};

    fn record(content: &str, vector: Vec<f32>) -> MemoryRecord {
        MemoryRecord::from_turn("s1", &Turn::new(TurnRole::User, content), vector)
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // 1 / sqrt(2)
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn ranks_by_similarity() {
        let records = vec![
            record("a", vec![0.0, 1.0, 0.0]),
            record("b", vec![1.0, 0.0, 0.0]),
            record("c", vec![0.5, 0.5, 0.0]),
        ];

        let ranked = rank_by_similarity(records, &[1.0, 0.0, 0.0], 10);
        let contents: Vec<_> = ranked.iter().map(|r| r.metadata.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c", "a"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn respects_top_k() {
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("e{i}"), vec![1.0, i as f32 * 0.1]))
            .collect();
        assert_eq!(rank_by_similarity(records.clone(), &[1.0, 0.0], 3).len(), 3);
        assert!(rank_by_similarity(records, &[1.0, 0.0], 0).is_empty());
    }
}
