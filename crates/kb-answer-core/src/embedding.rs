//! Vector utilities for unit-length embeddings.
//!
//! Document embeddings are L2-normalized once at index load, so query
//! similarity reduces to a dot product against a normalized query vector.

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Return a unit-length copy of `v` (a zero vector stays zero).
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product; `0.0` when lengths differ or either side is empty.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Map a cosine similarity from `[-1, 1]` onto `[0, 1]`.
pub fn rescale_similarity(sim: f32) -> f64 {
    (f64::from(sim) + 1.0) / 2.0
}

/// Weighted average of a query embedding and its paraphrase embeddings.
///
/// `vectors[0]` is the original query and receives `original_weight`; the
/// remaining `1 - original_weight` is split evenly across the rest. With a
/// single vector the input is returned unchanged. Returns `None` for an
/// empty batch or mismatched dimensions.
pub fn blend(vectors: &[Vec<f32>], original_weight: f32) -> Option<Vec<f32>> {
    let (first, rest) = vectors.split_first()?;
    if rest.is_empty() {
        return Some(first.clone());
    }
    if rest.iter().any(|v| v.len() != first.len()) {
        return None;
    }

    let para_weight = (1.0 - original_weight) / rest.len() as f32;
    let mut out: Vec<f32> = first.iter().map(|x| x * original_weight).collect();
    for v in rest {
        for (acc, x) in out.iter_mut().zip(v) {
            *acc += x * para_weight;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let v = normalized(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        let v = normalized(&[0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_renormalizing_does_not_change_similarity() {
        let doc = normalized(&[0.2, -0.7, 0.4]);
        let query = normalized(&[0.5, 0.1, -0.3]);
        let once = rescale_similarity(dot(&doc, &query));
        let twice = rescale_similarity(dot(&normalized(&doc), &normalized(&query)));
        assert!((once - twice).abs() < 1e-6);
    }

    #[test]
    fn test_rescale_bounds() {
        assert_eq!(rescale_similarity(-1.0), 0.0);
        assert_eq!(rescale_similarity(0.0), 0.5);
        assert_eq!(rescale_similarity(1.0), 1.0);
    }

    #[test]
    fn test_blend_single_vector_is_identity() {
        let v = vec![vec![0.3, 0.4]];
        assert_eq!(blend(&v, 0.5), Some(vec![0.3, 0.4]));
    }

    #[test]
    fn test_blend_weights() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 3.0]];
        let out = blend(&vectors, 0.5).unwrap();
        // 0.5 * [1,0] + 0.25 * [0,1] + 0.25 * [0,3]
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_blend_rejects_mismatched_dims() {
        assert_eq!(blend(&[vec![1.0, 0.0], vec![1.0]], 0.5), None);
        assert_eq!(blend(&[], 0.5), None);
    }
}
