//! Embedding blob codec and similarity.

/// Convert an f32 vector to bytes (little-endian).
pub(crate) fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_bytes`]; `None` when the blob is not whole floats.
pub(crate) fn bytes_to_vec(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine similarity in [-1, 1]; 0 when either side has zero norm or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }

    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Cosine mapped onto [0, 1] as `(1 + cos) / 2`, the score vector search
/// reports. Anti-aligned vectors score 0, orthogonal ones 0.5.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    ((1.0 + cosine_similarity(a, b)) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_codec() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_vec(&vec_to_bytes(&v)), Some(v));
        assert_eq!(bytes_to_vec(&[0u8; 5]), None);
    }

    #[test]
    fn test_cosine() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_score_range() {
        assert!((similarity_score(&[1.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((similarity_score(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-6);
        assert!(similarity_score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
        assert!((similarity_score(&[0.0, 0.0], &[1.0, 0.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
