//! Embedding vector operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors arising from vector operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },
}

/// An embedding vector with dynamic dimensionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub data: Vec<f32>,
    pub model_id: String,
    pub dimensions: i32,
}

impl EmbeddingVector {
    pub fn new(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        let dimensions = data.len() as i32;
        Self {
            data,
            model_id: model_id.into(),
            dimensions,
        }
    }

    /// Cosine similarity against another vector of the same dimensionality.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> Result<f32, VectorError> {
        if self.dimensions != other.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: other.dimensions,
            });
        }

        let mut dot_product = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.data.iter().zip(other.data.iter()) {
            dot_product += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let norm_a = norm_a.sqrt();
        let norm_b = norm_b.sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }

        Ok(dot_product / (norm_a * norm_b))
    }

    pub fn is_valid(&self) -> bool {
        self.dimensions > 0 && self.data.len() == self.dimensions as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = EmbeddingVector::new(vec![1.0, 2.0, 3.0], "test");
        let sim = v.cosine_similarity(&v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = EmbeddingVector::new(vec![1.0, 0.0], "test");
        let b = EmbeddingVector::new(vec![0.0, 1.0], "test");
        let sim = a.cosine_similarity(&b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let a = EmbeddingVector::new(vec![1.0, 0.0], "test");
        let b = EmbeddingVector::new(vec![1.0, 0.0, 0.0], "test");
        assert!(matches!(
            a.cosine_similarity(&b),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn zero_vector_similarity_is_zero_not_nan() {
        let a = EmbeddingVector::new(vec![0.0, 0.0], "test");
        let b = EmbeddingVector::new(vec![1.0, 1.0], "test");
        assert_eq!(a.cosine_similarity(&b).unwrap(), 0.0);
    }
}
