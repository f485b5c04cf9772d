//! Vector math shared by the vector index and tests.
//!
//! Stored vectors are unit-normalized `f32`s, so dot product and cosine similarity coincide.

use crate::{Error, Result};

pub fn magnitude(vector: &[f32]) -> f32 {
	vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

/// Returns `vector` scaled to unit length.
///
/// A zero vector (or one whose norm is not finite) is returned unchanged and a warning is logged.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
	let mut out = vector.to_vec();

	normalize_in_place(&mut out);

	out
}

pub fn normalize_in_place(vector: &mut [f32]) {
	let norm = magnitude(vector);

	if norm == 0.0 || !norm.is_finite() {
		tracing::warn!(dimensions = vector.len(), norm, "Vector cannot be normalized.");

		return;
	}

	for value in vector.iter_mut() {
		*value /= norm;
	}
}

/// Dot product over the shared prefix of `a` and `b`.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	let norm_a = magnitude(a);
	let norm_b = magnitude(b);

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot_product(a, b) / (norm_a * norm_b)
}

/// Little-endian `f32`s, four bytes per component.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
	let mut blob = Vec::with_capacity(vector.len() * 4);

	for value in vector {
		blob.extend_from_slice(&value.to_le_bytes());
	}

	blob
}

pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>> {
	if blob.len() % 4 != 0 {
		return Err(Error::InvalidBlob { len: blob.len() });
	}

	Ok(blob
		.chunks_exact(4)
		.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
		.collect())
}
