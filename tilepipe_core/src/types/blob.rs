//! This module provides the [`Blob`] struct, a thin wrapper around [`Vec<u8>`]
//! used for tile payloads everywhere in the pipeline.
//!
//! Tile bytes are opaque to the pipeline: they are moved between archives,
//! caches, and the network without being decoded.

use std::fmt::Debug;

/// A byte buffer holding one tile payload.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Consumes the `Blob`, returning the underlying vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Returns the length in bytes.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	/// Returns `true` if the blob holds no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(vec: Vec<u8>) -> Self {
		Blob(vec)
	}
}

impl From<&[u8]> for Blob {
	fn from(slice: &[u8]) -> Self {
		Blob(slice.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(array: &[u8; N]) -> Self {
		Blob(array.to_vec())
	}
}

/// `Debug` prints only the length, not the payload.
impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Blob").field("len", &self.0.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basics() {
		let blob = Blob::from(vec![1u8, 2, 3]);
		assert_eq!(blob.len(), 3);
		assert!(!blob.is_empty());
		assert_eq!(blob.as_slice(), &[1, 2, 3]);
		assert_eq!(blob.into_vec(), vec![1, 2, 3]);

		assert!(Blob::new_empty().is_empty());
		assert_eq!(Blob::from(&[9u8, 9]).len(), 2);
	}

	#[test]
	fn debug_hides_payload() {
		let blob = Blob::from(vec![0u8; 1000]);
		assert_eq!(format!("{blob:?}"), "Blob { len: 1000 }");
	}
}
