use core::{
	fmt,
	hash::{Hash, Hasher},
};
use std::collections::hash_map::DefaultHasher;

/// Structural hash of a static fragment sequence.
///
/// Two trees with equal fingerprints can be patched through the same static skeleton.
/// Fingerprints are deterministic within one process, but are not meant to be persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Debug for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Fingerprint({:016x})", self.0)
	}
}

/// Computes the [`Fingerprint`] of `statics`.
///
/// Depends on the fragment count and the text of each fragment, in order, and on nothing else.
#[must_use]
pub fn fingerprint<S: AsRef<str>>(statics: &[S]) -> Fingerprint {
	// `DefaultHasher::new()` uses fixed keys, unlike `RandomState`.
	let mut hasher = DefaultHasher::new();
	statics.len().hash(&mut hasher);
	for fragment in statics {
		// `str` hashing is prefix-free, so fragment boundaries are significant.
		fragment.as_ref().hash(&mut hasher);
	}
	Fingerprint(hasher.finish())
}
