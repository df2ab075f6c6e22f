use core::{
	borrow::Borrow,
	hash::{BuildHasher, Hash},
};
use hashbrown::{hash_map::DefaultHashBuilder, HashMap};
use num_traits::{CheckedAdd, One, Zero};

/// A [`HashMap`] with a reference count per entry.
///
/// Entries aren't removed when their count reaches zero, only when [`drain_weak`](`RcHashMap::drain_weak`) is called.
/// [`weaken_all`](`RcHashMap::weaken_all`) followed by increments for each live reference and a final drain is a mark-and-sweep pass.
#[derive(Debug, Clone)]
pub struct RcHashMap<K, C, V, S = DefaultHashBuilder>(HashMap<K, (C, V), S>)
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero,
	S: BuildHasher;
impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero + Copy,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + One + Zero + Copy,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Inserts `v` with a count of one, replacing (and returning) any previous value.
	pub fn insert_strong(&mut self, k: K, v: V) -> Option<V> {
		self.0.insert(k, (C::one(), v)).map(|(_, v)| v)
	}

	/// Increments the count of an existing entry and returns the new count.
	pub fn increment<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<C>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some((c, _)) => {
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(Some(*c))
			}
			None => Ok(None),
		}
	}

	pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.remove(k).map(|(_, v)| v)
	}

	/// Resets every count to zero without removing anything.
	pub fn weaken_all(&mut self) {
		for (c, _) in self.0.values_mut() {
			*c = C::zero();
		}
	}

	#[must_use]
	pub fn count<Q: ?Sized>(&self, k: &Q) -> Option<C>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.get(k).map(|&(c, _)| c)
	}

	#[must_use]
	pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.get(k).map(|(_, v)| v)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
		self.0.iter().map(|(k, (_, v))| (k, v))
	}

	/// Removes and yields all entries with a count of zero.
	///
	/// Entries are removed even if the iterator isn't fully consumed.
	pub fn drain_weak(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
		self.0.extract_if(|_, (c, _)| c.is_zero()).map(|(k, (_, v))| (k, v))
	}

	pub fn clear(&mut self) {
		self.0.clear();
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountSaturatedError;
