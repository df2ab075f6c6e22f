use crate::{
	error::DiffError,
	fingerprint::Fingerprint,
	rc_hash_map::RcHashMap,
	rendered::{Assigns, Rendered},
};
use core::fmt;
use hashbrown::HashMap;
use tracing::{debug, instrument, trace};

/// Component id, unique within one connection's lifetime.
///
/// Ids are assigned in increasing order starting at 1 and are never reused by the same registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(u32);

impl Cid {
	#[must_use]
	pub fn new(id: u32) -> Self {
		Self(id)
	}

	#[must_use]
	pub fn get(self) -> u32 {
		self.0
	}
}

impl fmt::Debug for Cid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Cid({})", self.0)
	}
}

impl fmt::Display for Cid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// The last render of a component.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
	pub(crate) name: String,
	pub(crate) key: String,
	pub(crate) rendered: Rendered,
	pub(crate) assigns: Assigns,
	/// Components referenced by `rendered`, in tree order.
	pub(crate) children: Vec<Cid>,
}

impl ComponentEntry {
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	#[must_use]
	pub fn rendered(&self) -> &Rendered {
		&self.rendered
	}

	#[must_use]
	pub fn assigns(&self) -> &Assigns {
		&self.assigns
	}

	#[must_use]
	pub fn children(&self) -> &[Cid] {
		&self.children
	}
}

/// Per-connection component state: id allocation and each component's last render.
///
/// Owned by exactly one connection and only touched by that connection's diff passes.
/// Entries that a pass doesn't reach are swept when it completes.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
	/// Component name, then key.
	ids: HashMap<String, HashMap<String, Cid>>,
	entries: RcHashMap<Cid, u16, ComponentEntry>,
	next_cid: u32,
}

impl ComponentRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Looks up the id of the component `name` with `key`, allocating a new one if there is none.
	///
	/// # Errors
	///
	/// Iff the id space is exhausted.
	pub fn cid_for(&mut self, name: &str, key: &str) -> Result<Cid, DiffError> {
		if let Some(cid) = self.lookup(name, key) {
			return Ok(cid);
		}
		self.next_cid = self.next_cid.checked_add(1).ok_or(DiffError::CidOverflow)?;
		let cid = Cid(self.next_cid);
		trace!(name, key, %cid, "Allocated component id.");
		self.ids.entry_ref(name).or_default().insert(key.to_owned(), cid);
		Ok(cid)
	}

	/// Looks up the id of the component `name` with `key` without allocating one.
	#[must_use]
	pub fn lookup(&self, name: &str, key: &str) -> Option<Cid> {
		self.ids.get(name).and_then(|keys| keys.get(key)).copied()
	}

	#[must_use]
	pub fn get(&self, cid: Cid) -> Option<&ComponentEntry> {
		self.entries.get(&cid)
	}

	#[must_use]
	pub fn contains(&self, cid: Cid) -> bool {
		self.entries.get(&cid).is_some()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Registered component ids in ascending order.
	#[must_use]
	pub fn cids(&self) -> Vec<Cid> {
		let mut cids = self.entries.iter().map(|(&cid, _)| cid).collect::<Vec<_>>();
		cids.sort_unstable();
		cids
	}

	/// Forgets everything, including the id allocation state.
	///
	/// Used to render from scratch after a failed pass or a reconnect.
	pub fn reset(&mut self) {
		debug!(components = self.entries.len(), "Resetting component registry.");
		self.ids.clear();
		self.entries.clear();
		self.next_cid = 0;
	}

	/// Unmarks all entries. Starts a diff pass.
	pub(crate) fn begin_pass(&mut self) {
		self.entries.weaken_all();
	}

	/// Marks `cid` and everything it references as reachable from the current pass.
	///
	/// Returns `false` if there is no entry for `cid`.
	pub(crate) fn mark_reachable(&mut self, cid: Cid) -> Result<bool, DiffError> {
		match self.entries.increment(&cid) {
			Ok(None) => return Ok(false),
			Ok(Some(1)) => (),
			Ok(Some(_)) | Err(_) => return Err(self.duplicate(cid)),
		}
		let children = self.entries.get(&cid).map(|entry| entry.children.clone()).unwrap_or_default();
		for child in children {
			if !self.mark_reachable(child)? {
				debug!(%cid, %child, "Child component vanished from the registry.");
			}
		}
		Ok(true)
	}

	/// Whether the current pass already reached `cid`, or `None` if there is no entry.
	pub(crate) fn is_marked(&self, cid: Cid) -> Option<bool> {
		self.entries.count(&cid).map(|count| count > 0)
	}

	/// Removes an entry so it can be diffed against while the registry is being updated.
	pub(crate) fn take(&mut self, cid: Cid) -> Option<ComponentEntry> {
		self.entries.remove(&cid)
	}

	/// Stores `entry` as reachable from the current pass.
	pub(crate) fn store(&mut self, cid: Cid, entry: ComponentEntry) {
		if self.entries.insert_strong(cid, entry).is_some() {
			debug!(%cid, "Replaced component entry that was still registered.");
		}
	}

	/// Finds a live component other than `except` whose statics have `fingerprint`.
	#[must_use]
	pub(crate) fn find_statics(&self, fingerprint: Fingerprint, except: Cid) -> Option<Cid> {
		self.entries
			.iter()
			.filter(|&(&cid, entry)| cid != except && entry.rendered.fingerprint() == fingerprint)
			.map(|(&cid, _)| cid)
			.min()
	}

	/// Removes every entry the current pass didn't mark and returns their ids in ascending order.
	#[instrument(skip(self))]
	pub(crate) fn sweep(&mut self) -> Vec<Cid> {
		let mut removed = Vec::new();
		for (cid, entry) in self.entries.drain_weak() {
			if let Some(keys) = self.ids.get_mut(&entry.name) {
				keys.remove(&entry.key);
			}
			removed.push(cid);
		}
		// Ids that were allocated but never registered, e.g. by a failed render.
		let entries = &self.entries;
		self.ids.retain(|_, keys| {
			keys.retain(|_, cid| entries.get(cid).is_some());
			!keys.is_empty()
		});
		removed.sort_unstable();
		if !removed.is_empty() {
			debug!(?removed, remaining = self.entries.len(), "Swept unreferenced components.");
		}
		removed
	}

	fn duplicate(&self, cid: Cid) -> DiffError {
		let (name, key) = self
			.ids
			.iter()
			.flat_map(|(name, keys)| keys.iter().map(move |(key, &c)| (name, key, c)))
			.find(|&(_, _, c)| c == cid)
			.map(|(name, key, _)| (name.clone(), key.clone()))
			.unwrap_or_default();
		DiffError::DuplicateComponent { name, key }
	}
}

#[cfg(test)]
mod tests {
	use super::{Cid, ComponentRegistry};

	#[test]
	fn ids_are_scoped_by_name() {
		let mut registry = ComponentRegistry::new();
		assert_eq!(registry.cid_for("card", "a"), Ok(Cid(1)));
		assert_eq!(registry.cid_for("shell", "a"), Ok(Cid(2)));
		assert_eq!(registry.cid_for("card", "a"), Ok(Cid(1)));
		assert_eq!(registry.lookup("shell", "a"), Some(Cid(2)));
		assert_eq!(registry.lookup("card", "b"), None);
		assert_eq!(registry.lookup("list", "a"), None);
	}

	#[test]
	fn unregistered_ids_are_swept() {
		let mut registry = ComponentRegistry::new();
		registry.cid_for("card", "a").unwrap();
		registry.begin_pass();
		assert_eq!(registry.sweep(), vec![]);
		assert_eq!(registry.lookup("card", "a"), None);
		// Ids are not reused.
		assert_eq!(registry.cid_for("card", "a"), Ok(Cid(2)));
	}
}
