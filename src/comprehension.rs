//! Diffs the ordered entries of a [`Comprehension`].
//!
//! Entries are matched by position, which makes appends and truncations cheap
//! but re-sends every moved entry that also changed its content.
//! If all entries of both renders carry unique keys and [`Config::keyed_comprehensions`](`crate::config::Config::keyed_comprehensions`)
//! is enabled, entries are matched by key instead, so reordering only transfers source indices.

use crate::{
	diff::{Differ, SlotDiff},
	error::DiffError,
	rendered::{Comprehension, Statics},
};
use hashbrown::{hash_map::Entry as MapEntry, HashMap, HashSet};
use tracing::{error, trace, warn};

/// Sparse counterpart of a [`Comprehension`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListDiff {
	/// The shared template, present iff the list is new to the client or its template changed.
	/// All items are complete in that case.
	pub statics: Option<Statics>,
	/// Length of the list after applying this diff. Previous items past it are discarded.
	pub count: usize,
	/// One entry per new item, except that trailing [`ItemDiff::Unchanged`] entries are left out.
	pub items: Vec<ItemDiff>,
}

impl ListDiff {
	/// The diff for the item at `index`, including elided trailing ones.
	#[must_use]
	pub fn item(&self, index: usize) -> &ItemDiff {
		self.items.get(index).unwrap_or(&ItemDiff::Unchanged)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemDiff {
	/// Keep the previous item at the same index.
	Unchanged,
	/// Keep the previous item at the given index, unchanged.
	Moved(usize),
	/// Patch the previous item at `source` with `slots`, or create a new item from complete `slots` if `source` is `None`.
	Patch { source: Option<usize>, slots: Vec<(usize, SlotDiff)> },
}

impl Differ<'_> {
	/// Returns `None` if the list is unchanged.
	pub(crate) fn diff_list(&mut self, previous: Option<&Comprehension>, next: &Comprehension, depth_limit: usize) -> Result<Option<ListDiff>, DiffError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(DiffError::DepthLimit);
		}

		let previous = match previous {
			Some(previous) if previous.fingerprint() == next.fingerprint() => previous,
			previous => {
				if previous.is_some() {
					trace!("Comprehension template changed. Resending all items.");
				}
				let mut items = Vec::with_capacity(next.entries().len());
				for entry in next.entries() {
					items.push(ItemDiff::Patch {
						source: None,
						slots: self.diff_slots(None, entry.dynamics(), depth_limit)?,
					});
				}
				return Ok(Some(ListDiff {
					statics: Some(next.statics().clone()),
					count: next.entries().len(),
					items,
				}));
			}
		};

		let mut items = match self.config.keyed_comprehensions.then(|| key_index(previous, next)).flatten() {
			Some(index) => self.diff_keyed(previous, next, &index, depth_limit)?,
			None => self.diff_positional(previous, next, depth_limit)?,
		};

		while items.last() == Some(&ItemDiff::Unchanged) {
			items.pop();
		}
		if items.is_empty() && previous.entries().len() == next.entries().len() {
			return Ok(None);
		}
		trace!(previous = previous.entries().len(), next = next.entries().len(), sent = items.len(), "Comprehension changed.");
		Ok(Some(ListDiff {
			statics: None,
			count: next.entries().len(),
			items,
		}))
	}

	fn diff_positional(&mut self, previous: &Comprehension, next: &Comprehension, depth_limit: usize) -> Result<Vec<ItemDiff>, DiffError> {
		let mut items = Vec::with_capacity(next.entries().len());
		for (index, entry) in next.entries().iter().enumerate() {
			items.push(match previous.entries().get(index) {
				Some(previous_entry) => {
					let slots = self.diff_slots(Some(previous_entry.dynamics()), entry.dynamics(), depth_limit)?;
					if slots.is_empty() {
						ItemDiff::Unchanged
					} else {
						ItemDiff::Patch { source: Some(index), slots }
					}
				}
				None => ItemDiff::Patch {
					source: None,
					slots: self.diff_slots(None, entry.dynamics(), depth_limit)?,
				},
			});
		}
		Ok(items)
	}

	fn diff_keyed(&mut self, previous: &Comprehension, next: &Comprehension, index: &HashMap<&str, usize>, depth_limit: usize) -> Result<Vec<ItemDiff>, DiffError> {
		let mut items = Vec::with_capacity(next.entries().len());
		for (position, entry) in next.entries().iter().enumerate() {
			let source = entry.key().and_then(|key| index.get(key)).copied();
			items.push(match source {
				Some(source) => {
					let slots = self.diff_slots(Some(previous.entries()[source].dynamics()), entry.dynamics(), depth_limit)?;
					match (slots.is_empty(), source == position) {
						(true, true) => ItemDiff::Unchanged,
						(true, false) => ItemDiff::Moved(source),
						(false, _) => ItemDiff::Patch { source: Some(source), slots },
					}
				}
				None => ItemDiff::Patch {
					source: None,
					slots: self.diff_slots(None, entry.dynamics(), depth_limit)?,
				},
			});
		}
		Ok(items)
	}
}

/// Maps previous keys to their positions, or returns `None` if keyed matching isn't possible.
fn key_index<'a>(previous: &'a Comprehension, next: &Comprehension) -> Option<HashMap<&'a str, usize>> {
	if !previous.is_keyed() || !next.is_keyed() {
		return None;
	}

	let mut index = HashMap::with_capacity(previous.entries().len());
	for (position, entry) in previous.entries().iter().enumerate() {
		match index.entry(entry.key()?) {
			MapEntry::Occupied(occupied) => {
				warn!(key = *occupied.key(), "Duplicate comprehension key in previous render. Matching by position.");
				return None;
			}
			MapEntry::Vacant(vacant) => {
				vacant.insert(position);
			}
		}
	}

	// Two entries reusing one source item would leave the client without that item.
	let mut seen = HashSet::with_capacity(next.entries().len());
	if let Some(duplicate) = next.entries().iter().filter_map(|entry| entry.key()).find(|key| !seen.insert(*key)) {
		warn!(key = duplicate, "Duplicate comprehension key. Matching by position.");
		return None;
	}

	Some(index)
}
