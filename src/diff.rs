//! Computes the minimal change between two renders of a view.
//!
//! A [`Diff`] is shaped like the [`Rendered`] tree it describes, but sparse:
//! slots that didn't change are absent, and statics are only present where the fingerprint changed.
//! Components are diffed separately and referenced by [`Cid`].

use crate::{
	comprehension::ListDiff,
	config::Config,
	error::DiffError,
	registry::{Cid, ComponentEntry, ComponentRegistry},
	rendered::{Assigns, ComponentRef, Dynamic, Rendered, Statics},
};
use hashbrown::HashSet;
use serde_json::Value;
use tracing::{debug, error, instrument, trace, trace_span};

/// Everything the client needs to move from the previous render to the next one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diff {
	pub root: TreeDiff,
	/// Component diffs in the order they must be applied.
	/// A component may reference another component's statics only if that one comes earlier or is already known.
	pub components: Vec<(Cid, TreeDiff)>,
	/// Components that are no longer referenced. The client drops these after applying everything else.
	pub removed: Vec<Cid>,
	/// Set on complete renders made from scratch, which replace whatever the client holds.
	/// Only these are accepted while the client is joining or reconnecting.
	pub join: bool,
}

impl Diff {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		!self.join && self.root.is_empty() && self.components.is_empty() && self.removed.is_empty()
	}
}

/// Sparse counterpart of a [`Rendered`] tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeDiff {
	/// Present iff the tree is new to the client or its fingerprint changed.
	pub statics: Option<StaticsDiff>,
	/// Changed slots in ascending index order.
	pub slots: Vec<(usize, SlotDiff)>,
}

impl TreeDiff {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.statics.is_none() && self.slots.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticsDiff {
	Inline(Statics),
	/// Same statics as the given component's current ones.
	Shared(Cid),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotDiff {
	Text(String),
	Tree(TreeDiff),
	List(ListDiff),
	/// The slot now holds (or still holds) `cid`. `assigns` lists changed assigns, with removed ones set to `null`.
	Component { cid: Cid, assigns: Vec<(String, Value)> },
}

impl SlotDiff {
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			SlotDiff::Text(_) => "text",
			SlotDiff::Tree(_) => "tree",
			SlotDiff::List(_) => "list",
			SlotDiff::Component { .. } => "component",
		}
	}
}

/// Diffs `next` against `previous` with the default [`Config`].
///
/// `previous` is `None` for the first render of a view, in which case the diff is complete
/// and `registry` is rebuilt from scratch.
///
/// # Errors
///
/// See [`diff_with_config`].
pub fn diff(previous: Option<&Rendered>, next: &Rendered, registry: &mut ComponentRegistry) -> Result<Diff, DiffError> {
	diff_with_config(previous, next, registry, &Config::default())
}

/// Diffs `next` against `previous`, updates `registry` with each component's latest render
/// and finally removes registry entries that `next` doesn't reference anymore.
///
/// # Errors
///
/// Iff a slot changes shape between renders, a component is rendered twice,
/// a component fails to render or the depth limit is reached.
/// `registry` is inconsistent afterwards and must be [reset](`ComponentRegistry::reset`).
#[instrument(skip_all, fields(first_render = previous.is_none()))]
pub fn diff_with_config(previous: Option<&Rendered>, next: &Rendered, registry: &mut ComponentRegistry, config: &Config) -> Result<Diff, DiffError> {
	if previous.is_none() && !registry.is_empty() {
		// A complete diff must not rely on components the client may not know.
		registry.reset();
	}
	registry.begin_pass();
	let mut differ = Differ {
		registry,
		config,
		components: Vec::new(),
		in_progress: HashSet::new(),
		children: vec![Vec::new()],
	};
	let root = differ.diff_tree(previous, next, config.depth_limit)?;
	let Differ { registry, components, .. } = differ;
	let removed = registry.sweep();
	debug!(components = components.len(), removed = removed.len(), registered = registry.len(), "Diff complete.");
	Ok(Diff {
		root,
		components,
		removed,
		join: previous.is_none(),
	})
}

pub(crate) struct Differ<'a> {
	pub(crate) registry: &'a mut ComponentRegistry,
	pub(crate) config: &'a Config,
	components: Vec<(Cid, TreeDiff)>,
	/// Components whose render is currently being diffed. Their entries are taken out of the registry meanwhile.
	in_progress: HashSet<Cid>,
	/// Components referenced by each tree that is currently being diffed, innermost last.
	children: Vec<Vec<Cid>>,
}

impl Differ<'_> {
	pub(crate) fn diff_tree(&mut self, previous: Option<&Rendered>, next: &Rendered, depth_limit: usize) -> Result<TreeDiff, DiffError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(DiffError::DepthLimit);
		}

		match previous {
			Some(previous) if previous.fingerprint() == next.fingerprint() => {
				if previous.dynamics().len() != next.dynamics().len() {
					return Err(DiffError::Arity {
						previous: previous.dynamics().len(),
						next: next.dynamics().len(),
					});
				}
				Ok(TreeDiff {
					statics: None,
					slots: self.diff_slots(Some(previous.dynamics()), next.dynamics(), depth_limit)?,
				})
			}
			_ => {
				if let Some(previous) = previous {
					trace!(previous = ?previous.fingerprint(), next = ?next.fingerprint(), "Fingerprint changed. Resending statics.");
				}
				Ok(TreeDiff {
					statics: Some(StaticsDiff::Inline(next.statics().clone())),
					slots: self.diff_slots(None, next.dynamics(), depth_limit)?,
				})
			}
		}
	}

	/// Diffs slot by slot. `previous` is `None` if every slot must be sent.
	pub(crate) fn diff_slots(&mut self, previous: Option<&[Dynamic]>, next: &[Dynamic], depth_limit: usize) -> Result<Vec<(usize, SlotDiff)>, DiffError> {
		let mut slots = Vec::new();
		for (slot, dynamic) in next.iter().enumerate() {
			let previous = previous.and_then(|previous| previous.get(slot));
			if let Some(slot_diff) = self.diff_slot(slot, previous, dynamic, depth_limit)? {
				slots.push((slot, slot_diff));
			}
		}
		Ok(slots)
	}

	fn diff_slot(&mut self, slot: usize, previous: Option<&Dynamic>, next: &Dynamic, depth_limit: usize) -> Result<Option<SlotDiff>, DiffError> {
		match (previous, next) {
			(None, Dynamic::Text(text)) => Ok(Some(SlotDiff::Text(text.clone()))),
			(Some(Dynamic::Text(t_1)), Dynamic::Text(t_2)) => Ok((t_1 != t_2).then(|| SlotDiff::Text(t_2.clone()))),

			(previous @ (None | Some(Dynamic::Tree(_))), Dynamic::Tree(tree)) => {
				let span = trace_span!("Diffing tree", slot);
				let _enter = span.enter();
				let previous = match previous {
					Some(Dynamic::Tree(previous)) => Some(previous),
					_ => None,
				};
				let tree_diff = self.diff_tree(previous, tree, depth_limit - 1)?;
				Ok((!tree_diff.is_empty()).then_some(SlotDiff::Tree(tree_diff)))
			}

			(previous @ (None | Some(Dynamic::List(_))), Dynamic::List(list)) => {
				let span = trace_span!("Diffing comprehension", slot, len = list.entries().len());
				let _enter = span.enter();
				let previous = match previous {
					Some(Dynamic::List(previous)) => Some(previous),
					_ => None,
				};
				Ok(self.diff_list(previous, list, depth_limit - 1)?.map(SlotDiff::List))
			}

			(previous @ (None | Some(Dynamic::Component(_))), Dynamic::Component(component)) => {
				let span = trace_span!("Diffing component", slot, name = component.name(), key = component.key());
				let _enter = span.enter();
				let previous = match previous {
					Some(Dynamic::Component(previous)) => Some(previous),
					_ => None,
				};
				self.diff_component(previous, component, depth_limit - 1)
			}

			(Some(previous), next) => {
				error!(slot, previous = previous.kind(), next = next.kind(), "Slot changed shape between renders.");
				Err(DiffError::ShapeMismatch {
					slot,
					previous: previous.kind(),
					next: next.kind(),
				})
			}
		}
	}

	/// Resolves `next` against the registry, diffs its render if needed and returns the slot's diff.
	fn diff_component(&mut self, previous: Option<&ComponentRef>, next: &ComponentRef, depth_limit: usize) -> Result<Option<SlotDiff>, DiffError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(DiffError::DepthLimit);
		}

		let cid = self.registry.cid_for(next.name(), next.key())?;
		if let Some(siblings) = self.children.last_mut() {
			siblings.push(cid);
		}
		let previous_cid = previous.and_then(|previous| self.registry.lookup(previous.name(), previous.key()));

		let duplicate = || DiffError::DuplicateComponent {
			name: next.name().to_owned(),
			key: next.key().to_owned(),
		};
		if self.in_progress.contains(&cid) {
			return Err(duplicate());
		}

		let assigns = match self.registry.is_marked(cid) {
			Some(true) => return Err(duplicate()),

			Some(false) if self.registry.get(cid).map_or(false, |entry| entry.assigns() == next.assigns()) => {
				trace!(%cid, "Assigns unchanged. Skipping render.");
				self.registry.mark_reachable(cid)?;
				Vec::new()
			}

			existing => {
				let previous_entry = match existing {
					Some(_) => self.registry.take(cid),
					None => None,
				};
				let assigns = assigns_delta(previous_entry.as_ref().map(ComponentEntry::assigns), next.assigns());

				self.in_progress.insert(cid);
				self.children.push(Vec::new());
				let rendered = next.render()?;
				let tree_diff = self.diff_tree(previous_entry.as_ref().map(ComponentEntry::rendered), &rendered, depth_limit)?;
				let children = self.children.pop().unwrap_or_default();
				self.in_progress.remove(&cid);

				let tree_diff = self.share_statics(cid, &rendered, tree_diff);
				self.registry.store(
					cid,
					ComponentEntry {
						name: next.name().to_owned(),
						key: next.key().to_owned(),
						rendered,
						assigns: next.assigns().clone(),
						children,
					},
				);
				if tree_diff.is_empty() {
					trace!(%cid, "Component render unchanged.");
				} else {
					self.components.push((cid, tree_diff));
				}
				assigns
			}
		};

		Ok((previous_cid != Some(cid) || !assigns.is_empty()).then_some(SlotDiff::Component { cid, assigns }))
	}

	fn share_statics(&self, cid: Cid, rendered: &Rendered, mut tree_diff: TreeDiff) -> TreeDiff {
		if self.config.share_component_statics && matches!(tree_diff.statics, Some(StaticsDiff::Inline(_))) {
			if let Some(shared) = self.registry.find_statics(rendered.fingerprint(), cid) {
				trace!(%cid, %shared, "Sharing statics.");
				tree_diff.statics = Some(StaticsDiff::Shared(shared));
			}
		}
		tree_diff
	}
}

/// Changed and added assigns in key order. Removed assigns are reported as `null`.
fn assigns_delta(previous: Option<&Assigns>, next: &Assigns) -> Vec<(String, Value)> {
	let mut delta = next
		.iter()
		.filter(|&(key, value)| previous.and_then(|previous| previous.get(key)) != Some(value))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect::<Vec<_>>();
	if let Some(previous) = previous {
		delta.extend(previous.keys().filter(|key| !next.contains_key(*key)).map(|key| (key.clone(), Value::Null)));
		delta.sort_by(|(a, _), (b, _)| a.cmp(b));
	}
	delta
}
