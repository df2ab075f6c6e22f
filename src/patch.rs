//! Applies [`Diff`]s to a [`Dom`], keeping a mirror of the server's trees and components.
//!
//! Every static fragment and every text slot is one text node.
//! A slot's nodes always sit directly before the static node that follows the slot,
//! which serves as insertion anchor when the slot's content changes.
//!
//! Components are never destroyed because the slot holding them changed. They are detached
//! and reattached wherever the new render references them, and only destroyed once the server
//! reports them as removed.

use crate::{
	codec,
	comprehension::{ItemDiff, ListDiff},
	config::Config,
	diff::{Diff, SlotDiff, StaticsDiff, TreeDiff},
	dom::Dom,
	error::PatchError,
	registry::Cid,
	rendered::{Assigns, Statics},
};
use core::{fmt, mem};
use hashbrown::HashMap;
use serde_json::Value;
use tracing::{debug, error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, warn, Level};

/// Lifecycle of a mounted view.
///
/// `Joining → Mounted ⇄ Updating`, `Mounted → Disconnected → Reconnecting → Mounted`,
/// and any state `→ Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
	/// Waiting for the first, complete render.
	Joining,
	Mounted,
	/// A diff is being applied.
	Updating,
	/// The transport is gone. Diffs still in flight are discarded.
	Disconnected,
	/// Waiting for the complete render of a rejoin.
	Reconnecting,
	Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	Applied,
	/// The diff arrived in a state that can't take it and was dropped without touching the DOM.
	Discarded,
}

/// What a lifecycle notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTarget {
	View,
	Component(Cid),
}

/// Lifecycle notifications, so that external code can save and restore state across patches.
///
/// `before_update` is called before the DOM changes. All other notifications are delivered once a diff is fully applied.
/// A component that is moved to another place in the view receives `before_update` and `updated` around the move.
#[allow(unused_variables)]
pub trait Hooks {
	fn mounted(&mut self, target: HookTarget) {}
	fn before_update(&mut self, target: HookTarget) {}
	fn updated(&mut self, target: HookTarget) {}
	fn disconnected(&mut self, target: HookTarget) {}
	fn reconnected(&mut self, target: HookTarget) {}
	fn destroyed(&mut self, target: HookTarget) {}
}

impl Hooks for () {}

/// Attached to a [`Dom`] container, this `struct` applies the diffs of one view to it.
///
/// # Correct Use
///
/// Diffs must be applied in the order they were produced, and each one exactly once.
/// Any [`PatchError`] means the client state no longer matches the server's.
/// The view is then torn down and every later call fails with [`PatchError::Dead`].
/// Recover by creating a new instance and remounting.
pub struct DomPatcher<D: Dom> {
	state: ViewState,
	dead: bool,
	depth_limit: usize,
	root: Option<ClientTree<D::Node>>,
	client: Client<D>,
}

impl<D: Dom> fmt::Debug for DomPatcher<D>
where
	D: fmt::Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomPatcher")
			.field("state", &self.state)
			.field("dead", &self.dead)
			.field("components", &self.client.components.len())
			.field("dom", &self.client.dom)
			.finish_non_exhaustive()
	}
}

impl<D: Dom> DomPatcher<D> {
	/// Takes ownership of the container's children. The container should be empty.
	#[must_use]
	pub fn new(dom: D) -> Self {
		Self::with_config(dom, &Config::default())
	}

	#[must_use]
	pub fn with_config(dom: D, config: &Config) -> Self {
		Self {
			state: ViewState::Joining,
			dead: false,
			depth_limit: config.depth_limit,
			root: None,
			client: Client {
				dom,
				hooks: Box::new(()),
				components: HashMap::new(),
				next_attachment: 0,
				depth_limit: config.depth_limit,
				tearing_down: false,
				deferred: Vec::new(),
			},
		}
	}

	#[must_use]
	pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
		self.client.hooks = Box::new(hooks);
		self
	}

	#[must_use]
	pub fn state(&self) -> ViewState {
		self.state
	}

	/// Whether an earlier failure tore down the view.
	#[must_use]
	pub fn is_dead(&self) -> bool {
		self.dead
	}

	#[must_use]
	pub fn dom(&self) -> &D {
		&self.client.dom
	}

	pub fn dom_mut(&mut self) -> &mut D {
		&mut self.client.dom
	}

	/// Ids of the components the client currently knows, in ascending order.
	#[must_use]
	pub fn components(&self) -> Vec<Cid> {
		let mut cids = self.client.components.keys().copied().collect::<Vec<_>>();
		cids.sort_unstable();
		cids
	}

	/// The assigns `cid` was last placed with.
	#[must_use]
	pub fn assigns(&self, cid: Cid) -> Option<&Assigns> {
		self.client.components.get(&cid).map(|component| &component.assigns)
	}

	/// Applies `diff` to the container.
	///
	/// While [`Joining`](`ViewState::Joining`) or [`Reconnecting`](`ViewState::Reconnecting`), `diff` must be a
	/// [complete render](`Diff::join`). Other diffs that arrive while reconnecting or disconnected are
	/// [discarded](`ApplyOutcome::Discarded`). A complete render while mounted replaces the whole view.
	///
	/// # Errors
	///
	/// Iff `diff` doesn't fit the current client state, the DOM fails or the view is not in a state to take diffs.
	/// The view is [destroyed](`ViewState::Destroyed`) in that case, with the DOM left as the last successful step produced it.
	#[instrument(skip_all, fields(state = ?self.state))]
	pub fn apply(&mut self, diff: &Diff) -> Result<ApplyOutcome, PatchError> {
		if self.dead {
			return Err(PatchError::Dead);
		}
		let result = match self.state {
			ViewState::Joining if diff.join => self.render_full(diff, Lifecycle::Mounted),
			ViewState::Joining => Err(PatchError::NotJoined),
			// Anything else was in flight when the transport dropped and builds on components that are gone now.
			ViewState::Reconnecting if !diff.join => {
				debug!("Discarding diff that isn't a complete render while reconnecting.");
				return Ok(ApplyOutcome::Discarded);
			}
			ViewState::Reconnecting => self.render_full(diff, Lifecycle::Reconnected),
			ViewState::Mounted if diff.join => {
				debug!("Remounting from a complete render.");
				self.render_full(diff, Lifecycle::Mounted)
			}
			ViewState::Mounted => self.update(diff),
			ViewState::Disconnected => {
				debug!("Discarding diff received while disconnected.");
				return Ok(ApplyOutcome::Discarded);
			}
			state @ (ViewState::Updating | ViewState::Destroyed) => Err(PatchError::InvalidState(state)),
		};
		match result {
			Ok(()) => {
				self.state = ViewState::Mounted;
				Ok(ApplyOutcome::Applied)
			}
			Err(error) => Err(self.fail(error)),
		}
	}

	/// Decodes and [applies](`DomPatcher::apply`) a message produced by [`codec::encode`].
	///
	/// # Errors
	///
	/// As [`apply`](`DomPatcher::apply`). An undecodable message is fatal too.
	pub fn apply_encoded(&mut self, json: &str) -> Result<ApplyOutcome, PatchError> {
		if self.dead {
			return Err(PatchError::Dead);
		}
		if self.state == ViewState::Disconnected {
			debug!("Discarding message received while disconnected.");
			return Ok(ApplyOutcome::Discarded);
		}
		match codec::decode(json) {
			Ok(diff) => self.apply(&diff),
			Err(error) => Err(self.fail(PatchError::Decode(error.to_string()))),
		}
	}

	/// Notes that the transport dropped.
	///
	/// # Errors
	///
	/// Iff the view is already disconnected or destroyed.
	pub fn disconnect(&mut self) -> Result<(), PatchError> {
		match self.state {
			_ if self.dead => Err(PatchError::Dead),
			ViewState::Mounted => {
				self.state = ViewState::Disconnected;
				self.client.hooks.disconnected(HookTarget::View);
				for cid in self.components() {
					self.client.hooks.disconnected(HookTarget::Component(cid));
				}
				Ok(())
			}
			ViewState::Joining | ViewState::Reconnecting => {
				self.state = ViewState::Disconnected;
				Ok(())
			}
			state => Err(PatchError::InvalidState(state)),
		}
	}

	/// Notes that the transport is back. The next complete diff replaces the whole view.
	///
	/// # Errors
	///
	/// Iff the view isn't disconnected.
	pub fn reconnect(&mut self) -> Result<(), PatchError> {
		match self.state {
			_ if self.dead => Err(PatchError::Dead),
			ViewState::Disconnected => {
				self.state = ViewState::Reconnecting;
				Ok(())
			}
			state => Err(PatchError::InvalidState(state)),
		}
	}

	/// Removes the view from the container and notifies all hooks.
	///
	/// After a failure, the DOM is left alone and this only marks the view as destroyed.
	///
	/// # Errors
	///
	/// Iff the DOM fails.
	#[instrument(skip_all)]
	pub fn destroy(&mut self) -> Result<(), PatchError> {
		if self.state == ViewState::Destroyed {
			return Ok(());
		}
		self.state = ViewState::Destroyed;
		if let Some(root) = self.root.take() {
			self.client.teardown(root)?;
			self.client.defer(Lifecycle::Destroyed, HookTarget::View);
		}
		self.client.flush_hooks();
		Ok(())
	}

	fn fail(&mut self, error: PatchError) -> PatchError {
		error!(%error, "Patch failed. Tearing down the view.");
		self.dead = true;
		self.state = ViewState::Destroyed;
		self.client.deferred.clear();
		error
	}

	fn render_full(&mut self, diff: &Diff, lifecycle: Lifecycle) -> Result<(), PatchError> {
		let statics = diff.root.statics.as_ref().ok_or(PatchError::MissingStatics)?;
		if let Some(root) = self.root.take() {
			debug!("Replacing the previous view.");
			self.client.teardown(root)?;
		}

		self.client.apply_components(&diff.components)?;
		let statics = self.client.resolve_statics(statics)?;
		let root = self.client.build_tree(statics, &diff.root.slots, self.depth_limit)?;
		self.client.insert_tree(&root, None)?;
		self.root = Some(root);
		self.client.remove_components(&diff.removed)?;
		self.client.check_attached()?;

		self.client.defer(lifecycle, HookTarget::View);
		self.client.flush_hooks();
		Ok(())
	}

	fn update(&mut self, diff: &Diff) -> Result<(), PatchError> {
		let root = self.root.as_mut().ok_or(PatchError::InvalidState(self.state))?;
		self.state = ViewState::Updating;
		self.client.hooks.before_update(HookTarget::View);

		self.client.apply_components(&diff.components)?;
		self.client.patch_tree(root, &diff.root, self.depth_limit)?;
		self.client.remove_components(&diff.removed)?;
		self.client.check_attached()?;

		if STATIC_MAX_LEVEL >= Level::WARN && self.client.deferred.len() > 1000 {
			warn!(count = self.client.deferred.len(), "Large number of lifecycle notifications for one diff.");
		}
		self.client.defer(Lifecycle::Updated, HookTarget::View);
		self.client.flush_hooks();
		Ok(())
	}
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
	Mounted,
	Updated,
	Reconnected,
	Destroyed,
}

/// Identifies one placement of a component, so that a slot can tell whether it still holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attachment(u64);

struct ClientTree<N> {
	statics: Statics,
	/// One per fragment of `statics`.
	static_nodes: Vec<N>,
	slots: Vec<ClientSlot<N>>,
}

enum ClientSlot<N> {
	Text { node: N, text: String },
	Tree(ClientTree<N>),
	List(ClientList<N>),
	Component { cid: Cid, attachment: Attachment },
}

impl<N> ClientSlot<N> {
	fn kind(&self) -> &'static str {
		match self {
			ClientSlot::Text { .. } => "text",
			ClientSlot::Tree(_) => "tree",
			ClientSlot::List(_) => "list",
			ClientSlot::Component { .. } => "component",
		}
	}
}

struct ClientList<N> {
	statics: Statics,
	items: Vec<ClientTree<N>>,
}

struct ClientComponent<N> {
	tree: ClientTree<N>,
	assigns: Assigns,
	/// `None` while no slot holds the component.
	attachment: Option<Attachment>,
	mounted: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Placement {
	Kept,
	Moved,
	New,
}

/// Client state apart from the root tree.
struct Client<D: Dom> {
	dom: D,
	hooks: Box<dyn Hooks>,
	components: HashMap<Cid, ClientComponent<D::Node>>,
	next_attachment: u64,
	depth_limit: usize,
	tearing_down: bool,
	/// Notifications that are delivered once the current diff is applied.
	deferred: Vec<(Lifecycle, HookTarget)>,
}

impl<D: Dom> Client<D> {
	fn next_attachment(&mut self) -> Attachment {
		self.next_attachment += 1;
		Attachment(self.next_attachment)
	}

	fn defer(&mut self, lifecycle: Lifecycle, target: HookTarget) {
		self.deferred.push((lifecycle, target));
	}

	fn flush_hooks(&mut self) {
		for (lifecycle, target) in mem::take(&mut self.deferred) {
			match lifecycle {
				Lifecycle::Mounted => self.hooks.mounted(target),
				Lifecycle::Updated => self.hooks.updated(target),
				Lifecycle::Reconnected => self.hooks.reconnected(target),
				Lifecycle::Destroyed => self.hooks.destroyed(target),
			}
		}
	}

	fn resolve_statics(&self, statics: &StaticsDiff) -> Result<Statics, PatchError> {
		match statics {
			StaticsDiff::Inline(statics) => Ok(statics.clone()),
			StaticsDiff::Shared(cid) => self
				.components
				.get(cid)
				.map(|component| component.tree.statics.clone())
				.ok_or(PatchError::UnknownComponent(*cid)),
		}
	}

	/// Creates new components detached and patches known ones in place.
	fn apply_components(&mut self, components: &[(Cid, TreeDiff)]) -> Result<(), PatchError> {
		for (cid, tree_diff) in components {
			let span = trace_span!("Applying component", %cid);
			let _enter = span.enter();

			let Some(mut component) = self.components.remove(cid) else {
				let statics = tree_diff.statics.as_ref().ok_or(PatchError::MissingStatics)?;
				let statics = self.resolve_statics(statics)?;
				let tree = self.build_tree(statics, &tree_diff.slots, self.depth_limit)?;
				trace!("Created component.");
				self.components.insert(
					*cid,
					ClientComponent {
						tree,
						assigns: Assigns::new(),
						attachment: None,
						mounted: false,
					},
				);
				continue;
			};

			self.client_hook_before_update(*cid);
			let result = self.patch_component(&mut component, tree_diff);
			self.components.insert(*cid, component);
			result?;
			self.defer(Lifecycle::Updated, HookTarget::Component(*cid));
		}
		Ok(())
	}

	/// Patches a component that is temporarily out of the registry.
	fn patch_component(&mut self, component: &mut ClientComponent<D::Node>, diff: &TreeDiff) -> Result<(), PatchError> {
		// An earlier component of this diff may have let go of this one already.
		// It's patched in the container regardless, as insertions need attached anchors.
		let detached = component.attachment.is_none();
		if detached {
			trace!("Patching detached component.");
			self.insert_tree(&component.tree, None)?;
		}
		self.patch_tree(&mut component.tree, diff, self.depth_limit)?;
		if detached {
			self.detach_tree(&component.tree)?;
		}
		Ok(())
	}

	fn client_hook_before_update(&mut self, cid: Cid) {
		if !self.tearing_down {
			self.hooks.before_update(HookTarget::Component(cid));
		}
	}

	/// Destroys each of `removed`, after everything else in a diff was applied.
	fn remove_components(&mut self, removed: &[Cid]) -> Result<(), PatchError> {
		for cid in removed {
			self.destroy_component(*cid)?;
		}
		Ok(())
	}

	fn destroy_component(&mut self, cid: Cid) -> Result<(), PatchError> {
		let component = self.components.remove(&cid).ok_or(PatchError::UnknownComponent(cid))?;
		trace!(%cid, attached = component.attachment.is_some(), "Destroying component.");
		self.release_tree(component.tree)?;
		self.defer(Lifecycle::Destroyed, HookTarget::Component(cid));
		Ok(())
	}

	fn check_attached(&self) -> Result<(), PatchError> {
		match self.components.iter().filter(|(_, component)| component.attachment.is_none()).map(|(&cid, _)| cid).min() {
			Some(cid) => {
				error!(%cid, "Component is neither placed nor removed.");
				Err(PatchError::OrphanedComponent(cid))
			}
			None => Ok(()),
		}
	}

	/// Removes the root and every component.
	fn teardown(&mut self, root: ClientTree<D::Node>) -> Result<(), PatchError> {
		self.tearing_down = true;
		let result = self.release_all(root);
		self.tearing_down = false;
		result
	}

	fn release_all(&mut self, root: ClientTree<D::Node>) -> Result<(), PatchError> {
		self.release_tree(root)?;
		let mut cids = self.components.keys().copied().collect::<Vec<_>>();
		cids.sort_unstable();
		for cid in cids {
			self.destroy_component(cid)?;
		}
		Ok(())
	}

	/// Creates the nodes for a complete tree without inserting them.
	/// Components it references are claimed, but also not moved yet.
	fn build_tree(&mut self, statics: Statics, slots: &[(usize, SlotDiff)], depth_limit: usize) -> Result<ClientTree<D::Node>, PatchError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(PatchError::DepthLimit);
		}
		if statics.len() != slots.len() + 1 {
			return Err(PatchError::Arity {
				statics: statics.len(),
				dynamics: slots.len(),
			});
		}

		let mut static_nodes = Vec::with_capacity(statics.len());
		for fragment in statics.iter() {
			static_nodes.push(self.dom.create_text(fragment)?);
		}
		let mut client_slots = Vec::with_capacity(slots.len());
		for (position, (index, slot)) in slots.iter().enumerate() {
			if *index != position {
				return Err(PatchError::MissingSlot { slot: position, len: slots.len() });
			}
			client_slots.push(self.build_slot(slot, depth_limit - 1)?);
		}
		Ok(ClientTree {
			statics,
			static_nodes,
			slots: client_slots,
		})
	}

	fn build_slot(&mut self, diff: &SlotDiff, depth_limit: usize) -> Result<ClientSlot<D::Node>, PatchError> {
		match diff {
			SlotDiff::Text(text) => Ok(ClientSlot::Text {
				node: self.dom.create_text(text)?,
				text: text.clone(),
			}),
			SlotDiff::Tree(tree) => {
				let statics = tree.statics.as_ref().ok_or(PatchError::MissingStatics)?;
				let statics = self.resolve_statics(statics)?;
				Ok(ClientSlot::Tree(self.build_tree(statics, &tree.slots, depth_limit)?))
			}
			SlotDiff::List(list) => {
				let statics = list.statics.clone().ok_or(PatchError::MissingStatics)?;
				let items = self.build_items(&statics, list, depth_limit)?;
				Ok(ClientSlot::List(ClientList { statics, items }))
			}
			SlotDiff::Component { cid, assigns } => Ok(ClientSlot::Component {
				cid: *cid,
				attachment: self.claim(*cid, assigns)?,
			}),
		}
	}

	/// Builds every item of a list that is new to the client.
	fn build_items(&mut self, statics: &Statics, list: &ListDiff, depth_limit: usize) -> Result<Vec<ClientTree<D::Node>>, PatchError> {
		// Elided items can't be new.
		check_count(list, 0)?;
		let mut items = Vec::with_capacity(list.count);
		for index in 0..list.count {
			match list.item(index) {
				ItemDiff::Patch { source: None, slots } => items.push(self.build_tree(statics.clone(), slots, depth_limit)?),
				ItemDiff::Unchanged => return Err(PatchError::MissingItem { index, source_index: index }),
				ItemDiff::Moved(source) | ItemDiff::Patch { source: Some(source), .. } => {
					return Err(PatchError::MissingItem {
						index,
						source_index: *source,
					})
				}
			}
		}
		Ok(items)
	}

	/// Places `cid` into a new slot and merges `assigns` into its cached ones.
	/// The caller moves the component's nodes.
	fn claim(&mut self, cid: Cid, assigns: &[(String, Value)]) -> Result<Attachment, PatchError> {
		let attachment = self.next_attachment();
		let component = self.components.get_mut(&cid).ok_or(PatchError::UnknownComponent(cid))?;
		merge_assigns(&mut component.assigns, assigns);
		let moved = component.attachment.replace(attachment).is_some();
		let first = !mem::replace(&mut component.mounted, true);

		let target = HookTarget::Component(cid);
		if moved {
			trace!(%cid, "Moving component.");
			self.client_hook_before_update(cid);
			self.defer(Lifecycle::Updated, target);
		} else if first {
			self.defer(Lifecycle::Mounted, target);
		} else {
			self.defer(Lifecycle::Updated, target);
		}
		Ok(attachment)
	}

	/// Takes `cid` out of the container, unless another slot claimed it meanwhile.
	fn detach_component(&mut self, cid: Cid, attachment: Attachment) -> Result<(), PatchError> {
		let mut nodes = Vec::new();
		match self.components.get(&cid) {
			Some(component) if component.attachment == Some(attachment) => self.collect_nodes(&component.tree, &mut nodes, self.depth_limit)?,
			Some(_) => {
				trace!(%cid, "Component was claimed by another slot already.");
				return Ok(());
			}
			None => {
				trace!(%cid, "Component was destroyed already.");
				return Ok(());
			}
		}
		for node in &nodes {
			self.dom.detach(node)?;
		}
		if let Some(component) = self.components.get_mut(&cid) {
			component.attachment = None;
		}
		self.client_hook_before_update(cid);
		Ok(())
	}

	/// Appends the nodes of `tree` in document order, including those of components it holds.
	fn collect_nodes(&self, tree: &ClientTree<D::Node>, nodes: &mut Vec<D::Node>, depth_limit: usize) -> Result<(), PatchError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(PatchError::DepthLimit);
		}
		for (i, static_node) in tree.static_nodes.iter().enumerate() {
			nodes.push(static_node.clone());
			match tree.slots.get(i) {
				None => (),
				Some(ClientSlot::Text { node, .. }) => nodes.push(node.clone()),
				Some(ClientSlot::Tree(tree)) => self.collect_nodes(tree, nodes, depth_limit - 1)?,
				Some(ClientSlot::List(list)) => {
					for item in &list.items {
						self.collect_nodes(item, nodes, depth_limit - 1)?;
					}
				}
				Some(ClientSlot::Component { cid, attachment }) => match self.components.get(cid) {
					Some(component) if component.attachment == Some(*attachment) => self.collect_nodes(&component.tree, nodes, depth_limit - 1)?,
					_ => trace!(%cid, "Skipping component that isn't held here."),
				},
			}
		}
		Ok(())
	}

	fn insert_nodes(&mut self, nodes: &[D::Node], before: Option<&D::Node>) -> Result<(), PatchError> {
		for node in nodes {
			self.dom.insert_before(node, before)?;
		}
		Ok(())
	}

	fn insert_tree(&mut self, tree: &ClientTree<D::Node>, before: Option<&D::Node>) -> Result<(), PatchError> {
		let mut nodes = Vec::new();
		self.collect_nodes(tree, &mut nodes, self.depth_limit)?;
		self.insert_nodes(&nodes, before)
	}

	fn insert_component(&mut self, cid: Cid, before: Option<&D::Node>) -> Result<(), PatchError> {
		let component = self.components.get(&cid).ok_or(PatchError::UnknownComponent(cid))?;
		let mut nodes = Vec::new();
		self.collect_nodes(&component.tree, &mut nodes, self.depth_limit)?;
		self.insert_nodes(&nodes, before)
	}

	fn detach_tree(&mut self, tree: &ClientTree<D::Node>) -> Result<(), PatchError> {
		let mut nodes = Vec::new();
		self.collect_nodes(tree, &mut nodes, self.depth_limit)?;
		for node in &nodes {
			self.dom.detach(node)?;
		}
		Ok(())
	}

	/// Destroys the nodes of `tree` and detaches the components it still holds.
	fn release_tree(&mut self, tree: ClientTree<D::Node>) -> Result<(), PatchError> {
		for node in tree.static_nodes {
			self.dom.destroy(node)?;
		}
		for slot in tree.slots {
			match slot {
				ClientSlot::Text { node, .. } => self.dom.destroy(node)?,
				ClientSlot::Tree(tree) => self.release_tree(tree)?,
				ClientSlot::List(list) => {
					for item in list.items {
						self.release_tree(item)?;
					}
				}
				ClientSlot::Component { cid, attachment } => self.detach_component(cid, attachment)?,
			}
		}
		Ok(())
	}

	fn patch_tree(&mut self, tree: &mut ClientTree<D::Node>, diff: &TreeDiff, depth_limit: usize) -> Result<(), PatchError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(PatchError::DepthLimit);
		}

		if let Some(statics) = &diff.statics {
			trace!("Statics changed. Rebuilding tree.");
			let statics = self.resolve_statics(statics)?;
			let rebuilt = self.build_tree(statics, &diff.slots, depth_limit)?;
			let before = tree.static_nodes.first().cloned();
			self.insert_tree(&rebuilt, before.as_ref())?;
			return self.release_tree(mem::replace(tree, rebuilt));
		}

		self.patch_slots(tree, &diff.slots, depth_limit)
	}

	/// `depth_limit` must not be zero.
	fn patch_slots(&mut self, tree: &mut ClientTree<D::Node>, slots: &[(usize, SlotDiff)], depth_limit: usize) -> Result<(), PatchError> {
		for (index, slot_diff) in slots {
			let len = tree.slots.len();
			let (Some(slot), Some(anchor)) = (tree.slots.get_mut(*index), tree.static_nodes.get(*index + 1)) else {
				error!(slot = *index, len, "Diff references a missing slot.");
				return Err(PatchError::MissingSlot { slot: *index, len });
			};
			self.patch_slot(*index, slot, anchor, slot_diff, depth_limit - 1)?;
		}
		Ok(())
	}

	/// `anchor` is the static node that follows the slot.
	fn patch_slot(&mut self, index: usize, slot: &mut ClientSlot<D::Node>, anchor: &D::Node, diff: &SlotDiff, depth_limit: usize) -> Result<(), PatchError> {
		match (slot, diff) {
			(ClientSlot::Text { node, text }, SlotDiff::Text(next)) => {
				if text != next {
					self.dom.set_text(node, next)?;
					next.clone_into(text);
				}
			}

			(ClientSlot::Tree(tree), SlotDiff::Tree(tree_diff)) => {
				let span = trace_span!("Patching tree", slot = index);
				let _enter = span.enter();
				self.patch_tree(tree, tree_diff, depth_limit)?;
			}

			(ClientSlot::List(list), SlotDiff::List(list_diff)) => {
				let span = trace_span!("Patching comprehension", slot = index, count = list_diff.count);
				let _enter = span.enter();
				self.patch_list(list, anchor, list_diff, depth_limit)?;
			}

			(ClientSlot::Component { cid, attachment }, SlotDiff::Component { cid: next, assigns }) => {
				let current = *cid;
				if current == *next {
					let component = self.components.get_mut(&current).ok_or(PatchError::UnknownComponent(current))?;
					merge_assigns(&mut component.assigns, assigns);
				} else {
					let span = trace_span!("Replacing component", slot = index, %current, %next);
					let _enter = span.enter();
					self.detach_component(current, *attachment)?;
					*attachment = self.claim(*next, assigns)?;
					*cid = *next;
					self.insert_component(*next, Some(anchor))?;
				}
			}

			(slot, diff) => {
				error!(slot = index, diff = diff.kind(), current = slot.kind(), "Diff doesn't fit the slot.");
				return Err(PatchError::ShapeMismatch {
					slot: index,
					diff: diff.kind(),
					current: slot.kind(),
				});
			}
		}
		Ok(())
	}

	fn patch_list(&mut self, list: &mut ClientList<D::Node>, anchor: &D::Node, diff: &ListDiff, depth_limit: usize) -> Result<(), PatchError> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(PatchError::DepthLimit);
		}

		if let Some(statics) = &diff.statics {
			trace!("Template changed. Rebuilding all items.");
			let items = self.build_items(statics, diff, depth_limit)?;
			for item in &items {
				self.insert_tree(item, Some(anchor))?;
			}
			for item in mem::replace(&mut list.items, items) {
				self.release_tree(item)?;
			}
			list.statics = statics.clone();
			return Ok(());
		}

		check_count(diff, list.items.len())?;
		let mut previous = mem::take(&mut list.items).into_iter().map(Some).collect::<Vec<_>>();
		let mut next = Vec::with_capacity(diff.count);
		for index in 0..diff.count {
			let (source, slots) = match diff.item(index) {
				ItemDiff::Patch { source: None, slots } => {
					next.push((self.build_tree(list.statics.clone(), slots, depth_limit)?, Placement::New));
					continue;
				}
				ItemDiff::Unchanged => (index, None),
				ItemDiff::Moved(source) => (*source, None),
				ItemDiff::Patch { source: Some(source), slots } => (*source, Some(slots)),
			};
			let mut item = previous
				.get_mut(source)
				.and_then(Option::take)
				.ok_or(PatchError::MissingItem { index, source_index: source })?;
			if let Some(slots) = slots {
				self.patch_slots(&mut item, slots, depth_limit)?;
			}
			next.push((item, if source == index { Placement::Kept } else { Placement::Moved }));
		}

		for item in previous.into_iter().flatten() {
			self.release_tree(item)?;
		}

		// Without moves, kept items are still in order and only new ones need a place.
		let reorder = next.iter().any(|(_, placement)| *placement == Placement::Moved);
		let mut before = anchor.clone();
		for (item, placement) in next.iter().rev() {
			if reorder || *placement == Placement::New {
				self.insert_tree(item, Some(&before))?;
			}
			if let Some(first) = item.static_nodes.first() {
				before = first.clone();
			}
		}
		list.items = next.into_iter().map(|(item, _)| item).collect();
		Ok(())
	}
}

/// Rejects a `count` that the diff's items and `previous` existing items can't fill,
/// before anything is sized by it.
fn check_count(diff: &ListDiff, previous: usize) -> Result<(), PatchError> {
	// Items past the transmitted ones are unchanged and so must exist already.
	let limit = diff.items.len().max(previous);
	if diff.count > limit {
		error!(count = diff.count, limit, "Item count exceeds what the client can fill.");
		return Err(PatchError::MissingItem {
			index: limit,
			source_index: limit,
		});
	}
	Ok(())
}

/// `null` assigns are indistinguishable from removed ones.
fn merge_assigns(assigns: &mut Assigns, delta: &[(String, Value)]) {
	for (key, value) in delta {
		if value.is_null() {
			assigns.remove(key);
		} else {
			assigns.insert(key.clone(), value.clone());
		}
	}
}
