//! The node operations the patch applier needs from a document.
//!
//! A [`Dom`] is attached to one container. Every static fragment and text slot becomes one text node in it,
//! so that each slot can be updated without touching its surroundings.

use crate::error::DomError;
use core::fmt;

pub trait Dom {
	type Node: Clone + PartialEq + fmt::Debug;

	/// Creates a text node that is not yet part of the container.
	///
	/// # Errors
	///
	/// Iff the host document refuses to create the node.
	fn create_text(&mut self, text: &str) -> Result<Self::Node, DomError>;

	/// # Errors
	///
	/// Iff `node` doesn't belong to this document.
	fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), DomError>;

	/// Inserts `node` into the container before `reference`, or at the end if `reference` is `None`.
	/// If `node` is already in the container, it is moved.
	///
	/// # Errors
	///
	/// Iff either node doesn't belong to this document or `reference` is not in the container.
	fn insert_before(&mut self, node: &Self::Node, reference: Option<&Self::Node>) -> Result<(), DomError>;

	/// Removes `node` from the container but keeps it usable for later reinsertion.
	/// Detaching a detached node does nothing.
	///
	/// # Errors
	///
	/// Iff `node` doesn't belong to this document.
	fn detach(&mut self, node: &Self::Node) -> Result<(), DomError>;

	/// Releases `node` for good.
	///
	/// # Errors
	///
	/// Iff `node` doesn't belong to this document.
	fn destroy(&mut self, node: Self::Node) -> Result<(), DomError> {
		self.detach(&node)
	}
}

/// Handle of a [`MemoryDom`] node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// A recorded [`MemoryDom`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	Create(NodeId),
	SetText(NodeId, String),
	Insert(NodeId),
	Detach(NodeId),
	Destroy(NodeId),
}

/// An in-memory container of text nodes that logs every mutation.
///
/// Useful to render on hosts without a browser and to observe exactly what a patch touches.
#[derive(Debug, Default)]
pub struct MemoryDom {
	nodes: Vec<Option<String>>,
	children: Vec<NodeId>,
	mutations: Vec<Mutation>,
}

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// The container's content.
	#[must_use]
	pub fn markup(&self) -> String {
		self.children.iter().filter_map(|&id| self.text(id)).collect()
	}

	/// The container's children, in order.
	#[must_use]
	pub fn children(&self) -> &[NodeId] {
		&self.children
	}

	#[must_use]
	pub fn text(&self, node: NodeId) -> Option<&str> {
		self.nodes.get(node.0).and_then(Option::as_deref)
	}

	/// Number of nodes that were created and not yet destroyed, attached or not.
	#[must_use]
	pub fn live_nodes(&self) -> usize {
		self.nodes.iter().filter(|node| node.is_some()).count()
	}

	#[must_use]
	pub fn mutations(&self) -> &[Mutation] {
		&self.mutations
	}

	/// Returns and clears the mutation log.
	pub fn take_mutations(&mut self) -> Vec<Mutation> {
		core::mem::take(&mut self.mutations)
	}

	fn check(&self, node: NodeId) -> Result<(), DomError> {
		match self.nodes.get(node.0) {
			Some(Some(_)) => Ok(()),
			_ => Err(DomError::UnknownNode(format!("{:?}", node))),
		}
	}

	fn position(&self, node: NodeId) -> Option<usize> {
		self.children.iter().position(|&child| child == node)
	}
}

impl Dom for MemoryDom {
	type Node = NodeId;

	fn create_text(&mut self, text: &str) -> Result<NodeId, DomError> {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Some(text.to_owned()));
		self.mutations.push(Mutation::Create(id));
		Ok(id)
	}

	fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), DomError> {
		match self.nodes.get_mut(node.0) {
			Some(Some(data)) => {
				text.clone_into(data);
				self.mutations.push(Mutation::SetText(*node, text.to_owned()));
				Ok(())
			}
			_ => Err(DomError::UnknownNode(format!("{:?}", node))),
		}
	}

	fn insert_before(&mut self, node: &NodeId, reference: Option<&NodeId>) -> Result<(), DomError> {
		self.check(*node)?;
		if let Some(position) = self.position(*node) {
			self.children.remove(position);
		}
		let position = match reference {
			None => self.children.len(),
			Some(reference) => {
				self.check(*reference)?;
				self.position(*reference).ok_or_else(|| DomError::DetachedReference(format!("{:?}", reference)))?
			}
		};
		self.children.insert(position, *node);
		self.mutations.push(Mutation::Insert(*node));
		Ok(())
	}

	fn detach(&mut self, node: &NodeId) -> Result<(), DomError> {
		self.check(*node)?;
		if let Some(position) = self.position(*node) {
			self.children.remove(position);
			self.mutations.push(Mutation::Detach(*node));
		}
		Ok(())
	}

	fn destroy(&mut self, node: NodeId) -> Result<(), DomError> {
		self.detach(&node)?;
		self.nodes[node.0] = None;
		self.mutations.push(Mutation::Destroy(node));
		Ok(())
	}
}
