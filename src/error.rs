//! Error types of each layer.
//!
//! All of these are fatal for the connection they occur on.
//! Retrying is up to the caller, by rendering again from clean state.

use crate::{patch::ViewState, registry::Cid};
use thiserror::Error;

/// A template produced a tree that violates the rendered tree invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
	#[error("template has {statics} static fragment(s) but {dynamics} dynamic slot(s)")]
	Arity { statics: usize, dynamics: usize },

	#[error("comprehension entry {index} has {dynamics} dynamic slot(s), but its template has {expected}")]
	EntryArity { index: usize, dynamics: usize, expected: usize },

	#[error("statics must contain at least one fragment")]
	EmptyStatics,

	#[error("component {name:?} failed to render: {message}")]
	Component { name: String, message: String },
}

/// The diff engine could not align two renders.
///
/// This is a programmer or template error, never a recoverable diff condition.
/// The [`ComponentRegistry`](`crate::registry::ComponentRegistry`) it happened on must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
	#[error("slot {slot} changed shape from {previous} to {next}")]
	ShapeMismatch { slot: usize, previous: &'static str, next: &'static str },

	#[error("tree with unchanged fingerprint has {next} dynamic slot(s) instead of {previous}")]
	Arity { previous: usize, next: usize },

	#[error("component {name:?} with key {key:?} is rendered more than once")]
	DuplicateComponent { name: String, key: String },

	#[error("component id space exhausted")]
	CidOverflow,

	#[error("depth limit reached")]
	DepthLimit,

	#[error(transparent)]
	Render(#[from] RenderError),
}

/// The client could not apply a diff to its current state.
///
/// Any of these is a protocol desync: the view is torn down and must be remounted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
	#[error("diff references component {0} which is not known to the client")]
	UnknownComponent(Cid),

	#[error("diff references slot {slot} of a tree with {len} slot(s)")]
	MissingSlot { slot: usize, len: usize },

	#[error("diff for slot {slot} is a {diff} but the slot holds a {current}")]
	ShapeMismatch { slot: usize, diff: &'static str, current: &'static str },

	#[error("statics are missing for a tree the client has never seen")]
	MissingStatics,

	#[error("the view has nothing to update yet and needs a complete render")]
	NotJoined,

	#[error("item {index} reuses previous item {source_index}, which does not exist or was reused already")]
	MissingItem { index: usize, source_index: usize },

	#[error("{statics} static fragment(s) do not fit {dynamics} dynamic slot(s)")]
	Arity { statics: usize, dynamics: usize },

	#[error("component {0} was left without a place in the view")]
	OrphanedComponent(Cid),

	#[error("depth limit reached")]
	DepthLimit,

	#[error("cannot apply a diff while the view is {0:?}")]
	InvalidState(ViewState),

	#[error("the view was torn down after an earlier failure")]
	Dead,

	#[error("undecodable diff: {0}")]
	Decode(String),

	#[error(transparent)]
	Dom(#[from] DomError),
}

/// A DOM operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
	#[error("node {0} does not exist")]
	UnknownNode(String),

	#[error("reference node {0} is not attached to the container")]
	DetachedReference(String),

	#[error("{0}")]
	Host(String),
}

/// Wire data could not be decoded into a diff.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("malformed JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("expected {expected} at {path}")]
	Unexpected { expected: &'static str, path: String },

	#[error("unknown node tag {tag} at {path}")]
	UnknownTag { tag: u64, path: String },
}

/// The connection's task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
	#[error("connection is closed")]
	Closed,
}
