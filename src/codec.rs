//! Compact JSON wire encoding of [`Diff`]s.
//!
//! Only arrays are used for structure, so no key names are transmitted:
//!
//! - message: `[tree, [cid, tree, cid, tree, …], [removed cid, …]]`, with a trailing `true` on complete renders
//! - tree: `[0, statics, index, slot, index, slot, …]`
//! - statics: `null` (unchanged) | `["fragment", …]` | `cid` (same as that component's)
//! - slot: `"text"` | `cid` | tree | list | `[2, cid, "assign", value, …]`
//! - list: `[1, statics, count, [item, …]]`
//! - item: `null` (unchanged) | `source` (moved, unchanged) | `[source | null, index, slot, …]`

use crate::{
	comprehension::{ItemDiff, ListDiff},
	diff::{Diff, SlotDiff, StaticsDiff, TreeDiff},
	error::CodecError,
	registry::Cid,
	rendered::Statics,
};
use core::fmt;
use serde_json::{Number, Value};
use tracing::instrument;

const TREE: u64 = 0;
const LIST: u64 = 1;
const COMPONENT: u64 = 2;

/// Encodes `diff` as JSON text.
#[must_use]
#[instrument(skip_all)]
pub fn encode(diff: &Diff) -> String {
	to_value(diff).to_string()
}

#[must_use]
pub fn to_value(diff: &Diff) -> Value {
	let mut components = Vec::with_capacity(diff.components.len() * 2);
	for (cid, tree) in &diff.components {
		components.push(cid_value(*cid));
		components.push(tree_value(tree));
	}
	let mut message = vec![
		tree_value(&diff.root),
		Value::Array(components),
		Value::Array(diff.removed.iter().copied().map(cid_value).collect()),
	];
	if diff.join {
		message.push(Value::Bool(true));
	}
	Value::Array(message)
}

/// Decodes JSON text produced by [`encode`].
///
/// # Errors
///
/// Iff `json` is not valid JSON or not a well-formed diff.
#[instrument(skip_all, fields(len = json.len()))]
pub fn decode(json: &str) -> Result<Diff, CodecError> {
	from_value(&serde_json::from_str(json)?)
}

/// # Errors
///
/// Iff `value` is not a well-formed diff.
pub fn from_value(value: &Value) -> Result<Diff, CodecError> {
	let path = Path { parent: None, index: 0 };
	let message = expect_array(value, "message array", &path)?;
	let (root, components, removed, join) = match message.as_slice() {
		[root, components, removed] => (root, components, removed, false),
		[root, components, removed, Value::Bool(true)] => (root, components, removed, true),
		[_, _, _, _] => return Err(unexpected("join marker", &path.child(3))),
		_ => return Err(unexpected("three- or four-element message array", &path)),
	};

	let root = decode_tree(root, &path.child(0))?;

	let components_path = path.child(1);
	let components = expect_array(components, "component array", &components_path)?;
	if components.len() % 2 != 0 {
		return Err(unexpected("cid/tree pairs", &components_path));
	}
	let components = components
		.chunks_exact(2)
		.enumerate()
		.map(|(i, pair)| {
			let cid = decode_cid(&pair[0], &components_path.child(i * 2))?;
			let tree = decode_tree(&pair[1], &components_path.child(i * 2 + 1))?;
			Ok((cid, tree))
		})
		.collect::<Result<Vec<_>, CodecError>>()?;

	let removed_path = path.child(2);
	let removed = expect_array(removed, "removed array", &removed_path)?
		.iter()
		.enumerate()
		.map(|(i, cid)| decode_cid(cid, &removed_path.child(i)))
		.collect::<Result<Vec<_>, CodecError>>()?;

	Ok(Diff {
		root,
		components,
		removed,
		join,
	})
}

fn cid_value(cid: Cid) -> Value {
	Value::Number(Number::from(cid.get()))
}

fn tree_value(tree: &TreeDiff) -> Value {
	let mut array = Vec::with_capacity(2 + tree.slots.len() * 2);
	array.push(Value::from(TREE));
	array.push(match &tree.statics {
		None => Value::Null,
		Some(StaticsDiff::Inline(statics)) => statics_value(statics),
		Some(StaticsDiff::Shared(cid)) => cid_value(*cid),
	});
	push_slots(&mut array, &tree.slots);
	Value::Array(array)
}

fn statics_value(statics: &[String]) -> Value {
	Value::Array(statics.iter().cloned().map(Value::String).collect())
}

fn push_slots(array: &mut Vec<Value>, slots: &[(usize, SlotDiff)]) {
	for (index, slot) in slots {
		array.push(Value::from(*index));
		array.push(slot_value(slot));
	}
}

fn slot_value(slot: &SlotDiff) -> Value {
	match slot {
		SlotDiff::Text(text) => Value::String(text.clone()),
		SlotDiff::Tree(tree) => tree_value(tree),
		SlotDiff::List(list) => list_value(list),
		SlotDiff::Component { cid, assigns } if assigns.is_empty() => cid_value(*cid),
		SlotDiff::Component { cid, assigns } => {
			let mut array = Vec::with_capacity(2 + assigns.len() * 2);
			array.push(Value::from(COMPONENT));
			array.push(cid_value(*cid));
			for (key, value) in assigns {
				array.push(Value::String(key.clone()));
				array.push(value.clone());
			}
			Value::Array(array)
		}
	}
}

fn list_value(list: &ListDiff) -> Value {
	let items = list
		.items
		.iter()
		.map(|item| match item {
			ItemDiff::Unchanged => Value::Null,
			ItemDiff::Moved(source) => Value::from(*source),
			ItemDiff::Patch { source, slots } => {
				let mut array = Vec::with_capacity(1 + slots.len() * 2);
				array.push(source.map_or(Value::Null, Value::from));
				push_slots(&mut array, slots);
				Value::Array(array)
			}
		})
		.collect();
	Value::Array(vec![
		Value::from(LIST),
		list.statics.as_deref().map_or(Value::Null, statics_value),
		Value::from(list.count),
		Value::Array(items),
	])
}

/// Location inside a message, for error reporting.
#[derive(Clone, Copy)]
struct Path<'a> {
	parent: Option<&'a Path<'a>>,
	index: usize,
}

impl Path<'_> {
	fn child(&self, index: usize) -> Path<'_> {
		Path { parent: Some(self), index }
	}
}

impl fmt::Display for Path<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.parent {
			None => f.write_str("$"),
			Some(parent) => write!(f, "{}[{}]", parent, self.index),
		}
	}
}

fn unexpected(expected: &'static str, path: &Path<'_>) -> CodecError {
	CodecError::Unexpected { expected, path: path.to_string() }
}

fn expect_array<'v>(value: &'v Value, expected: &'static str, path: &Path<'_>) -> Result<&'v Vec<Value>, CodecError> {
	value.as_array().ok_or_else(|| unexpected(expected, path))
}

fn expect_index(value: &Value, expected: &'static str, path: &Path<'_>) -> Result<usize, CodecError> {
	value.as_u64().and_then(|n| usize::try_from(n).ok()).ok_or_else(|| unexpected(expected, path))
}

fn decode_cid(value: &Value, path: &Path<'_>) -> Result<Cid, CodecError> {
	value.as_u64().and_then(|n| u32::try_from(n).ok()).map(Cid::new).ok_or_else(|| unexpected("component id", path))
}

fn decode_tag(array: &[Value], path: &Path<'_>) -> Result<u64, CodecError> {
	array.first().and_then(Value::as_u64).ok_or_else(|| unexpected("node tag", path))
}

fn decode_tree(value: &Value, path: &Path<'_>) -> Result<TreeDiff, CodecError> {
	let array = expect_array(value, "tree array", path)?;
	match decode_tag(array, path)? {
		TREE => (),
		tag => return Err(CodecError::UnknownTag { tag, path: path.to_string() }),
	}
	let statics_path = path.child(1);
	let statics = match array.get(1) {
		None => return Err(unexpected("tree statics", &statics_path)),
		Some(Value::Null) => None,
		Some(Value::Array(_)) => Some(StaticsDiff::Inline(decode_statics(&array[1], &statics_path)?)),
		Some(cid) => Some(StaticsDiff::Shared(decode_cid(cid, &statics_path)?)),
	};
	Ok(TreeDiff {
		statics,
		slots: decode_slots(&array[2..], 2, path)?,
	})
}

fn decode_statics(value: &Value, path: &Path<'_>) -> Result<Statics, CodecError> {
	expect_array(value, "statics array", path)?
		.iter()
		.enumerate()
		.map(|(i, fragment)| fragment.as_str().map(str::to_owned).ok_or_else(|| unexpected("static fragment", &path.child(i))))
		.collect()
}

/// Decodes index/slot pairs. `offset` is the position of `pairs` within its array.
fn decode_slots(pairs: &[Value], offset: usize, path: &Path<'_>) -> Result<Vec<(usize, SlotDiff)>, CodecError> {
	if pairs.len() % 2 != 0 {
		return Err(unexpected("index/slot pairs", path));
	}
	let mut slots = Vec::with_capacity(pairs.len() / 2);
	let mut last = None;
	for (i, pair) in pairs.chunks_exact(2).enumerate() {
		let index_path = path.child(offset + i * 2);
		let index = expect_index(&pair[0], "slot index", &index_path)?;
		if last.map_or(false, |last| index <= last) {
			return Err(unexpected("ascending slot index", &index_path));
		}
		last = Some(index);
		slots.push((index, decode_slot(&pair[1], &path.child(offset + i * 2 + 1))?));
	}
	Ok(slots)
}

fn decode_slot(value: &Value, path: &Path<'_>) -> Result<SlotDiff, CodecError> {
	match value {
		Value::String(text) => Ok(SlotDiff::Text(text.clone())),
		Value::Number(_) => Ok(SlotDiff::Component {
			cid: decode_cid(value, path)?,
			assigns: Vec::new(),
		}),
		Value::Array(array) => match decode_tag(array, path)? {
			TREE => Ok(SlotDiff::Tree(decode_tree(value, path)?)),
			LIST => Ok(SlotDiff::List(decode_list(array, path)?)),
			COMPONENT => {
				let cid = decode_cid(array.get(1).unwrap_or(&Value::Null), &path.child(1))?;
				let pairs = &array[2..];
				if pairs.len() % 2 != 0 {
					return Err(unexpected("assign/value pairs", path));
				}
				let assigns = pairs
					.chunks_exact(2)
					.enumerate()
					.map(|(i, pair)| match &pair[0] {
						Value::String(key) => Ok((key.clone(), pair[1].clone())),
						_ => Err(unexpected("assign name", &path.child(2 + i * 2))),
					})
					.collect::<Result<Vec<_>, CodecError>>()?;
				Ok(SlotDiff::Component { cid, assigns })
			}
			tag => Err(CodecError::UnknownTag { tag, path: path.to_string() }),
		},
		_ => Err(unexpected("slot", path)),
	}
}

fn decode_list(array: &[Value], path: &Path<'_>) -> Result<ListDiff, CodecError> {
	let [_, statics, count, items] = array else {
		return Err(unexpected("four-element list array", path));
	};
	let statics = match statics {
		Value::Null => None,
		statics => Some(decode_statics(statics, &path.child(1))?),
	};
	let count = expect_index(count, "item count", &path.child(2))?;

	let items_path = path.child(3);
	let items = expect_array(items, "item array", &items_path)?;
	if items.len() > count {
		return Err(unexpected("at most `count` items", &items_path));
	}
	let items = items
		.iter()
		.enumerate()
		.map(|(i, item)| {
			let item_path = items_path.child(i);
			match item {
				Value::Null => Ok(ItemDiff::Unchanged),
				Value::Number(_) => Ok(ItemDiff::Moved(expect_index(item, "source index", &item_path)?)),
				Value::Array(array) => {
					let source = match array.first() {
						Some(Value::Null) => None,
						Some(source) => Some(expect_index(source, "source index", &item_path.child(0))?),
						None => return Err(unexpected("item source", &item_path)),
					};
					Ok(ItemDiff::Patch {
						source,
						slots: decode_slots(&array[1..], 1, &item_path)?,
					})
				}
				_ => Err(unexpected("item", &item_path)),
			}
		})
		.collect::<Result<Vec<_>, CodecError>>()?;

	Ok(ListDiff { statics, count, items })
}
