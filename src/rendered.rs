//! The output of one render pass: static fragments interleaved with dynamic slots.
//!
//! A template collaborator splits its markup into [`Statics`] and [`Dynamic`] values.
//! Interleaving `statics[0]`, `dynamics[0]`, `statics[1]`, … `statics[N]` reconstructs the markup.

use crate::{
	error::RenderError,
	fingerprint::{fingerprint, Fingerprint},
};
use core::fmt;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};

/// Literal text fragments of a template, shared between all trees rendered from it.
pub type Statics = Arc<[String]>;

/// Component-local state. Ordered, so that changed-assigns payloads are deterministic.
pub type Assigns = BTreeMap<String, Value>;

/// Collects `fragments` into [`Statics`].
pub fn statics<I>(fragments: I) -> Statics
where
	I: IntoIterator,
	I::Item: Into<String>,
{
	fragments.into_iter().map(Into::into).collect()
}

#[derive(Debug, Clone)]
pub struct Rendered {
	statics: Statics,
	dynamics: Vec<Dynamic>,
	fingerprint: Fingerprint,
}

impl Rendered {
	/// # Errors
	///
	/// Iff `statics` is empty or `dynamics.len() + 1 != statics.len()`.
	pub fn new(statics: Statics, dynamics: Vec<Dynamic>) -> Result<Self, RenderError> {
		check_arity(&statics, dynamics.len())?;
		Ok(Self {
			fingerprint: fingerprint(&statics),
			statics,
			dynamics,
		})
	}

	#[must_use]
	pub fn statics(&self) -> &Statics {
		&self.statics
	}

	#[must_use]
	pub fn dynamics(&self) -> &[Dynamic] {
		&self.dynamics
	}

	#[must_use]
	pub fn fingerprint(&self) -> Fingerprint {
		self.fingerprint
	}

	/// Renders the complete markup, including components.
	///
	/// # Errors
	///
	/// Iff a nested component fails to render.
	pub fn to_markup(&self) -> Result<String, RenderError> {
		let mut markup = String::new();
		write_interleaved(&self.statics, &self.dynamics, &mut markup)?;
		Ok(markup)
	}
}

/// One dynamic slot value.
#[derive(Debug, Clone)]
pub enum Dynamic {
	Text(String),
	Tree(Rendered),
	List(Comprehension),
	Component(ComponentRef),
}

impl Dynamic {
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Dynamic::Text(_) => "text",
			Dynamic::Tree(_) => "tree",
			Dynamic::List(_) => "list",
			Dynamic::Component(_) => "component",
		}
	}

	fn write_markup(&self, markup: &mut String) -> Result<(), RenderError> {
		match self {
			Dynamic::Text(text) => markup.push_str(text),
			Dynamic::Tree(tree) => write_interleaved(&tree.statics, &tree.dynamics, markup)?,
			Dynamic::List(list) => {
				for entry in &list.entries {
					write_interleaved(&list.statics, &entry.dynamics, markup)?;
				}
			}
			Dynamic::Component(component) => {
				let rendered = component.render()?;
				write_interleaved(&rendered.statics, &rendered.dynamics, markup)?;
			}
		}
		Ok(())
	}
}

impl From<&str> for Dynamic {
	fn from(text: &str) -> Self {
		Dynamic::Text(text.to_owned())
	}
}

impl From<String> for Dynamic {
	fn from(text: String) -> Self {
		Dynamic::Text(text)
	}
}

impl From<Rendered> for Dynamic {
	fn from(tree: Rendered) -> Self {
		Dynamic::Tree(tree)
	}
}

impl From<Comprehension> for Dynamic {
	fn from(list: Comprehension) -> Self {
		Dynamic::List(list)
	}
}

impl From<ComponentRef> for Dynamic {
	fn from(component: ComponentRef) -> Self {
		Dynamic::Component(component)
	}
}

/// The rendered body of a loop: one shared template and a dynamics sequence per item.
///
/// Entries are matched across renders by position, or by key if every entry has one.
/// Callers must keep the entry order stable between renders for positional matching to be meaningful.
#[derive(Debug, Clone)]
pub struct Comprehension {
	statics: Statics,
	fingerprint: Fingerprint,
	entries: Vec<Entry>,
}

impl Comprehension {
	/// # Errors
	///
	/// Iff `statics` is empty or any entry's dynamics don't fit `statics`.
	pub fn new(statics: Statics, entries: Vec<Entry>) -> Result<Self, RenderError> {
		if statics.is_empty() {
			return Err(RenderError::EmptyStatics);
		}
		for (index, entry) in entries.iter().enumerate() {
			if entry.dynamics.len() + 1 != statics.len() {
				return Err(RenderError::EntryArity {
					index,
					dynamics: entry.dynamics.len(),
					expected: statics.len() - 1,
				});
			}
		}
		Ok(Self {
			fingerprint: fingerprint(&statics),
			statics,
			entries,
		})
	}

	#[must_use]
	pub fn statics(&self) -> &Statics {
		&self.statics
	}

	#[must_use]
	pub fn fingerprint(&self) -> Fingerprint {
		self.fingerprint
	}

	#[must_use]
	pub fn entries(&self) -> &[Entry] {
		&self.entries
	}

	/// Whether every entry carries a key.
	#[must_use]
	pub fn is_keyed(&self) -> bool {
		self.entries.iter().all(|entry| entry.key.is_some())
	}
}

#[derive(Debug, Clone)]
pub struct Entry {
	key: Option<String>,
	dynamics: Vec<Dynamic>,
}

impl Entry {
	#[must_use]
	pub fn new(dynamics: Vec<Dynamic>) -> Self {
		Self { key: None, dynamics }
	}

	#[must_use]
	pub fn keyed(key: impl Into<String>, dynamics: Vec<Dynamic>) -> Self {
		Self { key: Some(key.into()), dynamics }
	}

	#[must_use]
	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}

	#[must_use]
	pub fn dynamics(&self) -> &[Dynamic] {
		&self.dynamics
	}
}

/// A stateful sub-view with its own assigns, diffed independently of its parent.
pub trait Component: Send + Sync {
	/// Identifies the component kind. Together with a key, this determines the component id.
	fn name(&self) -> &str;

	/// # Errors
	///
	/// Iff the template can't be rendered for `assigns`.
	fn render(&self, assigns: &Assigns) -> Result<Rendered, RenderError>;
}

/// Places a component instance into a slot.
#[derive(Clone)]
pub struct ComponentRef {
	component: Arc<dyn Component>,
	key: String,
	assigns: Assigns,
}

impl ComponentRef {
	#[must_use]
	pub fn new(component: Arc<dyn Component>, key: impl Into<String>, assigns: Assigns) -> Self {
		Self {
			component,
			key: key.into(),
			assigns,
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		self.component.name()
	}

	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	#[must_use]
	pub fn assigns(&self) -> &Assigns {
		&self.assigns
	}

	/// # Errors
	///
	/// Iff the component fails to render.
	pub fn render(&self) -> Result<Rendered, RenderError> {
		self.component.render(&self.assigns)
	}
}

impl fmt::Debug for ComponentRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentRef")
			.field("name", &self.component.name())
			.field("key", &self.key)
			.field("assigns", &self.assigns)
			.finish()
	}
}

fn check_arity(statics: &[String], dynamics: usize) -> Result<(), RenderError> {
	if statics.is_empty() {
		Err(RenderError::EmptyStatics)
	} else if dynamics + 1 != statics.len() {
		Err(RenderError::Arity { statics: statics.len(), dynamics })
	} else {
		Ok(())
	}
}

fn write_interleaved(statics: &[String], dynamics: &[Dynamic], markup: &mut String) -> Result<(), RenderError> {
	let mut statics = statics.iter();
	if let Some(first) = statics.next() {
		markup.push_str(first);
	}
	for (dynamic, fragment) in dynamics.iter().zip(statics) {
		dynamic.write_markup(markup)?;
		markup.push_str(fragment);
	}
	Ok(())
}
