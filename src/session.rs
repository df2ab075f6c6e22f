//! Per-connection diff state.
//!
//! A [`Session`] owns the last render and the [`ComponentRegistry`] of exactly one connection.
//! It is not synchronized. All calls for one connection must be serialized by the caller,
//! which [`connection`](`crate::connection`) does with a mailbox per connection.

use crate::{
	config::Config,
	diff::{diff_with_config, Diff},
	error::{DiffError, RenderError},
	registry::ComponentRegistry,
	rendered::Rendered,
};
use core::{fmt, future::Future, pin::Pin};
use tracing::{debug, error, instrument, trace};

/// Application state plus its template.
pub trait LiveView {
	type Event;

	/// Renders the current state.
	///
	/// # Errors
	///
	/// Iff the template can't be rendered.
	fn render(&self) -> Result<Rendered, RenderError>;

	/// Updates the state in response to `event`.
	/// Slow work goes into `effects`, and its result comes back as another event.
	fn handle_event(&mut self, event: Self::Event, effects: &mut Effects<Self::Event>);
}

/// A background task whose output is posted back as an event.
pub type Effect<E> = Pin<Box<dyn Future<Output = E> + Send + 'static>>;

/// Background work requested while handling an event.
pub struct Effects<E> {
	tasks: Vec<Effect<E>>,
}

impl<E> Default for Effects<E> {
	fn default() -> Self {
		Self { tasks: Vec::new() }
	}
}

impl<E> fmt::Debug for Effects<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Effects").field("tasks", &self.tasks.len()).finish()
	}
}

impl<E> Effects<E> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues `task`. Its result is dropped if the connection is gone by the time it completes.
	pub fn spawn(&mut self, task: impl Future<Output = E> + Send + 'static) {
		self.tasks.push(Box::pin(task));
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.tasks.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.tasks.is_empty()
	}

	#[must_use]
	pub fn into_tasks(self) -> Vec<Effect<E>> {
		self.tasks
	}
}

/// One connection's view plus everything needed to diff its next render.
#[derive(Debug)]
pub struct Session<V> {
	view: V,
	config: Config,
	registry: ComponentRegistry,
	previous: Option<Rendered>,
}

impl<V: LiveView> Session<V> {
	#[must_use]
	pub fn new(view: V) -> Self {
		Self::with_config(view, Config::default())
	}

	#[must_use]
	pub fn with_config(view: V, config: Config) -> Self {
		Self {
			view,
			config,
			registry: ComponentRegistry::new(),
			previous: None,
		}
	}

	#[must_use]
	pub fn view(&self) -> &V {
		&self.view
	}

	#[must_use]
	pub fn registry(&self) -> &ComponentRegistry {
		&self.registry
	}

	/// Whether a render was sent that the next diff can build on.
	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.previous.is_some()
	}

	/// Renders the view completely, for a client that has nothing yet.
	///
	/// # Errors
	///
	/// Iff rendering or diffing fails. The session starts from scratch afterwards.
	#[instrument(skip_all)]
	pub fn mount(&mut self) -> Result<Diff, DiffError> {
		self.previous = None;
		self.render()
	}

	/// Renders the view completely with a fresh registry, for a client that reconnected.
	///
	/// # Errors
	///
	/// As [`mount`](`Session::mount`).
	#[instrument(skip_all)]
	pub fn rejoin(&mut self) -> Result<Diff, DiffError> {
		debug!("Rejoining from scratch.");
		self.registry.reset();
		self.previous = None;
		self.render()
	}

	/// Feeds `event` to the view and diffs the result against the last render.
	///
	/// Returns `None` if nothing changed.
	///
	/// # Errors
	///
	/// As [`mount`](`Session::mount`).
	#[instrument(skip_all)]
	pub fn handle(&mut self, event: V::Event, effects: &mut Effects<V::Event>) -> Result<Option<Diff>, DiffError> {
		self.view.handle_event(event, effects);
		let diff = self.render()?;
		if diff.is_empty() {
			trace!("Render unchanged.");
			return Ok(None);
		}
		Ok(Some(diff))
	}

	fn render(&mut self) -> Result<Diff, DiffError> {
		let result = self
			.view
			.render()
			.map_err(DiffError::from)
			.and_then(|next| diff_with_config(self.previous.as_ref(), &next, &mut self.registry, &self.config).map(|diff| (next, diff)));
		match result {
			Ok((next, diff)) => {
				self.previous = Some(next);
				Ok(diff)
			}
			Err(error) => {
				error!(%error, "Diff failed. Discarding session state.");
				self.registry.reset();
				self.previous = None;
				Err(error)
			}
		}
	}
}
