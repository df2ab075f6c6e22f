//! One task per connection, consuming a mailbox in order.
//!
//! ```text
//! ConnectionHandle::send ─┐
//! Effects (background) ───┼─▶ mailbox ─▶ Session ─▶ codec::encode ─▶ outbound
//! ConnectionHandle::rejoin┘
//! ```
//!
//! Only the connection's own task touches its [`Session`], so diffs leave in the same order as the events
//! that caused them. Connections share nothing with each other.

use crate::{
	codec,
	config::Config,
	diff::Diff,
	error::{ConnectionError, DiffError},
	session::{Effect, Effects, LiveView, Session},
};
use core::sync::atomic::{AtomicU64, Ordering};
use tokio::{
	sync::mpsc::{self, Receiver, Sender, WeakSender},
	task::JoinHandle,
};
use tracing::{debug, error, instrument, trace, Instrument};

/// What the transport has to deliver to the client, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
	/// An [encoded](`codec::encode`) diff.
	Diff(String),
	/// The connection failed and is gone. The client should remount.
	Crash(String),
}

enum Message<E> {
	Event(E),
	Rejoin,
	Close,
}

/// Controls a connection spawned with [`spawn`].
///
/// The connection shuts down once it is [closed](`ConnectionHandle::close`), crashes,
/// its outbound receiver is dropped or every handle is dropped.
#[derive(Debug)]
pub struct ConnectionHandle<E> {
	id: u64,
	mailbox: Sender<Message<E>>,
	task: JoinHandle<()>,
}

impl<E> ConnectionHandle<E> {
	#[must_use]
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Whether the connection still takes messages.
	#[must_use]
	pub fn is_alive(&self) -> bool {
		!self.mailbox.is_closed()
	}

	/// Queues `event` behind everything sent before.
	///
	/// # Errors
	///
	/// Iff the connection is gone.
	pub async fn send(&self, event: E) -> Result<(), ConnectionError> {
		self.post(Message::Event(event)).await
	}

	/// Queues a complete render with a fresh component registry, for a client that reconnected.
	///
	/// # Errors
	///
	/// Iff the connection is gone.
	pub async fn rejoin(&self) -> Result<(), ConnectionError> {
		self.post(Message::Rejoin).await
	}

	/// Queues a shutdown behind everything sent before and waits for the connection to finish.
	pub async fn close(self) {
		if self.post(Message::Close).await.is_err() {
			trace!(connection = self.id, "Connection was closed already.");
		}
		if let Err(error) = self.task.await {
			error!(connection = self.id, %error, "Connection task failed.");
		}
	}

	/// Waits until the connection stops taking messages.
	pub async fn closed(&self) {
		self.mailbox.closed().await;
	}

	async fn post(&self, message: Message<E>) -> Result<(), ConnectionError> {
		self.mailbox.send(message).await.map_err(|_| ConnectionError::Closed)
	}
}

/// Spawns the task for a new connection to `view` and queues its initial render.
///
/// Diffs and crashes are delivered to `outbound`. `capacity` bounds the mailbox,
/// so senders wait while the connection is busy.
///
/// # Panics
///
/// Iff called outside of a Tokio runtime or `capacity` is zero.
pub fn spawn<V>(view: V, config: Config, outbound: Sender<Outbound>, capacity: usize) -> ConnectionHandle<V::Event>
where
	V: LiveView + Send + 'static,
	V::Event: Send + 'static,
{
	static NEXT_ID: AtomicU64 = AtomicU64::new(1);
	let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

	let (sender, receiver) = mpsc::channel(capacity);
	let session = Session::with_config(view, config);
	let span = tracing::debug_span!("Connection", connection = id);
	let task = tokio::spawn(run(session, receiver, sender.downgrade(), outbound).instrument(span));
	ConnectionHandle { id, mailbox: sender, task }
}

async fn run<V>(mut session: Session<V>, mut mailbox: Receiver<Message<V::Event>>, this: WeakSender<Message<V::Event>>, outbound: Sender<Outbound>)
where
	V: LiveView,
	V::Event: Send + 'static,
{
	debug!("Mounting.");
	let mut result = session.mount().map(Some);
	loop {
		if !deliver(result, &outbound).await {
			break;
		}
		result = match mailbox.recv().await {
			Some(Message::Event(event)) => {
				let mut effects = Effects::new();
				let result = session.handle(event, &mut effects);
				for task in effects.into_tasks() {
					spawn_effect(task, this.clone());
				}
				result
			}
			Some(Message::Rejoin) => session.rejoin().map(Some),
			Some(Message::Close) => {
				debug!("Closing.");
				break;
			}
			None => {
				debug!("All handles dropped.");
				break;
			}
		};
	}
	mailbox.close();
	debug!("Connection closed.");
}

/// Returns whether the connection should keep going.
async fn deliver(result: Result<Option<Diff>, DiffError>, outbound: &Sender<Outbound>) -> bool {
	let message = match result {
		Ok(None) => {
			trace!("Nothing to send.");
			return true;
		}
		Ok(Some(diff)) => Outbound::Diff(codec::encode(&diff)),
		Err(error) => {
			error!(%error, "Crashing connection.");
			if outbound.send(Outbound::Crash(error.to_string())).await.is_err() {
				debug!("Transport gone before the crash could be reported.");
			}
			return false;
		}
	};
	if outbound.send(message).await.is_err() {
		debug!("Transport gone. Closing.");
		return false;
	}
	true
}

#[instrument(skip_all)]
fn spawn_effect<E: Send + 'static>(task: Effect<E>, mailbox: WeakSender<Message<E>>) {
	tokio::spawn(
		async move {
			let event = task.await;
			// The connection must still be registered for its result to count.
			let Some(mailbox) = mailbox.upgrade().filter(|mailbox| !mailbox.is_closed()) else {
				debug!("Connection is gone. Discarding background result.");
				return;
			};
			if mailbox.send(Message::Event(event)).await.is_err() {
				debug!("Connection closed before the background result arrived. Discarding it.");
			}
		}
		.in_current_span(),
	);
}
