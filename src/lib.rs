#![doc(html_root_url = "https://docs.rs/live-dom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod codec;
pub mod comprehension;
pub mod config;
pub mod diff;
pub mod dom;
pub mod error;
pub mod fingerprint;
pub mod patch;
pub mod registry;
pub mod rendered;
pub mod session;

#[cfg(feature = "connection")]
pub mod connection;

#[cfg(target_arch = "wasm32")]
pub mod web;

mod rc_hash_map;

pub use crate::{
	config::Config,
	diff::{diff, diff_with_config, Diff},
	dom::{Dom, MemoryDom},
	patch::{ApplyOutcome, DomPatcher, HookTarget, Hooks, ViewState},
	registry::{Cid, ComponentRegistry},
	rendered::{Assigns, Component, ComponentRef, Comprehension, Dynamic, Entry, Rendered},
	session::{Effects, LiveView, Session},
};
