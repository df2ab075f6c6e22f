use live_dom::{
	diff::{SlotDiff, StaticsDiff, TreeDiff},
	diff_with_config,
	error::DiffError,
	rendered::statics,
	ComponentRegistry, Config, Diff,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use common_::{card, init_log, page, tree, Card};

#[test]
fn count() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let first = tree(&["Count: ", ""], vec!["1".into()]);
	let second = tree(&["Count: ", ""], vec!["2".into()]);

	let mount = live_dom::diff(None, &first, &mut registry).unwrap();
	assert_eq!(
		mount,
		Diff {
			root: TreeDiff {
				statics: Some(StaticsDiff::Inline(statics(["Count: ", ""]))),
				slots: vec![(0, SlotDiff::Text("1".to_owned()))],
			},
			join: true,
			..Diff::default()
		}
	);

	let update = live_dom::diff(Some(&first), &second, &mut registry).unwrap();
	assert_eq!(
		update,
		Diff {
			root: TreeDiff {
				statics: None,
				slots: vec![(0, SlotDiff::Text("2".to_owned()))],
			},
			..Diff::default()
		}
	);
}

#[test]
fn identical_render_is_empty() {
	init_log();
	let cards = Arc::new(Card::default());
	let mut registry = ComponentRegistry::new();
	let rendered = page("Inbox", &["a", "b", "c"], &cards, "Hello");

	let mount = live_dom::diff(None, &rendered, &mut registry).unwrap();
	assert!(!mount.is_empty());
	assert_eq!(cards.renders(), 1);

	let again = live_dom::diff(Some(&rendered), &rendered, &mut registry).unwrap();
	assert!(again.is_empty(), "{:#?}", again);
	assert_eq!(cards.renders(), 1);
	assert_eq!(registry.len(), 1);
}

#[test]
fn statics_follow_fingerprint() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let first = tree(&["<p>", "</p>"], vec![tree(&["<b>", "</b>"], vec!["x".into()]).into()]);
	let same_template = tree(&["<p>", "</p>"], vec![tree(&["<b>", "</b>"], vec!["y".into()]).into()]);
	let other_template = tree(&["<p>", "</p>"], vec![tree(&["<i>", "</i>"], vec!["y".into()]).into()]);

	live_dom::diff(None, &first, &mut registry).unwrap();

	let diff = live_dom::diff(Some(&first), &same_template, &mut registry).unwrap();
	assert_eq!(diff.root.statics, None);
	assert_eq!(
		diff.root.slots,
		vec![(
			0,
			SlotDiff::Tree(TreeDiff {
				statics: None,
				slots: vec![(0, SlotDiff::Text("y".to_owned()))],
			})
		)]
	);

	let diff = live_dom::diff(Some(&same_template), &other_template, &mut registry).unwrap();
	assert_eq!(diff.root.statics, None);
	assert_eq!(
		diff.root.slots,
		vec![(
			0,
			SlotDiff::Tree(TreeDiff {
				statics: Some(StaticsDiff::Inline(statics(["<i>", "</i>"]))),
				slots: vec![(0, SlotDiff::Text("y".to_owned()))],
			})
		)]
	);
}

#[test]
fn only_changed_slots_are_sent() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let first = tree(&["", " ", " ", ""], vec!["a".into(), "b".into(), "c".into()]);
	let second = tree(&["", " ", " ", ""], vec!["a".into(), "B".into(), "c".into()]);

	live_dom::diff(None, &first, &mut registry).unwrap();
	let diff = live_dom::diff(Some(&first), &second, &mut registry).unwrap();
	assert_eq!(diff.root.slots, vec![(1, SlotDiff::Text("B".to_owned()))]);
}

#[test]
fn shape_change_is_an_error() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let text = tree(&["<p>", "</p>"], vec!["x".into()]);
	let nested = tree(&["<p>", "</p>"], vec![tree(&["x"], vec![]).into()]);

	live_dom::diff(None, &text, &mut registry).unwrap();
	assert_eq!(
		live_dom::diff(Some(&text), &nested, &mut registry),
		Err(DiffError::ShapeMismatch {
			slot: 0,
			previous: "text",
			next: "tree",
		})
	);
}

#[test]
fn depth_limit() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let config = Config {
		depth_limit: 2,
		..Config::default()
	};
	let shallow = tree(&["", ""], vec![tree(&["leaf"], vec![]).into()]);
	let deep = tree(&["", ""], vec![tree(&["", ""], vec![tree(&["leaf"], vec![]).into()]).into()]);

	assert!(diff_with_config(None, &shallow, &mut registry, &config).is_ok());
	assert_eq!(diff_with_config(None, &deep, &mut registry, &config), Err(DiffError::DepthLimit));
}

#[test]
fn first_render_resets_registry() {
	init_log();
	let cards = Arc::new(Card::default());
	let mut registry = ComponentRegistry::new();
	let rendered = tree(&["", ""], vec![card(&cards, "a", "A")]);

	live_dom::diff(None, &rendered, &mut registry).unwrap();
	let again = live_dom::diff(None, &rendered, &mut registry).unwrap();

	// The client may know nothing, so ids are allocated from scratch and the component is sent again.
	assert_eq!(again.components.len(), 1);
	assert_eq!(registry.cids(), vec![live_dom::Cid::new(1)]);
	assert_eq!(cards.renders(), 2);
}
