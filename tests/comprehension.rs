use live_dom::{
	comprehension::{ItemDiff, ListDiff},
	diff::SlotDiff,
	diff_with_config,
	rendered::statics,
	ComponentRegistry, Config, Entry, Rendered,
};
use pretty_assertions::assert_eq;

use common_::{init_log, items, keyed_items, list, tree};

fn ol(entries: Vec<Entry>) -> Rendered {
	tree(&["<ol>", "</ol>"], vec![list(&["<li>", "</li>"], entries).into()])
}

/// Diffs `next` against `previous` and returns the list diff at slot 0.
fn list_diff(previous: &Rendered, next: &Rendered, config: &Config) -> Option<ListDiff> {
	let mut registry = ComponentRegistry::new();
	diff_with_config(None, previous, &mut registry, config).unwrap();
	let diff = diff_with_config(Some(previous), next, &mut registry, config).unwrap();
	assert_eq!(diff.root.statics, None);
	match diff.root.slots.as_slice() {
		[] => None,
		[(0, SlotDiff::List(list))] => Some(list.clone()),
		slots => panic!("unexpected slots: {:#?}", slots),
	}
}

fn text(index: usize, text: &str) -> (usize, SlotDiff) {
	(index, SlotDiff::Text(text.to_owned()))
}

#[test]
fn first_render_sends_template_once() {
	init_log();
	let mut registry = ComponentRegistry::new();
	let diff = live_dom::diff(None, &ol(items(&["a", "b"])), &mut registry).unwrap();
	assert_eq!(
		diff.root.slots,
		vec![(
			0,
			SlotDiff::List(ListDiff {
				statics: Some(statics(["<li>", "</li>"])),
				count: 2,
				items: vec![
					ItemDiff::Patch {
						source: None,
						slots: vec![text(0, "a")],
					},
					ItemDiff::Patch {
						source: None,
						slots: vec![text(0, "b")],
					},
				],
			})
		)]
	);
}

#[test]
fn append() {
	init_log();
	let diff = list_diff(&ol(items(&["a", "b"])), &ol(items(&["a", "b", "c"])), &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 3,
			items: vec![
				ItemDiff::Unchanged,
				ItemDiff::Unchanged,
				ItemDiff::Patch {
					source: None,
					slots: vec![text(0, "c")],
				},
			],
		})
	);
}

#[test]
fn truncate() {
	init_log();
	let diff = list_diff(&ol(items(&["a", "b", "c", "d", "e"])), &ol(items(&["a", "b"])), &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 2,
			items: vec![],
		})
	);
}

#[test]
fn unchanged_list_is_omitted() {
	init_log();
	assert_eq!(list_diff(&ol(items(&["a", "b"])), &ol(items(&["a", "b"])), &Config::default()), None);
}

#[test]
fn positional_changes_patch_in_place() {
	init_log();
	let diff = list_diff(&ol(items(&["a", "b", "c"])), &ol(items(&["a", "B", "c"])), &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 3,
			items: vec![
				ItemDiff::Unchanged,
				ItemDiff::Patch {
					source: Some(1),
					slots: vec![text(0, "B")],
				},
			],
		})
	);
}

#[test]
fn keyed_reorder_only_moves() {
	init_log();
	let diff = list_diff(&ol(keyed_items(&["a", "b", "c"])), &ol(keyed_items(&["c", "a", "b"])), &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 3,
			items: vec![ItemDiff::Moved(2), ItemDiff::Moved(0), ItemDiff::Moved(1)],
		})
	);
}

#[test]
fn keyed_removal_and_patch() {
	init_log();
	let previous = ol(keyed_items(&["a", "b", "c"]));
	let next = ol(vec![Entry::keyed("a", vec!["a".into()]), Entry::keyed("c", vec!["C".into()])]);
	let diff = list_diff(&previous, &next, &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 2,
			items: vec![
				ItemDiff::Unchanged,
				ItemDiff::Patch {
					source: Some(2),
					slots: vec![text(0, "C")],
				},
			],
		})
	);
}

#[test]
fn keyed_mode_can_be_disabled() {
	init_log();
	let config = Config {
		keyed_comprehensions: false,
		..Config::default()
	};
	let diff = list_diff(&ol(keyed_items(&["a", "b"])), &ol(keyed_items(&["b", "a"])), &config);
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 2,
			items: vec![
				ItemDiff::Patch {
					source: Some(0),
					slots: vec![text(0, "b")],
				},
				ItemDiff::Patch {
					source: Some(1),
					slots: vec![text(0, "a")],
				},
			],
		})
	);
}

#[test]
fn duplicate_keys_match_by_position() {
	init_log();
	let previous = ol(keyed_items(&["a", "b"]));
	let next = ol(vec![Entry::keyed("b", vec!["x".into()]), Entry::keyed("b", vec!["b".into()])]);
	let diff = list_diff(&previous, &next, &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: None,
			count: 2,
			items: vec![ItemDiff::Patch {
				source: Some(0),
				slots: vec![text(0, "x")],
			}],
		})
	);
}

#[test]
fn template_change_resends_everything() {
	init_log();
	let previous = ol(items(&["a"]));
	let next = tree(&["<ol>", "</ol>"], vec![list(&["<li class=\"new\">", "</li>"], items(&["a"])).into()]);
	let diff = list_diff(&previous, &next, &Config::default());
	assert_eq!(
		diff,
		Some(ListDiff {
			statics: Some(statics(["<li class=\"new\">", "</li>"])),
			count: 1,
			items: vec![ItemDiff::Patch {
				source: None,
				slots: vec![text(0, "a")],
			}],
		})
	);
}
