use live_dom::{
	codec::{decode, encode},
	comprehension::{ItemDiff, ListDiff},
	diff::{SlotDiff, StaticsDiff, TreeDiff},
	error::CodecError,
	rendered::statics,
	Cid, ComponentRegistry, Diff,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;

use common_::{init_log, page, Card};

#[test]
fn slot_update() {
	let diff = Diff {
		root: TreeDiff {
			statics: None,
			slots: vec![(0, SlotDiff::Text("2".to_owned()))],
		},
		..Diff::default()
	};
	assert_eq!(encode(&diff), r#"[[0,null,0,"2"],[],[]]"#);
}

#[test]
fn list_with_elided_items() {
	let diff = Diff {
		root: TreeDiff {
			statics: None,
			slots: vec![(
				1,
				SlotDiff::List(ListDiff {
					statics: None,
					count: 4,
					items: vec![
						ItemDiff::Unchanged,
						ItemDiff::Moved(0),
						ItemDiff::Patch {
							source: None,
							slots: vec![(0, SlotDiff::Text("c".to_owned()))],
						},
					],
				}),
			)],
		},
		..Diff::default()
	};
	let json = encode(&diff);
	assert_eq!(json, r#"[[0,null,1,[1,null,4,[null,0,[null,0,"c"]]]],[],[]]"#);
	assert_eq!(decode(&json).unwrap(), diff);
}

#[test]
fn components_and_assigns() {
	let diff = Diff {
		root: TreeDiff {
			statics: Some(StaticsDiff::Inline(statics(["<main>", "", "</main>"]))),
			slots: vec![
				(
					0,
					SlotDiff::Component {
						cid: Cid::new(1),
						assigns: vec![],
					},
				),
				(
					1,
					SlotDiff::Component {
						cid: Cid::new(2),
						assigns: vec![("title".to_owned(), Value::from("x")), ("gone".to_owned(), Value::Null)],
					},
				),
			],
		},
		components: vec![
			(
				Cid::new(1),
				TreeDiff {
					statics: Some(StaticsDiff::Inline(statics(["<li>", "</li>"]))),
					slots: vec![(0, SlotDiff::Text("a".to_owned()))],
				},
			),
			(
				Cid::new(2),
				TreeDiff {
					statics: Some(StaticsDiff::Shared(Cid::new(1))),
					slots: vec![(0, SlotDiff::Text("b".to_owned()))],
				},
			),
		],
		removed: vec![Cid::new(7)],
		join: false,
	};
	let json = encode(&diff);
	assert_eq!(
		json,
		concat!(
			r#"[[0,["<main>","","</main>"],0,1,1,[2,2,"title","x","gone",null]],"#,
			r#"[1,[0,["<li>","</li>"],0,"a"],2,[0,1,0,"b"]],"#,
			r#"[7]]"#,
		)
	);
	assert_eq!(decode(&json).unwrap(), diff);
}

#[test]
fn complete_render_is_marked() {
	let diff = Diff {
		root: TreeDiff {
			statics: Some(StaticsDiff::Inline(statics(["Hello"]))),
			slots: vec![],
		},
		join: true,
		..Diff::default()
	};
	let json = encode(&diff);
	assert_eq!(json, r#"[[0,["Hello"]],[],[],true]"#);
	assert_eq!(decode(&json).unwrap(), diff);

	// The same tree without the marker is an update that happens to change the root template.
	assert!(!decode(r#"[[0,["Hello"]],[],[]]"#).unwrap().join);
	assert!(matches!(
		decode(r#"[[0,["Hello"]],[],[],false]"#),
		Err(CodecError::Unexpected { expected: "join marker", .. })
	));
}

#[test]
fn rendered_page_survives_the_wire() {
	init_log();
	let cards = Arc::new(Card::default());
	let mut registry = ComponentRegistry::new();
	let first = page("Inbox", &["a", "b"], &cards, "Hello");
	let second = page("Inbox (3)", &["c", "a", "b"], &cards, "World");

	let mount = live_dom::diff(None, &first, &mut registry).unwrap();
	assert_eq!(decode(&encode(&mount)).unwrap(), mount);
	let update = live_dom::diff(Some(&first), &second, &mut registry).unwrap();
	assert_eq!(decode(&encode(&update)).unwrap(), update);
}

#[test]
fn malformed_input() {
	assert!(matches!(decode("[[0,null"), Err(CodecError::Json(_))));
	assert!(matches!(decode("{}"), Err(CodecError::Unexpected { .. })));
	assert!(matches!(decode("[[0,null],[],[]"), Err(CodecError::Json(_))));
	assert!(matches!(
		decode("[[0,null,0],[],[]]"),
		Err(CodecError::Unexpected { expected: "index/slot pairs", .. })
	));
	assert!(matches!(
		decode("[[0,null,1,\"a\",0,\"b\"],[],[]]"),
		Err(CodecError::Unexpected { expected: "ascending slot index", .. })
	));
	assert!(matches!(decode("[[9,null],[],[]]"), Err(CodecError::UnknownTag { tag: 9, .. })));
	assert!(matches!(
		decode("[[0,null,0,[1,null,1,[null,null]]],[],[]]"),
		Err(CodecError::Unexpected { expected: "at most `count` items", .. })
	));

	match decode("[[0,null,0,[0,null,0,true]],[],[]]") {
		Err(CodecError::Unexpected { expected: "slot", path }) => assert_eq!(path, "$[0][3][3]"),
		other => panic!("unexpected result: {:?}", other),
	}
}
