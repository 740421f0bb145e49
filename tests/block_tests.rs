//! Block-level grammar tests: headers, rules, quotes, code, lists
//! and definition lists.

use rstest::rstest;

use mdtree::ast::{Document, ListFlags, NodeKind};
use mdtree::{parse, Options};

/// Kinds of the root's children, DOC_HEADER / DOC_FOOTER skipped.
fn body_kinds(doc: &Document) -> Vec<&'static str> {
    doc.root()
        .children()
        .map(|c| c.value().kind.name())
        .filter(|k| *k != "DOC_HEADER" && *k != "DOC_FOOTER")
        .collect()
}

fn body<'a>(doc: &'a Document) -> Vec<ego_tree::NodeRef<'a, mdtree::ast::MdNode>> {
    doc.root()
        .children()
        .filter(|c| {
            !matches!(
                c.value().kind,
                NodeKind::DocHeader | NodeKind::DocFooter
            )
        })
        .collect()
}

/// All NORMAL_TEXT bytes below a node, concatenated.
fn text_below(n: ego_tree::NodeRef<'_, mdtree::ast::MdNode>) -> String {
    let mut out = Vec::new();
    for d in n.descendants() {
        if let NodeKind::NormalText { text } = &d.value().kind {
            out.extend_from_slice(text);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[rstest]
#[case("# one", 1, "one")]
#[case("## two", 2, "two")]
#[case("###### six", 6, "six")]
#[case("### trailing ###", 3, "trailing")]
fn atx_header_levels(#[case] input: &str, #[case] level: usize, #[case] text: &str) {
    let doc = parse(input.as_bytes(), &Options::default());
    let b = body(&doc);
    assert_eq!(b.len(), 1);
    match &b[0].value().kind {
        NodeKind::Header { level: l, .. } => assert_eq!(*l, level),
        other => panic!("expected header, got {:?}", other),
    }
    assert_eq!(text_below(b[0]), text);
}

#[test]
fn space_headers_demand_the_space() {
    let opts = Options {
        space_headers: true,
        ..Options::default()
    };
    let doc = parse(b"#not a header\n", &opts);
    assert_eq!(body_kinds(&doc), vec!["PARAGRAPH"]);

    let doc = parse(b"# a header\n", &opts);
    assert_eq!(body_kinds(&doc), vec!["HEADER"]);

    // The CommonMark toggle implies the same requirement.
    let opts = Options {
        commonmark: true,
        ..Options::default()
    };
    let doc = parse(b"#not a header\n", &opts);
    assert_eq!(body_kinds(&doc), vec!["PARAGRAPH"]);
}

#[rstest]
#[case("Title\n=====\n", 1)]
#[case("Title\n-----\n", 2)]
fn setext_headers(#[case] input: &str, #[case] level: usize) {
    let doc = parse(input.as_bytes(), &Options::default());
    let b = body(&doc);
    assert_eq!(b.len(), 1);
    match &b[0].value().kind {
        NodeKind::Header { level: l, .. } => assert_eq!(*l, level),
        other => panic!("expected header, got {:?}", other),
    }
    assert_eq!(text_below(b[0]), "Title");
}

#[test]
fn setext_header_splits_leading_paragraph() {
    let doc = parse(b"lead text\nTitle\n=====\n", &Options::default());
    assert_eq!(body_kinds(&doc), vec!["PARAGRAPH", "HEADER"]);
}

#[rstest]
#[case("***\n")]
#[case("* * *\n")]
#[case("---\n")]
#[case("___\n")]
fn horizontal_rules(#[case] input: &str) {
    let doc = parse(input.as_bytes(), &Options::default());
    assert_eq!(body_kinds(&doc), vec!["HRULE"]);
}

#[test]
fn blockquote_with_lazy_continuation() {
    let doc = parse(b"> quoted\nlazy line\n\nafter\n", &Options::default());
    assert_eq!(body_kinds(&doc), vec!["BLOCKQUOTE", "PARAGRAPH"]);

    let b = body(&doc);
    assert_eq!(text_below(b[0]), "quoted\nlazy line");
}

#[test]
fn indented_code_block() {
    let doc = parse(b"    let x = 1;\n    let y = 2;\n", &Options::default());
    let b = body(&doc);
    match &b[0].value().kind {
        NodeKind::BlockCode { text, lang } => {
            assert_eq!(text, b"let x = 1;\nlet y = 2;\n");
            assert!(lang.is_empty());
        }
        other => panic!("expected block code, got {:?}", other),
    }
}

#[test]
fn indented_code_can_be_disabled() {
    let opts = Options {
        no_code_indent: true,
        ..Options::default()
    };
    let doc = parse(b"    not code\n", &opts);
    assert_eq!(body_kinds(&doc), vec!["PARAGRAPH"]);
}

#[test]
fn fenced_code_with_language() {
    let opts = Options {
        fenced_code: true,
        ..Options::default()
    };
    let doc = parse(b"```rust\nfn main() {}\n```\n", &opts);
    let b = body(&doc);
    match &b[0].value().kind {
        NodeKind::BlockCode { text, lang } => {
            assert_eq!(text, b"fn main() {}\n");
            assert_eq!(lang, b"rust");
        }
        other => panic!("expected block code, got {:?}", other),
    }
}

#[test]
fn tilde_fence_without_language() {
    // Fenced code with tildes and no language token.
    let opts = Options {
        fenced_code: true,
        ..Options::default()
    };
    let doc = parse(b"~~~\nabc\n~~~", &opts);
    let b = body(&doc);
    assert_eq!(b.len(), 1);
    match &b[0].value().kind {
        NodeKind::BlockCode { text, lang } => {
            assert_eq!(text, b"abc\n");
            assert!(lang.is_empty());
        }
        other => panic!("expected block code, got {:?}", other),
    }
}

#[test]
fn unordered_list_items_in_order() {
    let doc = parse(b"* one\n* two\n* three\n", &Options::default());
    let b = body(&doc);
    assert_eq!(b.len(), 1);

    match &b[0].value().kind {
        NodeKind::List {
            flags,
            items,
            start,
        } => {
            assert!(flags.contains(ListFlags::UNORDERED));
            assert!(!flags.contains(ListFlags::ORDERED));
            assert_eq!(*items, 3);
            assert_eq!(*start, 0);
        }
        other => panic!("expected list, got {:?}", other),
    }

    let nums: Vec<usize> = b[0]
        .children()
        .map(|c| match &c.value().kind {
            NodeKind::ListItem { num, .. } => *num,
            other => panic!("expected list item, got {:?}", other),
        })
        .collect();
    assert_eq!(nums, vec![1, 2, 3]);
}

#[test]
fn ordered_list_records_the_start() {
    let doc = parse(b"4. four\n5. five\n", &Options::default());
    let b = body(&doc);
    match &b[0].value().kind {
        NodeKind::List { flags, start, .. } => {
            assert!(flags.contains(ListFlags::ORDERED));
            assert_eq!(*start, 4);
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn blank_separated_items_become_block_scoped() {
    let doc = parse(b"* one\n\n* two\n", &Options::default());
    let b = body(&doc);
    match &b[0].value().kind {
        NodeKind::List { flags, .. } => assert!(flags.contains(ListFlags::BLOCK)),
        other => panic!("expected list, got {:?}", other),
    }

    // Block items wrap their content in paragraphs.
    let item = b[0].first_child().unwrap();
    assert!(matches!(
        item.first_child().unwrap().value().kind,
        NodeKind::Paragraph
    ));
}

#[test]
fn nested_list_goes_below_the_item() {
    let doc = parse(b"* top\n    * inner\n", &Options::default());
    let b = body(&doc);
    let item = b[0].first_child().unwrap();
    let has_sublist = item
        .descendants()
        .any(|n| matches!(n.value().kind, NodeKind::List { .. }));
    assert!(has_sublist);
}

#[rstest]
#[case("- [x] done\n", ListFlags::CHECKED, "done")]
#[case("- [X] done\n", ListFlags::CHECKED, "done")]
#[case("- [ ] todo\n", ListFlags::UNCHECKED, "todo")]
fn tasklist_markers(#[case] input: &str, #[case] flag: ListFlags, #[case] text: &str) {
    let opts = Options {
        tasklists: true,
        ..Options::default()
    };
    let doc = parse(input.as_bytes(), &opts);
    let b = body(&doc);
    let item = b[0].first_child().unwrap();
    match &item.value().kind {
        NodeKind::ListItem { flags, .. } => assert!(flags.contains(flag)),
        other => panic!("expected list item, got {:?}", other),
    }
    assert_eq!(text_below(item).trim_end(), text);
}

#[test]
fn tasklist_marker_stays_without_the_extension() {
    let doc = parse(b"- [x] done\n", &Options::default());
    let b = body(&doc);
    assert_eq!(text_below(b[0].first_child().unwrap()).trim_end(), "[x] done");
}

#[test]
fn definition_list_shape() {
    let opts = Options {
        definition_lists: true,
        ..Options::default()
    };
    let doc = parse(b"term\n: first\n: second\n", &opts);
    let b = body(&doc);
    assert_eq!(b.len(), 1);

    match &b[0].value().kind {
        NodeKind::Definition { flags } => assert!(flags.contains(ListFlags::DEF)),
        other => panic!("expected definition, got {:?}", other),
    }

    let kinds: Vec<&str> = b[0].children().map(|c| c.value().kind.name()).collect();
    assert_eq!(
        kinds,
        vec!["DEFINITION_TITLE", "DEFINITION_DATA", "DEFINITION_DATA"]
    );
    assert_eq!(text_below(b[0].first_child().unwrap()), "term");
}

#[test]
fn definition_list_with_two_groups() {
    let opts = Options {
        definition_lists: true,
        ..Options::default()
    };
    let doc = parse(b"alpha\n: one\n\nbeta\n: two\n", &opts);
    let b = body(&doc);
    assert_eq!(b.len(), 1);

    let kinds: Vec<&str> = b[0].children().map(|c| c.value().kind.name()).collect();
    assert_eq!(
        kinds,
        vec![
            "DEFINITION_TITLE",
            "DEFINITION_DATA",
            "DEFINITION_TITLE",
            "DEFINITION_DATA"
        ]
    );

    match &b[0].value().kind {
        NodeKind::Definition { flags } => assert!(flags.contains(ListFlags::BLOCK)),
        other => panic!("expected definition, got {:?}", other),
    }
}

#[test]
fn definition_lists_off_mean_plain_paragraphs() {
    let doc = parse(b"term\n: data\n", &Options::default());
    assert_eq!(body_kinds(&doc), vec!["PARAGRAPH"]);
}

#[test]
fn html_block_passes_through() {
    let doc = parse(b"<div>\nraw\n</div>\n\nafter\n", &Options::default());
    let b = body(&doc);
    assert!(matches!(b[0].value().kind, NodeKind::BlockHtml { .. }));
    match &b[0].value().kind {
        NodeKind::BlockHtml { text } => {
            let t = String::from_utf8_lossy(text);
            assert!(t.contains("</div>"));
        }
        _ => unreachable!(),
    }
    assert_eq!(b[1].value().kind.name(), "PARAGRAPH");
}

#[test]
fn html_comment_block() {
    let doc = parse(b"<!-- note -->\n\ntext\n", &Options::default());
    assert_eq!(body_kinds(&doc), vec!["BLOCKHTML", "PARAGRAPH"]);
}

#[test]
fn header_attribute_group() {
    let opts = Options {
        extended_attributes: true,
        ..Options::default()
    };
    let doc = parse(b"# Title {#main}\n", &opts);
    let b = body(&doc);
    match &b[0].value().kind {
        NodeKind::Header { level, attr_id } => {
            assert_eq!(*level, 1);
            assert_eq!(attr_id, b"main");
        }
        other => panic!("expected header, got {:?}", other),
    }
    assert_eq!(text_below(b[0]), "Title");
}

#[test]
fn nesting_cap_degrades_to_text() {
    let opts = Options {
        max_depth: 4,
        ..Options::default()
    };
    // Quotes nest one block level each; past the cap the content
    // comes through as plain text instead of structure.
    let doc = parse(b"> > > > > > deep\n", &opts);
    let quotes = doc
        .root()
        .descendants()
        .filter(|n| matches!(n.value().kind, NodeKind::BlockQuote))
        .count();
    assert!(quotes < 6);
    let all_text: String = text_below(doc.root());
    assert!(all_text.contains("deep"));
}
