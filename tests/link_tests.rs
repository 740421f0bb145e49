//! Link, image, reference, footnote and metadata-reference tests.

use rstest::rstest;

use mdtree::ast::{Document, NodeKind, Warning};
use mdtree::{parse, Options};

fn para(doc: &Document) -> ego_tree::NodeRef<'_, mdtree::ast::MdNode> {
    doc.root()
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Paragraph))
        .expect("no paragraph")
}

fn first_link(doc: &Document) -> (Vec<u8>, Vec<u8>, String) {
    let p = para(doc);
    let link = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Link { .. }))
        .expect("no link");
    match &link.value().kind {
        NodeKind::Link { link: l, title, .. } => {
            let mut content = Vec::new();
            for d in link.descendants() {
                if let NodeKind::NormalText { text } = &d.value().kind {
                    content.extend_from_slice(text);
                }
            }
            (
                l.clone(),
                title.clone(),
                String::from_utf8_lossy(&content).into_owned(),
            )
        }
        _ => unreachable!(),
    }
}

#[test]
fn inline_link_with_title() {
    let doc = parse(
        b"see [here](http://x.com \"The X\") end",
        &Options::default(),
    );
    let (link, title, content) = first_link(&doc);
    assert_eq!(link, b"http://x.com");
    assert_eq!(title, b"The X");
    assert_eq!(content, "here");
}

#[test]
fn inline_link_angle_bracketed() {
    let doc = parse(b"[x](<http://y.com>)", &Options::default());
    let (link, _, _) = first_link(&doc);
    assert_eq!(link, b"http://y.com");
}

#[test]
fn inline_link_balances_parentheses() {
    let doc = parse(b"[x](http://e.com/a(b))", &Options::default());
    let (link, _, _) = first_link(&doc);
    assert_eq!(link, b"http://e.com/a(b)");
}

#[test]
fn full_reference_link() {
    // A full reference resolves through the collected table; the
    // lookup id is case-folded.
    let doc = parse(b"[x][y]\n\n[y]: http://z\n", &Options::default());
    let (link, title, content) = first_link(&doc);
    assert_eq!(link, b"http://z");
    assert_eq!(title, b"");
    assert_eq!(content, "x");

    let doc = parse(b"[x][Y]\n\n[y]: http://z\n", &Options::default());
    let (link, _, _) = first_link(&doc);
    assert_eq!(link, b"http://z");
}

#[test]
fn shortcut_reference_link() {
    let doc = parse(b"[id]\n\n[id]: http://s \"T\"\n", &Options::default());
    let (link, title, content) = first_link(&doc);
    assert_eq!(link, b"http://s");
    assert_eq!(title, b"T");
    assert_eq!(content, "id");
}

#[test]
fn unresolved_reference_is_literal_text() {
    let doc = parse(b"[x][nope] rest\n", &Options::default());
    let p = para(&doc);
    assert!(!p
        .descendants()
        .any(|n| matches!(n.value().kind, NodeKind::Link { .. })));

    let mut text = Vec::new();
    for d in p.descendants() {
        if let NodeKind::NormalText { text: t } = &d.value().kind {
            text.extend_from_slice(t);
        }
    }
    assert_eq!(text, b"[x][nope] rest");
}

#[test]
fn space_before_target_warns_but_resolves() {
    let doc = parse(b"[x] (http://y.com)", &Options::default());
    let (link, _, _) = first_link(&doc);
    assert_eq!(link, b"http://y.com");
    assert!(doc.warnings.contains(&Warning::SpaceBeforeLink));
}

#[test]
fn image_with_dims_and_title() {
    let doc = parse(
        b"![alt text](pic.png \"A pic\" =20x30)",
        &Options::default(),
    );
    let p = para(&doc);
    let img = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Image { .. }))
        .expect("no image");
    match &img.value().kind {
        NodeKind::Image {
            link,
            title,
            dims,
            alt,
            ..
        } => {
            assert_eq!(link, b"pic.png");
            assert_eq!(title, b"A pic");
            assert_eq!(dims, b"20x30");
            assert_eq!(alt, b"alt text");
        }
        _ => unreachable!(),
    }

    // Image alt is kept raw, not span-parsed.
    assert!(img.children().next().is_none());
}

#[test]
fn image_dims_before_title() {
    let doc = parse(b"![a](p.png =5x6 \"T\")", &Options::default());
    let p = para(&doc);
    let img = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Image { .. }))
        .unwrap();
    match &img.value().kind {
        NodeKind::Image { title, dims, .. } => {
            assert_eq!(dims, b"5x6");
            assert_eq!(title, b"T");
        }
        _ => unreachable!(),
    }
}

#[test]
fn image_attribute_group() {
    let opts = Options {
        img_ext: true,
        ..Options::default()
    };
    let doc = parse(b"![a](p.png){width=20 height=10}", &opts);
    let p = para(&doc);
    let img = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Image { .. }))
        .unwrap();
    match &img.value().kind {
        NodeKind::Image {
            attr_width,
            attr_height,
            ..
        } => {
            assert_eq!(attr_width, b"20");
            assert_eq!(attr_height, b"10");
        }
        _ => unreachable!(),
    }
}

#[test]
fn link_id_attribute_group() {
    let opts = Options {
        extended_attributes: true,
        ..Options::default()
    };
    let doc = parse(b"[x](http://y.com){#anchor}", &opts);
    let p = para(&doc);
    let link = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Link { .. }))
        .unwrap();
    match &link.value().kind {
        NodeKind::Link { attr_id, .. } => assert_eq!(attr_id, b"anchor"),
        _ => unreachable!(),
    }
}

#[test]
fn autolinks_are_suppressed_inside_link_bodies() {
    let opts = Options {
        autolink: true,
        ..Options::default()
    };
    let doc = parse(b"[go http://in.com](http://out.com)", &opts);
    let p = para(&doc);
    let link = p
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Link { .. }))
        .unwrap();
    assert!(!link
        .descendants()
        .any(|n| matches!(n.value().kind, NodeKind::LinkAuto { .. })));
}

#[rstest]
#[case(b"one [^b] two [^a]\n\n[^a]: A\n[^b]: B\n".as_slice())]
fn footnotes_number_in_order_of_first_reference(#[case] input: &[u8]) {
    let opts = Options {
        footnotes: true,
        ..Options::default()
    };
    let doc = parse(input, &opts);

    let refs: Vec<usize> = para(&doc)
        .children()
        .filter_map(|c| match c.value().kind {
            NodeKind::FootnoteRef { num } => Some(num),
            _ => None,
        })
        .collect();
    assert_eq!(refs, vec![1, 2]);

    let block = doc
        .root()
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::FootnotesBlock))
        .expect("no footnotes block");
    let defs: Vec<usize> = block
        .children()
        .filter_map(|c| match c.value().kind {
            NodeKind::FootnoteDef { num } => Some(num),
            _ => None,
        })
        .collect();
    assert_eq!(defs, vec![1, 2]);

    // Definition bodies come from the collected contents, in
    // first-reference order: B first.
    let mut first_def_text = Vec::new();
    for d in block.first_child().unwrap().descendants() {
        if let NodeKind::NormalText { text } = &d.value().kind {
            first_def_text.extend_from_slice(text);
        }
    }
    assert_eq!(first_def_text, b"B");
}

#[test]
fn repeated_footnote_reference_stays_literal() {
    let opts = Options {
        footnotes: true,
        ..Options::default()
    };
    let doc = parse(b"x [^a] y [^a]\n\n[^a]: A\n", &opts);

    let refs = para(&doc)
        .children()
        .filter(|c| matches!(c.value().kind, NodeKind::FootnoteRef { .. }))
        .count();
    assert_eq!(refs, 1);

    let mut text = Vec::new();
    for d in para(&doc).descendants() {
        if let NodeKind::NormalText { text: t } = &d.value().kind {
            text.extend_from_slice(t);
        }
    }
    assert!(String::from_utf8_lossy(&text).contains("[^a]"));
}

#[test]
fn unknown_footnote_is_literal() {
    let opts = Options {
        footnotes: true,
        ..Options::default()
    };
    let doc = parse(b"x [^missing]\n", &opts);
    assert!(!doc
        .root()
        .descendants()
        .any(|n| matches!(n.value().kind, NodeKind::FootnoteRef { .. })));
    assert!(!doc
        .root()
        .descendants()
        .any(|n| matches!(n.value().kind, NodeKind::FootnotesBlock)));
}

#[test]
fn metadata_reference_expands_to_text() {
    let opts = Options {
        metadata: true,
        ..Options::default()
    };
    let doc = parse(b"title: My Doc\n\nSee [%title] here\n", &opts);
    let texts: Vec<String> = para(&doc)
        .children()
        .filter_map(|c| match &c.value().kind {
            NodeKind::NormalText { text } => {
                Some(String::from_utf8_lossy(text).into_owned())
            }
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["See ", "My Doc", " here"]);
}

#[test]
fn unknown_metadata_key_consumes_quietly() {
    let opts = Options {
        metadata: true,
        ..Options::default()
    };
    let doc = parse(b"title: T\n\na [%nope] b\n", &opts);
    let mut text = Vec::new();
    for d in para(&doc).descendants() {
        if let NodeKind::NormalText { text: t } = &d.value().kind {
            text.extend_from_slice(t);
        }
    }
    assert_eq!(text, b"a  b");
}
