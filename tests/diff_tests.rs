//! Differ behavior: change labelling, word-level text diffs, and
//! the structural properties of the merged tree.

use mdtree::ast::{isomorphic, merge_adjacent_text, Chng, Document, NodeKind};
use mdtree::{diff, parse, Options};

fn diff_docs(old: &[u8], new: &[u8]) -> Document {
    let opts = Options::default();
    let mut o = parse(old, &opts);
    let mut n = parse(new, &opts);
    merge_adjacent_text(&mut o);
    merge_adjacent_text(&mut n);
    diff(&o, &n)
}

/// `(text, chng)` for every NORMAL_TEXT below the first paragraph.
fn para_tokens(doc: &Document) -> Vec<(String, Chng)> {
    let para = doc
        .root()
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Paragraph))
        .expect("no paragraph");
    para.children()
        .filter_map(|c| match &c.value().kind {
            NodeKind::NormalText { text } => Some((
                String::from_utf8_lossy(text).into_owned(),
                c.value().chng,
            )),
            _ => None,
        })
        .collect()
}

/// Remove deleted subtrees and drop all labels; re-merge text runs
/// so word splits from the LCS coalesce again.
fn strip_deletions(doc: &mut Document) {
    let deleted: Vec<_> = doc
        .root()
        .descendants()
        .filter(|n| n.value().chng == Chng::Delete)
        .map(|n| n.id())
        .collect();
    for id in deleted {
        if let Some(mut n) = doc.tree.get_mut(id) {
            n.detach();
        }
    }

    let rest: Vec<_> = doc.root().descendants().map(|n| n.id()).collect();
    for id in rest {
        doc.tree.get_mut(id).unwrap().value().chng = Chng::None;
    }

    merge_adjacent_text(doc);
}

#[test]
fn word_insertion_labels_exactly_one_token() {
    let d = diff_docs(b"hello world", b"hello brave world");
    assert_eq!(
        para_tokens(&d),
        vec![
            ("hello".to_string(), Chng::None),
            (" ".to_string(), Chng::None),
            ("brave".to_string(), Chng::Insert),
            (" ".to_string(), Chng::None),
            ("world".to_string(), Chng::None),
        ]
    );
}

#[test]
fn word_removal_labels_exactly_one_token() {
    let d = diff_docs(b"hello brave world", b"hello world");
    let inserts = para_tokens(&d)
        .iter()
        .filter(|(_, c)| *c == Chng::Insert)
        .count();
    let deletes: Vec<String> = para_tokens(&d)
        .iter()
        .filter(|(_, c)| *c == Chng::Delete)
        .map(|(t, _)| t.clone())
        .collect();
    assert_eq!(inserts, 0);
    assert_eq!(deletes, vec!["brave".to_string()]);
}

#[test]
fn changed_header_keeps_the_paragraph_clean() {
    let d = diff_docs(b"# A\n\ntext\n", b"# B\n\ntext\n");

    let header = d
        .root()
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Header { .. }))
        .expect("no header");
    let labels: Vec<(String, Chng)> = header
        .children()
        .filter_map(|c| match &c.value().kind {
            NodeKind::NormalText { text } => Some((
                String::from_utf8_lossy(text).into_owned(),
                c.value().chng,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        labels,
        vec![
            ("A".to_string(), Chng::Delete),
            ("B".to_string(), Chng::Insert),
        ]
    );

    let para = d
        .root()
        .children()
        .find(|c| matches!(c.value().kind, NodeKind::Paragraph))
        .unwrap();
    assert!(para.descendants().all(|n| n.value().chng == Chng::None));
}

#[test]
fn self_diff_is_all_none() {
    let input = b"# T\n\npara *em* text\n\n* a\n* b\n";
    let d = diff_docs(input, input);
    assert!(d.root().descendants().all(|n| n.value().chng == Chng::None));
}

#[test]
fn inserted_block_is_labelled_whole() {
    let d = diff_docs(b"first\n", b"first\n\nsecond\n");

    let paras: Vec<_> = d
        .root()
        .children()
        .filter(|c| matches!(c.value().kind, NodeKind::Paragraph))
        .collect();
    assert_eq!(paras.len(), 2);
    assert_eq!(paras[0].value().chng, Chng::None);
    assert_eq!(paras[1].value().chng, Chng::Insert);
}

#[test]
fn removed_block_is_kept_as_deletion() {
    let d = diff_docs(b"first\n\nsecond\n", b"first\n");

    let paras: Vec<_> = d
        .root()
        .children()
        .filter(|c| matches!(c.value().kind, NodeKind::Paragraph))
        .collect();
    assert_eq!(paras.len(), 2);
    assert_eq!(paras[0].value().chng, Chng::None);
    assert_eq!(paras[1].value().chng, Chng::Delete);
}

#[test]
fn moved_subtree_shows_as_delete_and_insert() {
    let d = diff_docs(
        b"# H\n\nalpha beta gamma\n\n* one\n* two\n",
        b"* one\n* two\n\n# H\n\nalpha beta gamma\n",
    );

    // Everything survives; some nodes are re-ordered, which the
    // merge expresses as paired deletions and insertions.
    let has_delete = d
        .root()
        .descendants()
        .any(|n| n.value().chng == Chng::Delete);
    let has_insert = d
        .root()
        .descendants()
        .any(|n| n.value().chng == Chng::Insert);
    assert!(has_delete && has_insert);
}

#[test]
fn stripped_merge_of_word_insertion_is_the_new_tree() {
    let old = b"hello world\n";
    let new = b"hello brave world\n";

    let mut merged = diff_docs(old, new);
    strip_deletions(&mut merged);

    let opts = Options::default();
    let mut expected = parse(new, &opts);
    merge_adjacent_text(&mut expected);

    assert!(isomorphic(merged.root(), expected.root()));
}

#[test]
fn stripped_merge_of_block_changes_is_the_new_tree() {
    let old = b"# T\n\nkept paragraph\n\ndropped paragraph\n";
    let new = b"# T\n\nkept paragraph\n\n* fresh\n* list\n";

    let mut merged = diff_docs(old, new);
    strip_deletions(&mut merged);

    let opts = Options::default();
    let mut expected = parse(new, &opts);
    merge_adjacent_text(&mut expected);

    assert!(isomorphic(merged.root(), expected.root()));
}

#[test]
fn merged_tree_reuses_new_side_metadata() {
    let opts = Options {
        metadata: true,
        ..Options::default()
    };
    let mut o = parse(b"title: Old\n\nbody\n", &opts);
    let mut n = parse(b"title: New\n\nbody\n", &opts);
    merge_adjacent_text(&mut o);
    merge_adjacent_text(&mut n);
    let merged = diff(&o, &n);

    assert_eq!(merged.metadata.len(), 1);
    assert_eq!(merged.metadata[0].value, "New");
}

#[test]
fn threshold_is_configurable() {
    let opts = Options::default();
    let mut o = parse(b"a b\n\nx y\n", &opts);
    let mut n = parse(b"a b\n\nx z\n", &opts);
    merge_adjacent_text(&mut o);
    merge_adjacent_text(&mut n);

    // With an impossible threshold the bottom-up pass never pairs;
    // the call still produces a labelled tree.
    let merged = mdtree::diff::diff_with_threshold(&o, &n, 2.0);
    assert!(merged
        .root()
        .descendants()
        .any(|x| x.value().chng != Chng::None));
}
