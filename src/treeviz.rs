//! Tree-dump renderer
//!
//! The reference renderer of the crate: a read-only walk producing
//! an indented listing of the tree, one node per line, with the
//! attributes that matter for inspection. Diff output prefixes
//! changed nodes with `INSERT:` / `DELETE:`. The dump is
//! deterministic, so two isomorphic trees render identically.

use ego_tree::NodeRef;

use crate::ast::{Chng, Document, ListFlags, MdNode, NodeKind};

/// Render the whole document tree.
pub fn render(doc: &Document) -> String {
    let mut out = String::new();
    rndr(&mut out, doc.root(), 0);
    out
}

/// First bytes of a payload, printable-escaped, capped at 20.
fn short(b: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < 20 && i < b.len() {
        match b[i] {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push('?'),
            c => out.push(c as char),
        }
        i += 1;
    }
    if i < b.len() {
        out.push_str("...");
    }
    out
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn attr_line(out: &mut String, indent: usize, line: &str) {
    pad(out, indent + 1);
    out.push_str(line);
    out.push('\n');
}

fn scope(flags: ListFlags) -> &'static str {
    if flags.contains(ListFlags::BLOCK) {
        "block"
    } else {
        "span"
    }
}

fn rndr(out: &mut String, n: NodeRef<'_, MdNode>, indent: usize) {
    pad(out, indent);
    match n.value().chng {
        Chng::Insert => out.push_str("INSERT: "),
        Chng::Delete => out.push_str("DELETE: "),
        Chng::None => {}
    }
    out.push_str(n.value().kind.name());
    out.push('\n');

    match &n.value().kind {
        NodeKind::Image {
            link, title, dims, ..
        } => {
            let mut line = format!("source: {}", short(link));
            if !dims.is_empty() {
                line.push_str(&format!("({})", short(dims)));
            }
            attr_line(out, indent, &line);
            if !title.is_empty() {
                attr_line(out, indent, &format!("title: {}", short(title)));
            }
        }
        NodeKind::Header { level, attr_id } => {
            attr_line(out, indent, &format!("level: {}", level));
            if !attr_id.is_empty() {
                attr_line(out, indent, &format!("id: {}", short(attr_id)));
            }
        }
        NodeKind::FootnoteRef { num } | NodeKind::FootnoteDef { num } => {
            attr_line(out, indent, &format!("number: {}", num));
        }
        NodeKind::RawHtml { text } | NodeKind::BlockHtml { text } => {
            attr_line(
                out,
                indent,
                &format!("data: {} Bytes: {}", text.len(), short(text)),
            );
        }
        NodeKind::BlockCode { text, lang } => {
            attr_line(
                out,
                indent,
                &format!("data: {} Bytes: {}", text.len(), short(text)),
            );
            if !lang.is_empty() {
                attr_line(out, indent, &format!("lang: {}", short(lang)));
            }
        }
        NodeKind::Codespan { text } => {
            attr_line(
                out,
                indent,
                &format!("data: {} Bytes: {}", text.len(), short(text)),
            );
        }
        NodeKind::Definition { flags } => {
            attr_line(out, indent, &format!("item scope: {}", scope(*flags)));
        }
        NodeKind::ListItem { flags, num } => {
            attr_line(out, indent, &format!("item scope: {}", scope(*flags)));
            attr_line(out, indent, &format!("number: {}", num));
        }
        NodeKind::List { flags, start, .. } => {
            let ty = if flags.contains(ListFlags::ORDERED) {
                "ordered"
            } else {
                "unordered"
            };
            attr_line(out, indent, &format!("list type: {}", ty));
            if flags.contains(ListFlags::ORDERED) && *start > 1 {
                attr_line(out, indent, &format!("start: {}", start));
            }
        }
        NodeKind::Meta { key } => {
            attr_line(out, indent, &format!("key: {}", short(key)));
        }
        NodeKind::MathBlock { text, block_mode } => {
            attr_line(
                out,
                indent,
                &format!(
                    "blockmode: {}",
                    if *block_mode { "block" } else { "inline" }
                ),
            );
            attr_line(
                out,
                indent,
                &format!("data: {} Bytes: {}", text.len(), short(text)),
            );
        }
        NodeKind::Entity { text } => {
            attr_line(out, indent, &format!("value: {}", short(text)));
        }
        NodeKind::Link { link, title, .. } => {
            attr_line(out, indent, &format!("link: {}", short(link)));
            if !title.is_empty() {
                attr_line(out, indent, &format!("title: {}", short(title)));
            }
        }
        NodeKind::LinkAuto { link, .. } => {
            attr_line(out, indent, &format!("link: {}", short(link)));
        }
        NodeKind::NormalText { text } => {
            attr_line(
                out,
                indent,
                &format!("data: {} Bytes: {}", text.len(), short(text)),
            );
        }
        NodeKind::TableCell { col, columns, .. } => {
            attr_line(out, indent, &format!("column: {}/{}", col, columns));
        }
        _ => {}
    }

    for child in n.children() {
        rndr(out, child, indent + 1);
    }
}
