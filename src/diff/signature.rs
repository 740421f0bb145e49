//! Phase 2: signatures and weights
//!
//! Every node gets an MD5 digest over its label, its children's
//! digests and its context-independent attributes, plus a real
//! weight: leaves carrying bytes weigh `1 + ln(payload)`, interior
//! nodes `1 + sum(children)`. Attributes that a renderer may rewrite
//! without a semantic change (footnote numbers, table column
//! metrics) stay out of the digest.

use ego_tree::NodeRef;

use crate::ast::{AutolinkType, MdNode, NodeKind};
use crate::diff::{XMap, XNode};

fn consume_usize(ctx: &mut md5::Context, v: usize) {
    ctx.consume((v as u64).to_le_bytes());
}

fn consume_u32(ctx: &mut md5::Context, v: u32) {
    ctx.consume(v.to_le_bytes());
}

/// Recursively assign signature and weight for the subtree at `n`,
/// feeding the digest into `parent` as well. Returns the weight.
pub(crate) fn assign_sigs(
    parent: Option<&mut md5::Context>,
    map: &mut XMap,
    n: NodeRef<'_, MdNode>,
) -> f64 {
    let id = n.value().id;
    if id >= map.nodes.len() {
        map.nodes.resize_with(id + 64, || None);
    }
    if id > map.max_id {
        map.max_id = id;
    }

    let mut ctx = md5::Context::new();
    consume_u32(&mut ctx, n.value().kind.code());

    let mut v = 0.0;
    for child in n.children() {
        v += assign_sigs(Some(&mut ctx), map, child);
    }

    // Leaf payload size for the logarithmic weight.
    let payload = match &n.value().kind {
        NodeKind::BlockCode { text, .. } => Some(text.len()),
        NodeKind::BlockHtml { text } => Some(text.len()),
        NodeKind::LinkAuto { link, .. } => Some(link.len()),
        NodeKind::Codespan { text } => Some(text.len()),
        NodeKind::Image {
            link,
            title,
            dims,
            alt,
            ..
        } => Some(link.len() + title.len() + dims.len() + alt.len()),
        NodeKind::RawHtml { text } => Some(text.len()),
        NodeKind::NormalText { text } => Some(text.len()),
        NodeKind::Entity { text } => Some(text.len()),
        _ => None,
    };

    let weight = match payload {
        Some(bytes) => 1.0 + (bytes as f64).ln(),
        None => v + 1.0,
    };

    // Context-independent attributes augment the signature.
    match &n.value().kind {
        NodeKind::List { flags, .. } => consume_u32(&mut ctx, flags.bits()),
        NodeKind::ListItem { flags, num } => {
            consume_u32(&mut ctx, flags.bits());
            consume_usize(&mut ctx, *num);
        }
        NodeKind::Header { level, .. } => consume_usize(&mut ctx, *level),
        NodeKind::NormalText { text } => ctx.consume(text),
        NodeKind::Entity { text } => ctx.consume(text),
        NodeKind::LinkAuto { link, text, kind } => {
            ctx.consume(link);
            ctx.consume(text);
            consume_u32(
                &mut ctx,
                match kind {
                    AutolinkType::Normal => 1,
                    AutolinkType::Email => 2,
                },
            );
        }
        NodeKind::RawHtml { text } => ctx.consume(text),
        NodeKind::Link { link, title, .. } => {
            ctx.consume(link);
            ctx.consume(title);
        }
        NodeKind::BlockCode { text, lang } => {
            ctx.consume(text);
            ctx.consume(lang);
        }
        NodeKind::Codespan { text } => ctx.consume(text),
        NodeKind::TableHeader { .. } => {
            // Column metrics are mutable; hash nothing.
        }
        NodeKind::TableCell { flags, .. } => {
            // Column index/count are mutable; only alignment counts.
            consume_u32(&mut ctx, flags.bits());
        }
        NodeKind::FootnoteDef { .. } | NodeKind::FootnoteRef { .. } => {
            // Footnote numbers are mutable; hash nothing.
        }
        NodeKind::Image {
            link,
            title,
            dims,
            alt,
            ..
        } => {
            ctx.consume(link);
            ctx.consume(title);
            ctx.consume(dims);
            ctx.consume(alt);
        }
        NodeKind::MathBlock { block_mode, .. } => {
            consume_u32(&mut ctx, *block_mode as u32);
        }
        _ => {}
    }

    let digest = ctx.compute();
    if let Some(parent) = parent {
        parent.consume(digest.0);
    }

    if weight > map.max_weight {
        map.max_weight = weight;
    }

    map.nodes[id] = Some(XNode {
        node: n.id(),
        sig: digest.0,
        weight,
        matched: None,
        opt: 0,
        optmatch: None,
    });

    weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::Options;

    fn sig_of_root(input: &[u8]) -> ([u8; 16], f64) {
        let doc = parse(input, &Options::default());
        let mut map = XMap::default();
        let w = assign_sigs(None, &mut map, doc.root());
        let x = map.get(doc.root().value().id);
        (x.sig, w)
    }

    #[test]
    fn equal_documents_have_equal_sigs() {
        let (a, _) = sig_of_root(b"# T\n\nbody text\n");
        let (b, _) = sig_of_root(b"# T\n\nbody text\n");
        assert_eq!(a, b);
    }

    #[test]
    fn text_changes_the_sig() {
        let (a, _) = sig_of_root(b"body one\n");
        let (b, _) = sig_of_root(b"body two\n");
        assert_ne!(a, b);
    }

    #[test]
    fn interior_weight_accumulates() {
        let doc = parse(b"a b c d e f\n", &Options::default());
        let mut map = XMap::default();
        assign_sigs(None, &mut map, doc.root());

        // ROOT = 1 + (DOC_HEADER + PARAGRAPH + DOC_FOOTER).
        let para = doc.root().children().nth(1).unwrap();
        let text = para.first_child().unwrap();
        let text_w = map.get(text.value().id).weight;
        assert!((text_w - (1.0 + (11f64).ln())).abs() < 1e-9);

        let para_w = map.get(para.value().id).weight;
        assert!((para_w - (1.0 + text_w)).abs() < 1e-9);
    }

    #[test]
    fn footnote_numbers_stay_out_of_sigs() {
        let opts = Options {
            footnotes: true,
            ..Options::default()
        };
        let a = parse(b"x [^a]\n\n[^a]: one\n", &opts);
        let b = parse(b"y [^b] x [^a]\n\n[^a]: one\n[^b]: two\n", &opts);

        // The FOOTNOTE_DEF for "one" carries num 1 in `a` and num 2
        // in `b`, yet the signatures agree.
        let mut ma = XMap::default();
        assign_sigs(None, &mut ma, a.root());
        let mut mb = XMap::default();
        assign_sigs(None, &mut mb, b.root());

        let def_a = a
            .root()
            .descendants()
            .find(|n| matches!(n.value().kind, NodeKind::FootnoteDef { num: 1 }))
            .unwrap();
        let def_b = b
            .root()
            .descendants()
            .find(|n| matches!(n.value().kind, NodeKind::FootnoteDef { num: 2 }))
            .unwrap();
        assert_eq!(
            ma.get(def_a.value().id).sig,
            mb.get(def_b.value().id).sig
        );
    }
}
