//! Phase 5: merging the two trees into the labelled output
//!
//! A depth-first walk in lockstep from the matched roots. Matched
//! pairs recurse; unmatched old nodes clone in as deletions,
//! unmatched new nodes as insertions; facing unmatched text runs go
//! through a word-level LCS so only the changed words carry labels.

use ego_tree::{NodeId, NodeRef, Tree};
use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::ast::{Chng, MdNode, NodeKind};
use crate::diff::XMap;

/// One whitespace-separated word with its spacing context. Equality,
/// ordering and hashing see only the bytes, so the LCS compares by
/// content alone.
#[derive(Debug, Clone)]
struct SesToken<'a> {
    text: &'a [u8],
    head_space: bool,
    tail_space: bool,
}

impl PartialEq for SesToken<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for SesToken<'_> {}

impl std::hash::Hash for SesToken<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl PartialOrd for SesToken<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SesToken<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.text.cmp(other.text)
    }
}

fn tokenise(text: &[u8]) -> Vec<SesToken<'_>> {
    let sz = text.len();
    let mut toks = Vec::new();

    let head = sz > 0 && text[0].is_ascii_whitespace();
    let mut i = 0;
    while i < sz && text[i].is_ascii_whitespace() {
        i += 1;
    }

    while i < sz {
        let start = i;
        while i < sz && !text[i].is_ascii_whitespace() {
            i += 1;
        }
        toks.push(SesToken {
            text: &text[start..i],
            head_space: toks.is_empty() && head,
            tail_space: i < sz,
        });
        while i < sz && text[i].is_ascii_whitespace() {
            i += 1;
        }
    }

    toks
}

fn next_id(id: &mut usize) -> usize {
    let v = *id;
    *id += 1;
    v
}

fn append(
    out: &mut Tree<MdNode>,
    at: NodeId,
    kind: NodeKind,
    chng: Chng,
    id: &mut usize,
) -> NodeId {
    let mut node = MdNode::new(next_id(id), kind);
    node.chng = chng;
    out.get_mut(at).unwrap().append(node).id()
}

/// Deep-clone `src` below `at`; only the subtree root carries the
/// change label.
pub(crate) fn clone_subtree(
    out: &mut Tree<MdNode>,
    at: NodeId,
    src: NodeRef<'_, MdNode>,
    chng: Chng,
    id: &mut usize,
) -> NodeId {
    let top = append(out, at, src.value().kind.clone(), chng, id);
    for child in src.children() {
        clone_subtree(out, top, child, Chng::None, id);
    }
    top
}

fn emit_token(out: &mut Tree<MdNode>, at: NodeId, tok: &SesToken<'_>, chng: Chng, id: &mut usize) {
    if tok.head_space {
        append(
            out,
            at,
            NodeKind::NormalText {
                text: b" ".to_vec(),
            },
            Chng::None,
            id,
        );
    }

    append(
        out,
        at,
        NodeKind::NormalText {
            text: tok.text.to_vec(),
        },
        chng,
        id,
    );

    if tok.tail_space {
        append(
            out,
            at,
            NodeKind::NormalText {
                text: b" ".to_vec(),
            },
            Chng::None,
            id,
        );
    }
}

/// Word-level shortest edit script between two text nodes, emitted
/// as a run of labelled NORMAL_TEXT children.
fn node_lcs(
    old_text: &[u8],
    new_text: &[u8],
    out: &mut Tree<MdNode>,
    at: NodeId,
    id: &mut usize,
) {
    let oldtok = tokenise(old_text);
    let newtok = tokenise(new_text);

    for op in capture_diff_slices(Algorithm::Myers, &oldtok, &newtok) {
        match op {
            DiffOp::Equal {
                new_index, len, ..
            } => {
                for tok in &newtok[new_index..new_index + len] {
                    emit_token(out, at, tok, Chng::None, id);
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for tok in &oldtok[old_index..old_index + old_len] {
                    emit_token(out, at, tok, Chng::Delete, id);
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for tok in &newtok[new_index..new_index + new_len] {
                    emit_token(out, at, tok, Chng::Insert, id);
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                for tok in &oldtok[old_index..old_index + old_len] {
                    emit_token(out, at, tok, Chng::Delete, id);
                }
                for tok in &newtok[new_index..new_index + new_len] {
                    emit_token(out, at, tok, Chng::Insert, id);
                }
            }
        }
    }
}

fn text_of(n: NodeRef<'_, MdNode>) -> Option<&[u8]> {
    match &n.value().kind {
        NodeKind::NormalText { text } => Some(text),
        _ => None,
    }
}

/// Merge matched subtree pair into a fresh tree; the entry point
/// creates the output root and recurses.
pub(crate) fn merge(
    old_tree: &Tree<MdNode>,
    oldmap: &XMap,
    new_tree: &Tree<MdNode>,
    newmap: &XMap,
) -> (Tree<MdNode>, usize) {
    let mut id = 0usize;
    let mut out = Tree::new(MdNode::new(
        next_id(&mut id),
        new_tree.root().value().kind.clone(),
    ));
    let out_root = out.root().id();

    merge_children(
        old_tree,
        oldmap,
        old_tree.root(),
        new_tree,
        newmap,
        new_tree.root(),
        &mut out,
        out_root,
        &mut id,
    );

    (out, id)
}

#[allow(clippy::too_many_arguments)]
fn merge_children(
    old_tree: &Tree<MdNode>,
    oldmap: &XMap,
    nold: NodeRef<'_, MdNode>,
    new_tree: &Tree<MdNode>,
    newmap: &XMap,
    nnew: NodeRef<'_, MdNode>,
    out: &mut Tree<MdNode>,
    out_at: NodeId,
    id: &mut usize,
) {
    let oldch: Vec<NodeRef<'_, MdNode>> = nold.children().collect();
    let newch: Vec<NodeRef<'_, MdNode>> = nnew.children().collect();

    let mut oi = 0usize;
    let mut ni = 0usize;

    while ni < newch.len() {
        // Flush nodes deleted from the old tree at this level:
        // unmatched, and not text (text waits for the LCS below).
        while oi < oldch.len() {
            let o = oldch[oi];
            if oldmap.get(o.value().id).matched.is_some() || text_of(o).is_some() {
                break;
            }
            clone_subtree(out, out_at, o, Chng::Delete, id);
            oi += 1;
        }

        // Flush inserted new nodes the same way.
        while ni < newch.len() {
            let n = newch[ni];
            if newmap.get(n.value().id).matched.is_some() || text_of(n).is_some() {
                break;
            }
            clone_subtree(out, out_at, n, Chng::Insert, id);
            ni += 1;
        }

        // Facing unmatched text runs: word-level LCS.
        if oi < oldch.len() && ni < newch.len() {
            let o = oldch[oi];
            let n = newch[ni];
            if oldmap.get(o.value().id).matched.is_none()
                && newmap.get(n.value().id).matched.is_none()
            {
                if let (Some(ot), Some(nt)) = (text_of(o), text_of(n)) {
                    node_lcs(ot, nt, out, out_at, id);
                    oi += 1;
                    ni += 1;
                }
            }
        }

        // Whatever unmatched remains on either side goes out as
        // plain deletion / insertion.
        while oi < oldch.len() {
            let o = oldch[oi];
            if oldmap.get(o.value().id).matched.is_some() {
                break;
            }
            clone_subtree(out, out_at, o, Chng::Delete, id);
            oi += 1;
        }

        while ni < newch.len() {
            let n = newch[ni];
            if newmap.get(n.value().id).matched.is_some() {
                break;
            }
            clone_subtree(out, out_at, n, Chng::Insert, id);
            ni += 1;
        }

        if ni >= newch.len() {
            break;
        }

        // The new head is matched somewhere. If its partner is ahead
        // in this level, flush old nodes as deletions up to it and
        // recurse; otherwise the node moved in from elsewhere.
        let n = newch[ni];
        let n_id = n.value().id;
        let found = (oi..oldch.len())
            .find(|&k| oldmap.get(oldch[k].value().id).matched == Some(n_id));

        match found {
            None => {
                clone_subtree(out, out_at, n, Chng::Insert, id);
                ni += 1;
                continue;
            }
            Some(k) => {
                while oi < k {
                    clone_subtree(out, out_at, oldch[oi], Chng::Delete, id);
                    oi += 1;
                }

                let pair = append(out, out_at, n.value().kind.clone(), Chng::None, id);
                merge_children(
                    old_tree, oldmap, oldch[oi], new_tree, newmap, n, out, pair, id,
                );
                oi += 1;
                ni += 1;
            }
        }
    }

    // Flush remaining old nodes.
    while oi < oldch.len() {
        clone_subtree(out, out_at, oldch[oi], Chng::Delete, id);
        oi += 1;
    }
}
