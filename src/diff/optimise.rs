//! Phase 4: match optimization
//!
//! Two complementary sweeps over the new tree. Top-down pairs
//! unmatched interior children of matched parents by label.
//! Bottom-up looks at where an unmatched node's matched children
//! ended up: when more than the threshold fraction (by weight) share
//! one equal-labelled old parent, the parents pair too.

use ego_tree::Tree;

use crate::ast::MdNode;
use crate::diff::matching::match_eq;
use crate::diff::XMap;

/// Pair unmatched interior children of matched nodes, by label,
/// recursing into pairs made here.
pub(crate) fn optimise_topdown(
    new_tree: &Tree<MdNode>,
    newmap: &mut XMap,
    old_tree: &Tree<MdNode>,
    oldmap: &mut XMap,
    new_id: usize,
) {
    let match_id = match newmap.get(new_id).matched {
        Some(m) => m,
        None => return,
    };

    let children: Vec<usize> = new_tree
        .get(newmap.get(new_id).node)
        .map(|n| n.children().map(|c| c.value().id).collect())
        .unwrap_or_default();

    for nchild in children {
        let nref = match new_tree.get(newmap.get(nchild).node) {
            Some(n) => n,
            None => continue,
        };
        // Only inner nodes take part.
        if !nref.has_children() {
            continue;
        }
        if newmap.get(nchild).matched.is_some() {
            continue;
        }

        let mchildren: Vec<usize> = old_tree
            .get(oldmap.get(match_id).node)
            .map(|n| n.children().map(|c| c.value().id).collect())
            .unwrap_or_default();

        let mut paired = false;
        for mchild in mchildren {
            let mref = match old_tree.get(oldmap.get(mchild).node) {
                Some(n) => n,
                None => continue,
            };
            if !mref.has_children() {
                continue;
            }
            if oldmap.get(mchild).matched.is_some() {
                continue;
            }
            if !match_eq(&nref.value().kind, &mref.value().kind) {
                continue;
            }

            newmap.get_mut(nchild).matched = Some(mchild);
            oldmap.get_mut(mchild).matched = Some(nchild);
            paired = true;
            break;
        }

        if paired {
            optimise_topdown(new_tree, newmap, old_tree, oldmap, nchild);
        }
    }
}

/// Post-order: match an unmatched inner node with the old parent
/// that already holds at least `threshold` of its children's matches
/// by weight.
pub(crate) fn optimise_bottomup(
    new_tree: &Tree<MdNode>,
    newmap: &mut XMap,
    old_tree: &Tree<MdNode>,
    oldmap: &mut XMap,
    new_id: usize,
    threshold: f64,
) {
    let children: Vec<usize> = new_tree
        .get(newmap.get(new_id).node)
        .map(|n| n.children().map(|c| c.value().id).collect())
        .unwrap_or_default();
    if children.is_empty() {
        return;
    }

    let mut tw = 0.0;
    for &c in &children {
        tw += newmap.get(c).weight;
        optimise_bottomup(new_tree, newmap, old_tree, oldmap, c, threshold);
    }

    if newmap.get(new_id).matched.is_some() {
        return;
    }

    let nkind = &new_tree
        .get(newmap.get(new_id).node)
        .unwrap()
        .value()
        .kind;

    let mut maxw = 0.0;
    let mut maxn: Option<usize> = None;

    for &c in &children {
        let m = match newmap.get(c).matched {
            Some(m) => m,
            None => continue,
        };
        let on = match old_tree
            .get(oldmap.get(m).node)
            .and_then(|n| n.parent())
        {
            Some(p) => p,
            None => continue,
        };
        let on_id = on.value().id;
        if maxn == Some(on_id) {
            continue;
        }
        if !match_eq(nkind, &on.value().kind) {
            continue;
        }

        // Fraction of our children matched below this old parent.
        let mut w = 0.0;
        for &cc in &children {
            if let Some(mm) = newmap.get(cc).matched {
                let mm_parent = old_tree
                    .get(oldmap.get(mm).node)
                    .and_then(|n| n.parent())
                    .map(|p| p.value().id);
                if mm_parent == Some(on_id) {
                    w += newmap.get(cc).weight;
                }
            }
        }

        if w > maxw {
            maxw = w;
            maxn = Some(on_id);
        }
    }

    let maxn = match maxn {
        Some(m) => m,
        None => return,
    };

    if maxw / tw >= threshold {
        newmap.get_mut(new_id).matched = Some(maxn);
        oldmap.get_mut(maxn).matched = Some(new_id);
    }
}
