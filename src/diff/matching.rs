//! Phase 3: optimal match selection and propagation
//!
//! New-tree nodes leave a max-heap in order of descending weight
//! (ties to the lower preorder id) and look for old-tree nodes with
//! the same signature. Candidates are ranked by an optimality score
//! counting matched ancestors; the winner's match propagates down
//! through the whole subtree and up along equal-labelled ancestors.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ego_tree::Tree;

use crate::ast::{MdNode, NodeKind};
use crate::diff::XMap;

/// Heap entry: heaviest first, then closest to the parse root.
#[derive(Debug, PartialEq)]
pub(crate) struct QueueEntry {
    pub weight: f64,
    pub id: usize,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.weight.partial_cmp(&other.weight) {
            Some(Ordering::Equal) | None => other.id.cmp(&self.id),
            Some(ord) => ord,
        }
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) fn pqueue(map: &XMap, id: usize, pq: &mut BinaryHeap<QueueEntry>) {
    pq.push(QueueEntry {
        weight: map.get(id).weight,
        id,
    });
}

/// Number of ancestor levels to examine: `ln(n) * W/W_0`, at least
/// one.
fn search_height(map: &XMap, weight: f64) -> usize {
    let d = ((map.max_id as f64).ln() * weight / map.max_weight).ceil();
    if d >= 1.0 {
        d as usize
    } else {
        1
    }
}

/// Do the two nodes carry the same label? Links must also agree on
/// target and title, since their contained nodes only cover the
/// display text.
pub(crate) fn match_eq(a: &NodeKind, b: &NodeKind) -> bool {
    if !a.same_label(b) {
        return false;
    }

    if let (
        NodeKind::Link {
            link: l1, title: t1, ..
        },
        NodeKind::Link {
            link: l2, title: t2, ..
        },
    ) = (a, b)
    {
        return l1 == l2 && t1 == t2;
    }

    true
}

fn parent_id(tree: &Tree<MdNode>, map: &XMap, id: usize) -> Option<usize> {
    tree.get(map.get(id).node)
        .and_then(|n| n.parent())
        .map(|p| p.value().id)
}

fn is_singleton(tree: &Tree<MdNode>, map: &XMap, id: usize) -> bool {
    match tree.get(map.get(id).node) {
        Some(n) => n.prev_sibling().is_none() && n.next_sibling().is_none(),
        None => true,
    }
}

/// Candidate optimality: one plus the number of ancestor levels, up
/// to the search height, at which the two climbs are already matched
/// to each other.
fn optimality(
    new_tree: &Tree<MdNode>,
    newmap: &XMap,
    new_id: usize,
    old_tree: &Tree<MdNode>,
    oldmap: &XMap,
    old_id: usize,
) -> usize {
    let d = search_height(newmap, newmap.get(new_id).weight);

    let mut opt = 1;
    let mut i = 0;
    let mut nid = new_id;
    let mut oid = old_id;

    while i < d {
        let np = match parent_id(new_tree, newmap, nid) {
            Some(p) => p,
            None => break,
        };
        let op = match parent_id(old_tree, oldmap, oid) {
            Some(p) => p,
            None => break,
        };
        nid = np;
        oid = op;
        if newmap.get(nid).matched == Some(oid) {
            opt += 1;
        }
        i += 1;
    }

    opt
}

/// Fold `old_id` into the running best candidate for `new_id`. Ties
/// on optimality go to the candidate whose id is numerically closest.
pub(crate) fn candidate(
    new_tree: &Tree<MdNode>,
    newmap: &mut XMap,
    new_id: usize,
    old_tree: &Tree<MdNode>,
    oldmap: &XMap,
    old_id: usize,
) {
    let held = newmap.get(new_id).optmatch;
    let held_opt = newmap.get(new_id).opt;
    let opt = optimality(new_tree, newmap, new_id, old_tree, oldmap, old_id);

    let held = match held {
        None => {
            let x = newmap.get_mut(new_id);
            x.optmatch = Some(old_id);
            x.opt = opt;
            return;
        }
        Some(held) => held,
    };

    if opt == held_opt {
        // Norm over the identifier space; the lesser distance wins.
        let dold = (held as i64 - new_id as i64).abs();
        let dnew = (old_id as i64 - new_id as i64).abs();
        if dold > dnew {
            let x = newmap.get_mut(new_id);
            x.optmatch = Some(old_id);
            x.opt = opt;
        }
    } else if opt > held_opt {
        let x = newmap.get_mut(new_id);
        x.optmatch = Some(old_id);
        x.opt = opt;
    }
}

/// Propagate a match downward: children of signature-equal subtrees
/// pair up one-to-one in document order.
pub(crate) fn match_down(
    new_tree: &Tree<MdNode>,
    newmap: &mut XMap,
    new_id: usize,
    old_tree: &Tree<MdNode>,
    oldmap: &mut XMap,
    old_id: usize,
) {
    newmap.get_mut(new_id).matched = Some(old_id);
    oldmap.get_mut(old_id).matched = Some(new_id);

    let new_children: Vec<usize> = new_tree
        .get(newmap.get(new_id).node)
        .map(|n| n.children().map(|c| c.value().id).collect())
        .unwrap_or_default();
    let old_children: Vec<usize> = old_tree
        .get(oldmap.get(old_id).node)
        .map(|n| n.children().map(|c| c.value().id).collect())
        .unwrap_or_default();

    debug_assert_eq!(new_children.len(), old_children.len());

    for (nc, oc) in new_children.into_iter().zip(old_children) {
        match_down(new_tree, newmap, nc, old_tree, oldmap, oc);
    }
}

/// Propagate a match upward along equal-labelled ancestors, up to
/// the search height; never overwrites an existing match. Singleton
/// chains keep propagating past the height limit.
pub(crate) fn match_up(
    new_tree: &Tree<MdNode>,
    newmap: &mut XMap,
    new_id: usize,
    old_tree: &Tree<MdNode>,
    oldmap: &mut XMap,
    old_id: usize,
) {
    let d = search_height(newmap, newmap.get(new_id).weight);

    let mut nid = new_id;
    let mut oid = old_id;
    let mut i = 0;

    while i < d {
        let np = match parent_id(new_tree, newmap, nid) {
            Some(p) => p,
            None => break,
        };
        let op = match parent_id(old_tree, oldmap, oid) {
            Some(p) => p,
            None => break,
        };

        let nk = &new_tree.get(newmap.get(np).node).unwrap().value().kind;
        let ok = &old_tree.get(oldmap.get(op).node).unwrap().value().kind;
        if !match_eq(nk, ok) {
            break;
        }

        nid = np;
        oid = op;
        if oldmap.get(oid).matched.is_some() || newmap.get(nid).matched.is_some() {
            break;
        }
        newmap.get_mut(nid).matched = Some(oid);
        oldmap.get_mut(oid).matched = Some(nid);
        i += 1;
    }

    if i != d {
        return;
    }

    // Singletons pass upward beyond the height limit.
    loop {
        if !is_singleton(new_tree, newmap, nid) || !is_singleton(old_tree, oldmap, oid) {
            break;
        }
        let np = match parent_id(new_tree, newmap, nid) {
            Some(p) => p,
            None => break,
        };
        let op = match parent_id(old_tree, oldmap, oid) {
            Some(p) => p,
            None => break,
        };

        let nk = &new_tree.get(newmap.get(np).node).unwrap().value().kind;
        let ok = &old_tree.get(oldmap.get(op).node).unwrap().value().kind;
        if !match_eq(nk, ok) {
            break;
        }

        nid = np;
        oid = op;
        if oldmap.get(oid).matched.is_some() || newmap.get(nid).matched.is_some() {
            break;
        }
        newmap.get_mut(nid).matched = Some(oid);
        oldmap.get_mut(oid).matched = Some(nid);
    }
}
