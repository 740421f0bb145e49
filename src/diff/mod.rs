//! Semantic tree differ
//!
//! An adaptation of the XML tree differencing algorithm of Cobéna,
//! Abiteboul and Marian ("Detecting Changes in XML Documents",
//! <https://www.cs.rutgers.edu/~amelie/papers/2002/diff.pdf>) to
//! Markdown ASTs, in five phases:
//!
//! 1. per-node descriptor tables for both trees;
//! 2. content-hash signatures and weights ([`signature`]);
//! 3. weighted priority matching with downward and upward
//!    propagation ([`matching`]);
//! 4. top-down / bottom-up match optimization ([`optimise`]);
//! 5. a lockstep merge producing one labelled tree, with a
//!    word-level LCS over facing text runs ([`merge`]).
//!
//! The input trees are read-only; the output is a fresh tree with
//! fresh preorder identifiers.

pub(crate) mod matching;
pub(crate) mod merge;
pub(crate) mod optimise;
pub(crate) mod signature;

use std::collections::BinaryHeap;

use ego_tree::NodeId;

use crate::ast::Document;

/// Fraction of matched child weight at which bottom-up optimization
/// pairs two parents.
pub const BOTTOMUP_THRESHOLD: f64 = 0.5;

/// Per-node descriptor.
#[derive(Debug, Clone)]
pub(crate) struct XNode {
    /// The described node in its own tree.
    pub node: NodeId,
    /// MD5 digest over the subtree content.
    pub sig: [u8; 16],
    /// Priority-queue weight.
    pub weight: f64,
    /// Matched counterpart in the other tree, by preorder id.
    pub matched: Option<usize>,
    /// Optimality of the current best candidate.
    pub opt: usize,
    /// Best candidate during phase 3.
    pub optmatch: Option<usize>,
}

/// Dense descriptor table indexed by preorder id. Merged-text
/// preprocessing leaves id gaps, which stay `None`.
#[derive(Debug, Default)]
pub(crate) struct XMap {
    pub nodes: Vec<Option<XNode>>,
    pub max_id: usize,
    pub max_weight: f64,
}

impl XMap {
    pub(crate) fn get(&self, id: usize) -> &XNode {
        self.nodes[id].as_ref().unwrap()
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> &mut XNode {
        self.nodes[id].as_mut().unwrap()
    }
}

/// Compute the semantic difference between two parsed documents.
///
/// The result is a new document whose tree mixes both inputs: nodes
/// only in `old` appear labelled `Delete`, nodes only in `new`
/// labelled `Insert`, matched nodes recurse. For the word-level text
/// diff to be useful, merge adjacent text runs in both inputs first
/// (see [`crate::merge_adjacent_text`]).
pub fn diff(old: &Document, new: &Document) -> Document {
    diff_with_threshold(old, new, BOTTOMUP_THRESHOLD)
}

/// [`diff`] with an explicit bottom-up pairing threshold.
pub fn diff_with_threshold(old: &Document, new: &Document, threshold: f64) -> Document {
    let mut oldmap = XMap::default();
    let mut newmap = XMap::default();

    // Phase 2: signatures and weights.
    signature::assign_sigs(None, &mut oldmap, old.tree.root());
    signature::assign_sigs(None, &mut newmap, new.tree.root());

    let old_root = old.tree.root().value().id;
    let new_root = new.tree.root().value().id;

    // Phase 3: match-make while the queue drains.
    let mut pq: BinaryHeap<matching::QueueEntry> = BinaryHeap::new();
    matching::pqueue(&newmap, new_root, &mut pq);

    while let Some(entry) = pq.pop() {
        let n_id = entry.id;
        if newmap.get(n_id).matched.is_some() {
            continue;
        }

        // Equal signatures make a candidate; the best optimality
        // wins.
        for i in 0..=oldmap.max_id {
            let unmatched_same_sig = match &oldmap.nodes[i] {
                Some(x) => x.matched.is_none() && x.sig == newmap.get(n_id).sig,
                None => false,
            };
            if unmatched_same_sig {
                matching::candidate(&new.tree, &mut newmap, n_id, &old.tree, &oldmap, i);
            }
        }

        let optmatch = newmap.get(n_id).optmatch;
        match optmatch {
            None => {
                // No match: the children line up next.
                let children: Vec<usize> = new
                    .tree
                    .get(newmap.get(n_id).node)
                    .map(|n| n.children().map(|c| c.value().id).collect())
                    .unwrap_or_default();
                for c in children {
                    matching::pqueue(&newmap, c, &mut pq);
                }
            }
            Some(target) => {
                matching::match_down(
                    &new.tree, &mut newmap, n_id, &old.tree, &mut oldmap, target,
                );
                matching::match_up(
                    &new.tree, &mut newmap, n_id, &old.tree, &mut oldmap, target,
                );
            }
        }
    }

    // The merge walks from roots that are matched to each other;
    // completely disjoint documents still pair there (both ROOT).
    if newmap.get(new_root).matched != Some(old_root) {
        if let Some(p) = newmap.get(new_root).matched {
            oldmap.get_mut(p).matched = None;
        }
        if let Some(p) = oldmap.get(old_root).matched {
            newmap.get_mut(p).matched = None;
        }
        newmap.get_mut(new_root).matched = Some(old_root);
        oldmap.get_mut(old_root).matched = Some(new_root);
    }

    // Phase 4: optimization sweeps.
    optimise::optimise_topdown(&new.tree, &mut newmap, &old.tree, &mut oldmap, new_root);
    optimise::optimise_bottomup(
        &new.tree,
        &mut newmap,
        &old.tree,
        &mut oldmap,
        new_root,
        threshold,
    );

    // Phase 5: merge into the labelled output tree.
    let (tree, max_id) = merge::merge(&old.tree, &oldmap, &new.tree, &newmap);

    Document {
        tree,
        max_id,
        metadata: new.metadata.clone(),
        warnings: Vec::new(),
    }
}
