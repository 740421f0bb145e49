//! Markdown parser
//!
//! Three passes over caller-provided bytes: preprocessing (BOM skip,
//! tab expansion, newline normalization), collection of link
//! references / footnote definitions / metadata into side tables,
//! then the recursive block parse with span parsing inside block
//! content. Every node receives a monotonically increasing preorder
//! identifier.
//!
//! Malformed input never fails: whatever cannot be recognized is
//! emitted as best-effort text, and diagnostics are collected as
//! advisory [`Warning`](crate::ast::Warning)s on the output.

pub mod autolink;
pub mod block;
pub mod inline;
pub mod metadata;
pub mod references;
pub mod scan;

use ego_tree::{NodeId, Tree};

use crate::ast::{Document, MdNode, MetaEntry, NodeKind, Warning};
use crate::Options;
use references::{FootnoteList, RefTable};
use scan::expand_tabs;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Span-level dispatch classes; one per active character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    None,
    Emphasis,
    Codespan,
    Linebreak,
    Link,
    Image,
    Langle,
    Escape,
    Entity,
    AutolinkUrl,
    AutolinkEmail,
    AutolinkWww,
    Superscript,
    Subscript,
    Math,
}

/// Parser state for one document.
pub struct Parser<'a> {
    pub(crate) opts: &'a Options,
    pub(crate) tree: Tree<MdNode>,
    pub(crate) current: NodeId,
    pub(crate) next_id: usize,
    pub(crate) refs: RefTable,
    pub(crate) footnotes: FootnoteList,
    /// Indices into `footnotes.entries`, in order of first use.
    pub(crate) used_footnotes: Vec<usize>,
    pub(crate) active: [Trigger; 256],
    pub(crate) span_depth: usize,
    pub(crate) block_depth: usize,
    pub(crate) in_link_body: bool,
    pub(crate) metadata: Vec<MetaEntry>,
    pub(crate) warnings: Vec<Warning>,
}

/// Parse UTF-8 Markdown bytes into a [`Document`].
pub fn parse(input: &[u8], opts: &Options) -> Document {
    Parser::new(opts).run(input)
}

impl<'a> Parser<'a> {
    pub fn new(opts: &'a Options) -> Self {
        let tree = Tree::new(MdNode::new(0, NodeKind::Root));
        let current = tree.root().id();

        let mut active = [Trigger::None; 256];
        active[b'*' as usize] = Trigger::Emphasis;
        active[b'_' as usize] = Trigger::Emphasis;
        if opts.strikethrough {
            active[b'~' as usize] = Trigger::Emphasis;
        } else if opts.superscript {
            active[b'~' as usize] = Trigger::Subscript;
        }
        if opts.highlight {
            active[b'=' as usize] = Trigger::Emphasis;
        }
        active[b'`' as usize] = Trigger::Codespan;
        active[b'\n' as usize] = Trigger::Linebreak;
        active[b'[' as usize] = Trigger::Link;
        active[b'!' as usize] = Trigger::Image;
        active[b'<' as usize] = Trigger::Langle;
        active[b'\\' as usize] = Trigger::Escape;
        active[b'&' as usize] = Trigger::Entity;
        if opts.autolink {
            active[b':' as usize] = Trigger::AutolinkUrl;
            active[b'@' as usize] = Trigger::AutolinkEmail;
            active[b'w' as usize] = Trigger::AutolinkWww;
        }
        if opts.superscript {
            active[b'^' as usize] = Trigger::Superscript;
        }
        if opts.math {
            active[b'$' as usize] = Trigger::Math;
        }

        Parser {
            opts,
            tree,
            current,
            next_id: 1,
            refs: RefTable::new(),
            footnotes: FootnoteList::new(),
            used_footnotes: Vec::new(),
            active,
            span_depth: 0,
            block_depth: 0,
            in_link_body: false,
            metadata: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn trigger(&self, c: u8) -> Trigger {
        self.active[c as usize]
    }

    /// Append a node below the current one and descend into it.
    pub(crate) fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;

        let node = self
            .tree
            .get_mut(self.current)
            .unwrap()
            .append(MdNode::new(id, kind))
            .id();
        self.current = node;
        node
    }

    /// Ascend back to the parent of `n`.
    pub(crate) fn pop_node(&mut self, n: NodeId) {
        debug_assert_eq!(self.current, n);
        if let Some(parent) = self.tree.get(n).and_then(|x| x.parent()) {
            self.current = parent.id();
        }
    }

    pub(crate) fn last_child_of_current(&self) -> Option<NodeId> {
        self.tree
            .get(self.current)
            .and_then(|n| n.children().last())
            .map(|n| n.id())
    }

    fn run(mut self, input: &[u8]) -> Document {
        let size = input.len();
        let mut beg = 0usize;

        if input.starts_with(UTF8_BOM) {
            beg += UTF8_BOM.len();
        }

        // Zeroth pass: metadata, only when toggled and the document
        // opens with something that can start a key.
        if self.opts.metadata && beg + 1 < size && input[beg].is_ascii_alphanumeric() {
            let mut end = beg + 1;
            while end < size {
                if input[end] == b'\n' && input[end - 1] == b'\n' {
                    break;
                }
                end += 1;
            }
            if let Some(entries) = metadata::parse_metadata(&input[beg..end], &mut self.warnings)
            {
                self.metadata = entries;
                beg = end + 1;
            }
        }

        // First pass: extract references, expand tabs and normalize
        // newlines on everything else.
        let mut text: Vec<u8> = Vec::with_capacity(size);
        while beg < size {
            if self.opts.footnotes {
                if let Some(last) =
                    references::is_footnote(input, beg, size, &mut self.footnotes)
                {
                    beg = last;
                    continue;
                }
            }
            if let Some(last) = references::is_ref(input, beg, size, &mut self.refs) {
                beg = last;
                continue;
            }

            let mut end = beg;
            while end < size && input[end] != b'\n' && input[end] != b'\r' {
                end += 1;
            }

            if end > beg {
                expand_tabs(&mut text, &input[beg..end]);
            }

            while end < size && (input[end] == b'\n' || input[end] == b'\r') {
                // One \n per newline; CRLF collapses.
                if input[end] == b'\n' || (end + 1 < size && input[end + 1] != b'\n') {
                    text.push(b'\n');
                }
                end += 1;
            }

            beg = end;
        }

        // Second pass: the actual block parse.
        let header = self.push_node(NodeKind::DocHeader);
        let entries = self.metadata.clone();
        for entry in &entries {
            let m = self.push_node(NodeKind::Meta {
                key: entry.key.as_bytes().to_vec(),
            });
            let v = self.push_node(NodeKind::NormalText {
                text: entry.value.as_bytes().to_vec(),
            });
            self.pop_node(v);
            self.pop_node(m);
        }
        self.pop_node(header);

        if !text.is_empty() {
            if text.last() != Some(&b'\n') && text.last() != Some(&b'\r') {
                text.push(b'\n');
            }
            self.parse_block(&text);
        }

        if self.opts.footnotes {
            self.parse_footnote_list();
        }

        let footer = self.push_node(NodeKind::DocFooter);
        self.pop_node(footer);

        debug_assert_eq!(self.span_depth, 0);
        debug_assert_eq!(self.block_depth, 0);

        Document {
            tree: self.tree,
            max_id: self.next_id,
            metadata: self.metadata,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Chng;

    fn kinds_under_root(doc: &Document) -> Vec<&'static str> {
        doc.root()
            .children()
            .map(|c| c.value().kind.name())
            .collect()
    }

    #[test]
    fn document_skeleton() {
        let doc = parse(b"hello\n", &Options::default());
        assert_eq!(
            kinds_under_root(&doc),
            vec!["DOC_HEADER", "PARAGRAPH", "DOC_FOOTER"]
        );
        assert_eq!(doc.root().value().chng, Chng::None);
    }

    #[test]
    fn bom_is_skipped() {
        let doc = parse(b"\xEF\xBB\xBF# Hi", &Options::default());
        assert_eq!(
            kinds_under_root(&doc),
            vec!["DOC_HEADER", "HEADER", "DOC_FOOTER"]
        );
    }

    #[test]
    fn crlf_normalizes() {
        let doc = parse(b"a\r\nb\n", &Options::default());
        let para = doc.root().children().nth(1).unwrap();
        let mut text = Vec::new();
        for d in para.descendants() {
            if let NodeKind::NormalText { text: t } = &d.value().kind {
                text.extend_from_slice(t);
            }
        }
        assert_eq!(text, b"a\nb");
    }

    #[test]
    fn ids_are_preorder() {
        let doc = parse(b"# h\n\npara *em* text\n", &Options::default());
        let ids: Vec<usize> = doc.root().descendants().map(|n| n.value().id).collect();
        let expected: Vec<usize> = (0..ids.len()).collect();
        assert_eq!(ids, expected);
        assert_eq!(doc.max_id, ids.len());
    }

    #[test]
    fn metadata_pass_consumes_the_block() {
        let opts = Options {
            metadata: true,
            ..Options::default()
        };
        let doc = parse(b"title: T\nauthor: A\n\nbody\n", &opts);
        assert_eq!(doc.metadata.len(), 2);
        assert_eq!(doc.metadata[0].key, "title");
        assert_eq!(doc.metadata[0].value, "T");

        // DOC_HEADER carries one META per entry, value as text
        // child.
        let dh = doc.root().first_child().unwrap();
        let metas: Vec<_> = dh.children().collect();
        assert_eq!(metas.len(), 2);
        match &metas[1].value().kind {
            NodeKind::Meta { key } => assert_eq!(key, b"author"),
            other => panic!("unexpected kind {:?}", other),
        }
        match &metas[1].first_child().unwrap().value().kind {
            NodeKind::NormalText { text } => assert_eq!(text, b"A"),
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
