//! AST module for Markdown documents
//!
//! Defines the node model shared by the parser and the differ: a
//! closed set of node kinds, a uniform wrapper carrying identity and
//! change state, and the [`Document`] bundle returned by a parse.
//!
//! The tree itself is an [`ego_tree::Tree`]: an arena with integer
//! node ids, non-owning parent links and ordered child lists. Each
//! node exclusively owns its payload; dropping the tree drops every
//! node. Node ids in [`MdNode::id`] are assigned by the parser in
//! preorder and are stable for the lifetime of the tree.

use ego_tree::{NodeId, NodeRef, Tree};
use serde::Serialize;

/// Change annotation attached to every node.
///
/// `None` for freshly parsed trees; the differ labels nodes of the
/// merged tree `Insert` or `Delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Chng {
    #[default]
    None,
    Insert,
    Delete,
}

/// Bit-set of list and list-item properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ListFlags(pub u32);

impl ListFlags {
    pub const ORDERED: ListFlags = ListFlags(1 << 0);
    pub const UNORDERED: ListFlags = ListFlags(1 << 1);
    /// Items contain block data (blank-line separated).
    pub const BLOCK: ListFlags = ListFlags(1 << 2);
    /// Item belongs to a definition list.
    pub const DEF: ListFlags = ListFlags(1 << 3);
    /// Task-list item, checked state.
    pub const CHECKED: ListFlags = ListFlags(1 << 4);
    /// Task-list item, unchecked state.
    pub const UNCHECKED: ListFlags = ListFlags(1 << 5);

    pub fn contains(self, other: ListFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ListFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ListFlags {
    type Output = ListFlags;

    fn bitor(self, rhs: ListFlags) -> ListFlags {
        ListFlags(self.0 | rhs.0)
    }
}

/// Bit-set of table cell properties: a two-bit alignment field plus
/// a header marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TableFlags(pub u32);

impl TableFlags {
    pub const ALIGN_LEFT: TableFlags = TableFlags(1);
    pub const ALIGN_RIGHT: TableFlags = TableFlags(2);
    pub const ALIGN_CENTER: TableFlags = TableFlags(3);
    pub const ALIGN_MASK: u32 = 3;
    pub const HEADER: TableFlags = TableFlags(4);

    pub fn contains(self, other: TableFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TableFlags) {
        self.0 |= other.0;
    }

    pub fn alignment(self) -> u32 {
        self.0 & Self::ALIGN_MASK
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for TableFlags {
    type Output = TableFlags;

    fn bitor(self, rhs: TableFlags) -> TableFlags {
        TableFlags(self.0 | rhs.0)
    }
}

/// Flavor of an automatically recognized link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AutolinkType {
    /// A scheme-qualified URL.
    Normal,
    /// An e-mail address without an explicit `mailto:`.
    Email,
}

/// The closed set of node kinds.
///
/// Payload buffers are immutable byte sequences taken from (or
/// derived from) the input. Attributes that renderers may rewrite
/// for display (footnote numbers, table column indices) are noted in
/// the differ, which excludes them from signatures.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    BlockCode {
        text: Vec<u8>,
        lang: Vec<u8>,
    },
    BlockQuote,
    Definition {
        flags: ListFlags,
    },
    DefinitionTitle,
    DefinitionData,
    Header {
        level: usize,
        /// Identifier from a trailing `{#id}` attribute group.
        attr_id: Vec<u8>,
    },
    Hrule,
    List {
        flags: ListFlags,
        /// Marker value of the first ordered item.
        start: usize,
        /// Number of items directly below.
        items: usize,
    },
    ListItem {
        flags: ListFlags,
        /// 1-based ordinal within the parent list.
        num: usize,
    },
    Paragraph,
    TableBlock {
        columns: usize,
    },
    TableHeader {
        columns: usize,
        flags: Vec<TableFlags>,
    },
    TableBody,
    TableRow,
    TableCell {
        flags: TableFlags,
        col: usize,
        columns: usize,
    },
    FootnotesBlock,
    FootnoteDef {
        num: usize,
    },
    BlockHtml {
        text: Vec<u8>,
    },
    DocHeader,
    Meta {
        key: Vec<u8>,
    },
    DocFooter,
    MathBlock {
        text: Vec<u8>,
        block_mode: bool,
    },
    LinkAuto {
        link: Vec<u8>,
        text: Vec<u8>,
        kind: AutolinkType,
    },
    Codespan {
        text: Vec<u8>,
    },
    DoubleEmphasis,
    Emphasis,
    Highlight,
    Image {
        link: Vec<u8>,
        title: Vec<u8>,
        /// Dimension string of the form `WxH`.
        dims: Vec<u8>,
        alt: Vec<u8>,
        attr_width: Vec<u8>,
        attr_height: Vec<u8>,
    },
    Linebreak,
    Link {
        link: Vec<u8>,
        title: Vec<u8>,
        attr_id: Vec<u8>,
    },
    TripleEmphasis,
    Strikethrough,
    Superscript,
    Subscript,
    FootnoteRef {
        num: usize,
    },
    Footnote,
    RawHtml {
        text: Vec<u8>,
    },
    Entity {
        text: Vec<u8>,
    },
    NormalText {
        text: Vec<u8>,
    },
}

impl NodeKind {
    /// Stable numeric code of the kind, independent of payload.
    /// Fed into differ signatures as the node label.
    pub fn code(&self) -> u32 {
        match self {
            NodeKind::Root => 0,
            NodeKind::BlockCode { .. } => 1,
            NodeKind::BlockQuote => 2,
            NodeKind::Definition { .. } => 3,
            NodeKind::DefinitionTitle => 4,
            NodeKind::DefinitionData => 5,
            NodeKind::Header { .. } => 6,
            NodeKind::Hrule => 7,
            NodeKind::List { .. } => 8,
            NodeKind::ListItem { .. } => 9,
            NodeKind::Paragraph => 10,
            NodeKind::TableBlock { .. } => 11,
            NodeKind::TableHeader { .. } => 12,
            NodeKind::TableBody => 13,
            NodeKind::TableRow => 14,
            NodeKind::TableCell { .. } => 15,
            NodeKind::FootnotesBlock => 16,
            NodeKind::FootnoteDef { .. } => 17,
            NodeKind::BlockHtml { .. } => 18,
            NodeKind::DocHeader => 19,
            NodeKind::Meta { .. } => 20,
            NodeKind::DocFooter => 21,
            NodeKind::MathBlock { .. } => 22,
            NodeKind::LinkAuto { .. } => 23,
            NodeKind::Codespan { .. } => 24,
            NodeKind::DoubleEmphasis => 25,
            NodeKind::Emphasis => 26,
            NodeKind::Highlight => 27,
            NodeKind::Image { .. } => 28,
            NodeKind::Linebreak => 29,
            NodeKind::Link { .. } => 30,
            NodeKind::TripleEmphasis => 31,
            NodeKind::Strikethrough => 32,
            NodeKind::Superscript => 33,
            NodeKind::Subscript => 34,
            NodeKind::FootnoteRef { .. } => 35,
            NodeKind::Footnote => 36,
            NodeKind::RawHtml { .. } => 37,
            NodeKind::Entity { .. } => 38,
            NodeKind::NormalText { .. } => 39,
        }
    }

    /// Display name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "ROOT",
            NodeKind::BlockCode { .. } => "BLOCKCODE",
            NodeKind::BlockQuote => "BLOCKQUOTE",
            NodeKind::Definition { .. } => "DEFINITION",
            NodeKind::DefinitionTitle => "DEFINITION_TITLE",
            NodeKind::DefinitionData => "DEFINITION_DATA",
            NodeKind::Header { .. } => "HEADER",
            NodeKind::Hrule => "HRULE",
            NodeKind::List { .. } => "LIST",
            NodeKind::ListItem { .. } => "LISTITEM",
            NodeKind::Paragraph => "PARAGRAPH",
            NodeKind::TableBlock { .. } => "TABLE_BLOCK",
            NodeKind::TableHeader { .. } => "TABLE_HEADER",
            NodeKind::TableBody => "TABLE_BODY",
            NodeKind::TableRow => "TABLE_ROW",
            NodeKind::TableCell { .. } => "TABLE_CELL",
            NodeKind::FootnotesBlock => "FOOTNOTES_BLOCK",
            NodeKind::FootnoteDef { .. } => "FOOTNOTE_DEF",
            NodeKind::BlockHtml { .. } => "BLOCKHTML",
            NodeKind::DocHeader => "DOC_HEADER",
            NodeKind::Meta { .. } => "META",
            NodeKind::DocFooter => "DOC_FOOTER",
            NodeKind::MathBlock { .. } => "MATH_BLOCK",
            NodeKind::LinkAuto { .. } => "LINK_AUTO",
            NodeKind::Codespan { .. } => "CODESPAN",
            NodeKind::DoubleEmphasis => "DOUBLE_EMPHASIS",
            NodeKind::Emphasis => "EMPHASIS",
            NodeKind::Highlight => "HIGHLIGHT",
            NodeKind::Image { .. } => "IMAGE",
            NodeKind::Linebreak => "LINEBREAK",
            NodeKind::Link { .. } => "LINK",
            NodeKind::TripleEmphasis => "TRIPLE_EMPHASIS",
            NodeKind::Strikethrough => "STRIKETHROUGH",
            NodeKind::Superscript => "SUPERSCRIPT",
            NodeKind::Subscript => "SUBSCRIPT",
            NodeKind::FootnoteRef { .. } => "FOOTNOTE_REF",
            NodeKind::Footnote => "FOOTNOTE",
            NodeKind::RawHtml { .. } => "RAW_HTML",
            NodeKind::Entity { .. } => "ENTITY",
            NodeKind::NormalText { .. } => "NORMAL_TEXT",
        }
    }

    /// Whether two kinds carry the same label, disregarding payload.
    pub fn same_label(&self, other: &NodeKind) -> bool {
        self.code() == other.code()
    }
}

/// Uniform node wrapper stored in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MdNode {
    /// Preorder identifier, unique within the owning tree.
    pub id: usize,
    /// Change annotation, set only by the differ.
    pub chng: Chng,
    pub kind: NodeKind,
}

impl MdNode {
    pub fn new(id: usize, kind: NodeKind) -> Self {
        MdNode {
            id,
            chng: Chng::None,
            kind,
        }
    }
}

/// One normalized metadata entry, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

/// Advisory parser diagnostics. Never abort a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// Spacing between link text and target, accepted laxly.
    SpaceBeforeLink,
    /// A metadata key character outside the normalized alphabet was
    /// replaced with `?`.
    MetadataBadChar,
}

/// A parsed (or merged) document: the tree plus everything collected
/// alongside it.
#[derive(Debug)]
pub struct Document {
    pub tree: Tree<MdNode>,
    /// Upper bound on node ids: ids of a fresh parse are exactly
    /// `0..max_id` in preorder.
    pub max_id: usize,
    /// Metadata queue in document order; duplicate keys permitted.
    pub metadata: Vec<MetaEntry>,
    pub warnings: Vec<Warning>,
}

impl Document {
    pub fn root(&self) -> NodeRef<'_, MdNode> {
        self.tree.root()
    }
}

/// Merge adjacent NORMAL_TEXT siblings into single nodes.
///
/// Used before diffing so the word-level LCS sees whole text runs
/// instead of the fragments the span parser emits around inline
/// constructs. Node ids of surviving nodes are unchanged, which
/// leaves gaps in the id space; `Document::max_id` stays a valid
/// upper bound.
pub fn merge_adjacent_text(doc: &mut Document) {
    let root = doc.tree.root().id();
    merge_children(&mut doc.tree, root);
}

fn merge_children(tree: &mut Tree<MdNode>, at: NodeId) {
    let children: Vec<NodeId> = match tree.get(at) {
        Some(n) => n.children().map(|c| c.id()).collect(),
        None => return,
    };

    let mut i = 0;
    while i < children.len() {
        let id = children[i];
        let is_text = matches!(
            tree.get(id).map(|n| &n.value().kind),
            Some(NodeKind::NormalText { .. })
        );

        if !is_text {
            merge_children(tree, id);
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < children.len() {
            let next = children[j];
            let absorbed = match tree.get(next).map(|n| &n.value().kind) {
                Some(NodeKind::NormalText { text }) => Some(text.clone()),
                _ => None,
            };
            match absorbed {
                Some(bytes) => {
                    if let Some(mut node) = tree.get_mut(id) {
                        if let NodeKind::NormalText { text } = &mut node.value().kind {
                            text.extend_from_slice(&bytes);
                        }
                    }
                    if let Some(mut gone) = tree.get_mut(next) {
                        gone.detach();
                    }
                    j += 1;
                }
                None => break,
            }
        }
        i = j;
    }
}

/// Structural equality of two subtrees: kinds, payloads and change
/// labels must agree at every position; node ids are ignored.
pub fn isomorphic(a: NodeRef<'_, MdNode>, b: NodeRef<'_, MdNode>) -> bool {
    if a.value().kind != b.value().kind || a.value().chng != b.value().chng {
        return false;
    }
    let mut ca = a.children();
    let mut cb = b.children();
    loop {
        match (ca.next(), cb.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                if !isomorphic(x, y) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_node(id: usize, s: &str) -> MdNode {
        MdNode::new(id, NodeKind::NormalText { text: s.as_bytes().to_vec() })
    }

    #[test]
    fn merges_adjacent_text_runs() {
        let mut tree = Tree::new(MdNode::new(0, NodeKind::Root));
        let para = tree.root_mut().append(MdNode::new(1, NodeKind::Paragraph)).id();
        tree.get_mut(para).unwrap().append(text_node(2, "a "));
        tree.get_mut(para).unwrap().append(text_node(3, "b"));
        tree.get_mut(para).unwrap().append(MdNode::new(4, NodeKind::Linebreak));
        tree.get_mut(para).unwrap().append(text_node(5, "c"));

        let mut doc = Document {
            tree,
            max_id: 6,
            metadata: Vec::new(),
            warnings: Vec::new(),
        };
        merge_adjacent_text(&mut doc);

        let para = doc.root().first_child().unwrap();
        let kinds: Vec<String> = para
            .children()
            .map(|c| match &c.value().kind {
                NodeKind::NormalText { text } => {
                    format!("text:{}", String::from_utf8_lossy(text))
                }
                other => other.name().to_string(),
            })
            .collect();
        assert_eq!(kinds, vec!["text:a b", "LINEBREAK", "text:c"]);
    }

    #[test]
    fn isomorphism_ignores_ids() {
        let mut t1 = Tree::new(MdNode::new(0, NodeKind::Root));
        t1.root_mut().append(text_node(1, "x"));
        let mut t2 = Tree::new(MdNode::new(7, NodeKind::Root));
        t2.root_mut().append(text_node(9, "x"));
        assert!(isomorphic(t1.root(), t2.root()));

        let mut t3 = Tree::new(MdNode::new(0, NodeKind::Root));
        t3.root_mut().append(text_node(1, "y"));
        assert!(!isomorphic(t1.root(), t3.root()));
    }

    #[test]
    fn table_flags_alignment_field() {
        let f = TableFlags::ALIGN_LEFT | TableFlags::ALIGN_RIGHT;
        assert_eq!(f.alignment(), TableFlags::ALIGN_CENTER.0);
        assert!(!f.contains(TableFlags::HEADER));
    }
}
