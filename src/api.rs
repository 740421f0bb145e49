//! Processing API
//!
//! Pure functions mapping Markdown content to rendered output. This
//! module performs no I/O, CLI handling or process exits: all
//! functions take structured input and return structured output for
//! easy testing. The diff path implements the orchestration order of
//! the pipeline: parse both inputs, merge adjacent text runs in
//! each, diff, render the merged tree.

use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::ast::{merge_adjacent_text, Chng, Document, MdNode, NodeKind};
use crate::{diff, parse, treeviz, Options};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    /// Parsed AST as JSON.
    AstJson,
    /// Parsed AST as an indented tree dump.
    Treeviz,
    /// Merged diff tree as JSON.
    DiffJson,
    /// Merged diff tree as an indented tree dump.
    DiffTreeviz,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ast-json" => Ok(OutputFormat::AstJson),
            "treeviz" => Ok(OutputFormat::Treeviz),
            "diff-json" => Ok(OutputFormat::DiffJson),
            "diff-treeviz" => Ok(OutputFormat::DiffTreeviz),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessArgs {
    /// The document (for diffs: the "new" side).
    pub content: String,
    /// The "old" side of a diff.
    pub old_content: Option<String>,
    pub format: OutputFormat,
    pub options: Options,
}

#[derive(Debug)]
pub enum ProcessError {
    MissingInput(String),
    SerializationError(String),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::MissingInput(msg) => write!(f, "Missing input: {}", msg),
            ProcessError::SerializationError(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
        }
    }
}

impl Error for ProcessError {}

/// Main processing function - pure, no I/O or side effects.
pub fn process(args: ProcessArgs) -> Result<String, ProcessError> {
    match args.format {
        OutputFormat::AstJson => {
            let doc = parse(args.content.as_bytes(), &args.options);
            document_json(&doc)
        }
        OutputFormat::Treeviz => {
            let doc = parse(args.content.as_bytes(), &args.options);
            Ok(treeviz::render(&doc))
        }
        OutputFormat::DiffJson | OutputFormat::DiffTreeviz => {
            let old = args.old_content.as_ref().ok_or_else(|| {
                ProcessError::MissingInput("diff formats need the old document".to_string())
            })?;
            let merged = diff_buf(
                old.as_bytes(),
                args.content.as_bytes(),
                &args.options,
            );
            match args.format {
                OutputFormat::DiffJson => document_json(&merged),
                _ => Ok(treeviz::render(&merged)),
            }
        }
    }
}

/// Parse old and new, merge adjacent text runs in each, diff.
pub fn diff_buf(old: &[u8], new: &[u8], opts: &Options) -> Document {
    let mut old_doc = parse(old, opts);
    let mut new_doc = parse(new, opts);

    // Word-level LCS wants whole text runs on both sides.
    merge_adjacent_text(&mut old_doc);
    merge_adjacent_text(&mut new_doc);

    diff(&old_doc, &new_doc)
}

fn document_json(doc: &Document) -> Result<String, ProcessError> {
    let result = json!({
        "metadata": doc.metadata,
        "warnings": doc.warnings,
        "document": node_json(doc.root()),
    });

    serde_json::to_string_pretty(&result)
        .map_err(|e| ProcessError::SerializationError(e.to_string()))
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

/// Recursive JSON rendering of one node with its kind-specific
/// attributes.
fn node_json(n: ego_tree::NodeRef<'_, MdNode>) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert("kind".into(), json!(n.value().kind.name()));
    obj.insert("id".into(), json!(n.value().id));

    match n.value().chng {
        Chng::None => {}
        Chng::Insert => {
            obj.insert("chng".into(), json!("insert"));
        }
        Chng::Delete => {
            obj.insert("chng".into(), json!("delete"));
        }
    }

    match &n.value().kind {
        NodeKind::BlockCode { text, lang } => {
            obj.insert("text".into(), json!(lossy(text)));
            obj.insert("lang".into(), json!(lossy(lang)));
        }
        NodeKind::Definition { flags } => {
            obj.insert("flags".into(), json!(flags.bits()));
        }
        NodeKind::Header { level, attr_id } => {
            obj.insert("level".into(), json!(level));
            if !attr_id.is_empty() {
                obj.insert("attr_id".into(), json!(lossy(attr_id)));
            }
        }
        NodeKind::List {
            flags,
            start,
            items,
        } => {
            obj.insert("flags".into(), json!(flags.bits()));
            obj.insert("start".into(), json!(start));
            obj.insert("items".into(), json!(items));
        }
        NodeKind::ListItem { flags, num } => {
            obj.insert("flags".into(), json!(flags.bits()));
            obj.insert("num".into(), json!(num));
        }
        NodeKind::TableBlock { columns } => {
            obj.insert("columns".into(), json!(columns));
        }
        NodeKind::TableHeader { columns, flags } => {
            obj.insert("columns".into(), json!(columns));
            let f: Vec<u32> = flags.iter().map(|f| f.bits()).collect();
            obj.insert("align".into(), json!(f));
        }
        NodeKind::TableCell {
            flags,
            col,
            columns,
        } => {
            obj.insert("flags".into(), json!(flags.bits()));
            obj.insert("col".into(), json!(col));
            obj.insert("columns".into(), json!(columns));
        }
        NodeKind::FootnoteDef { num } | NodeKind::FootnoteRef { num } => {
            obj.insert("num".into(), json!(num));
        }
        NodeKind::BlockHtml { text } | NodeKind::RawHtml { text } => {
            obj.insert("text".into(), json!(lossy(text)));
        }
        NodeKind::Meta { key } => {
            obj.insert("key".into(), json!(lossy(key)));
        }
        NodeKind::MathBlock { text, block_mode } => {
            obj.insert("text".into(), json!(lossy(text)));
            obj.insert("block_mode".into(), json!(block_mode));
        }
        NodeKind::LinkAuto { link, text, kind } => {
            obj.insert("link".into(), json!(lossy(link)));
            obj.insert("text".into(), json!(lossy(text)));
            obj.insert(
                "type".into(),
                json!(match kind {
                    crate::ast::AutolinkType::Normal => "normal",
                    crate::ast::AutolinkType::Email => "email",
                }),
            );
        }
        NodeKind::Codespan { text }
        | NodeKind::Entity { text }
        | NodeKind::NormalText { text } => {
            obj.insert("text".into(), json!(lossy(text)));
        }
        NodeKind::Image {
            link,
            title,
            dims,
            alt,
            attr_width,
            attr_height,
        } => {
            obj.insert("link".into(), json!(lossy(link)));
            obj.insert("title".into(), json!(lossy(title)));
            obj.insert("dims".into(), json!(lossy(dims)));
            obj.insert("alt".into(), json!(lossy(alt)));
            if !attr_width.is_empty() {
                obj.insert("width".into(), json!(lossy(attr_width)));
            }
            if !attr_height.is_empty() {
                obj.insert("height".into(), json!(lossy(attr_height)));
            }
        }
        NodeKind::Link {
            link,
            title,
            attr_id,
        } => {
            obj.insert("link".into(), json!(lossy(link)));
            obj.insert("title".into(), json!(lossy(title)));
            if !attr_id.is_empty() {
                obj.insert("attr_id".into(), json!(lossy(attr_id)));
            }
        }
        _ => {}
    }

    let children: Vec<serde_json::Value> = n.children().map(node_json).collect();
    if !children.is_empty() {
        obj.insert("children".into(), json!(children));
    }

    serde_json::Value::Object(obj)
}
