//! Block-level grammar
//!
//! [`Parser::parse_block`] walks the preprocessed byte stream one
//! block rule at a time, in a fixed dispatch order; the first rule
//! that matches consumes its span. Span content inside blocks is
//! handed to the inline parser.

use crate::ast::{ListFlags, NodeKind, TableFlags};
use crate::parser::scan::{
    count_spaces, is_empty, is_headerline, is_hrule, is_next_headerline, is_space,
};
use crate::parser::Parser;

/// Internal list flag: the current item ends its list.
const LI_END: ListFlags = ListFlags(1 << 7);

/// Block-level HTML tag names. Lookup is by case-insensitive prefix
/// of the candidate bytes.
const BLOCK_TAGS: &[&str] = &[
    "blockquote",
    "del",
    "div",
    "dl",
    "fieldset",
    "figure",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "iframe",
    "ins",
    "math",
    "noscript",
    "ol",
    "p",
    "pre",
    "script",
    "style",
    "table",
    "ul",
];

fn find_block_tag(name: &[u8]) -> Option<&'static str> {
    if name.is_empty() {
        return None;
    }
    BLOCK_TAGS
        .iter()
        .find(|t| name.len() <= t.len() && t.as_bytes()[..name.len()].eq_ignore_ascii_case(name))
        .copied()
}

/// Blockquote prefix length: up to three spaces, `>`, one optional
/// space.
fn prefix_quote(data: &[u8]) -> usize {
    let i = count_spaces(data, 0, 3);
    if i < data.len() && data[i] == b'>' {
        count_spaces(data, i + 1, 1)
    } else {
        0
    }
}

/// Indented-code prefix length (four spaces).
fn prefix_code(data: &[u8]) -> usize {
    if count_spaces(data, 0, 4) == 4 {
        4
    } else {
        0
    }
}

/// Ordered list item prefix; returns the consumed length and the
/// marker value.
fn prefix_oli(data: &[u8]) -> (usize, usize) {
    let size = data.len();
    let mut i = count_spaces(data, 0, 3);

    if i >= size || !data[i].is_ascii_digit() {
        return (0, 0);
    }

    let st = i;
    while i < size && data[i].is_ascii_digit() {
        i += 1;
    }
    let start: usize = std::str::from_utf8(&data[st..i])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    if i + 1 >= size || data[i] != b'.' || data[i + 1] != b' ' {
        return (0, 0);
    }

    if is_next_headerline(&data[i..]) {
        return (0, 0);
    }

    (i + 2, start)
}

/// Unordered list item prefix length.
fn prefix_uli(data: &[u8]) -> usize {
    let size = data.len();
    let i = count_spaces(data, 0, 3);

    if i + 1 >= size
        || (data[i] != b'*' && data[i] != b'+' && data[i] != b'-')
        || data[i + 1] != b' '
    {
        return 0;
    }

    if is_next_headerline(&data[i..]) {
        return 0;
    }

    i + 2
}

/// Definition-data prefix length: up to three spaces, `:`, space.
fn prefix_dli(data: &[u8]) -> usize {
    let i = count_spaces(data, 0, 3);
    if i + 1 < data.len() && data[i] == b':' && data[i + 1] == b' ' {
        i + 2
    } else {
        0
    }
}

fn line_len(data: &[u8]) -> usize {
    data.iter().position(|&c| c == b'\n').unwrap_or(data.len())
}

/// Whether the current line reads as a definition term: not itself
/// definition data, with a data line right below it.
fn is_definition_term(data: &[u8]) -> bool {
    if prefix_dli(data) != 0 {
        return false;
    }
    let eol = line_len(data);
    if eol + 1 >= data.len() {
        return false;
    }
    prefix_dli(&data[eol + 1..]) != 0
}

/// Code fence test; returns the index just past the fence run along
/// with its width and character.
fn is_codefence(data: &[u8]) -> Option<(usize, usize, u8)> {
    let size = data.len();
    if size < 3 {
        return None;
    }
    let mut i = count_spaces(data, 0, 3);

    if i + 2 >= size {
        return None;
    }
    let c = data[i];
    if c != b'~' && c != b'`' {
        return None;
    }

    let mut n = 1;
    i += 1;
    while i < size && data[i] == c {
        i += 1;
        n += 1;
    }

    if n < 3 {
        None
    } else {
        Some((i, n, c))
    }
}

/// Opening-fence parse over a single line: fence plus an optional
/// language token. Rejects lines that close themselves (code spans).
fn parse_codefence(data: &[u8]) -> Option<(usize, usize, u8, std::ops::Range<usize>)> {
    let (w, width, chr) = is_codefence(data)?;
    let size = data.len();

    let mut i = w;
    while i < size && is_space(data[i]) {
        i += 1;
    }
    let lang_start = i;
    while i < size && !is_space(data[i]) {
        i += 1;
    }
    let lang = lang_start..i;

    let mut j = lang_start + 2;
    while j < size && !(data[j] == chr && data[j - 1] == chr && data[j - 2] == chr) {
        j += 1;
    }
    if j < size {
        return None;
    }

    Some((w, width, chr, lang))
}

impl<'a> Parser<'a> {
    fn is_atxheader(&self, data: &[u8]) -> bool {
        if data[0] != b'#' {
            return false;
        }

        if self.opts.space_headers || self.opts.commonmark {
            let mut level = 0;
            while level < data.len() && level < 6 && data[level] == b'#' {
                level += 1;
            }
            if level < data.len() && data[level] != b' ' {
                return false;
            }
        }

        true
    }

    /// Parse one block's worth of rules until the data runs out.
    pub(crate) fn parse_block(&mut self, data: &[u8]) {
        if self.span_depth + self.block_depth > self.opts.max_depth {
            if !data.is_empty() {
                let n = self.push_node(NodeKind::NormalText {
                    text: data.to_vec(),
                });
                self.pop_node(n);
            }
            return;
        }
        self.block_depth += 1;

        let size = data.len();
        let mut beg = 0;

        while beg < size {
            let txt = &data[beg..];

            if self.is_atxheader(txt) {
                beg += self.parse_atxheader(txt);
                continue;
            }

            if txt[0] == b'<' {
                let i = self.parse_htmlblock(txt);
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            let i = is_empty(txt);
            if i != 0 {
                beg += i;
                continue;
            }

            if is_hrule(txt) {
                let n = self.push_node(NodeKind::Hrule);
                self.pop_node(n);
                let eol = line_len(txt);
                beg += (eol + 1).min(txt.len());
                continue;
            }

            if self.opts.fenced_code {
                let i = self.parse_fencedcode(txt);
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            if self.opts.tables {
                let i = self.parse_table(txt);
                if i != 0 {
                    beg += i;
                    continue;
                }
            }

            if prefix_quote(txt) != 0 {
                beg += self.parse_blockquote(txt);
                continue;
            }

            if !self.opts.no_code_indent && prefix_code(txt) != 0 {
                beg += self.parse_blockcode(txt);
                continue;
            }

            if prefix_uli(txt) != 0 {
                beg += self.parse_list(txt, ListFlags::UNORDERED, 0);
                continue;
            }

            let (oli, start) = prefix_oli(txt);
            if oli != 0 {
                beg += self.parse_list(txt, ListFlags::ORDERED, start);
                continue;
            }

            if self.opts.definition_lists && is_definition_term(txt) {
                beg += self.parse_definition(txt);
                continue;
            }

            beg += self.parse_paragraph(txt);
        }

        self.block_depth -= 1;
    }

    /// ATX header: `#{1,6}` then text, trailing `#` and spaces
    /// stripped.
    fn parse_atxheader(&mut self, data: &[u8]) -> usize {
        let size = data.len();
        let mut level = 0;
        while level < size && level < 6 && data[level] == b'#' {
            level += 1;
        }

        let i = count_spaces(data, level, 0);

        let mut end = i;
        while end < size && data[end] != b'\n' {
            end += 1;
        }
        let skip = end;

        while end > 0 && data[end - 1] == b'#' {
            end -= 1;
        }
        while end > 0 && data[end - 1] == b' ' {
            end -= 1;
        }

        if end > i {
            let (text_end, attr_id) = if self.opts.extended_attributes {
                split_header_attr(&data[i..end])
            } else {
                (end - i, Vec::new())
            };

            let n = self.push_node(NodeKind::Header { level, attr_id });
            self.parse_inline(&data[i..i + text_end]);
            self.pop_node(n);
        }

        skip
    }

    /// `>`-prefixed block quote with lazy continuation lines.
    fn parse_blockquote(&mut self, data: &[u8]) -> usize {
        let size = data.len();
        let mut work: Vec<u8> = Vec::new();
        let mut beg = 0;
        let mut end = 0;

        while beg < size {
            end = beg + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            let pre = prefix_quote(&data[beg..end]);
            if pre != 0 {
                beg += pre;
            } else if is_empty(&data[beg..end]) != 0
                && (end >= size
                    || (prefix_quote(&data[end..]) == 0 && is_empty(&data[end..]) == 0))
            {
                // An empty line followed by a non-quote line ends
                // the quote.
                break;
            }

            if beg < end {
                work.extend_from_slice(&data[beg..end]);
            }
            beg = end;
        }

        let n = self.push_node(NodeKind::BlockQuote);
        self.parse_block(&work);
        self.pop_node(n);
        end
    }

    /// Paragraph, with promotion to a setext header when the loop
    /// stops on an underline.
    fn parse_paragraph(&mut self, data: &[u8]) -> usize {
        let size = data.len();
        let mut i = 0;
        let mut end = 0;
        let mut level = 0;

        while i < size {
            end = i + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            if is_empty(&data[i..]) != 0 {
                break;
            }

            level = is_headerline(&data[i..]);
            if level != 0 {
                break;
            }

            if self.is_atxheader(&data[i..])
                || is_hrule(&data[i..])
                || prefix_quote(&data[i..]) != 0
            {
                end = i;
                break;
            }

            i = end;
        }

        let mut work_size = i;
        while work_size > 0 && data[work_size - 1] == b'\n' {
            work_size -= 1;
        }

        if level == 0 {
            let n = self.push_node(NodeKind::Paragraph);
            self.parse_inline(&data[..work_size]);
            self.pop_node(n);
        } else {
            // The last line of the run is the header text; anything
            // before it stays a paragraph.
            let mut header_start = 0;
            if work_size > 0 {
                let full = work_size;
                work_size -= 1;
                while work_size > 0 && data[work_size] != b'\n' {
                    work_size -= 1;
                }
                let beg = work_size + 1;
                while work_size > 0 && data[work_size - 1] == b'\n' {
                    work_size -= 1;
                }

                if work_size > 0 {
                    let n = self.push_node(NodeKind::Paragraph);
                    self.parse_inline(&data[..work_size]);
                    self.pop_node(n);
                    header_start = beg;
                    work_size = full - beg;
                } else {
                    work_size = full;
                }
            }

            let n = self.push_node(NodeKind::Header {
                level,
                attr_id: Vec::new(),
            });
            self.parse_inline(&data[header_start..header_start + work_size]);
            self.pop_node(n);
        }

        end
    }

    /// Fenced code block.
    fn parse_fencedcode(&mut self, data: &[u8]) -> usize {
        let size = data.len();

        let mut i = 0;
        while i < size && data[i] != b'\n' {
            i += 1;
        }

        let (_, width, chr, lang) = match parse_codefence(&data[..i]) {
            Some(f) => f,
            None => return 0,
        };

        // Search for the closing fence: same character, at least the
        // same width, nothing else on the line.
        i += 1;
        let text_start = i;
        let mut line_start;
        loop {
            line_start = i;
            if line_start >= size {
                break;
            }
            while i < size && data[i] != b'\n' {
                i += 1;
            }

            if let Some((w2, width2, chr2)) = is_codefence(&data[line_start..i]) {
                if width2 >= width && chr == chr2 && is_empty(&data[line_start + w2..i]) != 0 {
                    break;
                }
            }

            i += 1;
        }

        let n = self.push_node(NodeKind::BlockCode {
            text: data[text_start..line_start].to_vec(),
            lang: data[lang].to_vec(),
        });
        self.pop_node(n);

        i
    }

    /// Four-space indented code block.
    fn parse_blockcode(&mut self, data: &[u8]) -> usize {
        let size = data.len();
        let mut work: Vec<u8> = Vec::new();
        let mut beg = 0;

        while beg < size {
            let mut end = beg + 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            let pre = prefix_code(&data[beg..end]);
            if pre != 0 {
                beg += pre;
            } else if is_empty(&data[beg..end]) == 0 {
                break;
            }

            if beg < end {
                if is_empty(&data[beg..end]) != 0 {
                    work.push(b'\n');
                } else {
                    work.extend_from_slice(&data[beg..end]);
                }
            }
            beg = end;
        }

        while work.last() == Some(&b'\n') {
            work.pop();
        }
        work.push(b'\n');

        let n = self.push_node(NodeKind::BlockCode {
            text: work,
            lang: Vec::new(),
        });
        self.pop_node(n);
        beg
    }

    /// One list item, its initial prefix still present.
    fn parse_listitem(&mut self, data: &[u8], flags: &mut ListFlags, num: usize) -> usize {
        let size = data.len();

        // First-line indentation decides where sublists nest.
        let orgpre = count_spaces(data, 0, 3);

        let mut beg = prefix_uli(data);
        if beg == 0 {
            beg = prefix_oli(data).0;
        }
        if beg == 0 {
            return 0;
        }

        if self.opts.tasklists {
            if data[beg..].starts_with(b"[ ] ") {
                flags.insert(ListFlags::UNCHECKED);
                beg += 4;
            } else if data[beg..].starts_with(b"[x] ") || data[beg..].starts_with(b"[X] ") {
                flags.insert(ListFlags::CHECKED);
                beg += 4;
            }
        }

        let mut end = beg;
        while end < size && data[end - 1] != b'\n' {
            end += 1;
        }

        let mut work: Vec<u8> = Vec::new();
        work.extend_from_slice(&data[beg..end]);
        beg = end;

        let mut in_empty = false;
        let mut has_inside_empty = false;
        let mut in_fence = false;
        let mut sublist = 0usize;

        while beg < size {
            end += 1;
            while end < size && data[end - 1] != b'\n' {
                end += 1;
            }

            if is_empty(&data[beg..end]) != 0 {
                in_empty = true;
                beg = end;
                continue;
            }

            let i = count_spaces(&data[..end], beg, 4) - beg;
            let pre = i;

            if self.opts.fenced_code && is_codefence(&data[beg + i..end]).is_some() {
                in_fence = !in_fence;
            }

            let mut has_next_uli = 0;
            let mut has_next_oli = 0;
            if !in_fence {
                has_next_uli = prefix_uli(&data[beg + i..end]);
                has_next_oli = prefix_oli(&data[beg + i..end]).0;
            }

            if (has_next_uli != 0 && !is_hrule(&data[beg + i..end])) || has_next_oli != 0 {
                if in_empty {
                    has_inside_empty = true;
                }

                // An item at the original indent level starts a
                // sibling; a deeper one starts a sublist.
                if pre <= orgpre {
                    if in_empty
                        && ((flags.contains(ListFlags::ORDERED) && has_next_uli != 0)
                            || (!flags.contains(ListFlags::ORDERED) && has_next_oli != 0))
                    {
                        flags.insert(LI_END);
                    }
                    break;
                }

                if sublist == 0 {
                    sublist = work.len();
                }
            } else if in_empty && pre == 0 {
                // Only indented content continues an item across
                // blank lines.
                flags.insert(LI_END);
                break;
            }

            if in_empty {
                work.push(b'\n');
                has_inside_empty = true;
                in_empty = false;
            }

            work.extend_from_slice(&data[beg + i..end]);
            beg = end;
        }

        if has_inside_empty {
            flags.insert(ListFlags::BLOCK);
        }

        let node_flags = ListFlags(flags.bits() & !LI_END.bits());
        let n = self.push_node(NodeKind::ListItem {
            flags: node_flags,
            num,
        });

        if flags.contains(ListFlags::BLOCK) {
            if sublist != 0 && sublist < work.len() {
                self.parse_block(&work[..sublist]);
                self.parse_block(&work[sublist..]);
            } else {
                self.parse_block(&work);
            }
        } else if sublist != 0 && sublist < work.len() {
            self.parse_inline(&work[..sublist]);
            self.parse_block(&work[sublist..]);
        } else {
            self.parse_inline(&work);
        }

        self.pop_node(n);
        beg
    }

    /// Ordered or unordered list block.
    fn parse_list(&mut self, data: &[u8], flags: ListFlags, start: usize) -> usize {
        let mut flags = flags;
        let n = self.push_node(NodeKind::List {
            flags,
            start,
            items: 0,
        });

        let mut i = 0;
        let mut created = 0;
        while i < data.len() {
            let j = self.parse_listitem(&data[i..], &mut flags, created + 1);
            i += j;
            if j == 0 {
                break;
            }
            created += 1;
            if flags.contains(LI_END) {
                break;
            }
        }

        let final_flags = ListFlags(flags.bits() & !LI_END.bits());
        if let Some(mut node) = self.tree.get_mut(n) {
            if let NodeKind::List { flags, items, .. } = &mut node.value().kind {
                *flags = final_flags;
                *items = created;
            }
        }

        self.pop_node(n);
        i
    }

    /// Definition list: term line plus `:`-prefixed data items.
    fn parse_definition(&mut self, data: &[u8]) -> usize {
        let size = data.len();
        let mut dflags = ListFlags::DEF;
        let n = self.push_node(NodeKind::Definition { flags: dflags });

        let mut i = 0;
        loop {
            // Term line.
            let eol = i + line_len(&data[i..]);
            let mut term_end = eol;
            while term_end > i && data[term_end - 1] == b' ' {
                term_end -= 1;
            }
            let nt = self.push_node(NodeKind::DefinitionTitle);
            self.parse_inline(&data[i..term_end]);
            self.pop_node(nt);
            i = (eol + 1).min(size);

            // Data items.
            let mut trailing_blank = false;
            while i < size {
                let pre = prefix_dli(&data[i..]);
                if pre == 0 {
                    break;
                }
                let (consumed, block, blank) = self.parse_definition_data(&data[i..], pre);
                if block {
                    dflags.insert(ListFlags::BLOCK);
                }
                trailing_blank = blank;
                i += consumed;
            }

            // Another term/data group continues the same list;
            // blank-line separation makes the whole list
            // block-scoped.
            let mut j = i;
            let mut saw_blank = trailing_blank;
            while j < size {
                let e = is_empty(&data[j..]);
                if e == 0 {
                    break;
                }
                saw_blank = true;
                j += e;
            }
            if j < size && is_definition_term(&data[j..]) {
                if saw_blank {
                    dflags.insert(ListFlags::BLOCK);
                }
                i = j;
                continue;
            }
            break;
        }

        if let Some(mut node) = self.tree.get_mut(n) {
            if let NodeKind::Definition { flags } = &mut node.value().kind {
                *flags = dflags;
            }
        }
        self.pop_node(n);
        i
    }

    /// One `:`-prefixed data item with list-item-style continuation.
    /// Returns the consumed length, whether the body was
    /// block-scoped, and whether the item stopped right after blank
    /// lines.
    fn parse_definition_data(&mut self, data: &[u8], pre: usize) -> (usize, bool, bool) {
        let size = data.len();
        let mut work: Vec<u8> = Vec::new();

        let mut end = pre;
        while end < size && data[end - 1] != b'\n' {
            end += 1;
        }
        work.extend_from_slice(&data[pre..end]);
        let mut beg = end;

        let mut in_empty = false;
        let mut has_inside_empty = false;

        while beg < size {
            let mut eol = beg + 1;
            while eol < size && data[eol - 1] != b'\n' {
                eol += 1;
            }

            if is_empty(&data[beg..eol]) != 0 {
                in_empty = true;
                beg = eol;
                continue;
            }

            if prefix_dli(&data[beg..eol]) != 0 {
                break;
            }

            let ind = count_spaces(&data[..eol], beg, 4) - beg;
            if ind == 0 {
                break;
            }

            if in_empty {
                work.push(b'\n');
                has_inside_empty = true;
                in_empty = false;
            }

            work.extend_from_slice(&data[beg + ind..eol]);
            beg = eol;
        }

        let nd = self.push_node(NodeKind::DefinitionData);
        if has_inside_empty {
            self.parse_block(&work);
        } else {
            while work.last() == Some(&b'\n') {
                work.pop();
            }
            self.parse_inline(&work);
        }
        self.pop_node(nd);

        (beg, has_inside_empty, in_empty)
    }

    /// Block-level HTML: a known opening tag with a matching close,
    /// a laxist comment, or a self-closing `<hr>`.
    fn parse_htmlblock(&mut self, data: &[u8]) -> usize {
        let size = data.len();

        if size < 2 || data[0] != b'<' {
            return 0;
        }

        let mut i = 1;
        while i < size && data[i] != b'>' && data[i] != b' ' {
            i += 1;
        }

        let curtag = if i < size {
            find_block_tag(&data[1..i])
        } else {
            None
        };

        let curtag = match curtag {
            Some(t) => t,
            None => {
                // HTML comment, laxist form.
                if size > 5 && data[1] == b'!' && data[2] == b'-' && data[3] == b'-' {
                    let mut i = 5;
                    while i < size
                        && !(data[i - 2] == b'-' && data[i - 1] == b'-' && data[i] == b'>')
                    {
                        i += 1;
                    }
                    i += 1;

                    if i < size {
                        let j = is_empty(&data[i..]);
                        if j != 0 {
                            let sz = i + j;
                            let n = self.push_node(NodeKind::BlockHtml {
                                text: data[..sz].to_vec(),
                            });
                            self.pop_node(n);
                            return sz;
                        }
                    }
                }

                // HR, the only self-closing block tag considered.
                if size > 4
                    && (data[1] == b'h' || data[1] == b'H')
                    && (data[2] == b'r' || data[2] == b'R')
                {
                    let mut i = 3;
                    while i < size && data[i] != b'>' {
                        i += 1;
                    }
                    if i + 1 < size {
                        i += 1;
                        let j = is_empty(&data[i..]);
                        if j != 0 {
                            let sz = i + j;
                            let n = self.push_node(NodeKind::BlockHtml {
                                text: data[..sz].to_vec(),
                            });
                            self.pop_node(n);
                            return sz;
                        }
                    }
                }

                return 0;
            }
        };

        let mut tag_end = htmlblock_find_end_strict(curtag, data);

        // Second, indented-match pass; "ins" and "del" stay strict.
        if tag_end == 0 && curtag != "ins" && curtag != "del" {
            tag_end = htmlblock_find_end(curtag, data);
        }

        if tag_end == 0 {
            return 0;
        }

        let n = self.push_node(NodeKind::BlockHtml {
            text: data[..tag_end].to_vec(),
        });
        self.pop_node(n);
        tag_end
    }

    fn parse_table_row(
        &mut self,
        data: &[u8],
        columns: usize,
        col_data: &[TableFlags],
        header_flag: TableFlags,
    ) {
        let size = data.len();
        let n = self.push_node(NodeKind::TableRow);

        let mut i = 0;
        if i < size && data[i] == b'|' {
            i += 1;
        }

        let mut col = 0;
        while col < columns && i < size {
            while i < size && is_space(data[i]) {
                i += 1;
            }

            let cell_start = i;
            let mut len = crate::parser::inline::find_emph_char(&data[i..], b'|');
            if len == 0 && i < size && data[i] != b'|' {
                len = size - i;
            }
            i += len;

            let content_end = if i > cell_start {
                let mut cell_end = i - 1;
                while cell_end > cell_start && is_space(data[cell_end]) {
                    cell_end -= 1;
                }
                cell_end + 1
            } else {
                cell_start
            };

            let nn = self.push_node(NodeKind::TableCell {
                flags: col_data[col] | header_flag,
                col,
                columns,
            });
            self.parse_inline(&data[cell_start..content_end]);
            self.pop_node(nn);

            i += 1;
            col += 1;
        }

        // Pad short rows so every row carries the full column count.
        while col < columns {
            let nn = self.push_node(NodeKind::TableCell {
                flags: col_data[col] | header_flag,
                col,
                columns,
            });
            self.pop_node(nn);
            col += 1;
        }

        self.pop_node(n);
    }

    /// Pipe table: a header line with pipes, an alignment underline,
    /// then body rows.
    fn parse_table(&mut self, data: &[u8]) -> usize {
        let size = data.len();

        let (header_end, under_end, columns, col_data) = match check_table_header(data) {
            Some(h) => h,
            None => return 0,
        };

        let block = self.push_node(NodeKind::TableBlock { columns });

        let header = self.push_node(NodeKind::TableHeader {
            columns,
            flags: col_data.clone(),
        });
        self.parse_table_row(&data[..header_end], columns, &col_data, TableFlags::HEADER);
        self.pop_node(header);

        let body = self.push_node(NodeKind::TableBody);
        let mut i = under_end + 1;
        while i < size {
            let row_start = i;
            let mut pipes = 0;
            while i < size && data[i] != b'\n' {
                if data[i] == b'|' {
                    pipes += 1;
                }
                i += 1;
            }

            if pipes == 0 || i == size {
                i = row_start;
                break;
            }

            self.parse_table_row(&data[row_start..i], columns, &col_data, TableFlags::default());
            i += 1;
        }
        self.pop_node(body);
        self.pop_node(block);

        i
    }

    /// Footnotes block at the end of the document, one definition
    /// per used footnote in reference order.
    pub(crate) fn parse_footnote_list(&mut self) {
        if self.used_footnotes.is_empty() {
            return;
        }

        let n = self.push_node(NodeKind::FootnotesBlock);

        let used: Vec<usize> = self.used_footnotes.clone();
        for idx in used {
            let (num, contents) = {
                let e = &self.footnotes.entries[idx];
                (e.num, e.contents.clone())
            };
            let d = self.push_node(NodeKind::FootnoteDef { num });
            self.parse_block(&contents);
            self.pop_node(d);
        }

        self.pop_node(n);
    }
}

/// Split trailing `{#id}` off an ATX header's text; returns the text
/// length to keep and the extracted id.
fn split_header_attr(text: &[u8]) -> (usize, Vec<u8>) {
    if text.last() != Some(&b'}') {
        return (text.len(), Vec::new());
    }
    let open = match text.windows(2).rposition(|w| w == b"{#") {
        Some(p) => p,
        None => return (text.len(), Vec::new()),
    };

    let id = text[open + 2..text.len() - 1].to_vec();
    if id.contains(&b' ') || id.is_empty() {
        return (text.len(), Vec::new());
    }

    let mut keep = open;
    while keep > 0 && text[keep - 1] == b' ' {
        keep -= 1;
    }
    (keep, id)
}

/// Match `</tag>` followed by an empty rest-of-line.
fn htmlblock_is_end(tag: &str, data: &[u8]) -> usize {
    let tag_len = tag.len();
    let i = tag_len + 3;

    if i > data.len()
        || data[1] != b'/'
        || !data[2..2 + tag_len].eq_ignore_ascii_case(tag.as_bytes())
        || data[tag_len + 2] != b'>'
    {
        return 0;
    }

    let w = if i < data.len() {
        let w = is_empty(&data[i..]);
        if w == 0 {
            return 0;
        }
        w
    } else {
        0
    };

    i + w
}

/// Find the closing tag anywhere in the block.
fn htmlblock_find_end(tag: &str, data: &[u8]) -> usize {
    let size = data.len();
    let mut i = 0;

    loop {
        while i < size && data[i] != b'<' {
            i += 1;
        }
        if i >= size {
            return 0;
        }

        let w = htmlblock_is_end(tag, &data[i..]);
        if w != 0 {
            return i + w;
        }
        i += 1;
    }
}

/// Strict mode: the closing tag must sit unindented and be followed
/// by a blank line.
fn htmlblock_find_end_strict(tag: &str, data: &[u8]) -> usize {
    let size = data.len();
    let mut i = 0;

    loop {
        let mark = i;
        while i < size && data[i] != b'\n' {
            i += 1;
        }
        if i < size {
            i += 1;
        }
        if i == mark {
            return 0;
        }

        if data[mark] == b' ' && mark > 0 {
            continue;
        }

        let inner = htmlblock_find_end(tag, &data[mark..i]);
        if mark + inner == i && (i >= size || is_empty(&data[i..]) != 0) {
            break;
        }
    }

    i
}

/// Validate a table header + underline; returns the header line
/// length, the underline end, the column count and per-column
/// alignment.
fn check_table_header(data: &[u8]) -> Option<(usize, usize, usize, Vec<TableFlags>)> {
    let size = data.len();

    let mut i = 0;
    let mut pipes = 0i64;
    while i < size && data[i] != b'\n' {
        if data[i] == b'|' {
            pipes += 1;
        }
        i += 1;
    }

    if i == size || pipes == 0 {
        return None;
    }

    let mut header_end = i;
    while header_end > 0 && is_space(data[header_end - 1]) {
        header_end -= 1;
    }

    if data[0] == b'|' {
        pipes -= 1;
    }
    if header_end > 0 && data[header_end - 1] == b'|' {
        pipes -= 1;
    }
    if pipes < 0 {
        return None;
    }

    let columns = pipes as usize + 1;
    let mut col_data = vec![TableFlags::default(); columns];

    // Underline row with `-` runs and optional alignment colons.
    i += 1;
    if i < size && data[i] == b'|' {
        i += 1;
    }

    let mut under_end = i;
    while under_end < size && data[under_end] != b'\n' {
        under_end += 1;
    }

    let mut col = 0;
    while col < columns && i < under_end {
        let mut dashes = 0;

        i = count_spaces(&data[..under_end], i, 0);

        if i < under_end && data[i] == b':' {
            i += 1;
            col_data[col].insert(TableFlags::ALIGN_LEFT);
            dashes += 1;
        }

        while i < under_end && data[i] == b'-' {
            i += 1;
            dashes += 1;
        }

        if i < under_end && data[i] == b':' {
            i += 1;
            col_data[col].insert(TableFlags::ALIGN_RIGHT);
            dashes += 1;
        }

        i = count_spaces(&data[..under_end], i, 0);

        if i < under_end && data[i] != b'|' && data[i] != b'+' {
            break;
        }

        if dashes < 3 {
            break;
        }

        i += 1;
        col += 1;
    }

    if col < columns {
        return None;
    }

    Some((header_end, under_end, columns, col_data))
}
