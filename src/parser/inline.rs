//! Span-level grammar: the active-character handlers
//!
//! [`Parser::parse_inline`] copies inert bytes into NORMAL_TEXT runs
//! and dispatches on "active" characters. A handler returns the
//! number of bytes it consumed, or 0 to let the character fall back
//! into plain text. Handlers receive the whole span buffer, their
//! trigger position, and the index of the last consumed boundary
//! (lookbehind never crosses an already-consumed construct).

use regex::bytes::Regex;
use std::sync::OnceLock;

use crate::ast::{AutolinkType, NodeKind, Warning};
use crate::parser::autolink;
use crate::parser::scan::{count_spaces, is_empty_all, is_escaped, is_space, replace_spacing};
use crate::parser::{Parser, Trigger};

/// Characters that may be backslash-escaped.
const ESCAPE_CHARS: &[u8] = b"\\`*_{}[]()#+-.!:|&<>^~=\"$";

static ENTITY: OnceLock<Regex> = OnceLock::new();

/// Remove backslash escapes, keeping the escaped bytes.
pub fn unescape_text(out: &mut Vec<u8>, src: &[u8]) {
    let mut i = 0;
    while i < src.len() {
        let org = i;
        while i < src.len() && src[i] != b'\\' {
            i += 1;
        }
        if i > org {
            out.extend_from_slice(&src[org..i]);
        }
        if i + 1 >= src.len() {
            break;
        }
        out.push(src[i + 1]);
        i += 2;
    }
}

/// Find the next occurrence of `c` in `data`, skipping escaped
/// characters, balanced code spans and bracketed segments. Returns
/// the offset, with 0 doubling as "not found".
pub fn find_emph_char(data: &[u8], c: u8) -> usize {
    let size = data.len();
    let mut i = 0;

    while i < size {
        while i < size && data[i] != c && data[i] != b'[' && data[i] != b'`' {
            i += 1;
        }

        if i == size {
            return 0;
        }

        if is_escaped(data, i) {
            i += 1;
            continue;
        }

        if data[i] == c {
            return i;
        }

        if data[i] == b'`' {
            // Skip a code span.
            let mut span_nb = 0;
            let mut tmp_i = 0;

            while i < size && data[i] == b'`' {
                i += 1;
                span_nb += 1;
            }

            if i >= size {
                return 0;
            }

            let mut bt = 0;
            while i < size && bt < span_nb {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                if data[i] == b'`' {
                    bt += 1;
                } else {
                    bt = 0;
                }
                i += 1;
            }

            // Not a well-formed code span; fall back to the emph
            // char found inside it.
            if bt < span_nb && i >= size {
                return tmp_i;
            }
        } else if data[i] == b'[' {
            // Skip a link.
            let mut tmp_i = 0;

            i += 1;
            while i < size && data[i] != b']' {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                i += 1;
            }

            i += 1;
            while i < size && is_space(data[i]) {
                i += 1;
            }

            if i >= size {
                return tmp_i;
            }

            let cc = match data[i] {
                b'[' => b']',
                b'(' => b')',
                _ => {
                    if tmp_i != 0 {
                        return tmp_i;
                    }
                    continue;
                }
            };

            i += 1;
            while i < size && data[i] != cc {
                if tmp_i == 0 && data[i] == c {
                    tmp_i = i;
                }
                i += 1;
            }

            if i >= size {
                return tmp_i;
            }

            i += 1;
        }
    }

    0
}

impl<'a> Parser<'a> {
    /// Parse inline markdown elements into children of the current
    /// node.
    pub(crate) fn parse_inline(&mut self, data: &[u8]) {
        if self.span_depth + self.block_depth > self.opts.max_depth {
            // Nesting cap: emit the remaining bytes as plain text.
            if !data.is_empty() {
                self.push_text(data);
            }
            return;
        }
        self.span_depth += 1;

        let mut i = 0usize;
        let mut end = 0usize;
        let mut consumed = 0usize;

        while i < data.len() {
            // Copy inert bytes up to the next active character.
            while end < data.len() && self.trigger(data[end]) == Trigger::None {
                end += 1;
            }

            if end > i {
                self.push_text(&data[i..end]);
            }

            if end >= data.len() {
                break;
            }
            i = end;

            let taken = self.dispatch(data, i, consumed);
            if taken == 0 {
                // No action: the character joins the next text run.
                end = i + 1;
            } else {
                i += taken;
                end = i;
                consumed = i;
            }
        }

        self.span_depth -= 1;
    }

    fn push_text(&mut self, text: &[u8]) {
        let n = self.push_node(NodeKind::NormalText {
            text: text.to_vec(),
        });
        self.pop_node(n);
    }

    fn dispatch(&mut self, data: &[u8], pos: usize, consumed: usize) -> usize {
        match self.trigger(data[pos]) {
            Trigger::None => 0,
            Trigger::Emphasis => self.char_emphasis(data, pos, consumed),
            Trigger::Codespan => self.char_codespan(data, pos),
            Trigger::Linebreak => self.char_linebreak(data, pos, consumed),
            Trigger::Link => self.char_link(data, pos, consumed),
            Trigger::Image => self.char_image(data, pos, consumed),
            Trigger::Langle => self.char_langle_tag(data, pos),
            Trigger::Escape => self.char_escape(data, pos, consumed),
            Trigger::Entity => self.char_entity(data, pos),
            Trigger::AutolinkUrl => self.char_autolink_url(data, pos),
            Trigger::AutolinkEmail => self.char_autolink_email(data, pos),
            Trigger::AutolinkWww => self.char_autolink_www(data, pos),
            Trigger::Superscript => self.char_superscript(data, pos),
            Trigger::Subscript => self.char_subscript(data, pos),
            Trigger::Math => self.char_math(data, pos, consumed),
        }
    }

    /// Single, double and triple emphasis plus strikethrough,
    /// highlight and the subscript fallback for single `~`.
    fn char_emphasis(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        let c = buf[pos];
        let data = &buf[pos..];
        let size = data.len();

        if self.opts.no_intra_emphasis
            && pos - consumed > 0
            && !is_space(buf[pos - 1])
            && buf[pos - 1] != b'>'
            && buf[pos - 1] != b'('
        {
            return 0;
        }

        if size > 2 && data[1] != c {
            // Spacing cannot follow an opening emphasis;
            // strikethrough and highlight only take doubled markers.
            if c == b'~' {
                return if self.opts.superscript {
                    self.char_subscript(buf, pos)
                } else {
                    0
                };
            }
            if c == b'=' || is_space(data[1]) {
                return 0;
            }
            let ret = self.parse_emph1(&buf[pos + 1..], c);
            return if ret == 0 { 0 } else { ret + 1 };
        }

        if size > 3 && data[1] == c && data[2] != c {
            if is_space(data[2]) {
                return 0;
            }
            let ret = self.parse_emph2(&buf[pos + 2..], c);
            return if ret == 0 { 0 } else { ret + 2 };
        }

        if size > 4 && data[1] == c && data[2] == c && data[3] != c {
            if c == b'~' || c == b'=' || is_space(data[3]) {
                return 0;
            }
            let ret = self.parse_emph3(buf, pos + 3, c);
            return if ret == 0 { 0 } else { ret + 3 };
        }

        0
    }

    /// Single emphasis, closed by a marker not preceded by spacing.
    fn parse_emph1(&mut self, data: &[u8], c: u8) -> usize {
        let size = data.len();
        let mut i = 0;

        // Skip one marker if coming from triple emphasis.
        if size > 1 && data[0] == c && data[1] == c {
            i = 1;
        }

        while i < size {
            let len = find_emph_char(&data[i..], c);
            if len == 0 {
                return 0;
            }
            i += len;
            if i >= size {
                return 0;
            }

            if data[i] == c && !is_space(data[i - 1]) {
                if self.opts.no_intra_emphasis
                    && i + 1 < size
                    && data[i + 1].is_ascii_alphanumeric()
                {
                    continue;
                }

                let n = self.push_node(NodeKind::Emphasis);
                self.parse_inline(&data[..i]);
                self.pop_node(n);
                return i + 1;
            }
        }

        0
    }

    /// Double emphasis, strikethrough (`~~`) and highlight (`==`).
    fn parse_emph2(&mut self, data: &[u8], c: u8) -> usize {
        let size = data.len();
        let mut i = 0;

        while i < size {
            let len = find_emph_char(&data[i..], c);
            if len == 0 {
                return 0;
            }
            i += len;

            if i + 1 < size && data[i] == c && data[i + 1] == c && i > 0 && !is_space(data[i - 1])
            {
                let kind = match c {
                    b'~' => NodeKind::Strikethrough,
                    b'=' => NodeKind::Highlight,
                    _ => NodeKind::DoubleEmphasis,
                };
                let n = self.push_node(kind);
                self.parse_inline(&data[..i]);
                self.pop_node(n);
                return i + 2;
            }
            i += 1;
        }

        0
    }

    /// Triple emphasis; on shorter closers delegates to the other
    /// parsers over a window widened to re-include the markers.
    fn parse_emph3(&mut self, buf: &[u8], at: usize, c: u8) -> usize {
        let data = &buf[at..];
        let size = data.len();
        let mut i = 0;

        while i < size {
            let len = find_emph_char(&data[i..], c);
            if len == 0 {
                return 0;
            }
            i += len;

            // Skip spacing-preceded markers.
            if data[i] != c || is_space(data[i - 1]) {
                continue;
            }

            if i + 2 < size && data[i + 1] == c && data[i + 2] == c {
                let n = self.push_node(NodeKind::TripleEmphasis);
                self.parse_inline(&data[..i]);
                self.pop_node(n);
                return i + 3;
            } else if i + 1 < size && data[i + 1] == c {
                // Double closing marker: single emphasis wrapping a
                // double one.
                let len = self.parse_emph1(&buf[at - 2..], c);
                return if len == 0 { 0 } else { len - 2 };
            } else {
                // Single closing marker: double emphasis wrapping a
                // single one.
                let len = self.parse_emph2(&buf[at - 1..], c);
                return if len == 0 { 0 } else { len - 1 };
            }
        }

        0
    }

    /// Code span: a run of N backticks closed by the next run of N.
    fn char_codespan(&mut self, buf: &[u8], pos: usize) -> usize {
        let data = &buf[pos..];
        let size = data.len();

        let mut nb = 0;
        while nb < size && data[nb] == b'`' {
            nb += 1;
        }

        let mut i = 0;
        let mut end = nb;
        while end < size && i < nb {
            if data[end] == b'`' {
                i += 1;
            } else {
                i = 0;
            }
            end += 1;
        }

        if i < nb && end >= size {
            return 0;
        }

        // Trim outside spaces.
        let f_begin = count_spaces(data, nb, 0);
        let mut f_end = end - nb;
        while f_end > nb && data[f_end - 1] == b' ' {
            f_end -= 1;
        }

        let text = if f_begin < f_end {
            data[f_begin..f_end].to_vec()
        } else {
            Vec::new()
        };
        let n = self.push_node(NodeKind::Codespan { text });
        self.pop_node(n);

        end
    }

    /// Hard line break: a newline preceded by two spaces.
    fn char_linebreak(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        if pos - consumed < 2 || buf[pos - 1] != b' ' || buf[pos - 2] != b' ' {
            return 0;
        }

        // The marker spaces are syntax, not content.
        self.trim_last_text_trailing_spaces();

        let n = self.push_node(NodeKind::Linebreak);
        self.pop_node(n);
        1
    }

    /// Backslash escape, or explicit math with `\\(` / `\\[`.
    fn char_escape(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        let data = &buf[pos..];
        let size = data.len();

        if size > 1 {
            if data[1] == b'\\'
                && self.opts.math
                && size > 2
                && (data[2] == b'(' || data[2] == b'[')
            {
                let (end, display): (&[u8], bool) = if data[2] == b'[' {
                    (b"\\\\]", true)
                } else {
                    (b"\\\\)", false)
                };
                let w = self.parse_math(buf, pos, consumed, end, 3, display);
                if w != 0 {
                    return w;
                }
            }

            if !ESCAPE_CHARS.contains(&data[1]) {
                return 0;
            }

            self.push_text(&data[1..2]);
        } else if size == 1 {
            self.push_text(&data[0..1]);
        }

        2
    }

    /// `&` introducing an entity of the shape `&#?[A-Za-z0-9]+;`.
    fn char_entity(&mut self, buf: &[u8], pos: usize) -> usize {
        let re = ENTITY.get_or_init(|| Regex::new(r"^&#?[A-Za-z0-9]+;").unwrap());
        let m = match re.find(&buf[pos..]) {
            Some(m) => m,
            None => return 0,
        };

        let n = self.push_node(NodeKind::Entity {
            text: buf[pos..pos + m.end()].to_vec(),
        });
        self.pop_node(n);
        m.end()
    }

    /// `<` opening an angle autolink or an inline tag.
    fn char_langle_tag(&mut self, buf: &[u8], pos: usize) -> usize {
        let data = &buf[pos..];
        let (end, altype) = tag_length(data);

        if end <= 2 {
            return 0;
        }

        if let Some(kind) = altype {
            let mut link = Vec::new();
            unescape_text(&mut link, &data[1..end - 1]);
            let n = self.push_node(NodeKind::LinkAuto {
                link: link.clone(),
                text: link,
                kind,
            });
            self.pop_node(n);
        } else {
            let n = self.push_node(NodeKind::RawHtml {
                text: data[..end].to_vec(),
            });
            self.pop_node(n);
        }

        end
    }

    fn char_autolink_url(&mut self, buf: &[u8], pos: usize) -> usize {
        if self.in_link_body {
            return 0;
        }
        let hit = match autolink::url(buf, pos) {
            Some(hit) => hit,
            None => return 0,
        };

        self.rewind_last_text(hit.rewind);
        let n = self.push_node(NodeKind::LinkAuto {
            link: hit.link,
            text: Vec::new(),
            kind: AutolinkType::Normal,
        });
        self.pop_node(n);
        hit.consumed
    }

    fn char_autolink_email(&mut self, buf: &[u8], pos: usize) -> usize {
        if self.in_link_body {
            return 0;
        }
        let hit = match autolink::email(buf, pos) {
            Some(hit) => hit,
            None => return 0,
        };

        self.rewind_last_text(hit.rewind);
        let n = self.push_node(NodeKind::LinkAuto {
            link: hit.link,
            text: Vec::new(),
            kind: AutolinkType::Email,
        });
        self.pop_node(n);
        hit.consumed
    }

    /// A `www.` link becomes a regular LINK with an `http://` target
    /// and the bare text as its child.
    fn char_autolink_www(&mut self, buf: &[u8], pos: usize) -> usize {
        if self.in_link_body {
            return 0;
        }
        let hit = match autolink::www(buf, pos) {
            Some(hit) => hit,
            None => return 0,
        };

        self.rewind_last_text(hit.rewind);

        let mut url = b"http://".to_vec();
        url.extend_from_slice(&hit.link);

        let n = self.push_node(NodeKind::Link {
            link: url,
            title: Vec::new(),
            attr_id: Vec::new(),
        });
        let nn = self.push_node(NodeKind::NormalText { text: hit.link });
        self.pop_node(nn);
        self.pop_node(n);

        hit.consumed
    }

    fn char_image(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        if buf.len() - pos < 2 || buf[pos + 1] != b'[' {
            return 0;
        }

        let ret = self.char_link(buf, pos + 1, consumed);
        if ret == 0 {
            0
        } else {
            ret + 1
        }
    }

    /// `[`: link, image, footnote reference or metadata reference.
    fn char_link(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        let data = &buf[pos..];
        let size = data.len();

        let is_img = pos - consumed > 0
            && buf[pos - 1] == b'!'
            && !is_escaped(&buf[consumed..], pos - 1 - consumed);
        let is_footnote = self.opts.footnotes && size > 1 && data[1] == b'^';
        let is_metadata = self.opts.metadata && size > 1 && data[1] == b'%';

        // Matching closing bracket.
        let mut i = 1 + find_emph_char(&data[1..], b']');
        let txt_e = i;
        if i < size && data[i] == b']' {
            i += 1;
        } else {
            return 0;
        }

        if is_footnote {
            // Mark the footnote used and number it on first
            // reference; later references fall back to plain text.
            if txt_e < 3 {
                return 0;
            }
            let name = data[2..txt_e].to_vec();
            let idx = match self.footnotes.find_index(&name) {
                Some(idx) => idx,
                None => return 0,
            };
            if self.footnotes.entries[idx].is_used {
                return 0;
            }
            self.used_footnotes.push(idx);
            let num = self.used_footnotes.len();
            self.footnotes.entries[idx].is_used = true;
            self.footnotes.entries[idx].num = num;

            let n = self.push_node(NodeKind::FootnoteRef { num });
            self.pop_node(n);
            return i;
        }

        if is_metadata {
            // Copy the keyed value (every matching entry) into the
            // stream as plain text.
            if txt_e < 3 {
                return 0;
            }
            let key = &data[2..txt_e];
            let values: Vec<String> = self
                .metadata
                .iter()
                .filter(|m| m.key.as_bytes() == key)
                .map(|m| m.value.clone())
                .collect();
            for value in values {
                self.push_text(value.as_bytes());
            }
            return i;
        }

        // Skip any amount of spacing, laxly.
        if i < size && is_space(data[i]) {
            self.warnings.push(Warning::SpaceBeforeLink);
        }
        while i < size && is_space(data[i]) {
            i += 1;
        }

        let mut link: Option<Vec<u8>> = None;
        let mut title: Option<Vec<u8>> = None;
        let mut dims: Option<Vec<u8>> = None;

        if i < size && data[i] == b'(' {
            // Inline style link.
            i += 1;
            while i < size && is_space(data[i]) {
                i += 1;
            }

            let mut link_b = i;

            // Looking for the link end, counting open parentheses.
            let mut nb_p = 0;
            while i < size {
                if data[i] == b'\\' {
                    i += 2;
                } else if data[i] == b'(' && i != 0 {
                    nb_p += 1;
                    i += 1;
                } else if data[i] == b')' {
                    if nb_p == 0 {
                        break;
                    }
                    nb_p -= 1;
                    i += 1;
                } else if i >= 1
                    && is_space(data[i - 1])
                    && (data[i] == b'\'' || data[i] == b'=' || data[i] == b'"')
                {
                    break;
                } else {
                    i += 1;
                }
            }

            if i >= size {
                return 0;
            }
            let mut link_e = i;
            let mut title_b = 0usize;
            let mut title_e = 0usize;
            let mut dims_b = 0usize;
            let mut dims_e = 0usize;

            // Optional quoted title and `=WxH` dimensions, in either
            // order.
            loop {
                if data[i] == b'\'' || data[i] == b'"' {
                    let qtype = data[i];
                    let mut in_title = true;
                    i += 1;
                    title_b = i;

                    while i < size {
                        if data[i] == b'\\' {
                            i += 1;
                        } else if data[i] == qtype {
                            in_title = false;
                        } else if data[i] == b'=' && !in_title {
                            break;
                        } else if data[i] == b')' && !in_title {
                            break;
                        }
                        i += 1;
                    }

                    if i >= size {
                        return 0;
                    }

                    title_e = i - 1;
                    while title_e > title_b && is_space(data[title_e]) {
                        title_e -= 1;
                    }

                    // The closing quote must be present.
                    if data[title_e] != b'\'' && data[title_e] != b'"' {
                        title_b = 0;
                        title_e = 0;
                        link_e = i;
                    }

                    if data[i] == b'=' {
                        continue;
                    }
                    break;
                } else if data[i] == b'=' {
                    i += 1;
                    dims_b = i;
                    while i < size {
                        if data[i] == b'\\' {
                            i += 1;
                        } else if data[i] == b'\'' || data[i] == b'"' {
                            break;
                        } else if data[i] == b')' {
                            break;
                        }
                        i += 1;
                    }

                    if i >= size {
                        return 0;
                    }

                    dims_e = i;
                    while dims_e > dims_b && is_space(data[dims_e - 1]) {
                        dims_e -= 1;
                    }

                    if data[i] == b'"' || data[i] == b'\'' {
                        continue;
                    }
                    break;
                }
                break;
            }

            // Remove spacing and optional angle brackets around the
            // link.
            while link_e > link_b && is_space(data[link_e - 1]) {
                link_e -= 1;
            }
            if link_e > link_b && data[link_b] == b'<' && data[link_e - 1] == b'>' {
                link_b += 1;
                link_e -= 1;
            }

            if link_e > link_b {
                link = Some(data[link_b..link_e].to_vec());
            }
            if title_e > title_b {
                title = Some(data[title_b..title_e].to_vec());
            }
            if dims_e > dims_b {
                dims = Some(data[dims_b..dims_e].to_vec());
            }

            i += 1;
        } else if i < size && data[i] == b'[' {
            // Reference style link.
            i += 1;
            let link_b = i;
            while i < size && data[i] != b']' {
                i += 1;
            }
            if i >= size {
                return 0;
            }
            let link_e = i;

            let mut id = Vec::new();
            if link_b == link_e {
                replace_spacing(&mut id, &data[1..txt_e]);
            } else {
                id.extend_from_slice(&data[link_b..link_e]);
            }

            match self.refs.find(&id) {
                Some(r) => {
                    link = if r.link.is_empty() {
                        None
                    } else {
                        Some(r.link.clone())
                    };
                    title = if r.title.is_empty() {
                        None
                    } else {
                        Some(r.title.clone())
                    };
                }
                None => return 0,
            }
            i += 1;
        } else {
            // Shortcut reference style link.
            let mut id = Vec::new();
            replace_spacing(&mut id, &data[1..txt_e]);

            match self.refs.find(&id) {
                Some(r) => {
                    link = if r.link.is_empty() {
                        None
                    } else {
                        Some(r.link.clone())
                    };
                    title = if r.title.is_empty() {
                        None
                    } else {
                        Some(r.title.clone())
                    };
                }
                None => return 0,
            }

            // Rewind the spacing.
            i = txt_e + 1;
        }

        // Optional trailing `{...}` attribute group.
        let mut attr_id = Vec::new();
        let mut attr_width = Vec::new();
        let mut attr_height = Vec::new();
        if (self.opts.extended_attributes || (is_img && self.opts.img_ext))
            && i < size
            && data[i] == b'{'
        {
            if let Some((id_v, w_v, h_v, after)) = parse_attr_group(&data[i..]) {
                if self.opts.extended_attributes {
                    attr_id = id_v;
                }
                if is_img && self.opts.img_ext {
                    attr_width = w_v;
                    attr_height = h_v;
                }
                i += after;
            }
        }

        let u_link = link.map(|l| {
            let mut u = Vec::new();
            unescape_text(&mut u, &l);
            u
        });

        let kind = if is_img {
            NodeKind::Image {
                link: u_link.unwrap_or_default(),
                title: title.unwrap_or_default(),
                dims: dims.unwrap_or_default(),
                alt: if txt_e > 1 {
                    data[1..txt_e].to_vec()
                } else {
                    Vec::new()
                },
                attr_width,
                attr_height,
            }
        } else {
            NodeKind::Link {
                link: u_link.unwrap_or_default(),
                title: title.unwrap_or_default(),
                attr_id,
            }
        };

        let n = self.push_node(kind);

        // Image alt stays raw; link content is span-parsed with
        // nested autolinks suppressed.
        if !is_img && txt_e > 1 {
            self.in_link_body = true;
            self.parse_inline(&data[1..txt_e]);
            self.in_link_body = false;
        }

        self.pop_node(n);
        i
    }

    /// `^word` or `^(...)`.
    fn char_superscript(&mut self, buf: &[u8], pos: usize) -> usize {
        self.char_supsub(buf, pos, NodeKind::Superscript)
    }

    /// `~word` or `~(...)`, sharing the superscript scanning rules.
    fn char_subscript(&mut self, buf: &[u8], pos: usize) -> usize {
        self.char_supsub(buf, pos, NodeKind::Subscript)
    }

    fn char_supsub(&mut self, buf: &[u8], pos: usize, kind: NodeKind) -> usize {
        let data = &buf[pos..];
        let size = data.len();

        if size < 2 {
            return 0;
        }

        let (sup_start, sup_len) = if data[1] == b'(' {
            let len = find_emph_char(&data[2..], b')') + 2;
            if len == size {
                return 0;
            }
            (2, len)
        } else {
            let mut len = 1;
            while len < size && !is_space(data[len]) {
                len += 1;
            }
            (1, len)
        };

        if sup_len - sup_start == 0 {
            return if sup_start == 2 { 3 } else { 0 };
        }

        let n = self.push_node(kind);
        self.parse_inline(&data[sup_start..sup_len]);
        self.pop_node(n);

        if sup_start == 2 {
            sup_len + 1
        } else {
            sup_len
        }
    }

    /// `$` math span; `$$` always, single `$` only when explicit
    /// math is enabled.
    fn char_math(&mut self, buf: &[u8], pos: usize, consumed: usize) -> usize {
        let data = &buf[pos..];

        if data.len() > 1 && data[1] == b'$' {
            return self.parse_math(buf, pos, consumed, b"$$", 2, true);
        }

        if self.opts.math_explicit {
            return self.parse_math(buf, pos, consumed, b"$", 1, false);
        }

        0
    }

    /// Math span up to `end_delim`. For `$$` without explicit math,
    /// display mode is guessed from the surrounding emptiness.
    fn parse_math(
        &mut self,
        buf: &[u8],
        pos: usize,
        consumed: usize,
        end_delim: &[u8],
        delimsz: usize,
        displaymode: bool,
    ) -> usize {
        let data = &buf[pos..];
        let size = data.len();
        let mut i = delimsz;

        loop {
            while i < size && data[i] != end_delim[0] {
                i += 1;
            }
            if i >= size {
                return 0;
            }
            if !is_escaped(data, i) && i + delimsz <= size && &data[i..i + delimsz] == end_delim {
                break;
            }
            i += 1;
        }

        let text = data[delimsz..i].to_vec();
        i += delimsz;

        let mut display = displaymode;
        if delimsz == 2 && !self.opts.math_explicit {
            display = is_empty_all(&buf[consumed..pos]) && is_empty_all(&data[i..]);
        }

        let n = self.push_node(NodeKind::MathBlock {
            text,
            block_mode: display,
        });
        self.pop_node(n);

        i
    }

    fn trim_last_text_trailing_spaces(&mut self) {
        if let Some(id) = self.last_child_of_current() {
            if let Some(mut node) = self.tree.get_mut(id) {
                if let NodeKind::NormalText { text } = &mut node.value().kind {
                    while text.last() == Some(&b' ') {
                        text.pop();
                    }
                }
            }
        }
    }

    /// Shorten the last emitted text run by `rewind` bytes; used by
    /// autolinks that begin inside already-copied text.
    fn rewind_last_text(&mut self, rewind: usize) {
        if rewind == 0 {
            return;
        }
        if let Some(id) = self.last_child_of_current() {
            if let Some(mut node) = self.tree.get_mut(id) {
                if let NodeKind::NormalText { text } = &mut node.value().kind {
                    let keep = text.len().saturating_sub(rewind);
                    text.truncate(keep);
                }
            }
        }
    }
}

/// Parse a `{...}` attribute group; returns `(#id, width, height,
/// consumed)` on a same-line balanced group.
fn parse_attr_group(data: &[u8]) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>, usize)> {
    let close = data.iter().position(|&c| c == b'}')?;
    if data[..close].contains(&b'\n') {
        return None;
    }

    let mut id = Vec::new();
    let mut width = Vec::new();
    let mut height = Vec::new();

    for tok in data[1..close].split(|&c| c == b' ') {
        if let Some(rest) = tok.strip_prefix(b"#") {
            id = rest.to_vec();
        } else if let Some(rest) = tok.strip_prefix(b"width=") {
            width = rest.to_vec();
        } else if let Some(rest) = tok.strip_prefix(b"height=") {
            height = rest.to_vec();
        }
    }

    Some((id, width, height, close + 1))
}

/// Length of the tag starting at `data[0] == '<'`, or 0; reports
/// whether it is a URL or e-mail autolink.
fn tag_length(data: &[u8]) -> (usize, Option<AutolinkType>) {
    let size = data.len();

    if size < 3 || data[0] != b'<' {
        return (0, None);
    }

    // HTML comment, laxist form.
    if size > 5 && data[1] == b'!' && data[2] == b'-' && data[3] == b'-' {
        let mut i = 5;
        while i < size && !(data[i - 2] == b'-' && data[i - 1] == b'-' && data[i] == b'>') {
            i += 1;
        }
        i += 1;
        if i <= size {
            return (i, None);
        }
    }

    let mut i = if data[1] == b'/' { 2 } else { 1 };
    if !data[i].is_ascii_alphanumeric() {
        return (0, None);
    }

    // Try to find the beginning of a URI.
    while i < size
        && (data[i].is_ascii_alphanumeric()
            || data[i] == b'.'
            || data[i] == b'+'
            || data[i] == b'-')
    {
        i += 1;
    }

    if i > 1 && i < size && data[i] == b'@' {
        let j = mail_autolink_len(&data[i..]);
        if j != 0 {
            return (i + j, Some(AutolinkType::Email));
        }
    }

    let mut autolink = false;
    if i > 2 && i < size && data[i] == b':' {
        autolink = true;
        i += 1;
    }

    // Complete the autolink test: no spacing or quotes allowed.
    if i < size && autolink {
        let j = i;
        while i < size {
            if data[i] == b'\\' {
                i += 2;
            } else if data[i] == b'>'
                || data[i] == b'\''
                || data[i] == b'"'
                || data[i] == b' '
                || data[i] == b'\n'
            {
                break;
            } else {
                i += 1;
            }
        }

        if i >= size {
            return (0, None);
        }
        if i > j && data[i] == b'>' {
            return (i + 1, Some(AutolinkType::Normal));
        }
    }

    // Something looking like a tag end.
    while i < size && data[i] != b'>' {
        i += 1;
    }
    if i >= size {
        return (0, None);
    }
    (i + 1, None)
}

/// Mail address part of an autolink, up to and including `>`:
/// `[-@._a-zA-Z0-9]+` with exactly one `@`.
fn mail_autolink_len(data: &[u8]) -> usize {
    let mut nb = 0;

    for (i, &c) in data.iter().enumerate() {
        if c.is_ascii_alphanumeric() {
            continue;
        }
        match c {
            b'@' => nb += 1,
            b'-' | b'.' | b'_' => {}
            b'>' => {
                return if nb == 1 { i + 1 } else { 0 };
            }
            _ => return 0,
        }
    }

    0
}
