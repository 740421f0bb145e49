//! Byte-level scanning helpers shared across the parser
//!
//! Markdown spacing is only the literal space and the newline: tabs
//! and carriage returns are rewritten during preprocessing, so the
//! grammar rules never see them.

use regex::bytes::Regex;
use std::sync::OnceLock;

/// Tab stops expand to the next multiple of this column count.
pub const TAB_WIDTH: usize = 4;

static HRULE: OnceLock<Regex> = OnceLock::new();
static HEADERLINE: OnceLock<Regex> = OnceLock::new();

pub fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\n'
}

/// Length of the line (including its newline) when it contains only
/// spaces, 0 otherwise.
pub fn is_empty(data: &[u8]) -> usize {
    let mut i = 0;
    while i < data.len() && data[i] != b'\n' {
        if data[i] != b' ' {
            return 0;
        }
        i += 1;
    }
    i + 1
}

/// Whether the whole slice is spacing.
pub fn is_empty_all(data: &[u8]) -> bool {
    data.iter().all(|&c| is_space(c))
}

/// Index just past the run of spaces starting at `offset`. A
/// `maxlen` of zero counts without bound.
pub fn count_spaces(data: &[u8], offset: usize, maxlen: usize) -> usize {
    let mut i = offset;
    while i < data.len() {
        if maxlen > 0 && i - offset == maxlen {
            break;
        }
        if data[i] != b' ' {
            break;
        }
        i += 1;
    }
    i
}

/// Copy `data` into `out`, replacing newlines with single spaces. A
/// newline directly after a space is dropped rather than doubled.
pub fn replace_spacing(out: &mut Vec<u8>, data: &[u8]) {
    let mut i = 0;
    loop {
        let mark = i;
        while i < data.len() && data[i] != b'\n' {
            i += 1;
        }
        out.extend_from_slice(&data[mark..i]);
        if i >= data.len() {
            break;
        }
        if !(i > 0 && data[i - 1] == b' ') {
            out.push(b' ');
        }
        i += 1;
    }
}

/// Expand tabs to the next 4-column boundary.
///
/// Columns are counted UTF-8-aware: continuation bytes (`10xxxxxx`)
/// do not advance the column. Combining characters are not handled.
pub fn expand_tabs(out: &mut Vec<u8>, line: &[u8]) {
    let mut i = 0;
    let mut tab = 0usize;

    while i < line.len() {
        let org = i;
        while i < line.len() && line[i] != b'\t' {
            if line[i] & 0xc0 != 0x80 {
                tab += 1;
            }
            i += 1;
        }

        if i > org {
            out.extend_from_slice(&line[org..i]);
        }

        if i >= line.len() {
            break;
        }

        loop {
            out.push(b' ');
            tab += 1;
            if tab % TAB_WIDTH == 0 {
                break;
            }
        }
        i += 1;
    }
}

/// Whether the char at `loc` is escaped by a preceding backslash
/// run. Odd run lengths escape, even ones do not.
pub fn is_escaped(data: &[u8], loc: usize) -> bool {
    let mut i = loc;
    while i >= 1 && data[i - 1] == b'\\' {
        i -= 1;
    }
    (loc - i) % 2 == 1
}

/// Whether the current line is a horizontal rule: at most three
/// leading spaces, then at least three of the same `*` / `-` / `_`
/// with nothing else but spaces.
pub fn is_hrule(data: &[u8]) -> bool {
    if data.len() < 3 {
        return false;
    }
    let line = match data.iter().position(|&c| c == b'\n') {
        Some(n) => &data[..n],
        None => data,
    };
    let re = HRULE.get_or_init(|| {
        Regex::new(r"^ {0,3}(?:(?:\* *){3,}|(?:- *){3,}|(?:_ *){3,})$").unwrap()
    });
    re.is_match(line)
}

/// Setext underline test: a run of `=` (level 1) or `-` (level 2)
/// with only trailing spaces. Returns the level, or 0.
pub fn is_headerline(data: &[u8]) -> usize {
    let line = match data.iter().position(|&c| c == b'\n') {
        Some(n) => &data[..n],
        None => data,
    };
    let re = HEADERLINE.get_or_init(|| Regex::new(r"^(?:=+|-+) *$").unwrap());
    if line.is_empty() || !re.is_match(line) {
        return 0;
    }
    if line[0] == b'=' {
        1
    } else {
        2
    }
}

/// Whether the line after the current one is a setext underline.
pub fn is_next_headerline(data: &[u8]) -> bool {
    let mut i = 0;
    while i < data.len() && data[i] != b'\n' {
        i += 1;
    }
    i += 1;
    if i >= data.len() {
        return false;
    }
    is_headerline(&data[i..]) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_lengths() {
        assert_eq!(is_empty(b"   \nrest"), 4);
        assert_eq!(is_empty(b"x\n"), 0);
        assert_eq!(is_empty(b"  "), 3);
    }

    #[test]
    fn hrule_shapes() {
        assert!(is_hrule(b"***\n"));
        assert!(is_hrule(b" - - -"));
        assert!(is_hrule(b"___ \nafter"));
        assert!(!is_hrule(b"**\n"));
        assert!(!is_hrule(b"-*-\n"));
        assert!(!is_hrule(b"    ---\n"));
    }

    #[test]
    fn headerline_levels() {
        assert_eq!(is_headerline(b"====\n"), 1);
        assert_eq!(is_headerline(b"--  \n"), 2);
        assert_eq!(is_headerline(b"=-=\n"), 0);
        assert_eq!(is_headerline(b"\n"), 0);
    }

    #[test]
    fn tab_expansion_stops() {
        let mut out = Vec::new();
        expand_tabs(&mut out, b"a\tb");
        assert_eq!(out, b"a   b");

        let mut out = Vec::new();
        expand_tabs(&mut out, b"\t.");
        assert_eq!(out, b"    .");
    }

    #[test]
    fn tab_expansion_is_utf8_aware() {
        // Two-byte character occupies one column.
        let mut out = Vec::new();
        expand_tabs(&mut out, "é\t.".as_bytes());
        assert_eq!(out, "é   .".as_bytes());
    }

    #[test]
    fn escape_runs() {
        assert!(is_escaped(b"\\*", 1));
        assert!(!is_escaped(b"\\\\*", 2));
        assert!(!is_escaped(b"*", 0));
    }

    #[test]
    fn spacing_replacement_collapses_newlines() {
        let mut out = Vec::new();
        replace_spacing(&mut out, b"a\nb");
        assert_eq!(out, b"a b");

        let mut out = Vec::new();
        replace_spacing(&mut out, b"a \nb");
        assert_eq!(out, b"a b");
    }
}
