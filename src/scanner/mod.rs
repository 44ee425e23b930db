//! Balanced-region scanners for expression and tag delimiters
//!
//! Both scanners are small finite state machines (see [`State`]) driven by a
//! [`Cursor`] that walks the text one character at a time and reports whether
//! each character is escaped by a preceding backslash. An escaped delimiter is
//! plain text and never opens, closes or nests a region.
//!
//! Escape sequences are left in place by every scan. [`unescape`] resolves
//! them once, when a render has finished.

pub mod bracket;
pub mod tag;

use std::str::CharIndices;

pub use bracket::scan_brackets;
pub use tag::{partial_invocations, scan_tags, PartialInvocation};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Characters that lose their structural meaning after a backslash
pub const ESCAPABLE: [char; 5] = ['{', '}', '<', '>', '\\'];

/// A top-level balanced region found by a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<'a> {
    /// Region text. Bracket regions exclude their delimiters, tag regions
    /// are the whole fragment from `<` through the balancing `>`.
    pub text: &'a str,
    /// Byte range of the region including its delimiters
    pub span: Span,
}

/// Outcome of scanning a text for top-level regions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan<'a> {
    /// Complete regions in order of appearance, duplicates preserved
    pub regions: Vec<Region<'a>>,
    /// Offset of a region that opened but never balanced before end of input
    pub unterminated: Option<usize>,
}

impl<'a> Scan<'a> {
    /// Region texts in order of appearance
    pub fn texts(&self) -> Vec<&'a str> {
        self.regions.iter().map(|r| r.text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Scanner state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Outside any region
    Literal,
    /// Inside a `{...}` region opened at `start`
    InBracket { start: usize, depth: usize },
    /// Inside a tag fragment opened at `start`. `in_tag` is set between a
    /// tag's `<` and its `>`, `closing` when that tag is a `</...>`.
    InTag {
        start: usize,
        depth: usize,
        closing: bool,
        in_tag: bool,
    },
}

/// One character visited by a [`Cursor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    pub offset: usize,
    pub ch: char,
    pub escaped: bool,
}

/// Character cursor that tracks backslash escapes.
///
/// A character is escaped when it follows an odd run of backslashes, so
/// `\\{` is an escaped backslash followed by a structural `{`.
pub(crate) struct Cursor<'a> {
    chars: CharIndices<'a>,
    pending_escape: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices(),
            pending_escape: false,
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        let (offset, ch) = self.chars.next()?;
        let escaped = self.pending_escape;
        self.pending_escape = !escaped && ch == '\\';
        Some(Step {
            offset,
            ch,
            escaped,
        })
    }
}

/// Byte offset of the first unescaped occurrence of `target`
pub(crate) fn find_unescaped(text: &str, target: char) -> Option<usize> {
    Cursor::new(text)
        .find(|step| step.ch == target && !step.escaped)
        .map(|step| step.offset)
}

/// Byte offset of the last unescaped occurrence of `target`
pub(crate) fn rfind_unescaped(text: &str, target: char) -> Option<usize> {
    Cursor::new(text)
        .filter(|step| step.ch == target && !step.escaped)
        .last()
        .map(|step| step.offset)
}

/// Resolve escape sequences into the bare delimiter.
///
/// Only the sequences in [`ESCAPABLE`] are rewritten; any other backslash is
/// literal text and is kept.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPABLE.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Protect literal text from [`unescape`] by doubling every backslash.
///
/// Evaluated values are spliced into escaped markup with this, so the final
/// resolution hands them back byte for byte.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', r"\\")
}
