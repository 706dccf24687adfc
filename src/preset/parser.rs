//! Preset document parser.
//!
//! # Responsibilities
//! - Split raw INI-style text into document globals, `[*]` defaults and named sections
//! - Preserve section and key order as written
//! - Reject malformed lines, duplicate sections and duplicate keys
//!
//! # Design Decisions
//! - Purely syntactic: values stay raw strings, keys are not normalized
//! - Never partially succeeds: the first error aborts with its line number
//! - An empty document is a valid document with no entries

use indexmap::IndexMap;
use thiserror::Error;

/// Section name whose keys apply to every entry.
pub const DEFAULTS_SECTION: &str = "*";

/// Raw key/value pairs of one section, in file order.
pub type RawAttributes = IndexMap<String, String>;

/// Syntax error in a preset document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// A syntactically valid preset document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetDocument {
    /// Keys that appear before the first section (e.g. `version`).
    pub globals: RawAttributes,
    /// Keys of the `[*]` section.
    pub defaults: RawAttributes,
    /// Named sections in the order they appear.
    pub sections: IndexMap<String, RawAttributes>,
}

impl PresetDocument {
    /// True if the document declares no entries.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

enum Target {
    Globals,
    Defaults,
    Section(String),
}

/// Parse preset text into a [`PresetDocument`].
pub fn parse(text: &str) -> Result<PresetDocument, ParseError> {
    let mut doc = PresetDocument::default();
    let mut target = Target::Globals;
    let mut defaults_seen = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| ParseError::new(line_no, "section header is missing closing ']'"))?
                .trim();

            if name.is_empty() {
                return Err(ParseError::new(line_no, "empty section name"));
            }

            if name == DEFAULTS_SECTION {
                if defaults_seen {
                    return Err(ParseError::new(line_no, "duplicate section '[*]'"));
                }
                defaults_seen = true;
                target = Target::Defaults;
                continue;
            }

            if doc.sections.contains_key(name) {
                return Err(ParseError::new(
                    line_no,
                    format!("duplicate section '{}'", name),
                ));
            }
            doc.sections.insert(name.to_string(), RawAttributes::new());
            target = Target::Section(name.to_string());
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ParseError::new(line_no, format!("expected 'key = value', found '{}'", line)))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::new(line_no, "empty key"));
        }
        let value = unquote(value.trim());

        let attrs = match &target {
            Target::Globals => &mut doc.globals,
            Target::Defaults => &mut doc.defaults,
            Target::Section(name) => doc
                .sections
                .get_mut(name)
                .ok_or_else(|| ParseError::new(line_no, "assignment outside of a section"))?,
        };

        if attrs.contains_key(key) {
            return Err(ParseError::new(line_no, format!("duplicate key '{}'", key)));
        }
        attrs.insert(key.to_string(), value.to_string());
    }

    Ok(doc)
}

/// Strip one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
