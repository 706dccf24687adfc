//! Model preset subsystem.
//!
//! # Data Flow
//! ```text
//! preset file (INI)
//!     → source.rs (read bytes, fingerprint)
//!     → parser.rs (sections, keys; syntax only)
//!     → validator.rs (normalize, coerce, resolve source)
//!     → DesiredSet (complete, immutable)
//!     → handed to the reconciler
//! ```
//!
//! # Design Decisions
//! - A document either yields a whole Desired Set or an error; never a part
//! - Bad entries are kept with their error attached, bad documents are rejected
//! - No I/O beyond reading the source

pub mod parser;
pub mod source;
pub mod validator;

use thiserror::Error;

pub use parser::{parse, ParseError, PresetDocument};
pub use source::{FileSource, Fingerprint, MemorySource, PresetSource, SourceContent, SourceError};
pub use validator::{
    build_desired_set, DesiredEntry, DesiredSet, DocumentError, ModelSource, ModelSpec,
    ValidationError,
};

/// Reasons a whole preset document is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
    #[error("invalid preset: {0}")]
    Document(#[from] DocumentError),
    #[error("preset is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Parse and validate preset text into a Desired Set.
pub fn desired_set_from_str(text: &str) -> Result<DesiredSet, PresetError> {
    let doc = parse(text)?;
    Ok(build_desired_set(&doc)?)
}

/// Decode raw preset content, then parse and validate it.
pub fn desired_set_from_bytes(bytes: &[u8]) -> Result<DesiredSet, PresetError> {
    desired_set_from_str(std::str::from_utf8(bytes)?)
}
