//! Entry and document validation.
//!
//! # Responsibilities
//! - Normalize attribute keys (`ctx-size` and `CTX_SIZE` become `ctx_size`)
//! - Resolve exactly one model source per entry
//! - Coerce typed attributes (integers, floats, booleans)
//! - Build the Desired Set from a parsed document
//!
//! # Design Decisions
//! - Attribute-local only: never touches the filesystem or network
//! - An invalid entry is kept in the Desired Set with its error attached
//! - Only document-level problems (unsupported `version`) reject the whole pass

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::preset::parser::{PresetDocument, RawAttributes};

/// The only preset format version understood by this router.
pub const SUPPORTED_VERSION: &str = "1";

/// Semantic problem with one entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model '{name}': {reason}")]
pub struct ValidationError {
    pub name: String,
    pub reason: String,
}

/// Semantic problem with the document as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("unsupported preset version '{0}' (expected {SUPPORTED_VERSION})")]
    UnsupportedVersion(String),
}

/// Where the weights (or the running server) for a model come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Local model file.
    Local(String),
    /// Remote repository resolved by the backend at load time.
    HuggingFace(String),
    /// An already running backend; loading only waits for it to be ready.
    Upstream(String),
}

impl ModelSource {
    /// Attribute keys that declare a source.
    pub const KEYS: [&'static str; 3] = ["model", "hf_repo", "upstream"];

    pub fn kind(&self) -> &'static str {
        match self {
            ModelSource::Local(_) => "model",
            ModelSource::HuggingFace(_) => "hf_repo",
            ModelSource::Upstream(_) => "upstream",
        }
    }

    pub fn location(&self) -> &str {
        match self {
            ModelSource::Local(v) | ModelSource::HuggingFace(v) | ModelSource::Upstream(v) => v,
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.location())
    }
}

/// Typed options coerced from the attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelOptions {
    pub ctx_size: Option<u32>,
    pub n_gpu_layers: Option<i32>,
    pub temperature: Option<f32>,
    pub load_on_startup: Option<bool>,
    pub load_timeout_secs: Option<u64>,
}

impl ModelOptions {
    /// Keys consumed by the router itself rather than forwarded to the backend.
    pub const ROUTER_KEYS: [&'static str; 2] = ["load_on_startup", "load_timeout"];
}

/// A validated (or knowingly invalid) model declaration.
///
/// Equality is defined by the normalized attributes alone: `source` and
/// `options` are derived from them. Attribute order does not matter.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub source: Option<ModelSource>,
    pub options: ModelOptions,
}

impl PartialEq for ModelSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.attributes == other.attributes
    }
}

impl Eq for ModelSpec {}

impl ModelSpec {
    /// Attributes forwarded to the backend process as `--key value`.
    pub fn backend_args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| {
                !ModelSource::KEYS.contains(&k.as_str())
                    && !ModelOptions::ROUTER_KEYS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One entry of the Desired Set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub spec: ModelSpec,
    pub error: Option<ValidationError>,
}

impl DesiredEntry {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// What the operator wants right now, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSet {
    entries: IndexMap<String, DesiredEntry>,
}

impl DesiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: DesiredEntry) {
        self.entries.insert(entry.spec.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&DesiredEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesiredEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries carrying a validation error.
    pub fn invalid_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_valid()).count()
    }
}

/// Normalize an attribute key: lowercase, dashes become underscores.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('-', "_")
}

/// Validate one entry.
///
/// On failure the error is returned together with the best-effort spec so the
/// caller can still record what the operator wrote.
pub fn validate_entry(
    name: &str,
    raw: &RawAttributes,
) -> Result<ModelSpec, (ModelSpec, ValidationError)> {
    let mut attributes = IndexMap::with_capacity(raw.len());
    let mut key_clash = None;
    for (key, value) in raw {
        let key = normalize_key(key);
        if attributes.contains_key(&key) && key_clash.is_none() {
            key_clash = Some(key.clone());
        }
        attributes.insert(key, value.clone());
    }

    let mut spec = ModelSpec {
        name: name.to_string(),
        attributes,
        source: None,
        options: ModelOptions::default(),
    };

    let fail = |spec: ModelSpec, reason: String| {
        let err = ValidationError {
            name: spec.name.clone(),
            reason,
        };
        Err((spec, err))
    };

    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return fail(spec, "name must be non-empty and contain no whitespace".into());
    }

    if let Some(key) = key_clash {
        return fail(spec, format!("attribute '{}' is given more than once", key));
    }

    match resolve_source(&spec.attributes) {
        Ok(source) => spec.source = Some(source),
        Err(reason) => return fail(spec, reason),
    }

    match coerce_options(&spec.attributes) {
        Ok(options) => spec.options = options,
        Err(reason) => return fail(spec, reason),
    }

    Ok(spec)
}

fn resolve_source(attrs: &IndexMap<String, String>) -> Result<ModelSource, String> {
    let declared: Vec<&str> = ModelSource::KEYS
        .iter()
        .copied()
        .filter(|k| attrs.contains_key(*k))
        .collect();

    let key = match declared.as_slice() {
        [] => {
            return Err(format!(
                "no model source: expected one of {}",
                ModelSource::KEYS.join(", ")
            ))
        }
        [key] => *key,
        many => return Err(format!("conflicting model sources: {}", many.join(", "))),
    };

    let value = attrs.get(key).map(|v| v.trim()).unwrap_or_default();
    if value.is_empty() {
        return Err(format!("'{}' must not be empty", key));
    }

    Ok(match key {
        "model" => ModelSource::Local(value.to_string()),
        "hf_repo" => ModelSource::HuggingFace(value.to_string()),
        _ => ModelSource::Upstream(value.to_string()),
    })
}

fn coerce_options(attrs: &IndexMap<String, String>) -> Result<ModelOptions, String> {
    let mut options = ModelOptions::default();

    if let Some(v) = attrs.get("ctx_size") {
        let n: u32 = parse_number("ctx_size", v)?;
        if n == 0 {
            return Err("'ctx_size' must be greater than 0".into());
        }
        options.ctx_size = Some(n);
    }
    if let Some(v) = attrs.get("n_gpu_layers") {
        options.n_gpu_layers = Some(parse_number("n_gpu_layers", v)?);
    }
    if let Some(v) = attrs.get("temperature") {
        let t: f32 = parse_number("temperature", v)?;
        if !(0.0..=2.0).contains(&t) {
            return Err(format!("'temperature' must be within 0.0..=2.0, got {}", t));
        }
        options.temperature = Some(t);
    }
    if let Some(v) = attrs.get("load_on_startup") {
        options.load_on_startup = Some(parse_bool("load_on_startup", v)?);
    }
    if let Some(v) = attrs.get("load_timeout") {
        let secs: u64 = parse_number("load_timeout", v)?;
        if secs == 0 {
            return Err("'load_timeout' must be greater than 0".into());
        }
        options.load_timeout_secs = Some(secs);
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' expects a number, got '{}'", key, value))
}

/// Parse a boolean attribute value.
pub fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("'{}' expects a boolean, got '{}'", key, value)),
    }
}

/// Check document globals.
pub fn validate_document(doc: &PresetDocument) -> Result<(), DocumentError> {
    if let Some(version) = doc.globals.get("version") {
        if version.trim() != SUPPORTED_VERSION {
            return Err(DocumentError::UnsupportedVersion(version.clone()));
        }
    }
    Ok(())
}

/// Turn a parsed document into a Desired Set.
///
/// `[*]` defaults are merged under each entry's own attributes before the
/// entry is validated.
pub fn build_desired_set(doc: &PresetDocument) -> Result<DesiredSet, DocumentError> {
    validate_document(doc)?;

    let mut desired = DesiredSet::new();
    for (name, own) in &doc.sections {
        let mut merged = RawAttributes::new();
        for (key, value) in &doc.defaults {
            let shadowed = own.keys().any(|k| normalize_key(k) == normalize_key(key));
            if !shadowed {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in own {
            merged.insert(key.clone(), value.clone());
        }

        let entry = match validate_entry(name, &merged) {
            Ok(spec) => DesiredEntry { spec, error: None },
            Err((spec, err)) => DesiredEntry {
                spec,
                error: Some(err),
            },
        };
        desired.insert(entry);
    }
    Ok(desired)
}
