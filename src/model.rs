//! Data model for the step catalogue.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;
use serde::Deserialize;

/// The Gherkin verb a step definition is registered under.
///
/// `And`, `But` and `*` never carry their own definitions; they inherit the
/// nearest preceding explicit verb when a document is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Given,
    When,
    Then,
}

impl StepKind {
    pub const ALL: [StepKind; 3] = [StepKind::Given, StepKind::When, StepKind::Then];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Given => "given",
            StepKind::When => "when",
            StepKind::Then => "then",
        }
    }

    /// Maps a registration or document keyword onto a verb.
    pub fn from_keyword(keyword: &str) -> Option<StepKind> {
        match keyword.trim_end_matches(':').to_lowercase().as_str() {
            "given" => Some(StepKind::Given),
            "when" => Some(StepKind::When),
            "then" => Some(StepKind::Then),
            _ => None,
        }
    }

    /// Whether the keyword inherits the verb of the nearest preceding step.
    pub fn inherits(keyword: &str) -> bool {
        matches!(keyword.to_lowercase().as_str(), "and" | "but" | "*")
    }
}

/// Where a step implementation lives in the external library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// 1-based line of the implementing function.
    pub line: u32,
}

/// One catalogue entry.
///
/// `regex_patterns` and `expression_variants` are parallel: variant `i` is the
/// human-readable expansion matched by pattern `i`. Both are non-empty and
/// every pattern is anchored at both ends.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub kind: StepKind,
    /// The original pattern string as registered.
    pub expression: String,
    /// The pattern with every placeholder emptied; used for similarity hints.
    pub clean_expression: String,
    pub regex_patterns: Vec<Regex>,
    pub expression_variants: Vec<String>,
    /// Per quoted slot of the expression, the permitted enum alternatives
    /// (`None` for free-text slots).
    pub quoted_slots: Vec<Option<Vec<String>>>,
    pub help: Option<String>,
    pub source_location: Option<SourceLocation>,
}

/// Registered parse types with enumerable alternatives, keyed by type name.
pub type ParseTypeRegistry = HashMap<String, Vec<String>>;

/// A step registration harvested from the external library, before pattern
/// compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStepDefinition {
    pub keyword: String,
    pub pattern: String,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

/// A parse type harvested from the external library.
#[derive(Debug, Clone, Deserialize)]
pub struct RawParseType {
    pub name: String,
    pub alternatives: Vec<String>,
}

/// The complete harvest payload produced by the source loader.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInventory {
    pub steps: Vec<RawStepDefinition>,
    #[serde(default)]
    pub types: Vec<RawParseType>,
}
