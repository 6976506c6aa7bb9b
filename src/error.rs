//! Structured error kinds for the language server.

use thiserror::Error;

/// Errors produced while turning a step-definition pattern into regexes.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A `{` without a matching `}`.
    #[error("missing closing '}}' for placeholder at offset {0}")]
    UnclosedPlaceholder(usize),
    /// A `}` without a matching `{`.
    #[error("unmatched closing '}}' at offset {0}")]
    UnmatchedBrace(usize),
}

/// Errors raised by the template preprocessing pass.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("scenario tag is invalid: {0}")]
    InvalidTag(String),
    #[error("included feature file \"{0}\" does not exist")]
    FeatureMissing(String),
    #[error("included feature file \"{0}\" could not be parsed: {1}")]
    FeatureUnparsable(String, String),
    #[error("scenario \"{scenario}\" does not exist in \"{feature}\"")]
    MissingScenario { scenario: String, feature: String },
    #[error(transparent)]
    Template(#[from] minijinja::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level server errors, tagged per kind.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A single step definition could not be compiled; the entry is skipped.
    #[error("malformed step pattern \"{pattern}\": {source}")]
    PatternMalformed {
        pattern: String,
        #[source]
        source: PatternError,
    },
    /// The whole inventory rebuild failed; the previous inventory stays active.
    #[error("failed to load step definitions: {0}")]
    SourceLoadFailed(String),
    /// The current document cannot be parsed.
    #[error("failed to parse feature: {0}")]
    ParseFailed(String),
    /// Template preprocessing raised.
    #[error("failed to render feature: {0}")]
    RenderFailed(#[from] RenderError),
    /// Anything else; the request returns a neutral result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Machine-readable tag for logs and client payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            ServerError::PatternMalformed { .. } => "PatternMalformed",
            ServerError::SourceLoadFailed(_) => "SourceLoadFailed",
            ServerError::ParseFailed(_) => "ParseFailed",
            ServerError::RenderFailed(_) => "RenderFailed",
            ServerError::Internal(_) => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        assert_eq!(
            ServerError::SourceLoadFailed("x".into()).tag(),
            "SourceLoadFailed"
        );
        assert_eq!(
            ServerError::PatternMalformed {
                pattern: "{".into(),
                source: PatternError::UnclosedPlaceholder(0),
            }
            .tag(),
            "PatternMalformed"
        );
    }

    #[test]
    fn pattern_error_display_names_offset() {
        let err = PatternError::UnclosedPlaceholder(7);
        assert!(err.to_string().contains('7'));
    }
}
