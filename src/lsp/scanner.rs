//! Buffer analysis around a cursor position.
//!
//! Splits in-progress lines into `(keyword, expression)`, resolves the
//! effective verb through the and/but/* inheritance rule, and classifies what
//! is being typed at the cursor.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::StepKind;

/// Keywords that introduce a section and take a trailing colon.
pub const STRUCTURAL_KEYWORDS: [&str; 7] = [
    "Feature",
    "Background",
    "Scenario",
    "Scenario Outline",
    "Scenario Template",
    "Examples",
    "Scenarios",
];

/// Keywords that introduce a step and take a trailing space.
pub const STEP_KEYWORDS: [&str; 6] = ["Given", "When", "Then", "And", "But", "*"];

/// The `# language:` metadata marker.
pub const MARKER_LANGUAGE: &str = "# language:";

pub fn is_step_keyword(keyword: &str) -> bool {
    STEP_KEYWORDS.contains(&keyword)
}

pub fn is_structural_keyword(keyword: &str) -> bool {
    let keyword = keyword.trim_end_matches(':');
    STRUCTURAL_KEYWORDS.contains(&keyword)
}

/// Splits a line into its leading keyword and the rest, collapsing runs of
/// whitespace. Returns `(None, None)` for blank lines and `(keyword, None)`
/// when nothing follows the keyword.
pub fn step_parts(line: &str) -> (Option<String>, Option<String>) {
    let collapsed = crate::normalize::collapse_whitespace(line.trim_start());
    let collapsed = collapsed.trim_end_matches('\r');
    if collapsed.is_empty() {
        return (None, None);
    }

    match collapsed.split_once(' ') {
        Some((keyword, rest)) => (Some(keyword.to_string()), Some(rest.to_string())),
        None => (Some(collapsed.to_string()), None),
    }
}

/// Converts an LSP character offset into a byte index of `line`.
pub fn byte_index(line: &str, character: usize) -> usize {
    line.char_indices()
        .nth(character)
        .map_or_else(|| line.len(), |(index, _)| index)
}

/// The verb in effect at `line_index`, following and/but/* inheritance: the
/// nearest preceding line with an explicit verb in the same scenario wins,
/// and `given` is assumed when there is none.
pub fn effective_verb(lines: &[&str], line_index: usize) -> StepKind {
    if lines.is_empty() {
        return StepKind::Given;
    }
    for line in lines[..=line_index.min(lines.len() - 1)].iter().rev() {
        let (keyword, _) = step_parts(line);
        let Some(keyword) = keyword else { continue };
        if let Some(kind) = StepKind::from_keyword(&keyword) {
            return kind;
        }
        if StepKind::inherits(&keyword) {
            continue;
        }
        if is_structural_keyword(&keyword) {
            break;
        }
    }
    StepKind::Given
}

fn variable_partial_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([\w.\-]*)$").unwrap())
}

/// Detects an open `{{ ... }}` variable reference ending at the cursor.
///
/// Returns `None` outside a reference, `Some(None)` right after `{{`, and
/// `Some(Some(partial))` once a name is being typed.
pub fn variable_trigger(before_cursor: &str) -> Option<Option<String>> {
    let open = before_cursor.rfind("{{")?;
    if before_cursor[open..].contains("}}") {
        return None;
    }
    let captures = variable_partial_re().captures(&before_cursor[open..])?;
    let partial = captures.get(1).map_or("", |m| m.as_str());
    if partial.is_empty() {
        Some(None)
    } else {
        Some(Some(partial.to_string()))
    }
}

/// A double-quoted region of a line; `start..end` is the inner span in
/// characters, `index` the region's ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedRegion {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// All quoted regions of a line, an unterminated final quote extending to the
/// end of the line.
pub fn quoted_regions(line: &str) -> Vec<QuotedRegion> {
    let mut regions = Vec::new();
    let mut open: Option<usize> = None;
    for (character, ch) in line.chars().enumerate() {
        if ch != '"' {
            continue;
        }
        match open.take() {
            Some(start) => regions.push(QuotedRegion {
                index: regions.len(),
                start,
                end: character,
            }),
            None => open = Some(character + 1),
        }
    }
    if let Some(start) = open {
        regions.push(QuotedRegion {
            index: regions.len(),
            start,
            end: line.chars().count(),
        });
    }
    regions
}

/// The quoted region containing the cursor, if any.
pub fn region_at(regions: &[QuotedRegion], character: usize) -> Option<QuotedRegion> {
    regions
        .iter()
        .find(|region| character >= region.start && character <= region.end)
        .copied()
}

/// Which keywords the document has already seen; drives keyword legality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordCensus {
    pub has_feature: bool,
    pub has_background: bool,
    pub has_scenario: bool,
}

pub fn census(source: &str) -> KeywordCensus {
    let mut census = KeywordCensus::default();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("Feature:") {
            census.has_feature = true;
        } else if trimmed.starts_with("Background:") {
            census.has_background = true;
        } else if trimmed.starts_with("Scenario") {
            census.has_scenario = true;
        }
    }
    census
}

/// What is being typed at the cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorContext {
    /// Start of a line (possibly with a partial keyword typed).
    Keyword { partial: Option<String> },
    /// Inside a step expression following a known step keyword. `slot` is
    /// set when the cursor sits inside a quoted argument.
    Step {
        kind: StepKind,
        keyword: String,
        text: Option<String>,
        slot: Option<QuotedRegion>,
    },
    /// Inside an open `{{ ... }}` variable reference.
    VariableRef { partial: Option<String> },
    /// On a `#` metadata line.
    Metadata,
    Outside,
}

/// Classifies the cursor position within the buffer.
pub fn classify(source: &str, line_index: usize, character: usize) -> CursorContext {
    let lines: Vec<&str> = source.lines().collect();
    let line = lines.get(line_index).copied().unwrap_or("");
    let before = &line[..byte_index(line, character)];

    if let Some(partial) = variable_trigger(before) {
        return CursorContext::VariableRef { partial };
    }

    if line.trim_start().starts_with('#') {
        return CursorContext::Metadata;
    }

    let (keyword, text) = step_parts(line);
    match keyword {
        None => CursorContext::Keyword { partial: None },
        Some(keyword) if is_step_keyword(&keyword) => {
            let kind = effective_verb(&lines, line_index);
            let slot = region_at(&quoted_regions(line), character);
            CursorContext::Step {
                kind,
                keyword,
                text,
                slot,
            }
        }
        Some(keyword) if text.is_none() => CursorContext::Keyword {
            partial: Some(keyword),
        },
        Some(_) => CursorContext::Outside,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_parts_splits_keyword_and_expression() {
        assert_eq!(
            step_parts("  Given a user of type \"RestApi\""),
            (
                Some("Given".to_string()),
                Some("a user of type \"RestApi\"".to_string())
            )
        );
        assert_eq!(step_parts("Given"), (Some("Given".to_string()), None));
        assert_eq!(step_parts("   "), (None, None));
    }

    #[test]
    fn step_parts_collapses_internal_whitespace() {
        assert_eq!(
            step_parts("Then   save   response"),
            (Some("Then".to_string()), Some("save response".to_string()))
        );
    }

    #[test]
    fn effective_verb_inherits_through_and_but() {
        let lines = vec![
            "Feature: x",
            "  Scenario: y",
            "    Then something",
            "    And something else",
            "    But a third thing",
        ];
        assert_eq!(effective_verb(&lines, 2), StepKind::Then);
        assert_eq!(effective_verb(&lines, 3), StepKind::Then);
        assert_eq!(effective_verb(&lines, 4), StepKind::Then);
    }

    #[test]
    fn effective_verb_defaults_to_given() {
        let lines = vec!["Feature: x", "  Scenario: y", "    And orphaned"];
        assert_eq!(effective_verb(&lines, 2), StepKind::Given);
    }

    #[test]
    fn effective_verb_stops_at_scenario_boundary() {
        let lines = vec![
            "  Scenario: one",
            "    When something",
            "  Scenario: two",
            "    And orphaned",
        ];
        assert_eq!(effective_verb(&lines, 3), StepKind::Given);
    }

    #[test]
    fn variable_trigger_detection() {
        assert_eq!(variable_trigger("Then what up"), None);
        assert_eq!(variable_trigger("Then log message \"{{"), Some(None));
        assert_eq!(
            variable_trigger("Then log message \"{{ foo"),
            Some(Some("foo".to_string()))
        );
        assert_eq!(variable_trigger("Then log \"{{ foo }}\" done"), None);
    }

    #[test]
    fn quoted_regions_cover_inner_spans() {
        let regions = quoted_regions(r#"post request "hello.txt" with name "hello""#);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start, 14);
        assert_eq!(regions[0].end, 23);
        assert_eq!(regions[1].index, 1);
    }

    #[test]
    fn unterminated_quote_extends_to_line_end() {
        let regions = quoted_regions(r#"parse "incomplete"#);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].end, 17);
    }

    #[test]
    fn census_sees_sections() {
        let census = census("Feature: x\n  Background:\n  Scenario Outline: y\n");
        assert!(census.has_feature);
        assert!(census.has_background);
        assert!(census.has_scenario);
        assert_eq!(super::census(""), KeywordCensus::default());
    }

    #[test]
    fn classify_empty_line_is_keyword_context() {
        assert_eq!(
            classify("", 0, 0),
            CursorContext::Keyword { partial: None }
        );
    }

    #[test]
    fn classify_partial_keyword() {
        let source = "Feature:\n\tGiv";
        assert_eq!(
            classify(source, 1, 4),
            CursorContext::Keyword {
                partial: Some("Giv".to_string())
            }
        );
    }

    #[test]
    fn classify_step_context_resolves_verb() {
        let source = "Feature:\n  Scenario: s\n    Then a thing\n    And another thing";
        match classify(source, 3, 20) {
            CursorContext::Step { kind, keyword, text, .. } => {
                assert_eq!(kind, StepKind::Then);
                assert_eq!(keyword, "And");
                assert_eq!(text.as_deref(), Some("another thing"));
            }
            other => panic!("unexpected context: {other:?}"),
        }
    }

    #[test]
    fn classify_cursor_inside_quotes_carries_slot() {
        let source = "Feature:\n  Scenario: s\n    Then parse \"x\" as \"json\"";
        match classify(source, 2, 24) {
            CursorContext::Step { slot: Some(slot), .. } => {
                assert_eq!(slot.index, 1);
            }
            other => panic!("unexpected context: {other:?}"),
        }
    }

    #[test]
    fn classify_variable_reference() {
        let source = "Feature:\n  Scenario: s\n    Then log message \"{{ fo";
        assert_eq!(
            classify(source, 2, 27),
            CursorContext::VariableRef {
                partial: Some("fo".to_string())
            }
        );
    }

    #[test]
    fn classify_metadata_line() {
        assert_eq!(classify("# language: en", 0, 3), CursorContext::Metadata);
    }
}
