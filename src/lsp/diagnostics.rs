//! Document validation.
//!
//! The pipeline runs per document: unclosed free-text markers, language
//! marker placement, scenario-tag validation, per-step matching against the
//! inventory, and finally a full parse of the preprocessed text.

use std::path::Path;
use std::sync::OnceLock;

use gherkin::GherkinEnv;
use regex::Regex;
use strsim::normalized_levenshtein;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::error::ServerError;
use crate::inventory::{normalize_query, StepInventory};
use crate::model::{StepDefinition, StepKind};
use crate::normalize::empty_quoted;
use crate::render;

use super::scanner::{
    effective_verb, is_step_keyword, is_structural_keyword, quoted_regions, step_parts,
    MARKER_LANGUAGE,
};

/// Diagnostic source tag shown in the editor.
pub const SOURCE: &str = "grizzly-ls";

pub const MARKER_NO_STEP_IMPL: &str = "No step implementation found";

/// Similarity floor for the nearest-candidate hint on unknown steps.
const SUGGESTION_CUTOFF: f64 = 0.5;

fn diagnostic(
    range: Range,
    severity: DiagnosticSeverity,
    code: &str,
    message: String,
) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        code: Some(tower_lsp::lsp_types::NumberOrString::String(code.to_string())),
        source: Some(SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

fn line_range(line_index: usize, start: usize, end: usize) -> Range {
    Range {
        start: Position {
            line: line_index as u32,
            character: start as u32,
        },
        end: Position {
            line: line_index as u32,
            character: end as u32,
        },
    }
}

/// Validates one document buffer against the inventory.
pub fn validate(
    source: &str,
    document_path: Option<&Path>,
    inventory: &StepInventory,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let lines: Vec<&str> = source.lines().collect();

    check_freetext_markers(&lines, &mut diagnostics);

    let mut ignoring = false;
    for (line_index, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.starts_with("\"\"\"") {
            ignoring = !ignoring;
            continue;
        }
        if ignoring || stripped.is_empty() {
            continue;
        }
        // plain comments and table rows carry nothing to validate
        if stripped.starts_with('#') && !stripped.starts_with(MARKER_LANGUAGE) {
            continue;
        }
        if stripped.starts_with('|') && stripped.ends_with('|') {
            continue;
        }

        if stripped.starts_with(MARKER_LANGUAGE) {
            check_language_marker(line_index, line, &mut diagnostics);
            continue;
        }

        if render::is_template_line(line) {
            check_scenario_tag(line_index, line, document_path, &mut diagnostics);
            continue;
        }

        check_step_line(line_index, line, &lines, inventory, &mut diagnostics);
    }

    check_parse(source, &lines, &mut diagnostics);

    diagnostics
}

/// An odd number of `"""` markers means the last free-text block is open.
fn check_freetext_markers(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) {
    if lines.iter().filter(|l| l.trim().starts_with("\"\"\"")).count() % 2 == 0 {
        return;
    }

    for (line_index, line) in lines.iter().enumerate().rev() {
        let stripped = line.trim();
        if !stripped.starts_with("\"\"\"") {
            continue;
        }
        let indent = line.chars().take_while(|ch| ch.is_whitespace()).count();
        diagnostics.push(diagnostic(
            line_range(line_index, indent, line.chars().count()),
            DiagnosticSeverity::ERROR,
            "freetext-unclosed",
            "Freetext marker is not closed".to_string(),
        ));
        break;
    }
}

fn check_language_marker(line_index: usize, line: &str, diagnostics: &mut Vec<Diagnostic>) {
    if line_index != 0 {
        let indent = line.chars().take_while(|ch| ch.is_whitespace()).count();
        diagnostics.push(diagnostic(
            line_range(line_index, indent, line.chars().count()),
            DiagnosticSeverity::WARNING,
            "language-marker-placement",
            format!("\"{MARKER_LANGUAGE}\" should be on the first line"),
        ));
    }
}

fn check_scenario_tag(
    line_index: usize,
    line: &str,
    document_path: Option<&Path>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(tag) = render::parse_scenario_tag(line) else {
        // other template expressions are passed through untouched
        return;
    };

    let indent = line.chars().take_while(|ch| ch.is_whitespace()).count();
    let full = line_range(line_index, indent, line.chars().count());

    let scenario = match tag.scenario.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => {
            diagnostics.push(diagnostic(
                full,
                DiagnosticSeverity::ERROR,
                "scenario-tag",
                "Scenario tag is invalid, could not find scenario argument".to_string(),
            ));
            return;
        }
    };
    let feature = match tag.feature.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => {
            diagnostics.push(diagnostic(
                full,
                DiagnosticSeverity::ERROR,
                "scenario-tag",
                "Scenario tag is invalid, could not find feature argument".to_string(),
            ));
            return;
        }
    };

    let base = document_path
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let feature_path = Path::new(feature);
    let feature_file = if feature_path.is_absolute() {
        feature_path.to_path_buf()
    } else {
        base.join(feature_path)
    };

    let steps = match render::scenario_steps(&feature_file, scenario) {
        Ok(steps) => steps,
        Err(err) => {
            diagnostics.push(diagnostic(
                full,
                DiagnosticSeverity::ERROR,
                "scenario-tag",
                err.to_string(),
            ));
            return;
        }
    };

    if steps.trim().is_empty() {
        diagnostics.push(diagnostic(
            full,
            DiagnosticSeverity::ERROR,
            "scenario-tag",
            format!("Scenario \"{scenario}\" in \"{feature}\" does not have any steps"),
        ));
        return;
    }

    // declared variables must be used, used variables must be declared
    let referenced = render::referenced_variables(&steps);
    for (name, _) in &tag.variables {
        if !referenced.contains(name) {
            diagnostics.push(diagnostic(
                full,
                DiagnosticSeverity::ERROR,
                "scenario-tag",
                format!("Declared variable \"{name}\" is not used in included scenario steps"),
            ));
        }
    }
    for name in &referenced {
        if !tag.variables.iter().any(|(declared, _)| declared == name) {
            diagnostics.push(diagnostic(
                full,
                DiagnosticSeverity::WARNING,
                "scenario-tag",
                format!("Scenario tag is missing variable \"{name}\""),
            ));
        }
    }
}

fn check_step_line(
    line_index: usize,
    line: &str,
    lines: &[&str],
    inventory: &StepInventory,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (keyword, expression) = step_parts(line);
    let Some(keyword) = keyword else { return };
    let indent = line.chars().take_while(|ch| ch.is_whitespace()).count();

    // "Scenario Outline:" splits at the first space, so the bare first word
    // is enough to recognize every structural keyword
    let bare = keyword.trim_end_matches(':');
    if is_structural_keyword(bare) {
        return;
    }

    if !is_step_keyword(bare) {
        diagnostics.push(diagnostic(
            line_range(line_index, indent, indent + keyword.chars().count()),
            DiagnosticSeverity::ERROR,
            "invalid-keyword",
            format!("\"{bare}\" is not a valid keyword"),
        ));
        return;
    }

    let Some(expression) = expression else { return };
    let kind = effective_verb(lines, line_index);

    if inventory.lookup(kind, &expression).is_some() {
        return;
    }

    // a shell-level match with a rejected enum value is an argument problem,
    // not an unknown step
    if check_enum_arguments(line_index, line, &expression, kind, inventory, diagnostics) {
        return;
    }

    let expression_start = line.chars().count() - expression.chars().count();
    let mut message = format!("{MARKER_NO_STEP_IMPL}\n{}", line.trim());
    if let Some(suggestion) = nearest_candidate(inventory, kind, &expression) {
        message.push_str(&format!("\nDid you mean: {suggestion}"));
    }
    diagnostics.push(diagnostic(
        line_range(line_index, expression_start, line.chars().count()),
        DiagnosticSeverity::WARNING,
        "unknown-step",
        message,
    ));
}

/// Emits `ArgumentInvalid` diagnostics when the step matches a definition
/// shell but carries a value outside an enumerated slot. Returns whether any
/// were emitted.
fn check_enum_arguments(
    line_index: usize,
    line: &str,
    expression: &str,
    kind: StepKind,
    inventory: &StepInventory,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let shell = normalize_query(&empty_quoted(expression));
    let values: Vec<String> = quoted_regions(expression)
        .iter()
        .map(|region| {
            expression
                .chars()
                .skip(region.start)
                .take(region.end - region.start)
                .collect()
        })
        .collect();

    for definition in inventory.all(kind) {
        let matches_shell = definition
            .expression_variants
            .iter()
            .any(|variant| normalize_query(&empty_quoted(variant)) == shell);
        if !matches_shell {
            continue;
        }

        let mut emitted = false;
        let line_regions = quoted_regions(line);
        for (slot, alternatives) in definition.quoted_slots.iter().enumerate() {
            let Some(alternatives) = alternatives else { continue };
            let Some(value) = values.get(slot) else { continue };
            if alternatives.iter().any(|alt| alt == value) {
                continue;
            }
            let range = line_regions
                .get(slot)
                .map(|region| line_range(line_index, region.start, region.end))
                .unwrap_or_else(|| line_range(line_index, 0, line.chars().count()));
            diagnostics.push(diagnostic(
                range,
                DiagnosticSeverity::ERROR,
                "argument-invalid",
                format!(
                    "\"{value}\" is not one of {alternatives}",
                    alternatives = alternatives.join(", ")
                ),
            ));
            emitted = true;
        }
        if emitted {
            return true;
        }
    }
    false
}

/// The definition nearest to the unmatched expression by normalized edit
/// distance on the clean expression, displayed as its closest variant.
fn nearest_candidate(
    inventory: &StepInventory,
    kind: StepKind,
    expression: &str,
) -> Option<String> {
    let shell = normalize_query(&empty_quoted(expression));
    let mut best: Option<(f64, &StepDefinition)> = None;
    for definition in inventory.all(kind) {
        let score = normalized_levenshtein(
            &shell,
            &normalize_query(&definition.clean_expression),
        );
        if score >= SUGGESTION_CUTOFF && best.map_or(true, |(top, _)| score > top) {
            best = Some((score, definition));
        }
    }

    let (_, definition) = best?;
    definition
        .expression_variants
        .iter()
        .max_by(|a, b| {
            let a = normalized_levenshtein(&shell, &normalize_query(a));
            let b = normalized_levenshtein(&shell, &normalize_query(b));
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

fn parse_error_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+):(\d+)").unwrap())
}

/// Feeds the preprocessed text to the Gherkin parser; a failure yields one
/// diagnostic at the reported line, or line 1 when none is reported.
fn check_parse(source: &str, lines: &[&str], diagnostics: &mut Vec<Diagnostic>) {
    let mut rendered = render::preprocess(source);
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }

    if let Err(err) = gherkin::Feature::parse(&rendered, GherkinEnv::default()) {
        let message = err.to_string();
        let err = ServerError::ParseFailed(message.clone());
        tracing::debug!(tag = err.tag(), "{err}");
        let line_index = parse_error_location_re()
            .captures(&message)
            .and_then(|captures| captures[1].parse::<usize>().ok())
            .map_or(0, |line| line.saturating_sub(1));
        let width = lines.get(line_index).map_or(0, |line| line.chars().count());
        diagnostics.push(diagnostic(
            line_range(line_index, 0, width),
            DiagnosticSeverity::ERROR,
            "parse-error",
            message,
        ));
    }
}
