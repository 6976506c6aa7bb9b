//! Completion for keywords, steps, variable references and enumerated
//! argument values.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use strsim::normalized_levenshtein;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, InsertTextFormat,
    MarkupContent, MarkupKind, Position, Range, TextEdit,
};

use crate::config::ServerConfig;
use crate::inventory::{normalize_query, StepInventory};
use crate::model::StepKind;
use crate::normalize::empty_quoted;

use super::scanner::{
    byte_index, census, is_structural_keyword, QuotedRegion, MARKER_LANGUAGE,
};

/// Similarity cutoff for the fuzzy step tier.
const FUZZY_CUTOFF: f64 = 0.6;

fn quoted_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)""#).unwrap())
}

/// Case-insensitive subsequence membership: every character of `needle`
/// appears in `haystack` in order.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars().flat_map(char::to_lowercase);
    needle
        .chars()
        .flat_map(char::to_lowercase)
        .all(|wanted| chars.any(|ch| ch == wanted))
}

/// Legal next keywords for the document, before narrowing.
fn legal_keywords(source: &str) -> Vec<&'static str> {
    let census = census(source);
    if !census.has_feature {
        return vec!["Feature"];
    }

    let mut keywords = vec!["Scenario", "Scenario Outline", "Scenario Template"];
    if !census.has_background {
        keywords.push("Background");
    }
    if census.has_scenario {
        keywords.extend(["Given", "When", "Then", "And", "But", "Examples", "Scenarios"]);
    }
    keywords
}

/// Keyword completion at the start of a line.
///
/// Narrowing is a case-insensitive subsequence test on the typed prefix;
/// among the matches, a keyword that is a strict prefix of another suppresses
/// the longer one.
pub fn complete_keyword(
    source: &str,
    partial: Option<&str>,
    position: Position,
) -> Vec<CompletionItem> {
    let mut keywords = legal_keywords(source);

    if let Some(partial) = partial.map(str::trim).filter(|p| !p.is_empty()) {
        keywords.retain(|keyword| is_subsequence(partial, keyword));
        let matched: Vec<&'static str> = keywords.clone();
        keywords.retain(|keyword| {
            !matched.iter().any(|other| {
                other.len() < keyword.len()
                    && keyword.to_lowercase().starts_with(&other.to_lowercase())
            })
        });
    }

    keywords.sort_unstable();

    let partial_len = partial.map_or(0, |p| p.chars().count()) as u32;
    let start = Position {
        line: position.line,
        character: position.character.saturating_sub(partial_len),
    };

    keywords
        .into_iter()
        .map(|keyword| {
            let suffix = if is_structural_keyword(keyword) { ": " } else { " " };
            CompletionItem {
                label: keyword.to_string(),
                kind: Some(CompletionItemKind::KEYWORD),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                    range: Range {
                        start,
                        end: position,
                    },
                    new_text: format!("{keyword}{suffix}"),
                })),
                ..Default::default()
            }
        })
        .collect()
}

/// Replaces each empty quoted slot with a `"$n"` snippet tab-stop,
/// numbering from 1 left to right.
fn snippet_template(label: &str) -> (String, bool) {
    let mut out = String::with_capacity(label.len() + 8);
    let mut rest = label;
    let mut index = 0usize;
    let mut has_stops = false;
    while let Some(found) = rest.find("\"\"") {
        index += 1;
        has_stops = true;
        out.push_str(&rest[..found]);
        out.push_str(&format!("\"${index}\""));
        rest = &rest[found + 2..];
    }
    out.push_str(rest);
    (out, has_stops)
}

/// Transplants quoted values the user already typed into the candidate's
/// quoted slots, pairwise from the left.
fn transplant_values(variant: &str, typed: &[&str]) -> String {
    if typed.is_empty() {
        return variant.to_string();
    }
    let mut result = String::with_capacity(variant.len());
    let mut last = 0usize;
    for (index, m) in quoted_value_re().find_iter(variant).enumerate() {
        let Some(value) = typed.get(index) else { break };
        result.push_str(&variant[last..m.start()]);
        result.push('"');
        result.push_str(value);
        result.push('"');
        last = m.end();
    }
    result.push_str(&variant[last..]);
    result
}

/// Step completion for `(verb, text)` at the cursor.
///
/// Candidates are ranked prefix matches first, then substring matches, then
/// fuzzy matches; ties keep variant order and registration order. The
/// replacement range starts right after the verb so that applying an item
/// always leaves a well-formed step line equal to its label.
pub fn complete_step(
    inventory: &StepInventory,
    kind: StepKind,
    line: &str,
    position: Position,
    text: Option<&str>,
) -> Vec<CompletionItem> {
    let shell = text.map(|t| empty_quoted(t)).unwrap_or_default();
    let normalized_shell = normalize_query(&shell);
    let typed_values: Vec<&str> = text
        .map(|t| {
            quoted_value_re()
                .captures_iter(t)
                .map(|c| c.get(1).unwrap().as_str())
                .collect()
        })
        .unwrap_or_default();

    // tier 1: prefix matches through the inventory's prefix index
    let prefix_hits = inventory.candidates(kind, &shell);
    let mut ordered: Vec<(usize, &crate::model::StepDefinition)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for hit in &prefix_hits {
        let variant = &hit.definition.expression_variants[hit.variant];
        if seen.insert(variant.clone()) {
            ordered.push((hit.variant, hit.definition));
        }
    }

    // tiers 2 and 3: substring and fuzzy matches, when prefix matching was
    // not decisive
    if !normalized_shell.is_empty()
        && (ordered.is_empty() || !normalized_shell.contains(' '))
    {
        let mut substring: Vec<(usize, &crate::model::StepDefinition)> = Vec::new();
        let mut fuzzy: Vec<(f64, usize, &crate::model::StepDefinition)> = Vec::new();
        for definition in inventory.all(kind) {
            for (index, variant) in definition.expression_variants.iter().enumerate() {
                if seen.contains(variant) {
                    continue;
                }
                let normalized_variant = normalize_query(variant);
                if normalized_variant.contains(&normalized_shell) {
                    seen.insert(variant.clone());
                    substring.push((index, definition));
                } else {
                    let score = normalized_levenshtein(&normalized_shell, &normalized_variant);
                    if score >= FUZZY_CUTOFF {
                        fuzzy.push((score, index, definition));
                    }
                }
            }
        }
        ordered.extend(substring);
        fuzzy.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        for (_, index, definition) in fuzzy {
            if seen.insert(definition.expression_variants[index].clone()) {
                ordered.push((index, definition));
            }
        }
    }

    // the replacement region starts at the column after the verb plus one
    // space; with no expression yet, insert at the cursor instead
    let (keyword, _) = super::scanner::step_parts(line);
    let expression_start = keyword.as_deref().and_then(|keyword| {
        let keyword_at = line.find(keyword)?;
        let after = keyword_at + keyword.len();
        line[after..]
            .starts_with(' ')
            .then(|| (line[..after].chars().count() + 1) as u32)
    });

    let typed = text.map(|t| t.trim()).unwrap_or_default();

    ordered
        .into_iter()
        .filter_map(|(variant_index, definition)| {
            let variant = &definition.expression_variants[variant_index];
            let label = transplant_values(variant, &typed_values);
            if label == typed {
                return None;
            }

            let (template, has_stops) = snippet_template(&label);
            let (range, new_text) = match expression_start {
                Some(start) => (
                    Range {
                        start: Position {
                            line: position.line,
                            character: start,
                        },
                        end: position,
                    },
                    template,
                ),
                None => (
                    Range {
                        start: position,
                        end: position,
                    },
                    format!(" {template}"),
                ),
            };

            Some(CompletionItem {
                label,
                kind: Some(CompletionItemKind::FUNCTION),
                documentation: definition.help.as_ref().map(|help| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: help.clone(),
                    })
                }),
                insert_text_format: Some(if has_stops {
                    InsertTextFormat::SNIPPET
                } else {
                    InsertTextFormat::PLAIN_TEXT
                }),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit { range, new_text })),
                ..Default::default()
            })
        })
        .collect()
}

/// Variables declared by matched steps above the cursor, in declaration
/// order without duplicates.
pub fn declared_variables(config: &ServerConfig, source: &str, before_line: usize) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in source.lines().take(before_line) {
        for pattern in config.variable_patterns() {
            if let Some(name) = pattern.captures(line.trim_end()).and_then(|c| c.get(1)) {
                if !names.iter().any(|existing| existing == name.as_str()) {
                    names.push(name.as_str().to_string());
                }
            }
        }
    }
    names
}

/// Completion inside an open `{{ ... }}` variable reference.
///
/// The inserted text includes or omits the surrounding space, the closing
/// `}}` and the closing quote depending on what already follows the cursor.
pub fn complete_variable_name(
    config: &ServerConfig,
    source: &str,
    line: &str,
    position: Position,
    partial: Option<&str>,
) -> Vec<CompletionItem> {
    let character = position.character as usize;
    let split = byte_index(line, character);
    let before = &line[..split];
    let after = &line[split..];

    let prefix = if partial.is_some() || before.ends_with(' ') {
        ""
    } else {
        " "
    };
    let suffix = if !line.trim_end().ends_with('"') && line.matches('"').count() % 2 != 0 {
        "\""
    } else {
        ""
    };
    let affix = if after.trim_start().starts_with("}}") {
        ""
    } else {
        "}}"
    };
    let affix_suffix = if affix == "}}" || after.starts_with("}}") {
        " "
    } else {
        ""
    };

    let partial_len = partial.map_or(0, |p| p.chars().count()) as u32;
    let start = Position {
        line: position.line,
        character: position.character.saturating_sub(partial_len),
    };

    declared_variables(config, source, position.line as usize)
        .into_iter()
        .filter(|name| partial.map_or(true, |partial| name.starts_with(partial)))
        .map(|name| CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::VARIABLE),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: Range {
                    start,
                    end: position,
                },
                new_text: format!("{prefix}{name}{affix_suffix}{affix}{suffix}"),
            })),
            ..Default::default()
        })
        .collect()
}

/// Completion on a metadata comment line: only the language marker is
/// offered.
pub fn complete_metadata(line: &str, position: Position) -> Vec<CompletionItem> {
    if line.trim_start().starts_with(MARKER_LANGUAGE) {
        return Vec::new();
    }

    vec![CompletionItem {
        label: MARKER_LANGUAGE.to_string(),
        kind: Some(CompletionItemKind::PROPERTY),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit {
            range: Range {
                start: Position {
                    line: position.line,
                    character: 0,
                },
                end: position,
            },
            new_text: format!("{MARKER_LANGUAGE} "),
        })),
        ..Default::default()
    }]
}

/// Permitted values when the cursor sits inside a quoted argument whose
/// owning definition enumerates alternatives for that slot.
pub fn complete_argument(
    inventory: &StepInventory,
    kind: StepKind,
    text: &str,
    position: Position,
    slot: QuotedRegion,
) -> Vec<CompletionItem> {
    let shell = normalize_query(&empty_quoted(text));

    let mut values: Vec<String> = Vec::new();
    for definition in inventory.all(kind) {
        let Some(Some(alternatives)) = definition.quoted_slots.get(slot.index) else {
            continue;
        };
        let matches_shell = definition
            .expression_variants
            .iter()
            .any(|variant| normalize_query(&empty_quoted(variant)) == shell);
        if !matches_shell {
            continue;
        }
        for alternative in alternatives {
            if !values.contains(alternative) {
                values.push(alternative.clone());
            }
        }
    }
    values.sort_unstable();

    let range = Range {
        start: Position {
            line: position.line,
            character: slot.start as u32,
        },
        end: Position {
            line: position.line,
            character: slot.end as u32,
        },
    };

    values
        .into_iter()
        .map(|value| CompletionItem {
            label: value.clone(),
            kind: Some(CompletionItemKind::VALUE),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range,
                new_text: value,
            })),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StepInventory;
    use crate::model::{ParseTypeRegistry, StepDefinition};
    use crate::normalize::normalize_pattern;
    use pretty_assertions::assert_eq;

    fn definition(kind: StepKind, pattern: &str, types: &ParseTypeRegistry) -> StepDefinition {
        let normalized = normalize_pattern(pattern, types).unwrap();
        StepDefinition {
            kind,
            expression: pattern.to_string(),
            clean_expression: normalized.clean_expression,
            regex_patterns: normalized
                .regexes
                .iter()
                .map(|source| Regex::new(source).unwrap())
                .collect(),
            expression_variants: normalized.variants,
            quoted_slots: normalized.quoted_slots,
            help: Some("Does the thing.".to_string()),
            source_location: None,
        }
    }

    fn inventory() -> StepInventory {
        let mut types = ParseTypeRegistry::new();
        types.insert(
            "ContentType".to_string(),
            vec!["json".to_string(), "xml".to_string(), "plain".to_string()],
        );
        StepInventory::build(
            vec![
                definition(
                    StepKind::Given,
                    r#"set context variable "{name}" to "{value}""#,
                    &types,
                ),
                definition(
                    StepKind::Given,
                    r#"ask for value of variable "{name}""#,
                    &types,
                ),
                definition(
                    StepKind::Given,
                    r#"set global context variable "{name}" to "{value}""#,
                    &types,
                ),
                definition(
                    StepKind::Given,
                    r#"set alias "{alias}" for variable "{name}""#,
                    &types,
                ),
                definition(
                    StepKind::Given,
                    r#"value for variable "{name}" is "{value}""#,
                    &types,
                ),
                definition(
                    StepKind::Given,
                    r#"a user of type "{user_class_name}" with weight "{weight}" load testing "{host}""#,
                    &types,
                ),
                definition(
                    StepKind::Then,
                    r#"parse "{content}" as "{content_type:ContentType}" and save in "{variable}""#,
                    &types,
                ),
            ],
            1,
        )
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    fn edit_text(item: &CompletionItem) -> &str {
        match item.text_edit.as_ref().unwrap() {
            CompletionTextEdit::Edit(edit) => &edit.new_text,
            other => panic!("unexpected edit: {other:?}"),
        }
    }

    // ── keyword completion ──

    #[test]
    fn empty_buffer_suggests_feature_only() {
        let items = complete_keyword("", None, Position::new(0, 0));
        assert_eq!(labels(&items), vec!["Feature"]);
        assert_eq!(edit_text(&items[0]), "Feature: ");
        assert_eq!(items[0].kind, Some(CompletionItemKind::KEYWORD));
    }

    #[test]
    fn feature_only_buffer_suggests_sections() {
        let items = complete_keyword("Feature:\n\t", None, Position::new(1, 1));
        assert_eq!(
            labels(&items),
            vec![
                "Background",
                "Scenario",
                "Scenario Outline",
                "Scenario Template"
            ]
        );
    }

    #[test]
    fn background_is_not_suggested_twice() {
        let source = "Feature:\n\tBackground:\n";
        let items = complete_keyword(source, None, Position::new(2, 0));
        assert!(!labels(&items).contains(&"Background"));
    }

    #[test]
    fn scenario_unlocks_step_keywords() {
        let source = "Feature:\nScenario:\n";
        let items = complete_keyword(source, None, Position::new(2, 0));
        let labels = labels(&items);
        for expected in [
            "And",
            "Background",
            "But",
            "Examples",
            "Given",
            "Scenario",
            "Scenario Outline",
            "Scenario Template",
            "Scenarios",
            "Then",
            "When",
        ] {
            assert!(labels.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn fuzzy_narrowing_dedupes_prefixed_keywords() {
        let source = "Feature:\n\tBackground:\n\tScenario:\n\t\ten";
        let mut found = labels(&complete_keyword(source, Some("en"), Position::new(3, 3)))
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        found.sort();
        assert_eq!(found, vec!["Given", "Scenario", "Then", "When"]);
    }

    #[test]
    fn prefix_narrowing_to_single_keyword() {
        let source = "Feature:\nScenario:\n";
        let items = complete_keyword(source, Some("Giv"), Position::new(2, 3));
        assert_eq!(labels(&items), vec!["Given"]);
        assert_eq!(edit_text(&items[0]), "Given ");
    }

    #[test]
    fn step_verbs_insert_trailing_space() {
        let source = "Feature:\nScenario:\n";
        let items = complete_keyword(source, Some("Then"), Position::new(2, 4));
        assert_eq!(edit_text(&items[0]), "Then ");
    }

    // ── step completion ──

    #[test]
    fn prefix_variable_under_given() {
        let inventory = inventory();
        let line = "    Given variable";
        let items = complete_step(
            &inventory,
            StepKind::Given,
            line,
            Position::new(3, line.len() as u32),
            Some("variable"),
        );
        let labels = labels(&items);
        for expected in [
            r#"set context variable "" to """#,
            r#"ask for value of variable """#,
            r#"set global context variable "" to """#,
            r#"set alias "" for variable """#,
            r#"value for variable "" is """#,
        ] {
            assert!(labels.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn snippet_numbers_increment_left_to_right() {
        let inventory = inventory();
        let line = "    Given set context";
        let items = complete_step(
            &inventory,
            StepKind::Given,
            line,
            Position::new(0, line.len() as u32),
            Some("set context"),
        );
        let item = items
            .iter()
            .find(|item| item.label == r#"set context variable "" to """#)
            .unwrap();
        assert_eq!(edit_text(item), r#"set context variable "$1" to "$2""#);
        assert_eq!(item.insert_text_format, Some(InsertTextFormat::SNIPPET));
    }

    #[test]
    fn replacement_starts_after_the_verb() {
        let inventory = inventory();
        let line = "    Given variable";
        let items = complete_step(
            &inventory,
            StepKind::Given,
            line,
            Position::new(3, line.len() as u32),
            Some("variable"),
        );
        let edit = match items[0].text_edit.as_ref().unwrap() {
            CompletionTextEdit::Edit(edit) => edit,
            other => panic!("unexpected edit: {other:?}"),
        };
        // "    Given " is 10 characters
        assert_eq!(edit.range.start, Position::new(3, 10));
        assert_eq!(edit.range.end, Position::new(3, 18));
    }

    #[test]
    fn applying_an_item_reproduces_its_label() {
        let inventory = inventory();
        let line = "    Given variable";
        let items = complete_step(
            &inventory,
            StepKind::Given,
            line,
            Position::new(0, line.len() as u32),
            Some("variable"),
        );
        for item in &items {
            let edit = match item.text_edit.as_ref().unwrap() {
                CompletionTextEdit::Edit(edit) => edit,
                other => panic!("unexpected edit: {other:?}"),
            };
            let start = edit.range.start.character as usize;
            let end = edit.range.end.character as usize;
            let mut applied = String::new();
            applied.push_str(&line[..start]);
            applied.push_str(&edit.new_text);
            applied.push_str(&line[end..]);
            // snippet stops collapse to empty values
            let collapsed = Regex::new(r#""\$\d+""#).unwrap().replace_all(&applied, "\"\"");
            assert_eq!(collapsed, format!("    Given {}", item.label));
        }
    }

    #[test]
    fn typed_values_are_transplanted() {
        let inventory = inventory();
        let text = r#"a user of type "RestApi" with weight "1" load"#;
        let line = format!("    Given {text}");
        let items = complete_step(
            &inventory,
            StepKind::Given,
            &line,
            Position::new(0, line.chars().count() as u32),
            Some(text),
        );
        assert_eq!(
            labels(&items),
            vec![r#"a user of type "RestApi" with weight "1" load testing """#]
        );
        assert_eq!(
            edit_text(&items[0]),
            r#"a user of type "RestApi" with weight "1" load testing "$1""#
        );
    }

    #[test]
    fn cursor_right_after_verb_inserts_with_space() {
        let inventory = inventory();
        let line = "    Given";
        let items = complete_step(
            &inventory,
            StepKind::Given,
            line,
            Position::new(0, line.len() as u32),
            None,
        );
        assert!(!items.is_empty());
        for item in &items {
            assert!(edit_text(item).starts_with(' '));
        }
    }

    #[test]
    fn enum_variants_rank_in_variant_order() {
        let inventory = inventory();
        let line = "    Then parse";
        let items = complete_step(
            &inventory,
            StepKind::Then,
            line,
            Position::new(0, line.len() as u32),
            Some("parse"),
        );
        let labels = labels(&items);
        assert_eq!(
            labels,
            vec![
                r#"parse "" as "json" and save in """#,
                r#"parse "" as "plain" and save in """#,
                r#"parse "" as "xml" and save in """#,
            ]
        );
    }

    #[test]
    fn already_written_step_is_not_suggested() {
        let inventory = inventory();
        let text = r#"ask for value of variable """#;
        let line = format!("    Given {text}");
        let items = complete_step(
            &inventory,
            StepKind::Given,
            &line,
            Position::new(0, line.chars().count() as u32),
            Some(text),
        );
        assert!(!labels(&items).contains(&text));
    }

    // ── variable completion ──

    fn variable_source() -> &'static str {
        concat!(
            "Feature:\n",
            "    Scenario:\n",
            "\n",
            "        And value for variable \"foo\" is \"none\"\n",
            "        And value for variable \"bar\" is \"none\"\n",
            "        Then log message \"{{\n",
        )
    }

    #[test]
    fn variables_complete_with_closing_affixes() {
        let config = ServerConfig::default();
        let line = "Then log message \"{{";
        let items = complete_variable_name(
            &config,
            variable_source(),
            line,
            Position::new(5, line.len() as u32),
            None,
        );
        let texts: Vec<&str> = items.iter().map(edit_text).collect();
        assert_eq!(texts, vec![" foo }}\"", " bar }}\""]);
    }

    #[test]
    fn variables_respect_existing_closing_braces() {
        let config = ServerConfig::default();
        let line = "Then log message \"{{ }}\"";
        let items = complete_variable_name(
            &config,
            variable_source(),
            line,
            Position::new(5, 21),
            None,
        );
        let texts: Vec<&str> = items.iter().map(edit_text).collect();
        assert_eq!(texts, vec!["foo ", "bar "]);
    }

    #[test]
    fn variable_partial_filters_names() {
        let config = ServerConfig::default();
        let line = "Then log message \"{{ f";
        let items = complete_variable_name(
            &config,
            variable_source(),
            line,
            Position::new(5, line.len() as u32),
            Some("f"),
        );
        assert_eq!(labels(&items), vec!["foo"]);
    }

    #[test]
    fn declared_variables_scan_the_whole_document_above() {
        let config = ServerConfig::default();
        let names = declared_variables(&config, variable_source(), 5);
        assert_eq!(names, vec!["foo", "bar"]);
    }

    // ── metadata completion ──

    #[test]
    fn metadata_offers_language_marker() {
        let items = complete_metadata("#", Position::new(0, 1));
        assert_eq!(labels(&items), vec![MARKER_LANGUAGE]);
        assert_eq!(edit_text(&items[0]), "# language: ");
    }

    #[test]
    fn metadata_offers_nothing_after_marker() {
        assert!(complete_metadata("# language: en", Position::new(0, 12)).is_empty());
    }

    // ── argument enumeration ──

    #[test]
    fn enum_argument_lists_alternatives() {
        let inventory = inventory();
        let slot = QuotedRegion {
            index: 1,
            start: 23,
            end: 23,
        };
        let items = complete_argument(
            &inventory,
            StepKind::Then,
            r#"parse "x" as "" and save in "y""#,
            Position::new(0, 23),
            slot,
        );
        assert_eq!(labels(&items), vec!["json", "plain", "xml"]);
    }

    #[test]
    fn free_argument_lists_nothing() {
        let inventory = inventory();
        let slot = QuotedRegion {
            index: 0,
            start: 7,
            end: 8,
        };
        let items = complete_argument(
            &inventory,
            StepKind::Then,
            r#"parse "x" as "json" and save in "y""#,
            Position::new(0, 8),
            slot,
        );
        assert!(items.is_empty());
    }

    // ── helpers ──

    #[test]
    fn subsequence_matching() {
        assert!(is_subsequence("en", "Given"));
        assert!(is_subsequence("en", "Scenario"));
        assert!(!is_subsequence("en", "Examples"));
        assert!(!is_subsequence("en", "But"));
        assert!(is_subsequence("", "anything"));
    }

    #[test]
    fn snippet_template_numbers_slots() {
        let (template, has) = snippet_template(r#"set alias "" for variable """#);
        assert_eq!(template, r#"set alias "$1" for variable "$2""#);
        assert!(has);
        let (template, has) = snippet_template("restart scenario");
        assert_eq!(template, "restart scenario");
        assert!(!has);
    }

    #[test]
    fn transplant_fills_slots_pairwise() {
        assert_eq!(
            transplant_values(r#"save "" in """#, &["x"]),
            r#"save "x" in """#
        );
        assert_eq!(transplant_values(r#"save "" in """#, &[]), r#"save "" in """#);
    }
}
