//! Hover help for the step under the cursor.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};

use crate::inventory::{normalize_query, StepInventory};
use crate::model::StepKind;
use crate::normalize::empty_quoted;

use super::scanner::step_parts;

/// Resolves the help text for a step expression.
///
/// Exact variant matches win; otherwise the help of the longest expression
/// that extends what has been typed so far is used.
pub fn find_help<'a>(
    inventory: &'a StepInventory,
    kind: StepKind,
    expression: &str,
) -> Option<&'a str> {
    let shell = normalize_query(&empty_quoted(expression));

    let mut fallback: Option<(&str, &str)> = None;
    for definition in inventory.all(kind) {
        for variant in &definition.expression_variants {
            let variant_shell = normalize_query(&empty_quoted(variant));
            if variant_shell == shell {
                return definition.help.as_deref();
            }
            if let Some(help) = definition.help.as_deref() {
                if variant_shell.starts_with(&shell)
                    && fallback.map_or(true, |(best, _)| variant_shell.as_str() > best)
                {
                    fallback = Some((variant.as_str(), help));
                }
            }
        }
    }
    fallback.map(|(_, help)| help)
}

/// Reformats an `Args:` docstring section as a markdown bullet list.
pub fn format_help(help: &str) -> String {
    let Some((pre, post)) = help.split_once("Args:") else {
        return help.to_string();
    };

    let args = post
        .trim()
        .lines()
        .map(format_arg_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!("{pre}Args:\n\n{args}\n")
}

fn format_arg_line(line: &str) -> String {
    let Some((argument, description)) = line.split_once(':') else {
        return format!("* {line}");
    };
    let Some((name, ty)) = argument.trim().split_once(' ') else {
        return format!("* {line}");
    };
    let ty = ty.replace(['(', ')'], "");
    format!(
        "* {name} `{ty}`: {description}",
        ty = ty.trim(),
        description = description.trim()
    )
}

/// Hover for the cursor line: the matched definition's help, with a range
/// spanning the step expression without its keyword.
pub fn hover(
    inventory: &StepInventory,
    kind: StepKind,
    line: &str,
    position: Position,
) -> Option<Hover> {
    let (keyword, expression) = step_parts(line);
    let keyword = keyword?;
    let expression = expression?;

    let help = inventory
        .lookup(kind, &expression)
        .and_then(|(definition, _)| definition.help.as_deref())
        .or_else(|| find_help(inventory, kind, &expression))?;

    let keyword_at = line.find(&keyword)?;
    let start = line[..keyword_at + keyword.len() + 1].chars().count() as u32;
    let end = line.trim_end().chars().count() as u32;

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format_help(help),
        }),
        range: Some(Range {
            start: Position {
                line: position.line,
                character: start,
            },
            end: Position {
                line: position.line,
                character: end,
            },
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParseTypeRegistry, StepDefinition};
    use crate::normalize::normalize_pattern;
    use regex::Regex;

    fn definition(kind: StepKind, pattern: &str, help: &str) -> StepDefinition {
        let normalized = normalize_pattern(pattern, &ParseTypeRegistry::new()).unwrap();
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
            help: Some(help.to_string()),
            source_location: None,
        }
    }

    fn inventory() -> StepInventory {
        StepInventory::build(
            vec![definition(
                StepKind::Given,
                r#"a user of type "{user_class_name}" with weight "{weight}" load testing "{host}""#,
                "Sets which user to use for the scenario.",
            )],
            1,
        )
    }

    #[test]
    fn hover_range_spans_the_expression() {
        let inventory = inventory();
        let line = r#"    Given a user of type "RestApi" with weight "1" load testing "http://x""#;
        let hover = hover(&inventory, StepKind::Given, line, Position::new(2, 35)).unwrap();
        let range = hover.range.unwrap();
        // the column of "a", right after "    Given "
        assert_eq!(range.start, Position::new(2, 10));
        assert_eq!(range.end, Position::new(2, line.trim_end().len() as u32));
        match hover.contents {
            HoverContents::Markup(content) => {
                assert_eq!(content.value, "Sets which user to use for the scenario.");
            }
            other => panic!("unexpected contents: {other:?}"),
        }
    }

    #[test]
    fn hover_misses_unknown_steps() {
        let inventory = inventory();
        assert!(hover(
            &inventory,
            StepKind::Given,
            "Given something unheard of",
            Position::new(0, 8)
        )
        .is_none());
    }

    #[test]
    fn find_help_prefers_exact_shell_match() {
        let inventory = StepInventory::build(
            vec![
                definition(StepKind::Given, r#"save "{x}""#, "short"),
                definition(StepKind::Given, r#"save "{x}" in "{y}""#, "long"),
            ],
            1,
        );
        assert_eq!(
            find_help(&inventory, StepKind::Given, r#"save "v""#),
            Some("short")
        );
    }

    #[test]
    fn find_help_falls_back_to_longest_extension() {
        let inventory = StepInventory::build(
            vec![
                definition(StepKind::Given, r#"save "{x}" in "{y}""#, "in"),
                definition(StepKind::Given, r#"save "{x}" in "{y}" twice"#, "twice"),
            ],
            1,
        );
        assert_eq!(
            find_help(&inventory, StepKind::Given, r#"save "v""#),
            Some("twice")
        );
    }

    #[test]
    fn format_help_renders_args_as_bullets() {
        let help = "Sets a value.\n\nArgs:\nname (str): the variable name\nvalue (str): the value";
        let formatted = format_help(help);
        assert!(formatted.contains("* name `str`: the variable name"));
        assert!(formatted.contains("* value `str`: the value"));
    }

    #[test]
    fn format_help_without_args_is_unchanged() {
        assert_eq!(format_help("Just a line."), "Just a line.");
    }

    #[test]
    fn malformed_arg_lines_become_plain_bullets() {
        let formatted = format_help("Args:\nnot a real arg line");
        assert!(formatted.contains("* not a real arg line"));
    }
}
