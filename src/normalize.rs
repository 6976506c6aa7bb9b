//! Step-pattern normalization.
//!
//! Converts a step-definition pattern with `{name}` / `{name:Type}`
//! placeholders into anchored regex sources, display variants with enum
//! alternatives substituted in, and a clean form with every placeholder
//! emptied.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::PatternError;
use crate::model::ParseTypeRegistry;

/// The normalized output for one pattern.
///
/// `variants` and `regexes` are parallel and non-empty; `regexes[i]` matches
/// `variants[i]` with every quoted slot emptied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPattern {
    pub clean_expression: String,
    pub variants: Vec<String>,
    pub regexes: Vec<String>,
    /// Enum alternatives per quoted slot, `None` for free-text slots.
    pub quoted_slots: Vec<Option<Vec<String>>>,
}

#[derive(Debug)]
enum Token {
    Literal(String),
    Placeholder { ty: Option<String> },
}

fn lex(pattern: &str) -> Result<Vec<Token>, PatternError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.char_indices();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' => {
                let mut content = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(PatternError::UnclosedPlaceholder(offset)),
                        other => content.push(other),
                    }
                }
                if !closed {
                    return Err(PatternError::UnclosedPlaceholder(offset));
                }
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let ty = content
                    .split_once(':')
                    .map(|(_, ty)| ty.trim().to_string())
                    .filter(|ty| !ty.is_empty());
                tokens.push(Token::Placeholder { ty });
            }
            '}' => return Err(PatternError::UnmatchedBrace(offset)),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(tokens)
}

/// Normalizes one pattern against the registered parse types.
///
/// Enum expansion is order-stable: alternatives are sorted lexicographically
/// and the cartesian product varies the left-most placeholder slowest, so two
/// identical inputs always produce identical outputs.
pub fn normalize_pattern(
    pattern: &str,
    types: &ParseTypeRegistry,
) -> Result<NormalizedPattern, PatternError> {
    let tokens = lex(pattern)?;

    // Resolve placeholders: enum alternatives and quoted-slot positions.
    let mut inside_quotes = false;
    let mut regions = 0usize;
    let mut placeholders: Vec<(Option<Vec<String>>, bool, Option<usize>)> = Vec::new();
    for token in &tokens {
        match token {
            Token::Literal(text) => {
                for ch in text.chars() {
                    if ch == '"' {
                        inside_quotes = !inside_quotes;
                        if inside_quotes {
                            regions += 1;
                        }
                    }
                }
            }
            Token::Placeholder { ty } => {
                let alternatives = ty.as_deref().and_then(|ty| types.get(ty)).map(|alts| {
                    let mut alts = alts.clone();
                    alts.sort();
                    alts
                });
                let region = inside_quotes.then(|| regions - 1);
                placeholders.push((alternatives, inside_quotes, region));
            }
        }
    }

    let mut quoted_slots: Vec<Option<Vec<String>>> = vec![None; regions];
    for (alternatives, _, region) in &placeholders {
        if let (Some(alts), Some(region)) = (alternatives, region) {
            quoted_slots[*region] = Some(alts.clone());
        }
    }

    // Cartesian product over the enum placeholders, in placeholder order.
    let enum_lists: Vec<&Vec<String>> = placeholders
        .iter()
        .filter_map(|(alts, _, _)| alts.as_ref())
        .collect();
    let mut combos: Vec<Vec<&str>> = vec![Vec::new()];
    for list in &enum_lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for alternative in list.iter() {
                let mut widened = combo.clone();
                widened.push(alternative.as_str());
                next.push(widened);
            }
        }
        combos = next;
    }

    let mut variants = Vec::with_capacity(combos.len());
    let mut regexes = Vec::with_capacity(combos.len());
    for combo in &combos {
        let mut display = String::new();
        let mut regex = String::from("^");
        let mut enum_index = 0usize;
        let mut placeholder_index = 0usize;
        for token in &tokens {
            match token {
                Token::Literal(text) => {
                    display.push_str(text);
                    regex.push_str(&regex::escape(text));
                }
                Token::Placeholder { .. } => {
                    let (alternatives, quoted, _) = &placeholders[placeholder_index];
                    placeholder_index += 1;
                    if alternatives.is_some() {
                        let value = combo[enum_index];
                        enum_index += 1;
                        display.push_str(value);
                        regex.push_str(&regex::escape(value));
                    } else if *quoted {
                        regex.push_str(r#"([^"]*)"#);
                    } else {
                        regex.push_str("(.*)");
                    }
                }
            }
        }
        regex.push('$');
        variants.push(display);
        regexes.push(regex);
    }

    let clean_expression = {
        let mut clean = String::new();
        for token in &tokens {
            if let Token::Literal(text) = token {
                clean.push_str(text);
            }
        }
        collapse_whitespace(clean.trim())
    };

    Ok(NormalizedPattern {
        clean_expression,
        variants,
        regexes,
        quoted_slots,
    })
}

fn quoted_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*""#).unwrap())
}

/// Empties every double-quoted value: `say "hi" to "bob"` → `say "" to ""`.
pub fn empty_quoted(text: &str) -> String {
    quoted_value_re().replace_all(text, "\"\"").to_string()
}

/// Collapses runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\s{2,}").unwrap());
    re.replace_all(text, " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashMap;

    fn types(entries: &[(&str, &[&str])]) -> ParseTypeRegistry {
        entries
            .iter()
            .map(|(name, alts)| {
                (
                    name.to_string(),
                    alts.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn plain_pattern_produces_single_variant() {
        let normalized = normalize_pattern("restart scenario", &HashMap::new()).unwrap();
        assert_eq!(normalized.variants, vec!["restart scenario"]);
        assert_eq!(normalized.regexes, vec!["^restart scenario$"]);
        assert_eq!(normalized.clean_expression, "restart scenario");
        assert!(normalized.quoted_slots.is_empty());
    }

    #[test]
    fn quoted_placeholders_become_empty_slots() {
        let normalized = normalize_pattern(
            r#"set context variable "{variable}" to "{value}""#,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(
            normalized.variants,
            vec![r#"set context variable "" to """#]
        );
        let re = Regex::new(&normalized.regexes[0]).unwrap();
        assert!(re.is_match(r#"set context variable "foo.bar" to "10""#));
        assert!(re.is_match(r#"set context variable "" to """#));
        assert!(!re.is_match(r#"set context variable "x" to "y" extra"#));
        assert_eq!(normalized.quoted_slots, vec![None, None]);
    }

    #[test]
    fn unquoted_enum_expands_in_lexicographic_order() {
        let types = types(&[("Method", &["post", "get", "put"])]);
        let normalized =
            normalize_pattern(r#"{method:Method} request with name "{name}""#, &types).unwrap();
        assert_eq!(
            normalized.variants,
            vec![
                r#"get request with name """#,
                r#"post request with name """#,
                r#"put request with name """#,
            ]
        );
        let re = Regex::new(&normalized.regexes[1]).unwrap();
        assert!(re.is_match(r#"post request with name "hello""#));
        assert!(!re.is_match(r#"delete request with name "hello""#));
    }

    #[test]
    fn quoted_enum_expands_inside_quotes() {
        let types = types(&[("ContentType", &["xml", "json", "plain"])]);
        let normalized = normalize_pattern(
            r#"parse "{content}" as "{content_type:ContentType}""#,
            &types,
        )
        .unwrap();
        assert_eq!(
            normalized.variants,
            vec![
                r#"parse "" as "json""#,
                r#"parse "" as "plain""#,
                r#"parse "" as "xml""#,
            ]
        );
        assert_eq!(normalized.quoted_slots.len(), 2);
        assert_eq!(normalized.quoted_slots[0], None);
        assert_eq!(
            normalized.quoted_slots[1],
            Some(vec![
                "json".to_string(),
                "plain".to_string(),
                "xml".to_string()
            ])
        );
    }

    #[test]
    fn cross_product_covers_all_combinations() {
        let types = types(&[("A", &["a1", "a2"]), ("B", &["b1", "b2"])]);
        let normalized = normalize_pattern("{x:A} and {y:B}", &types).unwrap();
        assert_eq!(
            normalized.variants,
            vec!["a1 and b1", "a1 and b2", "a2 and b1", "a2 and b2"]
        );
        assert_eq!(normalized.regexes.len(), 4);
    }

    #[test]
    fn every_regex_is_anchored_and_matches_its_variant() {
        let types = types(&[("Gram", &["iteration", "iterations"])]);
        let normalized =
            normalize_pattern(r#"repeat for "{repeat}" {grammar:Gram}"#, &types).unwrap();
        assert_eq!(normalized.variants.len(), normalized.regexes.len());
        for (variant, source) in normalized.variants.iter().zip(&normalized.regexes) {
            assert!(source.starts_with('^') && source.ends_with('$'));
            let re = Regex::new(source).unwrap();
            assert!(re.is_match(variant), "{source} should match {variant}");
        }
    }

    #[test]
    fn unbalanced_open_brace_is_rejected() {
        let err = normalize_pattern("say {open", &HashMap::new()).unwrap_err();
        assert!(matches!(err, PatternError::UnclosedPlaceholder(_)));
    }

    #[test]
    fn unmatched_close_brace_is_rejected() {
        let err = normalize_pattern("broken} stuff", &HashMap::new()).unwrap_err();
        assert!(matches!(err, PatternError::UnmatchedBrace(_)));
    }

    #[test]
    fn clean_normalization_round_trip() {
        // Applying clean-normalization to the pattern and to any emitted
        // variant yields the same string for non-enum patterns.
        let pattern = r#"save response payload "{expression}" in variable "{variable}""#;
        let normalized = normalize_pattern(pattern, &HashMap::new()).unwrap();
        let from_pattern = empty_quoted(&pattern.replace("{expression}", "").replace("{variable}", ""));
        for variant in &normalized.variants {
            assert_eq!(empty_quoted(variant), from_pattern);
        }
    }

    #[test]
    fn empty_quoted_empties_all_values() {
        assert_eq!(
            empty_quoted(r#"a user of type "RestApi" with weight "1""#),
            r#"a user of type "" with weight """#
        );
        assert_eq!(empty_quoted("no quotes"), "no quotes");
    }

    #[test]
    fn collapse_whitespace_leaves_single_spaces() {
        assert_eq!(collapse_whitespace("a  b\t\tc"), "a b c");
        assert_eq!(collapse_whitespace("a b"), "a b");
    }
}
