//! Template preprocessing for feature files.
//!
//! Feature files may embed `{% scenario "name", feature="./other.feature" %}`
//! tags that inline a scenario from another feature file, with `{$ name $}`
//! value substitution. The render pass expands those tags for previewing;
//! the preprocess pass blanks them out line-for-line so the Gherkin parser
//! sees the document at its original line numbers.

use std::path::Path;
use std::sync::OnceLock;

use gherkin::GherkinEnv;
use regex::Regex;

use crate::error::RenderError;

/// A parsed scenario tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioTag {
    pub scenario: Option<String>,
    pub feature: Option<String>,
    pub variables: Vec<(String, String)>,
}

fn tag_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{%\s*(.*?)\s*%\}$").unwrap())
}

fn tag_argument_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // named arguments first so positional quoting does not swallow them
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"([^"]*)"|"([^"]*)""#).unwrap()
    })
}

fn template_variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\$\s*([^$]+?)\s*\$\}").unwrap())
}

/// Returns the parsed scenario tag when the trimmed line is one, `None` for
/// any other content (including non-scenario `{% ... %}` expressions).
pub fn parse_scenario_tag(line: &str) -> Option<ScenarioTag> {
    let trimmed = line.trim();
    let captures = tag_line_re().captures(trimmed)?;
    let body = captures.get(1).map_or("", |m| m.as_str());
    let rest = body.strip_prefix("scenario")?;
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }

    let mut tag = ScenarioTag::default();
    let mut positional = 0usize;
    for captures in tag_argument_re().captures_iter(rest) {
        if let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) {
            match name.as_str() {
                "feature" => tag.feature = Some(value.as_str().to_string()),
                "scenario" => tag.scenario = Some(value.as_str().to_string()),
                other => tag
                    .variables
                    .push((other.to_string(), value.as_str().to_string())),
            }
        } else if let Some(value) = captures.get(3) {
            match positional {
                0 => tag.scenario = Some(value.as_str().to_string()),
                1 => tag.feature = Some(value.as_str().to_string()),
                _ => {}
            }
            positional += 1;
        }
    }
    Some(tag)
}

/// Whether the trimmed line is any `{% ... %}` template expression.
pub fn is_template_line(line: &str) -> bool {
    tag_line_re().is_match(line.trim())
}

/// Blanks template expression lines so the parser sees original line numbers.
pub fn preprocess(content: &str) -> String {
    content
        .lines()
        .map(|line| if is_template_line(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Variable names referenced as `{$ name $}` in a block of text.
pub fn referenced_variables(text: &str) -> Vec<String> {
    template_variable_re()
        .captures_iter(text)
        .map(|captures| captures[1].trim().to_string())
        .collect()
}

/// The steps of a named scenario in a feature file, keyword included, one
/// line per step.
pub fn scenario_steps(feature_file: &Path, scenario_name: &str) -> Result<String, RenderError> {
    let display = feature_file.display().to_string();
    if !feature_file.exists() {
        return Err(RenderError::FeatureMissing(display));
    }

    let content = std::fs::read_to_string(feature_file)?;
    let mut source = preprocess(&content);
    if !source.ends_with('\n') {
        source.push('\n');
    }

    let feature = gherkin::Feature::parse(&source, GherkinEnv::default())
        .map_err(|err| RenderError::FeatureUnparsable(display.clone(), err.to_string()))?;

    let scenario = feature
        .scenarios
        .iter()
        .find(|scenario| scenario.name == scenario_name)
        .ok_or_else(|| RenderError::MissingScenario {
            scenario: scenario_name.to_string(),
            feature: display,
        })?;

    let lines: Vec<String> = scenario
        .steps
        .iter()
        .map(|step| format!("{} {}", step.keyword.trim(), step.value))
        .collect();
    Ok(lines.join("\n"))
}

fn template_env() -> Result<minijinja::Environment<'static>, minijinja::Error> {
    let mut env = minijinja::Environment::new();
    env.set_syntax(
        minijinja::syntax::SyntaxConfig::builder()
            .variable_delimiters("{$", "$}")
            .build()?,
    );
    Ok(env)
}

/// Expands one scenario tag into the referenced scenario's steps with its
/// `{$ name $}` values substituted.
fn expand_tag(tag: &ScenarioTag, base: &Path, indent: &str) -> Result<String, RenderError> {
    let scenario = tag
        .scenario
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RenderError::InvalidTag("could not find scenario argument".into()))?;
    let feature = tag
        .feature
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RenderError::InvalidTag("could not find feature argument".into()))?;

    let feature_path = Path::new(feature);
    let feature_file = if feature_path.is_absolute() {
        feature_path.to_path_buf()
    } else {
        base.join(feature_path)
    };

    let steps = scenario_steps(&feature_file, scenario)?;
    let env = template_env()?;
    let context: std::collections::HashMap<&str, &str> = tag
        .variables
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let rendered = env.render_str(&steps, context)?;

    Ok(rendered
        .lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Renders a whole document for previewing: scenario tags are expanded in
/// place, other template expressions are dropped, and angle brackets inside
/// comments are replaced with HTML entities.
pub fn render(content: &str, feature_path: &Path) -> Result<String, RenderError> {
    let base = feature_path.parent().unwrap_or_else(|| Path::new("."));
    let mut buffer: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(tag) = parse_scenario_tag(line) {
            let indent: String = line.chars().take_while(|ch| ch.is_whitespace()).collect();
            buffer.push(expand_tag(&tag, base, &indent)?);
        } else if is_template_line(line) {
            continue;
        } else if line.trim_start().starts_with('#') {
            buffer.push(line.replace('<', "&lt;").replace('>', "&gt;"));
        } else {
            buffer.push(line.to_string());
        }
    }

    Ok(buffer.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_positional_and_named_arguments() {
        let tag = parse_scenario_tag(
            r#"{% scenario "sign in", feature="./auth.feature", user="alice" %}"#,
        )
        .unwrap();
        assert_eq!(tag.scenario.as_deref(), Some("sign in"));
        assert_eq!(tag.feature.as_deref(), Some("./auth.feature"));
        assert_eq!(
            tag.variables,
            vec![("user".to_string(), "alice".to_string())]
        );
    }

    #[test]
    fn non_scenario_expressions_are_not_tags() {
        assert!(parse_scenario_tag("{% if foo %}").is_none());
        assert!(parse_scenario_tag("Given a step").is_none());
        assert!(is_template_line("{% if foo %}"));
        assert!(!is_template_line("Given a step"));
    }

    #[test]
    fn preprocess_keeps_line_numbers() {
        let content = "Feature: x\n{% scenario \"a\", feature=\"b\" %}\n  Scenario: y\n";
        let processed = preprocess(content);
        assert_eq!(processed.lines().count(), content.lines().count());
        assert_eq!(processed.lines().nth(1), Some(""));
    }

    #[test]
    fn referenced_variables_are_collected() {
        let vars = referenced_variables("Given {$ user $} and \"{$ host $}\"");
        assert_eq!(vars, vec!["user", "host"]);
    }

    fn write_feature(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("auth.feature");
        fs::write(
            &path,
            concat!(
                "Feature: auth\n",
                "  Scenario: sign in\n",
                "    Given a user named \"{$ user $}\"\n",
                "    When the user signs in\n",
                "  Scenario: empty\n",
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn scenario_steps_returns_keyworded_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path());
        let steps = scenario_steps(&path, "sign in").unwrap();
        assert_eq!(
            steps,
            "Given a user named \"{$ user $}\"\nWhen the user signs in"
        );
    }

    #[test]
    fn missing_feature_file_is_reported() {
        let err = scenario_steps(Path::new("/nonexistent/x.feature"), "any").unwrap_err();
        assert!(matches!(err, RenderError::FeatureMissing(_)));
    }

    #[test]
    fn missing_scenario_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feature(dir.path());
        let err = scenario_steps(&path, "no such scenario").unwrap_err();
        assert!(matches!(err, RenderError::MissingScenario { .. }));
    }

    #[test]
    fn render_expands_tags_with_variables() {
        let dir = tempfile::tempdir().unwrap();
        write_feature(dir.path());
        let main = dir.path().join("main.feature");
        let content = concat!(
            "Feature: main\n",
            "  Scenario: composed\n",
            "    {% scenario \"sign in\", feature=\"./auth.feature\", user=\"alice\" %}\n",
            "    Then everything works\n",
        );
        let rendered = render(content, &main).unwrap();
        assert!(rendered.contains("    Given a user named \"alice\""));
        assert!(rendered.contains("    When the user signs in"));
        assert!(rendered.contains("    Then everything works"));
        assert!(!rendered.contains("{%"));
    }

    #[test]
    fn render_escapes_comment_markup() {
        let rendered = render("# a <tag> comment\nFeature: x", Path::new("x.feature")).unwrap();
        assert!(rendered.contains("# a &lt;tag&gt; comment"));
    }

    #[test]
    fn render_fails_on_incomplete_tag() {
        let err = render(
            "{% scenario \"only name\" %}\n",
            Path::new("x.feature"),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidTag(_)));
    }
}
