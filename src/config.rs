//! Server configuration assembled from the client's initialization options.
//!
//! A configuration is immutable once built; applying new options swaps a
//! complete snapshot.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

/// Template used when offering a "create step implementation" quick fix,
/// with `{keyword}` and `{expression}` placeholders.
pub const DEFAULT_STEP_IMPL_TEMPLATE: &str = "@{keyword}(u'{expression}')";

/// Patterns recognizing steps that declare a variable; exactly one capture
/// group naming the variable.
const DEFAULT_VARIABLE_PATTERNS: [&str; 2] = [
    r#"ask for value of variable "([^"]*)"$"#,
    r#"value for variable "([^"]*)" is ".*?"$"#,
];

const DEFAULT_SOURCE_LOAD_TIMEOUT_SECS: u64 = 120;

/// Raw shape of `initializationOptions`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClientSettings {
    pub variable_pattern: Vec<String>,
    pub use_virtual_environment: Option<bool>,
    pub pip_extra_index_url: Option<String>,
    pub diagnostics_on_save_only: Option<bool>,
    pub quick_fix: QuickFixSettings,
    pub file_ignore_patterns: Vec<String>,
    pub source_load_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QuickFixSettings {
    pub step_impl_template: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("initialization options are not valid: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("variable pattern \"{pattern}\" is not a valid regular expression: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("variable pattern \"{pattern}\" contains {groups} match groups, it must be exactly one")]
    WrongGroupCount { pattern: String, groups: usize },
}

/// Validated configuration snapshot.
#[derive(Debug)]
pub struct ServerConfig {
    pub use_virtual_environment: bool,
    pub pip_extra_index_url: Option<String>,
    pub diagnostics_on_save_only: bool,
    pub step_impl_template: String,
    pub file_ignore_patterns: Vec<String>,
    pub source_load_timeout: Duration,
    variable_patterns: Vec<Regex>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::from_settings(ClientSettings::default())
            .expect("default settings are valid")
    }
}

impl ServerConfig {
    /// Builds a configuration from the `initializationOptions` payload.
    pub fn from_initialization_options(
        options: Option<serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        let settings = match options {
            Some(value) => serde_json::from_value(value)?,
            None => ClientSettings::default(),
        };
        Self::from_settings(settings)
    }

    fn from_settings(settings: ClientSettings) -> Result<Self, ConfigError> {
        let sources: Vec<String> = if settings.variable_pattern.is_empty() {
            DEFAULT_VARIABLE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            settings.variable_pattern.clone()
        };

        let mut variable_patterns = Vec::with_capacity(sources.len());
        for source in sources {
            let anchored = anchor_pattern(&source);
            let pattern = Regex::new(&anchored).map_err(|e| ConfigError::BadPattern {
                pattern: source.clone(),
                source: e,
            })?;
            // captures_len includes the implicit whole-match group
            let groups = pattern.captures_len() - 1;
            if groups != 1 {
                return Err(ConfigError::WrongGroupCount {
                    pattern: source,
                    groups,
                });
            }
            variable_patterns.push(pattern);
        }

        let step_impl_template = settings
            .quick_fix
            .step_impl_template
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STEP_IMPL_TEMPLATE.to_string());

        Ok(ServerConfig {
            use_virtual_environment: settings.use_virtual_environment.unwrap_or(true),
            pip_extra_index_url: settings
                .pip_extra_index_url
                .filter(|url| !url.trim().is_empty()),
            diagnostics_on_save_only: settings.diagnostics_on_save_only.unwrap_or(true),
            step_impl_template,
            file_ignore_patterns: settings.file_ignore_patterns,
            source_load_timeout: Duration::from_secs(
                settings
                    .source_load_timeout_seconds
                    .unwrap_or(DEFAULT_SOURCE_LOAD_TIMEOUT_SECS),
            ),
            variable_patterns,
        })
    }

    /// Compiled variable-declaration patterns, each with one capture group.
    pub fn variable_patterns(&self) -> &[Regex] {
        &self.variable_patterns
    }
}

/// Anchors a variable pattern the way clients expect to write them: an
/// implicit `.*` prefix and `$` suffix unless already present.
fn anchor_pattern(source: &str) -> String {
    let mut pattern = source.to_string();
    if !pattern.starts_with(".*") && !pattern.starts_with('^') {
        pattern = format!(".*{pattern}");
    }
    if !pattern.starts_with('^') {
        pattern = format!("^{pattern}");
    }
    if !pattern.ends_with('$') {
        pattern = format!("{pattern}$");
    }
    pattern
}
