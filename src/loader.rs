//! Loads step definitions from the external library.
//!
//! The step library registers its patterns as an import side effect, so the
//! loader embeds a Python interpreter, points it at the workspace (and, when
//! configured, a dedicated virtual environment), imports the registry and
//! harvests everything as one JSON payload.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::model::{
    ParseTypeRegistry, RawInventory, SourceLocation, StepDefinition, StepKind,
};
use crate::normalize::normalize_pattern;

/// Python helper executed in the workspace interpreter. Imports the behave
/// step registry, loads every step module below the workspace root and dumps
/// the registrations plus enumerable parse types as JSON.
const HARVEST_MODULE: &str = r#"
import inspect
import json
import warnings
from fnmatch import fnmatch
from pathlib import Path


def _alternatives(func):
    pattern = getattr(func, 'pattern', None)
    if isinstance(pattern, str):
        inner = pattern.strip('^$')
        if inner.startswith('(') and inner.endswith(')'):
            inner = inner[1:-1]
        if inner and not any(ch in inner for ch in '[]{}()*+?.\\'):
            parts = [part for part in inner.split('|') if part]
            if len(parts) > 1:
                return parts

    owner = getattr(func, '__self__', None)
    members = getattr(owner, '__members__', None)
    if members:
        return [name.lower() for name in members]

    return None


def harvest(root, ignore_patterns):
    from behave import step_registry
    from behave.matchers import ParseMatcher
    from behave.runner_util import load_step_modules

    root_path = Path(root)
    step_paths = set()
    for path in root_path.rglob('*.py'):
        relative = str(path.relative_to(root_path))
        if any(fnmatch(relative, pattern) for pattern in ignore_patterns):
            continue
        step_paths.add(str(path.parent))

    with warnings.catch_warnings():
        warnings.simplefilter('ignore')
        load_step_modules(sorted(step_paths))

    types = []
    for name, func in ParseMatcher.custom_types.items():
        alternatives = _alternatives(func)
        if alternatives:
            types.append({'name': name, 'alternatives': alternatives})

    steps = []
    for keyword, matchers in step_registry.registry.steps.items():
        for matcher in matchers:
            if not isinstance(matcher, ParseMatcher):
                continue
            func = matcher.func
            try:
                source_file = inspect.getfile(func)
                _, line = inspect.getsourcelines(func)
            except (OSError, TypeError):
                source_file, line = None, None
            steps.append({
                'keyword': keyword,
                'pattern': matcher.pattern,
                'help': inspect.getdoc(func),
                'file': source_file,
                'line': line,
            })

    return json.dumps({'steps': steps, 'types': types})
"#;

/// Loads and compiles the complete step inventory for a workspace.
///
/// Individual malformed patterns are skipped with a warning; any failure to
/// prepare the environment or import the library fails the whole load and
/// leaves the previous inventory in place at the call site.
pub fn load_inventory(
    root: &Path,
    config: &ServerConfig,
) -> Result<Vec<StepDefinition>, ServerError> {
    let mut extra_sys_paths = vec![root.join("features")];
    if config.use_virtual_environment {
        let site_packages = ensure_environment(root, config)?;
        debug!(path = %site_packages.display(), "using virtual environment site-packages");
        extra_sys_paths.push(site_packages);
    }

    let raw = harvest(root, &extra_sys_paths, &config.file_ignore_patterns)?;
    let definitions = compile_definitions(raw);
    info!(steps = definitions.len(), "step inventory loaded");
    Ok(definitions)
}

/// Turns harvested registrations into catalogue entries. Registrations under
/// behave's generic `step` keyword are cloned under each verb so that every
/// entry lives under exactly one verb.
pub fn compile_definitions(raw: RawInventory) -> Vec<StepDefinition> {
    let types: ParseTypeRegistry = raw
        .types
        .into_iter()
        .map(|ty| (ty.name, ty.alternatives))
        .collect();

    let mut definitions = Vec::with_capacity(raw.steps.len());
    for step in raw.steps {
        let kinds: Vec<StepKind> = match StepKind::from_keyword(&step.keyword) {
            Some(kind) => vec![kind],
            None if step.keyword.eq_ignore_ascii_case("step") => StepKind::ALL.to_vec(),
            None => {
                warn!(keyword = %step.keyword, "skipping step with unknown keyword");
                continue;
            }
        };

        let normalized = match normalize_pattern(&step.pattern, &types) {
            Ok(normalized) => normalized,
            Err(source) => {
                let err = ServerError::PatternMalformed {
                    pattern: step.pattern.clone(),
                    source,
                };
                warn!(tag = err.tag(), "{err}");
                continue;
            }
        };

        let compiled: Result<Vec<Regex>, regex::Error> = normalized
            .regexes
            .iter()
            .map(|source| Regex::new(source))
            .collect();
        let regex_patterns = match compiled {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(pattern = %step.pattern, "step pattern produced an invalid regex: {err}");
                continue;
            }
        };

        let help = step.help.as_deref().map(clean_help);
        let source_location = match (&step.file, step.line) {
            (Some(file), Some(line)) => Some(SourceLocation {
                path: PathBuf::from(file),
                line,
            }),
            _ => None,
        };

        for kind in kinds {
            definitions.push(StepDefinition {
                kind,
                expression: step.pattern.clone(),
                clean_expression: normalized.clean_expression.clone(),
                regex_patterns: regex_patterns.clone(),
                expression_variants: normalized.variants.clone(),
                quoted_slots: normalized.quoted_slots.clone(),
                help: help.clone(),
                source_location: source_location.clone(),
            });
        }
    }

    definitions
}

/// Rewrites `{@pylink some.module.Item}` markers to their last component and
/// strips leading indentation, so docstrings render as plain markdown.
pub fn clean_help(help: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\{@pylink ([^\}]*)\}").unwrap());

    let text = re.replace_all(help, |captures: &regex::Captures<'_>| {
        let target = captures.get(1).map_or("", |m| m.as_str());
        target.rsplit('.').next().unwrap_or(target).to_string()
    });

    text.lines()
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n")
}

fn harvest(
    root: &Path,
    extra_sys_paths: &[PathBuf],
    ignore_patterns: &[String],
) -> Result<RawInventory, ServerError> {
    let payload: String = Python::with_gil(|py| -> PyResult<String> {
        let sys_path = py.import_bound("sys")?.getattr("path")?;
        for path in extra_sys_paths {
            sys_path.call_method1("append", (path.to_string_lossy().as_ref(),))?;
        }

        let module = PyModule::from_code_bound(
            py,
            HARVEST_MODULE,
            "grizzly_ls_harvest.py",
            "grizzly_ls_harvest",
        )?;
        module
            .getattr("harvest")?
            .call1((root.to_string_lossy().as_ref(), ignore_patterns.to_vec()))?
            .extract()
    })
    .map_err(|err| ServerError::SourceLoadFailed(err.to_string()))?;

    serde_json::from_str(&payload)
        .map_err(|err| ServerError::SourceLoadFailed(format!("invalid harvest payload: {err}")))
}

/// Provisions the per-workspace virtual environment and returns its
/// site-packages directory.
///
/// The environment lives under the system temp directory, keyed by the
/// workspace name. Dependencies are (re)installed when the age marker is
/// missing or older than `requirements.txt`.
fn ensure_environment(root: &Path, config: &ServerConfig) -> Result<PathBuf, ServerError> {
    let project = root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "workspace".to_string());
    let venv_dir = std::env::temp_dir().join(format!("grizzly-ls-{project}"));

    if !venv_dir.exists() {
        info!(path = %venv_dir.display(), "creating virtual environment");
        run_command(
            Command::new("python3").args(["-m", "venv"]).arg(&venv_dir),
            "create virtual environment",
        )?;
    }

    let requirements = root.join("requirements.txt");
    if !requirements.exists() {
        return Err(ServerError::SourceLoadFailed(format!(
            "project \"{project}\" does not have a requirements.txt in {}",
            root.display()
        )));
    }

    let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
    let python = venv_dir.join(bin_dir).join(if cfg!(windows) {
        "python.exe"
    } else {
        "python"
    });

    let age_marker = venv_dir.join(".age");
    if install_needed(&age_marker, &requirements) {
        info!("installing dependencies from {}", requirements.display());
        let mut command = Command::new(&python);
        command
            .args(["-m", "pip", "install", "--upgrade", "-r"])
            .arg(&requirements)
            .env("VIRTUAL_ENV", &venv_dir);
        if let Some(index_url) = &config.pip_extra_index_url {
            command.env("PIP_EXTRA_INDEX_URL", index_url);
        }
        run_command(&mut command, "install dependencies")?;
        fs::write(&age_marker, b"").map_err(|err| {
            ServerError::SourceLoadFailed(format!("failed to touch age marker: {err}"))
        })?;
    }

    site_packages(&venv_dir)
}

fn install_needed(age_marker: &Path, requirements: &Path) -> bool {
    let Ok(marker_meta) = fs::metadata(age_marker) else {
        return true;
    };
    match (marker_meta.modified(), fs::metadata(requirements).and_then(|m| m.modified())) {
        (Ok(marker), Ok(requirements)) => requirements > marker,
        _ => true,
    }
}

fn site_packages(venv_dir: &Path) -> Result<PathBuf, ServerError> {
    if cfg!(windows) {
        return Ok(venv_dir.join("Lib").join("site-packages"));
    }

    let lib_dir = venv_dir.join("lib");
    let entries = fs::read_dir(&lib_dir).map_err(|err| {
        ServerError::SourceLoadFailed(format!(
            "virtual environment has no lib directory at {}: {err}",
            lib_dir.display()
        ))
    })?;
    for entry in entries.flatten() {
        let candidate = entry.path().join("site-packages");
        if candidate.is_dir() {
            return Ok(candidate);
        }
    }

    Err(ServerError::SourceLoadFailed(format!(
        "no site-packages directory below {}",
        lib_dir.display()
    )))
}

fn run_command(command: &mut Command, what: &str) -> Result<(), ServerError> {
    debug!("executing: {command:?}");
    let output = command
        .output()
        .map_err(|err| ServerError::SourceLoadFailed(format!("failed to {what}: {err}")))?;

    for line in String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
    {
        if line.trim().is_empty() {
            continue;
        }
        if output.status.success() {
            debug!("{line}");
        } else {
            warn!("{line}");
        }
    }

    if !output.status.success() {
        return Err(ServerError::SourceLoadFailed(format!(
            "failed to {what} (exit status {status})",
            status = output.status
        )));
    }
    Ok(())
}
