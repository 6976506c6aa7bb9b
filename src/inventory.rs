//! The indexed catalogue of known step definitions.

use std::collections::HashMap;

use crate::model::{StepDefinition, StepKind};
use crate::normalize::collapse_whitespace;

/// One prefix-query hit: a definition together with the variant that matched.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub definition: &'a StepDefinition,
    /// Index into `definition.expression_variants` / `regex_patterns`.
    pub variant: usize,
}

#[derive(Debug, Clone)]
struct PrefixEntry {
    normalized: String,
    definition: usize,
    variant: usize,
}

/// Immutable step catalogue. Rebuilds replace the whole inventory; readers
/// hold a snapshot and never observe a partially-built one.
#[derive(Debug, Default)]
pub struct StepInventory {
    steps: HashMap<StepKind, Vec<StepDefinition>>,
    /// Ordered set of normalized expression variants per verb, used for
    /// prefix narrowing.
    prefixes: HashMap<StepKind, Vec<PrefixEntry>>,
    revision: u64,
}

/// Normalization applied to both the index and incoming queries: leading
/// whitespace trimmed, internal runs collapsed, lowercased.
pub fn normalize_query(text: &str) -> String {
    collapse_whitespace(text.trim_start()).to_lowercase()
}

impl StepInventory {
    /// Builds a new inventory from compiled definitions, preserving
    /// registration order within each verb.
    pub fn build(definitions: Vec<StepDefinition>, revision: u64) -> Self {
        let mut steps: HashMap<StepKind, Vec<StepDefinition>> = HashMap::new();
        for definition in definitions {
            steps.entry(definition.kind).or_default().push(definition);
        }

        let mut prefixes: HashMap<StepKind, Vec<PrefixEntry>> = HashMap::new();
        for (kind, definitions) in &steps {
            let mut entries = Vec::new();
            for (definition_index, definition) in definitions.iter().enumerate() {
                for (variant_index, variant) in
                    definition.expression_variants.iter().enumerate()
                {
                    entries.push(PrefixEntry {
                        normalized: normalize_query(variant),
                        definition: definition_index,
                        variant: variant_index,
                    });
                }
            }
            entries.sort_by(|a, b| a.normalized.cmp(&b.normalized));
            prefixes.insert(*kind, entries);
        }

        StepInventory {
            steps,
            prefixes,
            revision,
        }
    }

    /// Bumped on every rebuild.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.steps.values().all(|defs| defs.is_empty())
    }

    pub fn len(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    /// All definitions under a verb, in registration order.
    pub fn all(&self, kind: StepKind) -> &[StepDefinition] {
        self.steps.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Finds the definition matching `text`: first matching definition in
    /// registration order, ties broken by the lowest pattern index.
    pub fn lookup(&self, kind: StepKind, text: &str) -> Option<(&StepDefinition, usize)> {
        let text = collapse_whitespace(text.trim());
        for definition in self.all(kind) {
            for (index, pattern) in definition.regex_patterns.iter().enumerate() {
                if pattern.is_match(&text) {
                    return Some((definition, index));
                }
            }
        }
        None
    }

    /// Definitions whose expression variant starts with the normalized
    /// prefix. An empty prefix yields every variant. Results are ordered by
    /// registration, then variant index.
    pub fn candidates(&self, kind: StepKind, prefix: &str) -> Vec<Candidate<'_>> {
        let definitions = self.all(kind);
        let Some(entries) = self.prefixes.get(&kind) else {
            return Vec::new();
        };

        let normalized = normalize_query(prefix);
        let mut hits: Vec<(usize, usize)> = if normalized.is_empty() {
            entries
                .iter()
                .map(|entry| (entry.definition, entry.variant))
                .collect()
        } else {
            let start = entries.partition_point(|entry| entry.normalized < normalized);
            entries[start..]
                .iter()
                .take_while(|entry| entry.normalized.starts_with(&normalized))
                .map(|entry| (entry.definition, entry.variant))
                .collect()
        };

        hits.sort_unstable();
        hits.into_iter()
            .map(|(definition, variant)| Candidate {
                definition: &definitions[definition],
                variant,
            })
            .collect()
    }
}
