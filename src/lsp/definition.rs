//! Go-to-definition: step implementations and payload file arguments.

use std::path::Path;

use tower_lsp::lsp_types::{LocationLink, Position, Range, Url};

use crate::inventory::StepInventory;
use crate::model::StepKind;

use super::scanner::{quoted_regions, step_parts};

/// Subdirectory of the workspace holding request payload files.
const REQUESTS_DIR: &str = "features/requests";

fn zero_range() -> Range {
    Range::default()
}

/// Location of the implementation for the step on the cursor line.
pub fn step_definition_link(
    inventory: &StepInventory,
    kind: StepKind,
    line: &str,
    position: Position,
) -> Option<LocationLink> {
    let (_, expression) = step_parts(line);
    let (definition, _) = inventory.lookup(kind, &expression?)?;
    let location = definition.source_location.as_ref()?;

    let target_uri = Url::from_file_path(&location.path).ok()?;
    let target_line = location.line.saturating_sub(1);
    let target_range = Range {
        start: Position {
            line: target_line,
            character: 0,
        },
        end: Position {
            line: target_line,
            character: 0,
        },
    };

    let indent = (line.len() - line.trim_start().len()) as u32;
    Some(LocationLink {
        origin_selection_range: Some(Range {
            start: Position {
                line: position.line,
                character: indent,
            },
            end: Position {
                line: position.line,
                character: line.trim_end().chars().count() as u32,
            },
        }),
        target_uri,
        target_range,
        target_selection_range: target_range,
    })
}

/// Locations for quoted arguments naming files under `features/requests/`.
///
/// Only the argument under the cursor produces a link, and only when the file
/// actually exists.
pub fn payload_links(root: &Path, line: &str, position: Position) -> Vec<LocationLink> {
    let character = position.character as usize;
    let mut links = Vec::new();

    for region in quoted_regions(line) {
        if character < region.start || character > region.end {
            continue;
        }
        let value: String = line
            .chars()
            .skip(region.start)
            .take(region.end - region.start)
            .collect();
        if value.is_empty() {
            continue;
        }

        let payload_file = root.join(REQUESTS_DIR).join(&value);
        if !payload_file.exists() {
            continue;
        }
        let Ok(target_uri) = Url::from_file_path(&payload_file) else {
            continue;
        };

        links.push(LocationLink {
            origin_selection_range: Some(Range {
                start: Position {
                    line: position.line,
                    character: region.start as u32,
                },
                end: Position {
                    line: position.line,
                    character: region.end as u32,
                },
            }),
            target_uri,
            target_range: zero_range(),
            target_selection_range: zero_range(),
        });
    }

    links
}
