//! Abort macros in non-test code.

use super::{compile, read_text, CheckId, Finding, ModuleTree, ValidationReport};
use crate::errors::Result;
use std::path::Path;

pub(crate) fn check(modules: &ModuleTree<'_>, report: &mut ValidationReport) -> Result<()> {
    let abort = compile(r"\b(?:panic|todo|unimplemented)!")?;
    let mut hits = Vec::new();

    for file in modules.rust_sources() {
        let shown = modules.display(&file);
        if in_tests_dir(Path::new(&shown)) {
            continue;
        }
        let text = read_text(&file)?;
        let lines: Vec<&str> = text.lines().collect();
        let gated = cfg_test_lines(&lines);

        for (index, line) in lines.iter().enumerate() {
            if gated[index] || line.trim_start().starts_with("//") {
                continue;
            }
            if abort.is_match(line) {
                hits.push(format!("{shown}:{}:{line}", index + 1));
            }
        }
    }

    if !hits.is_empty() {
        for hit in hits.into_iter().take(modules.config().max_abort_matches) {
            report.line(hit);
        }
        report.record(&Finding::warning(
            CheckId::AbortMacros,
            "Found panic!/todo!/unimplemented! macros in non-test code",
        ));
    }

    Ok(())
}

fn in_tests_dir(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "tests")
}

const TEST_GATE: &str = "#[cfg(test)]";

/// Marks the lines belonging to items gated by `#[cfg(test)]`.
///
/// The gated item runs from the first line after the gate (and any further
/// attributes) until its braces balance, or until a `;` when the item has
/// no body. A file-level `#![cfg(test)]` gates every line.
fn cfg_test_lines(lines: &[&str]) -> Vec<bool> {
    if lines.iter().any(|l| l.trim_start().starts_with("#![cfg(test)]")) {
        return vec![true; lines.len()];
    }

    let mut gated = vec![false; lines.len()];
    let mut i = 0;
    while i < lines.len() {
        let Some(rest) = lines[i].trim_start().strip_prefix(TEST_GATE) else {
            i += 1;
            continue;
        };
        if rest.trim().is_empty() {
            gated[i] = true;
            i += 1;
            while i < lines.len() && (lines[i].trim().is_empty() || lines[i].trim_start().starts_with("#[")) {
                gated[i] = true;
                i += 1;
            }
        }

        let mut depth = 0i64;
        let mut opened = false;
        while i < lines.len() {
            let line = lines[i];
            gated[i] = true;
            i += 1;
            for c in line.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if (opened && depth <= 0) || (!opened && line.trim_end().ends_with(';')) {
                break;
            }
        }
    }
    gated
}
