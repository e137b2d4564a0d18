//! Duplicate record ids within a module.

use super::{compile, read_text, CheckId, Finding, ModuleTree, ValidationReport};
use crate::errors::Result;
use std::collections::BTreeMap;

pub(crate) fn check(modules: &ModuleTree<'_>, report: &mut ValidationReport) -> Result<()> {
    let id_attr = compile(r#"\bid="([^"]*)""#)?;

    for module in modules.modules() {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for file in modules.files_with_extension(module, "xml") {
            let text = read_text(&file)?;
            for capture in id_attr.captures_iter(&text) {
                *seen.entry(capture[1].to_string()).or_default() += 1;
            }
        }

        let duplicated: Vec<&str> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| id.as_str())
            .collect();
        if !duplicated.is_empty() {
            let name = module
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            report.record(&Finding::warning(
                CheckId::DuplicateIds,
                format!("Duplicate record IDs in {name}: {}", duplicated.join(", ")),
            ));
        }
    }

    Ok(())
}
