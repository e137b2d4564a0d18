//! Manifest structure and declared data files.

use super::{compile, read_text, CheckId, Finding, ModuleTree, ValidationReport};
use crate::errors::Result;

pub(crate) fn check(modules: &ModuleTree<'_>, report: &mut ValidationReport) -> Result<()> {
    let config = modules.config();
    let section = compile(&format!(r"(?m)^\[{}\]", regex::escape(&config.manifest_section)))?;
    let name_key = compile(&format!(r"(?m)^\s*{}\s*=", regex::escape(&config.manifest_name_key)))?;
    let references = config
        .data_extensions
        .iter()
        .map(|ext| compile(&format!(r#""([^"]+\.{})""#, regex::escape(ext))))
        .collect::<Result<Vec<_>>>()?;

    for module in modules.modules() {
        let path = module.join(&config.manifest_file);
        if !path.is_file() {
            continue;
        }
        let shown = modules.display(&path);
        let text = read_text(&path)?;

        if !section.is_match(&text) {
            report.record(&Finding::error(
                CheckId::Manifest,
                format!("{shown} missing [{}] section", config.manifest_section),
            ));
        }
        if !name_key.is_match(&text) {
            report.record(&Finding::error(
                CheckId::Manifest,
                format!("{shown} missing '{}' key", config.manifest_name_key),
            ));
        }

        for pattern in &references {
            for capture in pattern.captures_iter(&text) {
                let declared = &capture[1];
                if !module.join(declared).is_file() {
                    report.record(&Finding::error(
                        CheckId::Manifest,
                        format!("{shown} declares '{declared}' but file not found"),
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::testing::ModuleTreeFixture;

    fn run(fixture: &ModuleTreeFixture) -> ValidationReport {
        let tree = fixture.tree();
        let config = ValidationConfig::default();
        let modules = ModuleTree::scan(&tree, &config).unwrap();
        let mut report = ValidationReport::new();
        check(&modules, &mut report).unwrap();
        report
    }

    #[test]
    fn test_valid_manifest() {
        let fixture = ModuleTreeFixture::new();
        fixture.write(
            "modules/crm/manifest.toml",
            "[module]\nname = \"crm\"\ndata = [\"data/partners.xml\", \"data/tags.csv\"]\n",
        );
        fixture.write("modules/crm/data/partners.xml", "<data/>");
        fixture.write("modules/crm/data/tags.csv", "id,name\n");

        assert_eq!(run(&fixture).errors(), 0);
    }

    #[test]
    fn test_missing_section() {
        let fixture = ModuleTreeFixture::new();
        fixture.write("modules/crm/manifest.toml", "name = \"crm\"\n");

        let report = run(&fixture);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.lines()[0], "ERROR: modules/crm/manifest.toml missing [module] section");
    }

    #[test]
    fn test_indented_section_is_not_a_section() {
        let fixture = ModuleTreeFixture::new();
        fixture.write("modules/crm/manifest.toml", "  [module]\nname = \"crm\"\n");
        assert_eq!(run(&fixture).errors(), 1);
    }

    #[test]
    fn test_key_suffix_is_not_name() {
        let fixture = ModuleTreeFixture::new();
        fixture.write("modules/crm/manifest.toml", "[module]\ndisplay_name = \"CRM\"\n");
        assert_eq!(run(&fixture).errors(), 1);
    }

    #[test]
    fn test_each_missing_data_file_is_an_error() {
        let fixture = ModuleTreeFixture::new();
        fixture.write(
            "modules/crm/manifest.toml",
            "[module]\nname = \"crm\"\ndata = [\"data/a.xml\", \"data/b.csv\"]\n",
        );

        let report = run(&fixture);
        assert_eq!(report.errors(), 2);
        assert_eq!(
            report.lines()[0],
            "ERROR: modules/crm/manifest.toml declares 'data/a.xml' but file not found"
        );
        assert_eq!(
            report.lines()[1],
            "ERROR: modules/crm/manifest.toml declares 'data/b.csv' but file not found"
        );
    }

    #[test]
    fn test_module_without_manifest_is_skipped() {
        let fixture = ModuleTreeFixture::new();
        fixture.write("modules/scratch/README.md", "notes\n");
        assert_eq!(run(&fixture).errors(), 0);
    }
}
