//! SQL assembled with `format!`.

use super::{compile, read_text, CheckId, Finding, ModuleTree, ValidationReport};
use crate::errors::Result;

pub(crate) fn check(modules: &ModuleTree<'_>, report: &mut ValidationReport) -> Result<()> {
    let config = modules.config();
    let formatted_sql = compile(r#"format!\s*\(\s*"[^"]*(?:SELECT|INSERT|UPDATE|DELETE)"#)?;

    for file in modules.rust_sources() {
        let text = read_text(&file)?;
        let hits: Vec<String> = text
            .lines()
            .enumerate()
            .filter(|(_, line)| formatted_sql.is_match(line))
            .filter(|(_, line)| !config.safe_sql_markers.iter().any(|m| line.contains(m.as_str())))
            .map(|(index, line)| format!("{}:{line}", index + 1))
            .collect();

        if hits.is_empty() {
            continue;
        }
        for hit in hits.into_iter().take(config.max_sql_matches) {
            report.line(hit);
        }
        report.record(&Finding::warning(
            CheckId::UnsafeSql,
            format!("Possible unparameterized SQL in {}", modules.display(&file)),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::testing::ModuleTreeFixture;
    use pretty_assertions::assert_eq;

    fn run(fixture: &ModuleTreeFixture) -> ValidationReport {
        let tree = fixture.tree();
        let config = ValidationConfig::default();
        let modules = ModuleTree::scan(&tree, &config).unwrap();
        let mut report = ValidationReport::new();
        check(&modules, &mut report).unwrap();
        report
    }

    #[test]
    fn test_formatted_select_warns_once_per_file() {
        let fixture = ModuleTreeFixture::new();
        fixture.write(
            "erp_core/src/repo.rs",
            "fn q(t: &str) -> String {\n    format!(\"SELECT * FROM {t}\")\n}\nfn d(t: &str) -> String {\n    format!(\"DELETE FROM {t}\")\n}\n",
        );

        let report = run(&fixture);
        assert_eq!(report.warnings(), 1);
        assert_eq!(
            report.lines(),
            [
                "2:    format!(\"SELECT * FROM {t}\")".to_string(),
                "5:    format!(\"DELETE FROM {t}\")".to_string(),
                "WARNING: Possible unparameterized SQL in erp_core/src/repo.rs".to_string(),
            ]
        );
    }

    #[test]
    fn test_safe_markers_suppress() {
        let fixture = ModuleTreeFixture::new();
        fixture.write(
            "modules/crm/src/db.rs",
            "let q = sqlx::query(&format!(\"SELECT * FROM {t} WHERE id = $1\")).bind(id);\n",
        );
        assert_eq!(run(&fixture).warnings(), 0);
    }

    #[test]
    fn test_printed_matches_are_capped() {
        let fixture = ModuleTreeFixture::new();
        let body: String = (0..6).map(|i| format!("format!(\"UPDATE t{i} SET x = 1\");\n")).collect();
        fixture.write("modules/crm/src/bulk.rs", &body);

        let report = run(&fixture);
        assert_eq!(report.lines().len(), 4);
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn test_plain_strings_are_fine() {
        let fixture = ModuleTreeFixture::new();
        fixture.write("erp_core/src/repo.rs", "const Q: &str = \"SELECT 1\";\n");
        assert_eq!(run(&fixture).warnings(), 0);
    }
}
