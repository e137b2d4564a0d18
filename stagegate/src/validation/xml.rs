//! XML well-formedness.

use super::{CheckId, Finding, ModuleTree, ValidationReport};
use crate::errors::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

pub(crate) fn check(modules: &ModuleTree<'_>, report: &mut ValidationReport) -> Result<()> {
    for module in modules.modules() {
        for dir in &modules.config().xml_dirs {
            let dir = module.join(dir);
            if !dir.is_dir() {
                continue;
            }
            let mut files: Vec<_> = std::fs::read_dir(&dir)?
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().and_then(|x| x.to_str()) == Some("xml"))
                .collect();
            files.sort();

            for file in files {
                let bytes = std::fs::read(&file)?;
                if let Err(reason) = check_well_formed(&bytes) {
                    let shown = modules.display(&file);
                    debug!(file = %shown, reason = %reason, "Malformed XML");
                    report.record(&Finding::error(
                        CheckId::XmlWellFormed,
                        format!("{shown} is not well-formed XML"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Checks that `content` is a well-formed XML document.
///
/// Tags must balance and match, there must be exactly one root element,
/// and no text may appear outside the root. Element and attribute names
/// must start with a letter, `_` or `:`. Attributes must be quoted and
/// unique and may not contain `<`. Every entity reference in text or
/// attribute values must be terminated and predefined or numeric.
pub fn check_well_formed(content: &[u8]) -> std::result::Result<(), String> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => {
                open_element(&tag, depth, &mut roots)?;
                depth += 1;
            }
            Ok(Event::Empty(tag)) => open_element(&tag, depth, &mut roots)?,
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "closing tag without opening tag".to_string())?;
            }
            Ok(Event::Text(text)) => {
                if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                    return Err("text outside the root element".to_string());
                }
                text.unescape().map_err(|e| e.to_string())?;
            }
            Ok(Event::CData(_)) if depth == 0 => {
                return Err("CDATA outside the root element".to_string());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(format!("{depth} element(s) left unclosed"));
    }
    if roots == 0 {
        return Err("no root element".to_string());
    }
    Ok(())
}

fn open_element(tag: &BytesStart<'_>, depth: usize, roots: &mut usize) -> std::result::Result<(), String> {
    if depth == 0 {
        *roots += 1;
        if *roots > 1 {
            return Err("more than one root element".to_string());
        }
    }
    check_name(tag.name().as_ref())?;
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        check_name(attribute.key.as_ref())?;
        if attribute.value.contains(&b'<') {
            return Err(format!(
                "'<' in value of attribute '{}'",
                String::from_utf8_lossy(attribute.key.as_ref())
            ));
        }
        attribute.unescape_value().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn check_name(name: &[u8]) -> std::result::Result<(), String> {
    match name.first() {
        Some(&b) if b.is_ascii_alphabetic() || b == b'_' || b == b':' || !b.is_ascii() => Ok(()),
        _ => Err(format!("invalid name '{}'", String::from_utf8_lossy(name))),
    }
}
