//! Tolerant INI parsing matching the legacy Python `ConfigParser` rules the
//! main config and drop-in files were always written for (§4.1): quoted
//! values, `key = value` and `key: value`, and continuation lines. This is
//! purpose-built rather than built on a general INI crate because the
//! continuation-line and commented-continuation semantics aren't expressible
//! through a stock parser's public API -- see DESIGN.md.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// One `[section]` block, preserving insertion order of its keys.
#[derive(Debug, Clone, Default)]
pub struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn set(&mut self, key: String, value: String) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }
}

/// A fully parsed document: an ordered list of sections plus a lookup index.
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    /// Names of all sections other than `global`/`defaults`, in file order.
    pub fn source_section_names(&self) -> Vec<&str> {
        self.sections
            .iter()
            .map(|s| s.name.as_str())
            .filter(|n| !n.eq_ignore_ascii_case("global") && !n.eq_ignore_ascii_case("defaults"))
            .collect()
    }

    fn section_mut(&mut self, name: &str) -> &mut IniSection {
        if let Some(idx) = self.sections.iter().position(|s| s.name.eq_ignore_ascii_case(name)) {
            &mut self.sections[idx]
        } else {
            self.sections.push(IniSection {
                name: name.to_string(),
                entries: Vec::new(),
            });
            self.sections.last_mut().expect("just pushed")
        }
    }
}

/// Parses the contents of one INI file. Warnings (dropped commented
/// continuations, malformed lines) are returned alongside the document
/// rather than logged directly, so callers can attribute them to a config
/// name via `tracing`.
pub fn parse_str(contents: &str) -> (IniDocument, Vec<String>) {
    let mut doc = IniDocument::default();
    let mut warnings = Vec::new();
    let mut current_section = "global".to_string();
    let mut last_key: Option<String> = None;

    for raw_line in contents.lines() {
        if let Some(key) = &last_key {
            if raw_line.starts_with(' ') || raw_line.starts_with('\t') {
                let trimmed = raw_line.trim();
                if trimmed.starts_with('#') || trimmed.starts_with(';') {
                    warnings.push(format!(
                        "[{current_section}] dropped commented continuation under {key:?}: {trimmed}"
                    ));
                } else if !trimmed.is_empty() {
                    let section = doc.section_mut(&current_section);
                    let joined = format!("{}\n{}", section.get(key).unwrap_or(""), trimmed);
                    section.set(key.clone(), joined);
                }
                continue;
            }
        }
        last_key = None;

        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[') {
            if let Some(name) = stripped.strip_suffix(']') {
                current_section = name.trim().to_string();
                doc.section_mut(&current_section);
                continue;
            }
        }
        match split_key_value(line) {
            Some((key, value)) => {
                let value = strip_matching_quotes(value.trim());
                doc.section_mut(&current_section).set(key.to_string(), value);
                last_key = Some(key.to_string());
            }
            None => warnings.push(format!("[{current_section}] ignoring malformed line: {line:?}")),
        }
    }

    (doc, warnings)
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(['=', ':'])?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, &line[idx + 1..]))
}

/// Strips one layer of matching single or double quotes, only when both
/// ends carry the same quote character and it doesn't reappear inside.
fn strip_matching_quotes(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            let inner = &value[1..value.len() - 1];
            if !inner.contains(first as char) {
                return inner.to_string();
            }
        }
    }
    value.to_string()
}

/// Reads and parses a single file, mapping I/O failure to `ConfigError::Io`.
/// Parse warnings are returned for the caller to log against this path.
pub fn parse_file(path: &Path) -> Result<(IniDocument, Vec<String>), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_str(&contents))
}

/// Lists `*.conf` files in a drop-in directory, dotfiles excluded, sorted for
/// deterministic layering order.
pub fn drop_in_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| !name.starts_with('.') && name.ends_with(".conf"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_key_value_pairs() {
        let (doc, warnings) = parse_str(
            "[esx-1]\ntype = esx\nserver = esx.example.com\n",
        );
        assert!(warnings.is_empty());
        let section = doc.section("esx-1").unwrap();
        assert_eq!(section.get("type"), Some("esx"));
        assert_eq!(section.get("server"), Some("esx.example.com"));
    }

    #[test]
    fn strips_matching_quotes_only() {
        assert_eq!(strip_matching_quotes("\"hello\""), "hello");
        assert_eq!(strip_matching_quotes("'hello'"), "hello");
        assert_eq!(strip_matching_quotes("\"mismatched'"), "\"mismatched'");
        assert_eq!(strip_matching_quotes("no quotes"), "no quotes");
    }

    #[test]
    fn joins_continuation_lines() {
        let (doc, warnings) = parse_str("[esx-1]\nfilter_hosts = aaa\n bbb\n ccc\n");
        assert!(warnings.is_empty());
        let value = doc.section("esx-1").unwrap().get("filter_hosts").unwrap();
        assert_eq!(value, "aaa\nbbb\nccc");
    }

    #[test]
    fn commented_continuation_is_dropped_with_warning() {
        let (doc, warnings) = parse_str("[esx-1]\nfilter_hosts = aaa\n # not part of the value\n");
        assert_eq!(warnings.len(), 1);
        let value = doc.section("esx-1").unwrap().get("filter_hosts").unwrap();
        assert_eq!(value, "aaa");
    }

    #[test]
    fn colon_separator_is_accepted() {
        let (doc, _) = parse_str("[esx-1]\ntype: esx\n");
        assert_eq!(doc.section("esx-1").unwrap().get("type"), Some("esx"));
    }
}
