//! Minimal INI-style document reader and writer.
//!
//! Covers exactly what the per-guild config files need: named sections with
//! `key = value` entries in file order, blank lines, and `;`/`#` comment
//! lines. Parsing is tolerant: a line that is neither a section header nor
//! a key/value pair is skipped, so a hand-edited file never fails wholesale.
//! Values keep everything after the first `=`, which lets message templates
//! contain `=`, `#` and `;` freely.

/// One `[name]` section with its entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Append a `key = value` entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Value for `key`; with duplicates the last one wins, matching common
    /// INI semantics.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get), but treats an empty value as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

/// An ordered list of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    pub sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tolerantly. Keys and values are trimmed; entries appearing
    /// before the first section header are dropped.
    pub fn parse(input: &str) -> Self {
        let mut doc = Self::new();
        for raw in input.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim().to_string();
                doc.sections.push(IniSection::new(name));
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if let Some(section) = doc.sections.last_mut() {
                    section.set(key.trim(), value.trim());
                }
            }
        }
        doc
    }

    /// Render as `[section]` blocks separated by blank lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    /// First section with the given name.
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Start a new section and return it for population.
    pub fn push_section(&mut self, name: impl Into<String>) -> &mut IniSection {
        self.sections.push(IniSection::new(name));
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }
}
