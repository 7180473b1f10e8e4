//! PLU (Price Look-Up) catalog.
//!
//! Loaded once at startup from a newline-delimited file and never mutated
//! again. Order matters: it fixes the left-to-right column order of PLU
//! totals in the output file, so this is a `Vec` with a side `HashSet` index
//! for membership tests, not a `HashMap` -- insertion order in a hash map is
//! an implementation detail we don't get to rely on.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct PluCatalog {
    names: Vec<String>,
    index: HashSet<String>,
}

impl PluCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading PLU catalog at {}", path.display()))?;
        Ok(Self::from_lines(text.lines()))
    }

    #[cfg(test)]
    pub fn load_from_str(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    fn from_lines<'a, I: Iterator<Item = &'a str>>(lines: I) -> Self {
        let mut names = Vec::new();
        let mut index = HashSet::new();
        for line in lines {
            let name = title_case(line.trim());
            if name.is_empty() {
                continue;
            }
            if index.insert(name.clone()) {
                names.push(name);
            }
        }
        PluCatalog { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of `name` (already title-cased) in catalog order, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        if !self.index.contains(name) {
            return None;
        }
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }
}

/// Normalizes a raw PLU key to the catalog's case convention: `"COFFEE"` and
/// `"coffee"` and `"Coffee"` all resolve to `"Coffee"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = true;
    for ch in s.chars() {
        if ch.is_whitespace() {
            capitalize_next = true;
            out.push(ch);
            continue;
        }
        if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out.trim().to_string()
}
