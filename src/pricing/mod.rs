mod builtin;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;

use crate::cost::{PricingEntry, PricingMap};

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("failed to read pricing file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pricing file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("model {0:?} is listed more than once")]
    Duplicate(String),
    #[error("model {name:?} has a negative or non-finite price")]
    InvalidPrice { name: String },
    #[error("pricing table is empty")]
    Empty,
}

/// Ordered model -> price table. Loaded once at startup and never mutated.
pub struct PricingTable {
    revision: String,
    entries: Vec<(String, PricingEntry)>,
    index: HashMap<String, usize>,
    warned: Mutex<HashSet<String>>,
}

impl PricingMap for PricingTable {
    fn get(&self, model: &str) -> Option<&PricingEntry> {
        self.index.get(model).map(|&i| &self.entries[i].1)
    }

    // Once per model; a page of records would otherwise repeat it per row.
    fn report_missing(&self, model: &str) {
        let mut warned = match self.warned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if warned.insert(model.to_string()) {
            tracing::warn!(model, "no pricing entry for model, costs shown as zero");
        }
    }
}

#[derive(Deserialize)]
struct PricingFile {
    revision: String,
    models: Vec<PricingFileEntry>,
}

#[derive(Deserialize)]
struct PricingFileEntry {
    name: String,
    input: f64,
    output: f64,
}

impl PricingTable {
    pub fn builtin() -> Self {
        let mut table = Self::empty(builtin::REVISION);
        for &(name, input, output) in builtin::MODELS {
            table.push(name.to_string(), PricingEntry { input, output });
        }
        table
    }

    fn push(&mut self, name: String, entry: PricingEntry) {
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, entry));
    }

    fn empty(revision: &str) -> Self {
        Self {
            revision: revision.to_string(),
            entries: Vec::new(),
            index: HashMap::new(),
            warned: Mutex::new(HashSet::new()),
        }
    }

    fn from_entries(
        revision: String,
        entries: impl IntoIterator<Item = (String, PricingEntry)>,
    ) -> Result<Self, PricingError> {
        let mut table = Self::empty(&revision);
        for (name, entry) in entries {
            if !(entry.input.is_finite() && entry.output.is_finite())
                || entry.input < 0.0
                || entry.output < 0.0
            {
                return Err(PricingError::InvalidPrice { name });
            }
            if table.index.contains_key(&name) {
                return Err(PricingError::Duplicate(name));
            }
            table.push(name, entry);
        }
        if table.entries.is_empty() {
            return Err(PricingError::Empty);
        }
        Ok(table)
    }

    /// Parse a pricing file:
    ///
    /// ```toml
    /// revision = "2025-06"
    ///
    /// [[models]]
    /// name = "Claude 3.5 Sonnet"
    /// input = 0.003
    /// output = 0.015
    /// ```
    pub fn from_toml_str(data: &str, path: &Path) -> Result<Self, PricingError> {
        let file: PricingFile = toml::from_str(data).map_err(|source| PricingError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_entries(
            file.revision,
            file.models.into_iter().map(|m| {
                (
                    m.name,
                    PricingEntry {
                        input: m.input,
                        output: m.output,
                    },
                )
            }),
        )
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.index.contains_key(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PricingEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// The model `step` places away from `current` in table order, wrapping.
    /// An unknown `current` starts from the first entry.
    pub fn neighbour(&self, current: &str, step: isize) -> Option<&str> {
        let (first, _) = self.entries.first()?;
        let Some(&pos) = self.index.get(current) else {
            return Some(first);
        };
        let len = self.entries.len() as isize;
        let next = (pos as isize + step).rem_euclid(len) as usize;
        Some(&self.entries[next].0)
    }
}

/// The built-in table, or the table from `custom` when configured.
pub fn load_pricing(custom: Option<&Path>) -> Result<PricingTable, PricingError> {
    let Some(path) = custom else {
        return Ok(PricingTable::builtin());
    };
    let data = fs::read_to_string(path).map_err(|source| PricingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = PricingTable::from_toml_str(&data, path)?;
    tracing::debug!(
        path = %path.display(),
        revision = table.revision(),
        models = table.len(),
        "loaded custom pricing"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        let mut seen = HashSet::new();
        for (name, _, _) in builtin::MODELS {
            assert!(seen.insert(*name), "duplicate model {name}");
        }
        assert_eq!(PricingTable::builtin().len(), builtin::MODELS.len());
    }

    #[test]
    fn builtin_keeps_picker_order() {
        let table = PricingTable::builtin();
        let first: Vec<&str> = table.names().take(3).collect();
        assert_eq!(first, vec!["GPT-4o", "GPT-4o mini", "GPT-3.5 Turbo"]);
        assert_eq!(table.revision(), "2025-01");
    }

    #[test]
    fn builtin_prices_match_published_table() {
        let table = PricingTable::builtin();
        assert_eq!(
            table.get("Claude 3.5 Sonnet"),
            Some(&PricingEntry {
                input: 0.003,
                output: 0.015
            })
        );
        assert_eq!(
            table.get("Gemini 2.0 Flash"),
            Some(&PricingEntry {
                input: 0.00001315,
                output: 0.0000526
            })
        );
        assert!(table.get("GPT-4").is_none());
    }

    #[test]
    fn neighbour_wraps_both_ways() {
        let table = PricingTable::builtin();
        let last = table.names().last().unwrap().to_string();
        assert_eq!(table.neighbour("GPT-4o", 1), Some("GPT-4o mini"));
        assert_eq!(table.neighbour("GPT-4o", -1), Some(last.as_str()));
        assert_eq!(table.neighbour(&last, 1), Some("GPT-4o"));
        assert_eq!(table.neighbour("no such model", 1), Some("GPT-4o"));
    }

    #[test]
    fn custom_file_replaces_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
revision = "2025-06"

[[models]]
name = "House Model"
input = 0.01
output = 0.02
"#
        )
        .unwrap();

        let table = load_pricing(Some(file.path())).unwrap();
        assert_eq!(table.revision(), "2025-06");
        assert_eq!(table.len(), 1);
        assert!(table.contains("House Model"));
        assert!(!table.contains("GPT-4o"));
    }

    #[test]
    fn custom_file_rejects_duplicates() {
        let data = r#"
revision = "x"
[[models]]
name = "Dup"
input = 0.1
output = 0.1
[[models]]
name = "Dup"
input = 0.2
output = 0.2
"#;
        let err = PricingTable::from_toml_str(data, Path::new("p.toml"))
            .err()
            .unwrap();
        assert!(matches!(err, PricingError::Duplicate(name) if name == "Dup"));
    }

    #[test]
    fn custom_file_rejects_negative_prices() {
        let data = r#"
revision = "x"
[[models]]
name = "Bad"
input = -0.1
output = 0.1
"#;
        let err = PricingTable::from_toml_str(data, Path::new("p.toml"))
            .err()
            .unwrap();
        assert!(matches!(err, PricingError::InvalidPrice { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_pricing(Some(Path::new("/nonexistent/pricing.toml")))
            .err()
            .unwrap();
        assert!(matches!(err, PricingError::Io { .. }));
    }
}
