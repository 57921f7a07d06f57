//! Rule persistence: a library directory of detection records and a chain
//! file holding the ordered rules with their actions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::action::ActionList;
use crate::detector::MatchDefaults;
use crate::error::{RecordError, StoreError};
use crate::logger;
use crate::record::{actions_from_records, actions_to_records, ActionRecord, RuleRecord};
use crate::rule::{Rule, RuleChain};

/// All `*.json` files directly inside `dir`, sorted by name.
pub fn list_records(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut results: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            path.is_file() && !name.starts_with('.') && path.extension().is_some_and(|e| e == "json")
        })
        .collect();
    results.sort();
    results
}

/// Rule name from its file: rules/collect.json -> collect
pub fn record_name(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Json { path: path.to_path_buf(), source })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| StoreError::Json { path: path.to_path_buf(), source })?;
    std::fs::write(path, json).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

pub fn load_record(path: &Path) -> Result<RuleRecord, StoreError> {
    read_json(path)
}

/// Write `record` as `<dir>/<name>.json`.
pub fn save_record(dir: &Path, name: &str, record: &RuleRecord) -> Result<PathBuf, StoreError> {
    let path = dir.join(format!("{}.json", name));
    write_json(&path, record)?;
    Ok(path)
}

/// A saved detection condition that can be added to the chain.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub name: String,
    pub record: RuleRecord,
}

impl LibraryEntry {
    /// New rule for this entry, with no actions yet.
    pub fn to_rule(&self, defaults: &MatchDefaults) -> Result<Rule, StoreError> {
        let spec = self.record.to_spec().map_err(|source| self.invalid(source))?;
        Rule::new(&self.name, spec, ActionList::new(), defaults).map_err(|source| self.invalid(source))
    }

    fn invalid(&self, source: RecordError) -> StoreError {
        StoreError::Record { name: self.name.clone(), source }
    }
}

/// Every readable record in `dir`. Unreadable files are logged and skipped.
pub fn load_library(dir: &Path) -> Vec<LibraryEntry> {
    list_records(dir)
        .into_iter()
        .filter_map(|path| match load_record(&path) {
            Ok(record) => Some(LibraryEntry { name: record_name(&path), record }),
            Err(e) => {
                logger::warn(&e.to_string());
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub detector: RuleRecord,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

impl ChainEntry {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            name: rule.name.clone(),
            detector: RuleRecord::from_spec(&rule.spec),
            actions: actions_to_records(&rule.actions),
        }
    }

    pub fn to_rule(&self, defaults: &MatchDefaults) -> Result<Rule, RecordError> {
        let spec = self.detector.to_spec()?;
        let actions = actions_from_records(&self.actions)?;
        Rule::new(&self.name, spec, actions, defaults)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainFile {
    pub rules: Vec<ChainEntry>,
}

/// Load the rule chain. A missing file is an empty chain; entries that fail
/// validation are logged and skipped.
pub fn load_chain(path: &Path, defaults: &MatchDefaults) -> Result<RuleChain, StoreError> {
    if !path.exists() {
        return Ok(RuleChain::new());
    }
    let file: ChainFile = read_json(path)?;
    let mut chain = RuleChain::new();
    for entry in &file.rules {
        match entry.to_rule(defaults) {
            Ok(rule) => chain.add(rule),
            Err(e) => logger::warn(&format!("skipping rule '{}': {}", entry.name, e)),
        }
    }
    logger::info(&format!("loaded {} rule(s) from {}", chain.len(), path.display()));
    Ok(chain)
}

pub fn save_chain(path: &Path, chain: &RuleChain) -> Result<(), StoreError> {
    let file = ChainFile { rules: chain.iter().map(ChainEntry::from_rule).collect() };
    write_json(path, &file)
}
