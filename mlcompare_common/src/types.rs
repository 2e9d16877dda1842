use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Language strings keyed by string identifier, always sorted by key
pub type StringTable = BTreeMap<String, String>;

/// Kind of component a language file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Core,
    Block,
    Mod,
    Enrol,
    Repository,
    Report,
    Auth,
    /// The pair was given explicitly and never went through path matching
    Unknown,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Core => "core",
            PluginType::Block => "block",
            PluginType::Mod => "mod",
            PluginType::Enrol => "enrol",
            PluginType::Repository => "repository",
            PluginType::Report => "report",
            PluginType::Auth => "auth",
            PluginType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An upstream language file paired with the customization that overrides it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub upstream: PathBuf,
    pub custom: PathBuf,
    pub plugin_type: PluginType,
}

impl MatchedPair {
    pub fn new(upstream: PathBuf, custom: PathBuf, plugin_type: PluginType) -> Self {
        Self {
            upstream,
            custom,
            plugin_type,
        }
    }
}

/// How often a word or phrase was removed from or added to upstream text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub delete_count: usize,
    pub insert_count: usize,
}

impl TokenCounts {
    pub fn total(&self) -> usize {
        self.delete_count + self.insert_count
    }
}

/// Per-token delete/insert tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsTable(BTreeMap<String, TokenCounts>);

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delete(&mut self, token: &str) {
        self.0.entry(token.to_string()).or_default().delete_count += 1;
    }

    pub fn record_insert(&mut self, token: &str) {
        self.0.entry(token.to_string()).or_default().insert_count += 1;
    }

    /// Add every count in `other` to this table
    pub fn merge(&mut self, other: &StatsTable) {
        for (token, counts) in &other.0 {
            let entry = self.0.entry(token.clone()).or_default();
            entry.delete_count += counts.delete_count;
            entry.insert_count += counts.insert_count;
        }
    }

    /// Tokens seen at least `min_occurrences` times in total.
    ///
    /// Display filter only; the stored counts are left untouched.
    pub fn filtered(&self, min_occurrences: usize) -> Vec<(&str, TokenCounts)> {
        self.0
            .iter()
            .filter(|(_, counts)| counts.total() >= min_occurrences)
            .map(|(token, counts)| (token.as_str(), *counts))
            .collect()
    }

    pub fn get(&self, token: &str) -> Option<TokenCounts> {
        self.0.get(token).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenCounts)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Both string tables of one matched pair plus everything derived from them.
///
/// Paths and tables are fixed at construction. Unused keys are computed on
/// first access and cached; diffs and stats start empty and are filled in by
/// the comparison service.
#[derive(Debug, Clone)]
pub struct LangRecord {
    upstream_path: PathBuf,
    custom_path: PathBuf,
    plugin_type: PluginType,
    upstream_strings: StringTable,
    custom_strings: StringTable,
    unused_keys: OnceCell<BTreeSet<String>>,
    diffs: BTreeMap<String, String>,
    stats: StatsTable,
}

impl LangRecord {
    pub fn new(
        pair: MatchedPair,
        upstream_strings: StringTable,
        custom_strings: StringTable,
    ) -> Self {
        Self {
            upstream_path: pair.upstream,
            custom_path: pair.custom,
            plugin_type: pair.plugin_type,
            upstream_strings,
            custom_strings,
            unused_keys: OnceCell::new(),
            diffs: BTreeMap::new(),
            stats: StatsTable::new(),
        }
    }

    pub fn upstream_path(&self) -> &Path {
        &self.upstream_path
    }

    pub fn custom_path(&self) -> &Path {
        &self.custom_path
    }

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn upstream_strings(&self) -> &StringTable {
        &self.upstream_strings
    }

    pub fn custom_strings(&self) -> &StringTable {
        &self.custom_strings
    }

    /// Custom keys that no longer exist upstream
    pub fn unused_keys(&self) -> &BTreeSet<String> {
        self.unused_keys.get_or_init(|| {
            self.custom_strings
                .keys()
                .filter(|key| !self.upstream_strings.contains_key(*key))
                .cloned()
                .collect()
        })
    }

    /// Custom keys that still have an upstream counterpart, in key order
    pub fn used_keys(&self) -> Vec<&str> {
        let unused = self.unused_keys();
        self.custom_strings
            .keys()
            .filter(|key| !unused.contains(*key))
            .map(String::as_str)
            .collect()
    }

    /// True when every customization in this file is orphaned
    pub fn is_fully_orphaned(&self) -> bool {
        self.unused_keys().len() == self.custom_strings.len()
    }

    pub fn diffs(&self) -> &BTreeMap<String, String> {
        &self.diffs
    }

    pub fn set_diffs(&mut self, diffs: BTreeMap<String, String>) {
        self.diffs = diffs;
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    pub fn set_stats(&mut self, stats: StatsTable) {
        self.stats = stats;
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ignore patterns applied when scanning a customization directory
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Minimum combined occurrences before a token is shown in stats output
    #[serde(default = "default_occurrence_threshold")]
    pub occurrence_threshold: usize,

    /// Render word diffs for every used key
    #[serde(default)]
    pub show_diff: bool,

    /// Collect deleted/inserted word statistics
    #[serde(default)]
    pub show_stats: bool,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

fn default_occurrence_threshold() -> usize {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            occurrence_threshold: default_occurrence_threshold(),
            show_diff: false,
            show_stats: false,
            portable_mode: false,
        }
    }
}
