use crate::path_matcher::{MatchOutcome, PathMatcher};
use crate::string_loader::load_string_table;
use crate::word_diff::{DiffMode, RenderedDiff, WordDiffEngine};
use mlcompare_common::{LangRecord, MatchedPair, MlCompareError, StatsTable};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which derived data to calculate for each record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    pub show_diff: bool,
    pub show_stats: bool,
}

/// Customization files split by whether an upstream counterpart exists
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub matched: Vec<MatchedPair>,
    /// Files without an upstream counterpart, in input order
    pub skipped: Vec<PathBuf>,
}

/// A pair that matched but could not be loaded
#[derive(Debug, Clone)]
pub struct FailedPair {
    pub pair: MatchedPair,
    pub message: String,
}

/// Outcome of comparing a whole batch of customization files
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<LangRecord>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedPair>,
    /// Sum of every record's stats
    pub global_stats: StatsTable,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Matches customization files to upstream language files and compares them
#[derive(Debug, Clone)]
pub struct ComparisonService {
    matcher: PathMatcher,
}

impl ComparisonService {
    pub fn new(upstream_root: impl Into<PathBuf>) -> Self {
        Self {
            matcher: PathMatcher::new(upstream_root),
        }
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn match_paths(&self, custom_paths: &[PathBuf]) -> MatchResult {
        let mut result = MatchResult::default();

        for custom in custom_paths {
            match self.matcher.match_path(custom) {
                MatchOutcome::Matched(pair) => result.matched.push(pair),
                MatchOutcome::NotFound => result.skipped.push(custom.clone()),
            }
        }

        info!(
            "Matched {} of {} customization files ({} skipped)",
            result.matched.len(),
            custom_paths.len(),
            result.skipped.len()
        );
        result
    }

    /// Load both string tables of a matched pair
    pub fn load_pair(&self, pair: &MatchedPair) -> Result<LangRecord, MlCompareError> {
        if pair.upstream.file_name() != pair.custom.file_name() {
            return Err(MlCompareError::InvalidPair {
                upstream: pair.upstream.clone(),
                custom: pair.custom.clone(),
            });
        }

        let upstream_strings = load_string_table(&pair.upstream)?;
        let custom_strings = load_string_table(&pair.custom)?;

        let record = LangRecord::new(pair.clone(), upstream_strings, custom_strings);
        debug!(
            "Loaded {:?}: {} upstream, {} custom, {} unused",
            record.custom_path(),
            record.upstream_strings().len(),
            record.custom_strings().len(),
            record.unused_keys().len()
        );
        Ok(record)
    }

    /// Render a colour word diff for every used key
    pub fn calculate_diffs(&self, record: &mut LangRecord) {
        if record.is_fully_orphaned() {
            debug!("All customizations in {:?} are unused, no diffs", record.custom_path());
            return;
        }

        let mut engine = WordDiffEngine::new(DiffMode::Colour);
        let mut diffs = BTreeMap::new();

        for key in record.used_keys() {
            let (Some(from), Some(to)) = (
                record.upstream_strings().get(key),
                record.custom_strings().get(key),
            ) else {
                continue;
            };
            if let RenderedDiff::Colour(text) = engine.diff(from, to) {
                diffs.insert(key.to_string(), text);
            }
        }

        record.set_diffs(diffs);
    }

    /// Count deleted and inserted phrases over every used key.
    ///
    /// The table is stored on the record and returned for merging into a
    /// batch-wide tally.
    pub fn calculate_stats(&self, record: &mut LangRecord) -> StatsTable {
        if record.is_fully_orphaned() {
            debug!("All customizations in {:?} are unused, no stats", record.custom_path());
            return StatsTable::new();
        }

        let mut engine = WordDiffEngine::new(DiffMode::Stats);
        let mut stats = StatsTable::new();

        for key in record.used_keys() {
            let (Some(from), Some(to)) = (
                record.upstream_strings().get(key),
                record.custom_strings().get(key),
            ) else {
                continue;
            };
            engine.diff(from, to);
            for token in engine.deletes() {
                stats.record_delete(token);
            }
            for token in engine.inserts() {
                stats.record_insert(token);
            }
            engine.reset();
        }

        record.set_stats(stats.clone());
        stats
    }

    /// Compare one explicitly given pair of files; any failure is returned
    pub fn compare_files(
        &self,
        upstream: &Path,
        custom: &Path,
        options: CompareOptions,
    ) -> Result<LangRecord, MlCompareError> {
        let pair = MatchedPair::new(
            upstream.to_path_buf(),
            custom.to_path_buf(),
            mlcompare_common::PluginType::Unknown,
        );
        let mut record = self.load_pair(&pair)?;
        self.calculate(&mut record, options);
        Ok(record)
    }

    /// Match, load and compare every customization file.
    ///
    /// Skipped files and pairs that fail to load are reported, and the batch
    /// carries on with the remaining pairs.
    pub fn compare_batch(&self, custom_paths: &[PathBuf], options: CompareOptions) -> BatchReport {
        let MatchResult { matched, skipped } = self.match_paths(custom_paths);
        self.compare_pairs(matched, skipped, options)
    }

    /// Compare already matched pairs, carrying `skipped` into the report
    pub fn compare_pairs(
        &self,
        pairs: Vec<MatchedPair>,
        skipped: Vec<PathBuf>,
        options: CompareOptions,
    ) -> BatchReport {
        let mut report = BatchReport {
            skipped,
            ..BatchReport::default()
        };

        for pair in pairs {
            let mut record = match self.load_pair(&pair) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Failed to load {:?}: {}", pair.custom, e);
                    report.failed.push(FailedPair {
                        pair,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(stats) = self.calculate(&mut record, options) {
                report.global_stats.merge(&stats);
            }
            report.records.push(record);
        }

        info!(
            "Compared {} files, {} skipped, {} failed",
            report.records.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    fn calculate(&self, record: &mut LangRecord, options: CompareOptions) -> Option<StatsTable> {
        if options.show_diff {
            self.calculate_diffs(record);
        }
        options.show_stats.then(|| self.calculate_stats(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlcompare_common::{PluginType, TokenCounts};
    use std::fs;
    use tempfile::TempDir;

    struct Install {
        _temp: TempDir,
        root: PathBuf,
        custom: PathBuf,
    }

    impl Install {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().join("moodle").join("lang").join("en");
            let custom = temp.path().join("moodledata").join("lang").join("en_local");
            fs::create_dir_all(&root).unwrap();
            fs::create_dir_all(&custom).unwrap();
            Self {
                _temp: temp,
                root,
                custom,
            }
        }

        fn upstream(&self, name: &str, body: &str) -> PathBuf {
            write_lang(&self.root.join(name), body)
        }

        fn custom(&self, name: &str, body: &str) -> PathBuf {
            write_lang(&self.custom.join(name), body)
        }
    }

    fn write_lang(path: &Path, body: &str) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("<?php\n{body}")).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn test_match_paths_keeps_skipped_order() {
        let install = Install::new();
        install.upstream("moodle.php", "");
        let paths = vec![
            install.custom("zzz.php", ""),
            install.custom("moodle.php", ""),
            install.custom("block_none.php", ""),
            install.custom("aaa.php", ""),
        ];

        let service = ComparisonService::new(&install.root);
        let result = service.match_paths(&paths);

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].plugin_type, PluginType::Core);
        assert_eq!(result.skipped, vec![paths[0].clone(), paths[2].clone(), paths[3].clone()]);
    }

    #[test]
    fn test_load_pair_rejects_different_basenames() {
        let install = Install::new();
        let pair = MatchedPair::new(
            install.upstream("moodle.php", ""),
            install.custom("admin.php", ""),
            PluginType::Core,
        );

        let err = ComparisonService::new(&install.root).load_pair(&pair).unwrap_err();
        assert!(matches!(err, MlCompareError::InvalidPair { .. }));
    }

    #[test]
    fn test_load_pair_missing_file() {
        let install = Install::new();
        let upstream = install.upstream("moodle.php", "");
        let custom = install.custom.join("moodle.php");
        let pair = MatchedPair::new(upstream, custom.clone(), PluginType::Core);

        let err = ComparisonService::new(&install.root).load_pair(&pair).unwrap_err();
        assert!(matches!(err, MlCompareError::FileNotFound(p) if p == custom));
    }

    #[test]
    fn test_calculate_diffs_for_used_keys_only() {
        let install = Install::new();
        install.upstream(
            "moodle.php",
            "$string['course'] = 'Course';\n$string['intro'] = 'Replace Me with something else';\n",
        );
        let custom = install.custom(
            "moodle.php",
            "$string['intro'] = 'with something else';\n$string['gone'] = 'Orphan';\n$string['course'] = 'Course';\n",
        );

        let service = ComparisonService::new(&install.root);
        let pair = match service.matcher().match_path(&custom) {
            MatchOutcome::Matched(pair) => pair,
            MatchOutcome::NotFound => panic!("expected match"),
        };
        let mut record = service.load_pair(&pair).unwrap();
        service.calculate_diffs(&mut record);

        assert_eq!(record.diffs().len(), 2);
        assert_eq!(record.diffs()["course"], "Course");
        assert_eq!(record.diffs()["intro"], "%rReplace Me %wwith something else");
        assert!(!record.diffs().contains_key("gone"));
    }

    #[test]
    fn test_fully_orphaned_record_short_circuits() {
        let install = Install::new();
        let upstream = install.upstream("moodle.php", "$string['a'] = 'A';\n");
        let custom = install.custom("moodle.php", "$string['x'] = 'X';\n$string['y'] = 'Y';\n");

        let service = ComparisonService::new(&install.root);
        let mut record = service
            .load_pair(&MatchedPair::new(upstream, custom, PluginType::Core))
            .unwrap();

        service.calculate_diffs(&mut record);
        let stats = service.calculate_stats(&mut record);

        assert_eq!(record.unused_keys().len(), 2);
        assert!(record.diffs().is_empty());
        assert!(record.stats().is_empty());
        assert!(stats.is_empty());
    }

    #[test]
    fn test_calculate_stats_counts_tokens_per_key() {
        let install = Install::new();
        let upstream = install.upstream(
            "moodle.php",
            "$string['a'] = 'Course name';\n$string['b'] = 'Course code';\n",
        );
        let custom = install.custom(
            "moodle.php",
            "$string['a'] = 'Module name';\n$string['b'] = 'Module code';\n",
        );

        let service = ComparisonService::new(&install.root);
        let mut record = service
            .load_pair(&MatchedPair::new(upstream, custom, PluginType::Core))
            .unwrap();
        let stats = service.calculate_stats(&mut record);

        let expected_course = TokenCounts {
            delete_count: 2,
            insert_count: 0,
        };
        assert_eq!(stats.get("course"), Some(expected_course));
        assert_eq!(stats.get("module").map(|c| c.insert_count), Some(2));
        assert_eq!(record.stats(), &stats);
    }

    #[test]
    fn test_batch_sums_global_stats_and_continues_after_failure() {
        let install = Install::new();
        install.upstream("moodle.php", "$string['k'] = 'foo bar';\n");
        install.upstream("admin.php", "$string['k'] = 'foo baz';\n");
        install.upstream("grades.php", "$string['k'] = 'x';\n");

        let paths = vec![
            install.custom("moodle.php", "$string['k'] = 'bar';\n"),
            install.custom("admin.php", "$string['k'] = 'baz';\n"),
            install.custom("grades.php", "$string['k'] = 'broken;\n"),
            install.custom("unmatched.php", "$string['k'] = 'x';\n"),
        ];

        let service = ComparisonService::new(&install.root);
        let report = service.compare_batch(
            &paths,
            CompareOptions {
                show_diff: true,
                show_stats: true,
            },
        );

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped, vec![paths[3].clone()]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.has_failures());
        assert_eq!(
            report.global_stats.get("foo"),
            Some(TokenCounts {
                delete_count: 2,
                insert_count: 0
            })
        );
        assert!(report.records.iter().all(|r| r.diffs().len() == 1));
    }

    #[test]
    fn test_compare_files_uses_unknown_plugin_type() {
        let temp = TempDir::new().unwrap();
        let upstream = write_lang(&temp.path().join("a").join("forum.php"), "$string['k'] = 'Forum';\n");
        let custom = write_lang(&temp.path().join("b").join("forum.php"), "$string['k'] = 'Discussion board';\n");

        let service = ComparisonService::new(temp.path());
        let record = service
            .compare_files(
                &upstream,
                &custom,
                CompareOptions {
                    show_diff: true,
                    show_stats: false,
                },
            )
            .unwrap();

        assert_eq!(record.plugin_type(), PluginType::Unknown);
        assert_eq!(record.diffs()["k"], "%rForum%w%gDiscussion board%w");
        assert!(record.stats().is_empty());
    }
}
