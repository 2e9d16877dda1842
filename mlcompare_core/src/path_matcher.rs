use mlcompare_common::{MatchedPair, PluginType};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of looking up the upstream counterpart of a customization file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(MatchedPair),
    /// No upstream file exists for this customization
    NotFound,
}

/// Prefixed plugin types in lookup priority order, with the directory that
/// holds them relative to the install root.
///
/// `auth_` resolves against the repository plugin root. Upstream auth plugins
/// live under `auth/`, so auth customizations only match when a repository
/// plugin of the same name exists.
const PREFIXED_PLUGINS: &[(&str, &str, PluginType)] = &[
    ("block_", "blocks", PluginType::Block),
    ("enrol_", "enrol", PluginType::Enrol),
    ("report_", "report", PluginType::Report),
    ("repository_", "repository", PluginType::Repository),
    ("auth_", "repository", PluginType::Auth),
];

const MOD_DIR: &str = "mod";

/// Resolves customization files to upstream English language files.
///
/// `upstream_root` is the core language directory (`<install>/lang/en`);
/// plugin directories are looked up two levels above it.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    upstream_root: PathBuf,
}

impl PathMatcher {
    pub fn new(upstream_root: impl Into<PathBuf>) -> Self {
        Self {
            upstream_root: upstream_root.into(),
        }
    }

    pub fn upstream_root(&self) -> &Path {
        &self.upstream_root
    }

    /// Find the upstream file for `custom_path` and classify its plugin type
    pub fn match_path(&self, custom_path: &Path) -> MatchOutcome {
        let Some(basename) = custom_path.file_name().and_then(|n| n.to_str()) else {
            debug!("No usable file name in {:?}", custom_path);
            return MatchOutcome::NotFound;
        };
        let stem = Path::new(basename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(basename);

        for (prefix, dir, plugin_type) in PREFIXED_PLUGINS {
            if let Some(plugin) = stem.strip_prefix(prefix) {
                if *plugin_type == PluginType::Auth {
                    warn!(
                        "{} is looked up under the repository plugin root, not auth",
                        basename
                    );
                }
                let candidate = self.plugin_lang_file(dir, plugin, basename);
                return self.check_candidate(candidate, custom_path, *plugin_type);
            }
        }

        let core = self.upstream_root.join(basename);
        if core.is_file() {
            return self.check_candidate(core, custom_path, PluginType::Core);
        }

        let candidate = self.plugin_lang_file(MOD_DIR, stem, basename);
        self.check_candidate(candidate, custom_path, PluginType::Mod)
    }

    /// `<upstream_root>/../../<dir>/<plugin>/lang/en/<basename>`
    fn plugin_lang_file(&self, dir: &str, plugin: &str, basename: &str) -> PathBuf {
        self.upstream_root
            .join("..")
            .join("..")
            .join(dir)
            .join(plugin)
            .join("lang")
            .join("en")
            .join(basename)
    }

    fn check_candidate(&self, candidate: PathBuf, custom_path: &Path, plugin_type: PluginType) -> MatchOutcome {
        if candidate.is_file() {
            debug!("Matched {:?} -> {:?} ({})", custom_path, candidate, plugin_type);
            MatchOutcome::Matched(MatchedPair::new(
                candidate,
                custom_path.to_path_buf(),
                plugin_type,
            ))
        } else {
            debug!("No upstream file at {:?} for {:?}", candidate, custom_path);
            MatchOutcome::NotFound
        }
    }
}
