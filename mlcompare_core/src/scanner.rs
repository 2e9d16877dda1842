use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;
use mlcompare_common::{AppConfig, MlCompareError};
use std::path::{Path, PathBuf};
use tracing::debug;

const LANG_FILE_EXTENSION: &str = "php";

/// Collects language files from a customization directory
pub struct FolderScanner {
    custom_ignore: Option<Gitignore>,
}

impl FolderScanner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            custom_ignore: Self::build_custom_ignore(config),
        }
    }

    /// Build a Gitignore from custom ignore patterns in config
    fn build_custom_ignore(config: &AppConfig) -> Option<Gitignore> {
        if config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new("");
        for pattern in &config.ignore_patterns {
            if let Err(err) = builder.add_line(None, pattern) {
                debug!("Failed to add ignore pattern '{}': {}", pattern, err);
            } else {
                debug!("Added custom ignore pattern: {}", pattern);
            }
        }

        match builder.build() {
            Ok(ignore) => Some(ignore),
            Err(e) => {
                debug!("Failed to build custom ignore: {}", e);
                None
            }
        }
    }

    /// Every `.php` file below `root`, sorted by path
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, MlCompareError> {
        if !root.is_dir() {
            return Err(MlCompareError::Path(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();

        for entry in WalkDir::new(root).sort(true) {
            let entry = entry.map_err(|e| {
                MlCompareError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Walk error: {}", e),
                ))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LANG_FILE_EXTENSION) {
                continue;
            }

            let relative_path = path
                .strip_prefix(root)
                .map_err(|e| MlCompareError::Path(e.to_string()))?;
            if self.should_ignore_with_parents(relative_path) {
                continue;
            }

            files.push(path);
        }

        files.sort();
        debug!("Found {} language files under {:?}", files.len(), root);
        Ok(files)
    }

    /// Check if a path or any of its parent directories should be ignored
    fn should_ignore_with_parents(&self, path: &Path) -> bool {
        let Some(ref custom_ignore) = self.custom_ignore else {
            return false;
        };

        if custom_ignore.matched(path, false).is_ignore() {
            return true;
        }

        let mut current = path;
        while let Some(parent) = current.parent() {
            if !parent.as_os_str().is_empty() && custom_ignore.matched(parent, true).is_ignore() {
                return true;
            }
            current = parent;
        }
        false
    }
}
