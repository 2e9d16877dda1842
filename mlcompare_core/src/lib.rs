pub mod comparison;
pub mod path_matcher;
pub mod scanner;
pub mod string_loader;
pub mod word_diff;

pub use comparison::{BatchReport, CompareOptions, ComparisonService, FailedPair, MatchResult};
pub use path_matcher::{MatchOutcome, PathMatcher};
pub use scanner::FolderScanner;
pub use string_loader::{load_string_table, parse_string_table, StringParseError};
pub use word_diff::{DiffMode, RenderedDiff, SpanKind, WordDiffEngine};
