use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mlcompare_common::{
    ensure_config, load_config, LangRecord, MatchedPair, PluginType, StatsTable,
};
use mlcompare_core::word_diff::{word_spans, SpanKind};
use mlcompare_core::{BatchReport, CompareOptions, ComparisonService, FolderScanner};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mlcompare")]
#[command(author = "MLCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Compare Moodle language customizations against upstream strings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare customized language files with their upstream originals
    Compare {
        /// Upstream language directory (e.g. moodle/lang/en) or a single upstream file
        upstream: PathBuf,

        /// Customization directory (e.g. moodledata/lang/en_local) or a single file
        custom: PathBuf,

        /// Show a word diff for every customized string
        #[arg(short = 'd', long)]
        diff: bool,

        /// Collect statistics of deleted and inserted words
        #[arg(short = 's', long)]
        stats: bool,

        /// Only list words seen at least this many times in statistics
        #[arg(short = 't', long)]
        threshold: Option<usize>,

        /// Ignore patterns for the customization directory (can be specified multiple times)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },

    /// List which upstream file each customization file maps to
    Match {
        /// Upstream language directory (e.g. moodle/lang/en)
        upstream: PathBuf,

        /// Customization directory
        custom: PathBuf,

        /// Ignore patterns for the customization directory (can be specified multiple times)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the configuration file location and effective settings
    Config {
        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,

        /// Use the portable configuration next to the executable
        #[arg(long)]
        portable: bool,
    },
}

/// How the two positional paths of `compare` are combined
#[derive(Debug, PartialEq, Eq)]
enum CompareInput {
    /// Every file under the custom directory is matched against the upstream root
    Batch { root: PathBuf, custom_dir: PathBuf },
    /// One custom file matched against the upstream root
    MatchFile { root: PathBuf, custom: PathBuf },
    /// One upstream file paired with the same-named file in the custom directory
    UpstreamFile { upstream: PathBuf, custom_dir: PathBuf },
    /// Two explicitly paired files
    Pair { upstream: PathBuf, custom: PathBuf },
}

struct CompareArgs {
    diff: bool,
    stats: bool,
    threshold: Option<usize>,
    ignore: Vec<String>,
    json: bool,
    no_color: bool,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare {
            upstream,
            custom,
            diff,
            stats,
            threshold,
            ignore,
            json,
            no_color,
        } => run_compare(
            upstream,
            custom,
            CompareArgs {
                diff,
                stats,
                threshold,
                ignore,
                json,
                no_color,
            },
        ),
        Commands::Match {
            upstream,
            custom,
            ignore,
            json,
        } => run_match(upstream, custom, ignore, json),
        Commands::Config { init, portable } => run_config(init, portable),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when some pairs failed to load
fn run_compare(upstream: PathBuf, custom: PathBuf, args: CompareArgs) -> anyhow::Result<bool> {
    let input = resolve_input(&upstream, &custom)?;

    let loaded = load_config(false)?;
    let mut config = loaded.config;
    config.ignore_patterns.extend(args.ignore);
    let options = CompareOptions {
        show_diff: args.diff || config.show_diff,
        show_stats: args.stats || config.show_stats,
    };
    let threshold = args.threshold.unwrap_or(config.occurrence_threshold);

    info!("Comparing:");
    info!("  Upstream: {}", upstream.display());
    info!("  Custom:   {}", custom.display());

    let report = match input {
        CompareInput::Batch { root, custom_dir } => {
            let scanner = FolderScanner::new(&config);
            let files = scanner.scan(&custom_dir)?;
            info!("Found {} customization files", files.len());
            ComparisonService::new(root).compare_batch(&files, options)
        }
        CompareInput::MatchFile { root, custom } => {
            let report = ComparisonService::new(root).compare_batch(&[custom], options);
            if let Some(failed) = report.failed.first() {
                bail!("{}", failed.message);
            }
            report
        }
        CompareInput::UpstreamFile {
            upstream,
            custom_dir,
        } => {
            let name = upstream
                .file_name()
                .context("upstream file has no file name")?;
            let custom = custom_dir.join(name);
            if custom.is_file() {
                single_pair_report(&upstream, &custom, options)?
            } else {
                BatchReport {
                    skipped: vec![custom],
                    ..BatchReport::default()
                }
            }
        }
        CompareInput::Pair { upstream, custom } => {
            single_pair_report(&upstream, &custom, options)?
        }
    };

    if args.json {
        let json_report = build_json_report(&upstream, &custom, &report, threshold);
        println!("{}", serde_json::to_string_pretty(&json_report)?);
    } else {
        let use_color = !args.no_color && std::io::stdout().is_terminal();
        print_report(&report, options, threshold, use_color);
    }

    Ok(!report.has_failures())
}

fn single_pair_report(
    upstream: &Path,
    custom: &Path,
    options: CompareOptions,
) -> anyhow::Result<BatchReport> {
    let service = ComparisonService::new(upstream.parent().unwrap_or(Path::new(".")));
    let record = service
        .compare_files(upstream, custom, options)
        .with_context(|| format!("Failed to compare {}", custom.display()))?;

    let mut global_stats = StatsTable::new();
    global_stats.merge(record.stats());
    Ok(BatchReport {
        records: vec![record],
        global_stats,
        ..BatchReport::default()
    })
}

fn resolve_input(upstream: &Path, custom: &Path) -> anyhow::Result<CompareInput> {
    if !upstream.exists() {
        bail!("Upstream path does not exist: {}", upstream.display());
    }
    if !custom.exists() {
        bail!("Custom path does not exist: {}", custom.display());
    }

    let input = match (upstream.is_dir(), custom.is_dir()) {
        (true, true) => CompareInput::Batch {
            root: upstream.to_path_buf(),
            custom_dir: custom.to_path_buf(),
        },
        (true, false) => CompareInput::MatchFile {
            root: upstream.to_path_buf(),
            custom: custom.to_path_buf(),
        },
        (false, true) => CompareInput::UpstreamFile {
            upstream: upstream.to_path_buf(),
            custom_dir: custom.to_path_buf(),
        },
        (false, false) => CompareInput::Pair {
            upstream: upstream.to_path_buf(),
            custom: custom.to_path_buf(),
        },
    };
    Ok(input)
}

fn run_match(
    upstream: PathBuf,
    custom: PathBuf,
    ignore: Vec<String>,
    json: bool,
) -> anyhow::Result<bool> {
    if !upstream.is_dir() {
        bail!("Upstream path is not a directory: {}", upstream.display());
    }

    let loaded = load_config(false)?;
    let mut config = loaded.config;
    config.ignore_patterns.extend(ignore);

    let files = FolderScanner::new(&config).scan(&custom)?;
    let result = ComparisonService::new(&upstream).match_paths(&files);

    if json {
        let report = JsonMatchReport {
            matched: result.matched.iter().map(json_pair).collect(),
            skipped: result.skipped.iter().map(|p| display_path(p)).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    println!("\n{}", "=".repeat(80));
    println!("Matched Files");
    println!("{}", "=".repeat(80));
    for pair in &result.matched {
        println!(
            "  [{:<10}] {} -> {}",
            pair.plugin_type,
            pair.custom.display(),
            pair.upstream.display()
        );
    }

    if !result.skipped.is_empty() {
        println!("\nSkipped (no upstream file):");
        for path in &result.skipped {
            println!("  {}", path.display());
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Matched: {}  Skipped: {}", result.matched.len(), result.skipped.len());
    Ok(true)
}

fn run_config(init: bool, portable: bool) -> anyhow::Result<bool> {
    let loaded = if init {
        ensure_config(portable)?
    } else {
        load_config(portable)?
    };
    let config = &loaded.config;

    println!("Config file: {}", loaded.path.display());
    if init && !loaded.exists {
        println!("  (created with defaults)");
    } else if !loaded.exists {
        println!("  (not found, using defaults)");
    }
    println!("Portable:              {}", loaded.portable);
    println!("Occurrence threshold:  {}", config.occurrence_threshold);
    println!("Show diff:             {}", config.show_diff);
    println!("Show stats:            {}", config.show_stats);
    if config.ignore_patterns.is_empty() {
        println!("Ignore patterns:       (none)");
    } else {
        println!("Ignore patterns:");
        for pattern in &config.ignore_patterns {
            println!("  {}", pattern);
        }
    }
    Ok(true)
}

fn print_report(report: &BatchReport, options: CompareOptions, threshold: usize, use_color: bool) {
    println!("\n{}", "=".repeat(80));
    println!("Language Customization Report");
    println!("{}", "=".repeat(80));

    let mut custom_total = 0;
    let mut unused_total = 0;

    for record in &report.records {
        custom_total += record.custom_strings().len();
        unused_total += record.unused_keys().len();
        print_record(record, options, use_color);
    }

    if !report.skipped.is_empty() {
        println!("\nSkipped (no upstream file):");
        for path in &report.skipped {
            println!("  {}", path.display());
        }
    }

    if !report.failed.is_empty() {
        println!("\nFailed:");
        for failed in &report.failed {
            println!("  {}: {}", failed.pair.custom.display(), failed.message);
        }
    }

    if options.show_stats {
        let tokens = report.global_stats.filtered(threshold);
        println!("\nWord statistics (at least {} occurrences):", threshold);
        println!("  {:<40} {:>8} {:>8}", "Words", "Deleted", "Inserted");
        for (token, counts) in tokens {
            println!(
                "  {:<40} {:>8} {:>8}",
                truncate_text(token, 40),
                counts.delete_count,
                counts.insert_count
            );
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Files compared:  {}", report.records.len());
    println!("  Skipped:         {}", report.skipped.len());
    println!("  Failed:          {}", report.failed.len());
    println!("  Custom strings:  {}", custom_total);
    println!("  Unused strings:  {}", unused_total);
    println!("{}", "=".repeat(80));
}

fn print_record(record: &LangRecord, options: CompareOptions, use_color: bool) {
    let name = record
        .custom_path()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    println!("\n[{}] {}", record.plugin_type(), name);
    println!("  Upstream: {}", record.upstream_path().display());
    println!("  Custom:   {}", record.custom_path().display());
    println!(
        "  Strings:  {} custom, {} used, {} unused",
        record.custom_strings().len(),
        record.custom_strings().len() - record.unused_keys().len(),
        record.unused_keys().len()
    );

    if !record.unused_keys().is_empty() {
        println!("  Unused keys:");
        for key in record.unused_keys() {
            println!("    - {}", key);
        }
    }

    if options.show_diff && !record.diffs().is_empty() {
        println!("  Diffs:");
        for key in record.diffs().keys() {
            let (Some(from), Some(to)) = (
                record.upstream_strings().get(key),
                record.custom_strings().get(key),
            ) else {
                continue;
            };
            let rendered = render_diff(from, to, use_color);
            println!("    {}: {}", key, indent_continuation(&rendered, DIFF_INDENT));
        }
    }
}

const DIFF_INDENT: &str = "      ";

/// Word diff for the text report: ANSI colors, or `[-…-]` / `{+…+}` without color
fn render_diff(from: &str, to: &str, use_color: bool) -> String {
    let mut out = String::new();

    for span in word_spans(from, to) {
        let (start, end) = match (span.kind, use_color) {
            (SpanKind::Copy, _) => ("", ""),
            (SpanKind::Delete, true) => ("\x1b[31m", "\x1b[0m"),
            (SpanKind::Insert, true) => ("\x1b[32m", "\x1b[0m"),
            (SpanKind::Delete, false) => ("[-", "-]"),
            (SpanKind::Insert, false) => ("{+", "+}"),
        };
        out.push_str(start);
        out.push_str(&span.display_text());
        out.push_str(end);
    }

    out
}

/// Indent every line after the first so multi-line strings stay in the report layout
fn indent_continuation(text: &str, indent: &str) -> String {
    let text = text.replace("\r\n", "\n");
    text.lines().collect::<Vec<_>>().join(&format!("\n{}", indent))
}

#[derive(Serialize)]
struct JsonReport {
    upstream: String,
    custom: String,
    summary: JsonSummary,
    files: Vec<JsonFile>,
    skipped: Vec<String>,
    failed: Vec<JsonFailure>,
    stats: Vec<JsonToken>,
}

#[derive(Serialize)]
struct JsonSummary {
    compared: usize,
    skipped: usize,
    failed: usize,
    custom_strings: usize,
    unused_strings: usize,
}

#[derive(Serialize)]
struct JsonFile {
    upstream: String,
    custom: String,
    plugin_type: PluginType,
    custom_strings: usize,
    unused_keys: Vec<String>,
    diffs: BTreeMap<String, String>,
    stats: Vec<JsonToken>,
}

#[derive(Serialize)]
struct JsonFailure {
    custom: String,
    message: String,
}

#[derive(Serialize)]
struct JsonToken {
    token: String,
    deleted: usize,
    inserted: usize,
}

#[derive(Serialize)]
struct JsonMatchReport {
    matched: Vec<JsonPair>,
    skipped: Vec<String>,
}

#[derive(Serialize)]
struct JsonPair {
    upstream: String,
    custom: String,
    plugin_type: PluginType,
}

fn build_json_report(
    upstream: &Path,
    custom: &Path,
    report: &BatchReport,
    threshold: usize,
) -> JsonReport {
    let files: Vec<JsonFile> = report.records.iter().map(json_file).collect();

    JsonReport {
        upstream: display_path(upstream),
        custom: display_path(custom),
        summary: JsonSummary {
            compared: report.records.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            custom_strings: files.iter().map(|f| f.custom_strings).sum(),
            unused_strings: files.iter().map(|f| f.unused_keys.len()).sum(),
        },
        files,
        skipped: report.skipped.iter().map(|p| display_path(p)).collect(),
        failed: report
            .failed
            .iter()
            .map(|f| JsonFailure {
                custom: display_path(&f.pair.custom),
                message: f.message.clone(),
            })
            .collect(),
        stats: json_tokens(&report.global_stats, threshold),
    }
}

fn json_file(record: &LangRecord) -> JsonFile {
    JsonFile {
        upstream: display_path(record.upstream_path()),
        custom: display_path(record.custom_path()),
        plugin_type: record.plugin_type(),
        custom_strings: record.custom_strings().len(),
        unused_keys: record.unused_keys().iter().cloned().collect(),
        diffs: record.diffs().clone(),
        stats: json_tokens(record.stats(), 1),
    }
}

fn json_tokens(stats: &StatsTable, threshold: usize) -> Vec<JsonToken> {
    stats
        .filtered(threshold)
        .into_iter()
        .map(|(token, counts)| JsonToken {
            token: token.to_string(),
            deleted: counts.delete_count,
            inserted: counts.insert_count,
        })
        .collect()
}

fn json_pair(pair: &MatchedPair) -> JsonPair {
    JsonPair {
        upstream: display_path(&pair.upstream),
        custom: display_path(&pair.custom),
        plugin_type: pair.plugin_type,
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let suffix = "...";
    let keep_len = max_len.saturating_sub(suffix.len());

    // Use chars to avoid splitting UTF-8 characters
    let prefix: String = text.chars().take(keep_len).collect();
    format!("{}{}", prefix, suffix)
}
