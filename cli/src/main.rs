use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use console::style;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use vbt_core::{
    document::{parse_lenient, parse_strict},
    source::consolidate_pages,
    to_canonical_string, Classification, CommandAssistant, Config, FixAssistant, Highlight,
    LineIndex, Location, MatchStats, VerificationState, Verifier,
};
use walkdir::WalkDir;

/// Verbatim CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "vbt",
    about = "Verify extracted JSON against the source text it came from."
)]
struct Cli {
    /// Log engine decisions (repeat for block-level tracing).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Highlight every eligible field and report match statistics.
    Check(CheckArgs),
    /// Resolve the unmatched word under a cursor and build a fix request.
    Fix(FixArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Path to config file (YAML). Defaults to verbatim.yml if present.
    #[arg(long, default_value = "verbatim.yml")]
    config: PathBuf,

    /// Source text files, merged in order as pages. Defaults to the sidecar next to each document.
    #[arg(long = "source", value_name = "FILE")]
    sources: Vec<PathBuf>,

    /// Recover JSON wrapped in code fences or prose before verifying.
    #[arg(long, action = ArgAction::SetTrue)]
    coerce: bool,

    /// Set config overrides (repeatable as key=value). Example: --set eligibility.min_value_chars=2
    #[arg(long = "set", value_name = "KEY=VALUE", num_args = 0..)]
    sets: Vec<String>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Only print the summary line.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Exit non-zero when the overall match percentage is below this value.
    #[arg(long, value_name = "P")]
    min_percentage: Option<f64>,

    /// Skip paths matching these globs when walking directories.
    #[arg(long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Documents or directories of documents to verify.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct FixArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// 1-based cursor position in the canonical document text.
    #[arg(long, value_name = "LINE:COL")]
    at: String,

    /// Print the request without calling the configured assistant.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Document to inspect.
    #[arg(value_name = "DOC")]
    doc: PathBuf,
}

#[derive(Debug, Serialize)]
struct FileResult {
    path: String,
    stats: MatchStats,
    percentage: String,
    fields_checked: usize,
    fields_skipped: usize,
    highlights: Vec<Highlight>,
}

#[derive(Debug, Serialize)]
struct Totals {
    stats: MatchStats,
    percentage: String,
    files: usize,
}

#[derive(Debug, Serialize)]
struct OutputReport {
    files: Vec<FileResult>,
    totals: Totals,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Check(args) => run_check(args),
        Command::Fix(args) => run_fix(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "vbt_core=debug",
        _ => "vbt_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let (mut cfg, config_root) = load_config(&args.common.config)?;
    apply_overrides(&mut cfg, &args.common.sets)?;
    let verifier = Verifier::new(cfg)?;

    let ignore = build_ignore_set(&args.ignore)?;
    let mut files = collect_files(&args.paths, ignore.as_ref())?;
    files.sort();
    if files.is_empty() {
        bail!("no JSON documents found");
    }

    let shared_source = if args.common.sources.is_empty() {
        None
    } else {
        Some(read_source(&args.common.sources, &verifier)?)
    };

    let mut file_reports = Vec::new();
    let mut totals = MatchStats::default();

    for path in files {
        let source = match &shared_source {
            Some(text) => text.clone(),
            None => sidecar_source(&path, &verifier),
        };
        let (text, state) = verify_file(&verifier, &path, &source, args.common.coerce)?;
        totals += state.stats;

        let rel_path = pathdiff::diff_paths(&path, &config_root).unwrap_or_else(|| path.clone());
        let rel_path_clean = rel_path.to_string_lossy().replace('\\', "/");
        if !args.quiet && !args.json {
            print_human_report(&rel_path_clean, &text, &state);
        }

        file_reports.push(FileResult {
            path: rel_path_clean,
            stats: state.stats,
            percentage: state.stats.percentage_label(),
            fields_checked: state.fields_checked,
            fields_skipped: state.fields_skipped,
            highlights: state.highlights,
        });
    }

    let output = OutputReport {
        totals: Totals {
            stats: totals,
            percentage: totals.percentage_label(),
            files: file_reports.len(),
        },
        files: file_reports,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "\n{} matched / {} unmatched blocks, {}",
            totals.matched_blocks, totals.unmatched_blocks, totals
        );
    }

    if let Some(min) = args.min_percentage {
        if totals.percentage() < min {
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run_fix(args: FixArgs) -> anyhow::Result<()> {
    let (mut cfg, _) = load_config(&args.common.config)?;
    apply_overrides(&mut cfg, &args.common.sets)?;
    let verifier = Verifier::new(cfg)?;

    let cursor = parse_location(&args.at)?;
    let source = if args.common.sources.is_empty() {
        read_source(&[sidecar_path(&args.doc, &verifier)], &verifier)?
    } else {
        read_source(&args.common.sources, &verifier)?
    };
    let (text, state) = verify_file(&verifier, &args.doc, &source, args.common.coerce)?;

    let offset = LineIndex::new(&text)
        .offset(&text, cursor)
        .ok_or_else(|| anyhow!("{} is outside the document", args.at))?;
    let Some(request) = state.resolve_fix_target(offset) else {
        eprintln!("No unmatched text at {}.", args.at);
        std::process::exit(1);
    };
    debug!(path = %request.path, snippet = %request.snippet, "fix target");

    let assistant = CommandAssistant::from_config(&verifier.config().assistant);
    match assistant {
        Some(assistant) if !args.dry_run => {
            let response = assistant.request_fix(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        _ => println!("{}", serde_json::to_string_pretty(&request)?),
    }
    Ok(())
}

/// Load and verify one document. Without `coerce` the file must be strict
/// JSON; highlights always refer to its canonical serialization.
fn verify_file(
    verifier: &Verifier,
    path: &Path,
    source: &str,
    coerce: bool,
) -> anyhow::Result<(String, VerificationState)> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = if coerce {
        parse_lenient(&raw)
    } else {
        parse_strict(&raw)
    }
    .with_context(|| format!("Failed to parse {}", path.display()))?;
    let text = to_canonical_string(&doc);
    let state = verifier.run(&text, source);
    Ok((text, state))
}

fn sidecar_path(doc: &Path, verifier: &Verifier) -> PathBuf {
    doc.with_extension(&verifier.config().source.sidecar_extension)
}

/// Source for `doc` from its sidecar. A missing or unreadable sidecar gives
/// an empty source, which verifies to an empty report.
fn sidecar_source(doc: &Path, verifier: &Verifier) -> String {
    let sidecar = sidecar_path(doc, verifier);
    match read_source(&[sidecar.clone()], verifier) {
        Ok(text) => text,
        Err(err) => {
            warn!(doc = %doc.display(), "{err:#}");
            eprintln!(
                "{} {}: no source text at {}",
                style("warning:").yellow(),
                doc.display(),
                sidecar.display()
            );
            String::new()
        }
    }
}

fn read_source(paths: &[PathBuf], verifier: &Verifier) -> anyhow::Result<String> {
    let mut pages = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read source {}", path.display()))?;
        pages.push(text);
    }
    Ok(consolidate_pages(&pages, &verifier.config().source))
}

fn parse_location(text: &str) -> anyhow::Result<Location> {
    let (line, column) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected LINE:COL, got {text}"))?;
    let line: usize = line.trim().parse().context("invalid line")?;
    let column: usize = column.trim().parse().context("invalid column")?;
    if line == 0 || column == 0 {
        bail!("line and column are 1-based");
    }
    Ok(Location { line, column })
}

fn build_ignore_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

fn collect_files(paths: &[PathBuf], ignore: Option<&GlobSet>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut walker = WalkDir::new(path).into_iter();
            while let Some(entry_res) = walker.next() {
                let entry = entry_res?;
                let entry_path = entry.path();
                if let Some(set) = ignore {
                    if set.is_match(entry_path) {
                        if entry.file_type().is_dir() {
                            walker.skip_current_dir();
                        }
                        continue;
                    }
                }
                if entry.file_type().is_file() && is_supported(entry_path) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else if path.is_file() {
            if let Some(set) = ignore {
                if set.is_match(path) {
                    continue;
                }
            }
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => ext.eq_ignore_ascii_case("json"),
        None => false,
    }
}

fn load_config(path: &Path) -> anyhow::Result<(Config, PathBuf)> {
    let cfg = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if path.exists() && !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => env::current_dir()?,
    };
    Ok((cfg, dir))
}

fn apply_overrides(cfg: &mut Config, sets: &[String]) -> anyhow::Result<()> {
    for kv in sets {
        let (key, val) = kv
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got {kv}"))?;
        let (key, val) = (key.trim(), val.trim());
        match key {
            "eligibility.content_fields" => cfg.eligibility.content_fields = split_list(val),
            "eligibility.list_fields" => cfg.eligibility.list_fields = split_list(val),
            "eligibility.short_value_fields" => {
                cfg.eligibility.short_value_fields = split_list(val)
            }
            "eligibility.min_value_chars" => {
                cfg.eligibility.min_value_chars = val
                    .parse::<usize>()
                    .with_context(|| format!("invalid number for {key}: {val}"))?;
            }
            "source.strip_page_markers" => {
                cfg.source.strip_page_markers = matches!(val, "true" | "1" | "yes");
            }
            "source.sidecar_extension" => {
                cfg.source.sidecar_extension = val.trim_start_matches('.').to_string();
            }
            _ => bail!("unknown config key {key}"),
        }
    }
    Ok(())
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_human_report(path: &str, text: &str, state: &VerificationState) {
    println!(
        "{} ({} fields, {})",
        style(path).bold(),
        state.fields_checked,
        state.stats
    );
    if state.fields_skipped > 0 {
        println!(
            "  {}",
            style(format!("{} field(s) not found in text", state.fields_skipped)).yellow()
        );
    }
    let mut current: Option<&str> = None;
    let mut line = String::new();
    for h in &state.highlights {
        if current != Some(h.path.as_str()) {
            if let Some(prev) = current {
                println!("  {}:{}", style(prev).cyan(), line);
            }
            current = Some(h.path.as_str());
            line.clear();
        }
        let word = text.get(h.span.0..h.span.1).unwrap_or(&h.snippet);
        let styled = match h.classification {
            Classification::Matched => style(word).green(),
            Classification::Unmatched => style(word).red().underlined(),
        };
        line.push(' ');
        line.push_str(&styled.to_string());
    }
    if let Some(prev) = current {
        println!("  {}:{}", style(prev).cyan(), line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_lists_and_numbers() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &[
                "eligibility.content_fields=body, summary".to_string(),
                "eligibility.min_value_chars=5".to_string(),
                "source.strip_page_markers=false".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(cfg.eligibility.content_fields, vec!["body", "summary"]);
        assert_eq!(cfg.eligibility.min_value_chars, 5);
        assert!(!cfg.source.strip_page_markers);
    }

    #[test]
    fn unknown_override_is_an_error() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &["scores.fail=1".to_string()]).is_err());
        assert!(apply_overrides(&mut cfg, &["novalue".to_string()]).is_err());
    }

    #[test]
    fn cursor_positions_are_one_based() {
        assert_eq!(
            parse_location("3:15").unwrap(),
            Location {
                line: 3,
                column: 15
            }
        );
        assert!(parse_location("0:1").is_err());
        assert!(parse_location("3").is_err());
    }

    #[test]
    fn missing_sidecar_yields_an_empty_report() {
        let dir = env::temp_dir().join(format!("vbt-cli-sidecar-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let doc = dir.join("act.json");
        fs::write(&doc, r#"{"content": "The sky is blue."}"#).unwrap();
        let verifier = Verifier::new(Config::default()).unwrap();

        let source = sidecar_source(&doc, &verifier);
        assert_eq!(source, "");
        let (_, state) = verify_file(&verifier, &doc, &source, false).unwrap();
        assert!(state.highlights.is_empty());
        assert_eq!(state.stats, MatchStats::default());

        fs::write(dir.join("act.txt"), "the sky\nis blue").unwrap();
        let source = sidecar_source(&doc, &verifier);
        let (_, state) = verify_file(&verifier, &doc, &source, false).unwrap();
        assert_eq!(state.stats.matched_blocks, 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn sidecar_swaps_the_extension() {
        let verifier = Verifier::new(Config::default()).unwrap();
        assert_eq!(
            sidecar_path(Path::new("out/act.json"), &verifier),
            PathBuf::from("out/act.txt")
        );
    }
}
