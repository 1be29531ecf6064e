mod db;
mod fetch;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use changelog_harvest::parser::fallback;
use changelog_harvest::parser::record::truncate;
use changelog_harvest::parser::versions::CURSOR;
use changelog_harvest::{extract_changelog, extract_news, extract_news_response, ExtractContext, ExtractedRecord};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use settings::Settings;

const CHANGELOG_SOURCE: &str = "cursor_changelog";
const NEWS_SOURCE: &str = "ai_news";

#[derive(Parser)]
#[command(name = "harvest", about = "Changelog and AI news record extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract release records from the changelog page
    Changelog {
        /// Saved HTML page to read instead of fetching
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Print records without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract news records from a generated response
    News {
        /// Saved chat-completion response (JSON, possibly broken)
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Plain generated text
        #[arg(short, long)]
        text: Option<PathBuf>,
        /// Print records without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract every saved input in a directory (.html, .json, .txt, .md)
    Process {
        dir: PathBuf,
    },
    /// Stored records table
    List {
        /// Filter by kind (changelog, news)
        #[arg(short, long)]
        kind: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show storage statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(settings_loaded = ?settings, msg = "Starting harvest");

    let result = match cli.command {
        Commands::Changelog { file, dry_run } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let ctx = ExtractContext::now_utc(CHANGELOG_SOURCE).with_page_url(&settings.changelog_url);
            let html = match file {
                Some(path) => read_input(&path)?,
                None => {
                    let client = fetch::client()?;
                    let start = Instant::now();
                    let fetched = fetch::fetch_page(&client, &settings.changelog_url).await;
                    log_fetch(&conn, CHANGELOG_SOURCE, &settings.changelog_url, &fetched, start)?;
                    fetched?.body
                }
            };
            let records = extract_changelog(&html, &CURSOR, &ctx);
            finish(&conn, &records, dry_run)
        }
        Commands::News { file, text, dry_run } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let ctx = ExtractContext::now_utc(NEWS_SOURCE);
            let records = match (file, text) {
                (Some(path), _) => extract_news_response(&read_input(&path)?, &ctx)
                    .with_context(|| format!("decoding {}", path.display()))?,
                (None, Some(path)) => extract_news(&read_input(&path)?, &ctx),
                (None, None) => {
                    let client = fetch::client()?;
                    let start = Instant::now();
                    let fetched = fetch::request_news(&client, &settings, ctx.now.date_naive()).await;
                    log_fetch(&conn, NEWS_SOURCE, &settings.api_url, &fetched, start)?;
                    match fetched {
                        Ok(response) => extract_news_response(&response.body, &ctx).unwrap_or_else(|e| {
                            warn!(error = %e, "response unusable, emitting advisories");
                            fallback::advisory_records(&ctx)
                        }),
                        Err(e) => {
                            warn!(error = %e, "news request failed, emitting advisories");
                            fallback::advisory_records(&ctx)
                        }
                    }
                }
            };
            finish(&conn, &records, dry_run)
        }
        Commands::Process { dir } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let inputs = collect_inputs(&dir)?;
            if inputs.is_empty() {
                println!("No .html, .json, .txt or .md files in {}.", dir.display());
                return Ok(());
            }
            println!("Processing {} files...", inputs.len());
            let counts = process_inputs(&conn, &inputs, &settings)?;
            counts.print();
            Ok(())
        }
        Commands::List { kind, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_records(&conn, kind.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No records stored.");
                return Ok(());
            }

            println!("{:>3} | {:<9} | {:<7} | {:<10} | {:<48} | {:<40}", "#", "Kind", "Version", "Date", "Title", "Summary");
            println!("{}", "-".repeat(132));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<9} | {:<7} | {:<10} | {:<48} | {:<40}",
                    i + 1,
                    r.kind,
                    r.identifier.as_deref().unwrap_or("-"),
                    r.date,
                    truncate(&r.title, 45),
                    truncate(&r.summary.replace('\n', " "), 37),
                );
            }
            println!("\n{} records", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Changelog:     {}", s.changelog);
            println!("Latest:        {}", s.latest_version.as_deref().unwrap_or("-"));
            println!("News:          {}", s.news);
            println!("Fetches:       {}", s.fetches);
            println!("Fetch errors:  {}", s.fetch_errors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn log_fetch(
    conn: &rusqlite::Connection,
    source: &str,
    url: &str,
    fetched: &Result<fetch::Fetched>,
    start: Instant,
) -> Result<()> {
    let (status, error) = match fetched {
        Ok(f) => (Some(f.status), None),
        Err(e) => (None, Some(format!("{:#}", e))),
    };
    db::log_fetch(
        conn,
        &db::FetchRow {
            source: source.to_string(),
            url: url.to_string(),
            status,
            error,
            latency_ms: start.elapsed().as_millis() as i64,
        },
    )
}

fn finish(conn: &rusqlite::Connection, records: &[ExtractedRecord], dry_run: bool) -> Result<()> {
    print_records(records);
    if dry_run {
        println!("\nDry run, nothing saved.");
        return Ok(());
    }
    let stats = db::save_records(conn, records)?;
    stats.print();
    Ok(())
}

fn print_records(records: &[ExtractedRecord]) {
    println!("{:>3} | {:<8} | {:<7} | {:<10} | {:<60}", "#", "Kind", "Version", "Date", "Title");
    println!("{}", "-".repeat(100));
    for (i, r) in records.iter().enumerate() {
        println!(
            "{:>3} | {:<8} | {:<7} | {:<10} | {:<60}",
            i + 1,
            r.kind.as_str(),
            r.identifier.as_deref().unwrap_or("-"),
            r.published_at.format("%Y-%m-%d"),
            truncate(&r.title, 57),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    ChangelogPage,
    Completion,
    Text,
}

fn classify_input(path: &Path) -> Option<InputKind> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "html" | "htm" => Some(InputKind::ChangelogPage),
        "json" => Some(InputKind::Completion),
        "txt" | "md" => Some(InputKind::Text),
        _ => None,
    }
}

fn collect_inputs(dir: &Path) -> Result<Vec<(PathBuf, InputKind)>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if let Some(kind) = classify_input(&path) {
            inputs.push((path, kind));
        }
    }
    inputs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(inputs)
}

struct ProcessCounts {
    files: usize,
    failed: usize,
    records: usize,
    saved: db::SaveStats,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Extracted {} records from {} files ({} failed). Saved {} new, {} already stored, {} not persisted.",
            self.records, self.files, self.failed, self.saved.new, self.saved.existing, self.saved.skipped,
        );
    }
}

fn extract_file(path: &Path, kind: InputKind, settings: &Settings) -> Result<Vec<ExtractedRecord>> {
    let content = read_input(path)?;
    let records = match kind {
        InputKind::ChangelogPage => {
            let ctx = ExtractContext::now_utc(CHANGELOG_SOURCE).with_page_url(&settings.changelog_url);
            extract_changelog(&content, &CURSOR, &ctx)
        }
        InputKind::Completion => extract_news_response(&content, &ExtractContext::now_utc(NEWS_SOURCE))
            .with_context(|| format!("decoding {}", path.display()))?,
        InputKind::Text => extract_news(&content, &ExtractContext::now_utc(NEWS_SOURCE)),
    };
    Ok(records)
}

fn process_inputs(
    conn: &rusqlite::Connection,
    inputs: &[(PathBuf, InputKind)],
    settings: &Settings,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        files: inputs.len(),
        failed: 0,
        records: 0,
        saved: db::SaveStats::default(),
    };

    for chunk in inputs.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|(path, kind)| (path, extract_file(path, *kind, settings)))
            .collect();

        let mut records = Vec::new();
        for (path, result) in results {
            match result {
                Ok(extracted) => records.extend(extracted),
                Err(e) => {
                    warn!(file = %path.display(), error = %format!("{:#}", e), "extraction failed");
                    counts.failed += 1;
                }
            }
        }

        counts.records += records.len();
        let saved = db::save_records(conn, &records)?;
        counts.saved.new += saved.new;
        counts.saved.existing += saved.existing;
        counts.saved.skipped += saved.skipped;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_classified_by_extension() {
        assert_eq!(classify_input(Path::new("page.HTML")), Some(InputKind::ChangelogPage));
        assert_eq!(classify_input(Path::new("resp.json")), Some(InputKind::Completion));
        assert_eq!(classify_input(Path::new("news.md")), Some(InputKind::Text));
        assert_eq!(classify_input(Path::new("notes.pdf")), None);
        assert_eq!(classify_input(Path::new("README")), None);
    }

    #[test]
    fn fixtures_directory_is_processable() {
        let inputs = collect_inputs(Path::new("tests/fixtures")).unwrap();
        assert_eq!(inputs.len(), 4);

        let settings = Settings {
            api_url: String::new(),
            api_key: None,
            model: String::new(),
            changelog_url: "https://cursor.com/changelog".into(),
            db_path: PathBuf::new(),
        };
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let counts = process_inputs(&conn, &inputs, &settings).unwrap();
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.saved.skipped, 0);
        assert!(counts.saved.new >= 3);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
