use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use qagent_core::config::Config;
use qagent_core::normalize::SourceFile;
use qagent_core::types::{DocumentFormat, TestCase};
use qagent_session::KnowledgeBase;

#[derive(Parser, Debug)]
#[command(name = "qagent", about = "Grounded test case generation and browser script synthesis")]
struct Cli {
    /// Directory holding the persisted index; overrides `storage.index_dir`
    #[arg(long, global = true, env = "QAGENT_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize documents (files or directories) and index them
    Ingest {
        paths: Vec<PathBuf>,
        /// Drop the existing index before indexing
        #[arg(long)]
        clear: bool,
    },
    /// Generate grounded test cases for a feature query
    Query { text: String },
    /// Show raw retrieval hits
    Search {
        text: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Bind a test case to a page and emit a Selenium script
    Script {
        /// JSON file with one test case, a list of them, or a query result
        #[arg(long)]
        case: PathBuf,
        /// HTML of the target page
        #[arg(long)]
        page: PathBuf,
        /// Which case to use when the file holds several
        #[arg(long)]
        case_id: Option<String>,
        /// Write the script here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Documents, entries and backend of the saved knowledge base
    Status,
    /// Remove every document and the saved index
    Clear,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| DocumentFormat::from_extension(e).is_some())
}

/// Expands directories into the supported files below them; explicit file
/// arguments are kept even with an unknown extension so they get reported.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file() && is_supported(e.path()))
                .map(walkdir::DirEntry::into_path)
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn read_sources(files: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .context("progress template")?
            .progress_chars("=> "),
    );
    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        bar.set_message(path.display().to_string());
        sources.push(SourceFile::read(path).with_context(|| format!("reading {}", path.display()))?);
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(sources)
}

/// Accepts a bare test case, an array of them, or an object with `test_cases`.
fn pick_case(raw: &str, case_id: Option<&str>) -> Result<TestCase> {
    let value: serde_json::Value = serde_json::from_str(raw).context("test case file is not JSON")?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(ref map) if map.contains_key("test_cases") => {
            map.get("test_cases").and_then(|v| v.as_array()).cloned().unwrap_or_default()
        }
        other => vec![other],
    };
    let cases: Vec<TestCase> = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<_, _>>()
        .context("test case does not match the TestCase schema")?;
    let found = match case_id {
        Some(id) => cases.into_iter().find(|c| c.id.eq_ignore_ascii_case(id)),
        None => cases.into_iter().next(),
    };
    match (found, case_id) {
        (Some(case), _) => Ok(case),
        (None, Some(id)) => bail!("no test case with id {id}"),
        (None, None) => bail!("the file holds no test cases"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut settings = Config::load()?.settings()?;
    if let Some(dir) = &cli.index_dir {
        settings.storage.index_dir = dir.display().to_string();
    }
    let index_dir = settings.storage.index_path();
    let kb = KnowledgeBase::open(settings).await.context("opening knowledge base")?;

    match cli.command {
        Command::Ingest { paths, clear } => {
            if paths.is_empty() {
                bail!("no input paths given");
            }
            let files = collect_files(&paths);
            tracing::info!(files = files.len(), "ingesting");
            let ingestion = kb.submit_documents(read_sources(&files)?);
            let build = kb.build_index(clear).await?;
            kb.save(&index_dir).await?;
            print_json(&serde_json::json!({ "ingestion": ingestion, "build": build }))?;
        }
        Command::Query { text } => {
            let outcome = kb.query(&text).await?;
            for d in &outcome.diagnostics {
                tracing::warn!("{d}");
            }
            print_json(&outcome)?;
        }
        Command::Search { text, k } => print_json(&kb.search(&text, k).await?)?,
        Command::Script { case, page, case_id, out } => {
            let raw = std::fs::read_to_string(&case).with_context(|| format!("reading {}", case.display()))?;
            let test_case = pick_case(&raw, case_id.as_deref())?;
            let html = std::fs::read_to_string(&page).with_context(|| format!("reading {}", page.display()))?;
            let synthesis = kb.synthesize_script(&test_case, &html)?;
            for d in &synthesis.diagnostics {
                tracing::warn!("{d}");
            }
            match out {
                Some(path) => {
                    std::fs::write(&path, &synthesis.script.source)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), suggested = %synthesis.script.filename, "script written");
                }
                None => print!("{}", synthesis.script.source),
            }
        }
        Command::Status => print_json(&kb.stats().await)?,
        Command::Clear => {
            kb.reset().await?;
            if index_dir.exists() {
                std::fs::remove_dir_all(&index_dir).with_context(|| format!("removing {}", index_dir.display()))?;
            }
            tracing::info!(dir = %index_dir.display(), "knowledge base cleared");
        }
    }
    Ok(())
}
