use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use quill_core::analyzer::AnalyzerKind;
use quill_core::composer::DEFAULT_TITLE_BOOST;
use quill_core::{ContentStore, NewItem, TextConfig};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct InputPost {
    #[serde(default)]
    author_ref: String,
    title: String,
    body: String,
    #[serde(default)]
    image_url: Option<String>,
    /// RFC 3339; import time is used when absent or unparseable
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Parser)]
#[command(name = "quill-indexer")]
#[command(about = "Import posts and maintain the keyword text index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Data directory holding the content database
    #[arg(long, env = "QUILL_DATA", default_value = "./data")]
    data: PathBuf,
    /// Noun analyzer: hangul, command or none
    #[arg(long, env = "QUILL_ANALYZER", default_value = "hangul")]
    analyzer: AnalyzerKind,
    /// MeCab-compatible program used when --analyzer=command
    #[arg(long, env = "QUILL_ANALYZER_CMD")]
    analyzer_cmd: Option<PathBuf>,
    /// Extra argument passed to the analyzer program (repeatable)
    #[arg(long = "analyzer-arg")]
    analyzer_args: Vec<String>,
    /// Per-call analyzer timeout in milliseconds
    #[arg(long, env = "QUILL_ANALYZER_TIMEOUT_MS")]
    analyzer_timeout_ms: Option<u64>,
    /// How many times title keywords are repeated in the derived field
    #[arg(long, default_value_t = DEFAULT_TITLE_BOOST)]
    title_boost: usize,
}

impl StoreArgs {
    fn open(&self) -> Result<ContentStore> {
        let text = TextConfig {
            analyzer: self.analyzer,
            analyzer_command: self.analyzer_cmd.clone(),
            analyzer_args: self.analyzer_args.clone(),
            analyzer_timeout: self.analyzer_timeout_ms.map(Duration::from_millis),
            title_boost: self.title_boost,
        };
        let store = ContentStore::open(&self.data, text.composer()?)
            .with_context(|| format!("opening store at {}", self.data.display()))?;
        Ok(store)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import posts from JSON/JSONL files or a directory of them
    Import {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Recompute derived keywords for every post and rebuild the index
    Reindex {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Apply text index migrations and report the active index
    Migrate {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print store and index statistics
    Stats {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import { input, store } => {
            let store = store.open()?;
            let imported = import_posts(&store, Path::new(&input))?;
            store.flush()?;
            tracing::info!(imported, total = store.len(), "import complete");
        }
        Commands::Reindex { store } => {
            let store = store.open()?;
            let report = store.reindex_all()?;
            store.flush()?;
            println!("reindexed {} posts, {} keyword fields changed", report.items, report.updated);
        }
        Commands::Migrate { store } => {
            let store = store.open()?;
            let plan = store.migration();
            for dropped in &plan.dropped {
                println!("dropped text index {} on [{}]", dropped.name, dropped.fields.join(", "));
            }
            if plan.created {
                println!("created text index {}", plan.active.name);
            }
            if plan.is_noop() {
                println!("schema up to date");
            }
            store.flush()?;
        }
        Commands::Stats { store } => {
            let store = store.open()?;
            let spec = store.text_index();
            println!("posts: {}", store.len());
            println!("indexed posts: {}", store.indexed_len());
            println!("terms: {}", store.num_terms());
            println!("text index: {} on [{}]", spec.name, spec.fields.join(", "));
        }
    }
    Ok(())
}

fn import_posts(store: &ContentStore, input_path: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", input_path.display());
    }

    let mut imported = 0;
    for file in files {
        let n = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            import_jsonl(store, &file)?
        } else {
            import_json(store, &file)?
        };
        tracing::info!(file = %file.display(), posts = n, "imported file");
        imported += n;
    }
    Ok(imported)
}

fn import_jsonl(store: &ContentStore, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let mut n = 0;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let post: InputPost = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        ingest_post(store, post)?;
        n += 1;
    }
    Ok(n)
}

fn import_json(store: &ContentStore, file: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let mut n = 0;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                ingest_post(store, serde_json::from_value(v)?)?;
                n += 1;
            }
        }
        serde_json::Value::Object(_) => {
            ingest_post(store, serde_json::from_value(json)?)?;
            n += 1;
        }
        _ => tracing::warn!(file = %file.display(), "skipping file without post objects"),
    }
    Ok(n)
}

fn ingest_post(store: &ContentStore, post: InputPost) -> Result<()> {
    let created_at = parse_timestamp(post.created_at.as_deref());
    let new = NewItem { author_ref: post.author_ref, title: post.title, body: post.body, image_url: post.image_url };
    let item = store.create_with_timestamp(new, created_at)?;
    tracing::debug!(id = item.id, "post imported");
    Ok(())
}

fn parse_timestamp(raw: Option<&str>) -> OffsetDateTime {
    match raw.map(|s| OffsetDateTime::parse(s, &Rfc3339)) {
        Some(Ok(ts)) => ts,
        Some(Err(err)) => {
            tracing::warn!(error = %err, "invalid created_at, using import time");
            OffsetDateTime::now_utc()
        }
        None => OffsetDateTime::now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::KeywordComposer;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn imports_json_and_jsonl_preserving_timestamps() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(
            dir.join("a.json"),
            r#"[{"title": "Go concurrency", "body": "channels", "created_at": "2024-01-02T03:04:05Z"}]"#,
        )
        .unwrap();
        fs::write(
            dir.join("nested/b.jsonl"),
            "{\"title\": \"Go patterns\", \"body\": \"\"}\n\n{\"title\": \"Pasta\", \"body\": \"\"}\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let store = ContentStore::temporary(KeywordComposer::default()).unwrap();
        assert_eq!(import_posts(&store, dir).unwrap(), 3);
        assert_eq!(store.len(), 3);
        let hits = store.search("concurrency", 5).unwrap();
        assert_eq!(hits[0].item.created_at.year(), 2024);
    }

    #[test]
    fn bad_timestamp_falls_back_to_now() {
        let ts = parse_timestamp(Some("yesterday"));
        assert!(ts.year() >= 2024);
    }
}
