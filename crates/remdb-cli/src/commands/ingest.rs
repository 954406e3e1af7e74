//! `rem ingest` - walk a directory and store each readable file as a
//! resource row (embedded through the background worker).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory to ingest
    pub path: PathBuf,

    /// Resource category stamped on every row
    #[arg(long, default_value = "document")]
    pub category: String,

    /// Only files with one of these extensions (comma separated)
    #[arg(long, default_value = "md,txt,rst,adoc")]
    pub extensions: String,

    /// Skip files larger than this many bytes
    #[arg(long, default_value_t = 1_048_576)]
    pub max_bytes: u64,
}

pub fn run(global: &GlobalOptions, args: IngestArgs) -> Result<()> {
    let config = super::load_config(global)?;
    let db = super::open_database(&config)?;

    let extensions: Vec<&str> = args.extensions.split(',').map(str::trim).collect();
    let files: Vec<PathBuf> = WalkDir::new(&args.path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e))
                .unwrap_or(false)
        })
        .filter(|entry| entry.metadata().map(|m| m.len() <= args.max_bytes).unwrap_or(false))
        .map(|entry| entry.into_path())
        .collect();

    let bar = ProgressBar::new(files.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .expect("static progress template"),
    );

    let mut ingested = 0usize;
    for path in &files {
        bar.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), "skipping unreadable file: {err}");
                bar.inc(1);
                continue;
            }
        };
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        db.insert(
            "resource",
            json!({
                "name": name,
                "content": content,
                "category": args.category,
                "uri": format!("file://{}", path.display()),
            }),
        )
        .with_context(|| format!("failed to ingest {}", path.display()))?;
        ingested += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();

    // Let queued embedding generation drain before reporting.
    db.wait_for_worker(Duration::from_secs(60));

    super::print_json(&json!({
        "scanned": files.len(),
        "ingested": ingested,
    }))
}
