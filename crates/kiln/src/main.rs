mod analyzer;
mod cli;
mod config;
mod index;
mod transformer;
mod walker;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use analyzer::{AnalyzerStage, ScriptChain};
use cli::Cli;
use kiln_core::FileRecord;
use kiln_pipeline::{run_stage, spawn_log_consumer, LogEntry};
use kiln_probe::{FingerprintTool, Prober, Transcoder};
use kiln_resolver::{AcoustidClient, CoverArtClient, MusicBrainzClient, Resolver};
use kiln_sandbox::Sandbox;
use kiln_transform::CoverDedupSet;
use transformer::TransformerStage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let roots = kiln_paths::search_roots().context("resolving configuration search paths")?;
    let root = kiln_paths::resolve_config(&roots).context("locating config.lua")?;
    let mut settings = config::load(root).context("loading config.lua")?;
    if let Some(cores) = cli.cores {
        settings.cores = cores.max(1);
    }

    let chain = ScriptChain {
        prescript: settings.prescript.as_ref().map(config::read_script).transpose()?,
        scripts: settings
            .scripts
            .iter()
            .map(config::read_script)
            .collect::<anyhow::Result<Vec<_>>>()?,
        postscript: settings.postscript.as_ref().map(config::read_script).transpose()?,
    };
    let exist_action = settings.exist_action.as_ref().map(config::read_script).transpose()?;

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("building shared HTTP client")?;

    let resolver = Arc::new(Resolver::new(
        MusicBrainzClient::new(http.clone()),
        AcoustidClient::new(http.clone(), settings.acoustid_key.clone()),
        CoverArtClient::new(http),
    ));
    let sandbox = Arc::new(Sandbox::new().context("initializing the script sandbox")?);
    let prober = Arc::new(Prober::default());
    let transcoder = Arc::new(Transcoder::default());
    let fingerprinter = Arc::new(FingerprintTool::default());
    let cover_dedup = Arc::new(CoverDedupSet::new());

    let extensions: HashSet<String> = settings.extensions.iter().cloned().collect();
    let file_rx = walker::spawn_walker(cli.roots.clone(), extensions);

    let analyzer = Arc::new(AnalyzerStage {
        worker_count: settings.cores,
        prober,
        transcoder: transcoder.clone(),
        fingerprinter,
        resolver,
        sandbox,
        chain: Arc::new(chain),
        exist_action: Arc::new(exist_action),
        online: settings.online,
    });
    let analyzed_rx = run_stage(analyzer, file_rx);

    let (log_tx, log_rx) = tokio::sync::mpsc::channel::<LogEntry>(settings.cores.max(1));
    let log_handle = spawn_log_consumer(log_rx);

    let (transform_tx, transform_rx) = tokio::sync::mpsc::channel::<FileRecord>(settings.cores.max(1));
    // Spawned rather than awaited inline: the preview tap and the transformer
    // below must run concurrently, since the bounded `transform_tx` channel
    // would otherwise deadlock once the analyzer outpaces a not-yet-running
    // consumer (§5 "Suspension": a worker may block on sending when the next
    // stage's queue is full).
    let forward_handle = tokio::spawn(forward_with_preview(
        analyzed_rx,
        transform_tx,
        log_tx.clone(),
        cli.dry_run,
        cli.index.clone(),
    ));

    if !cli.dry_run {
        let transformer = Arc::new(TransformerStage {
            worker_count: settings.cores,
            transcoder,
            cover_dedup,
        });
        let mut written_rx = run_stage(transformer, transform_rx);
        while let Some(record) = written_rx.recv().await {
            let log_entry = LogEntry {
                source: record.input.canonical_path.display().to_string(),
                lines: record.log.clone(),
            };
            if log_tx.send(log_entry).await.is_err() {
                break;
            }
        }
    } else {
        drop(transform_rx);
    }

    forward_handle.await.context("preview/index task panicked")??;

    drop(log_tx);
    log_handle.await.context("log consumer task panicked")?;

    Ok(())
}

/// Taps the analyzer's output (§4.5 step 9): renders a preview diff and/or
/// appends to the index file, emits the per-record log, then forwards every
/// record into the transformer's input channel (skipped entirely in
/// `--dry-run` mode, where only the preview/index side effects happen).
async fn forward_with_preview(
    mut analyzed_rx: tokio::sync::mpsc::Receiver<FileRecord>,
    transform_tx: tokio::sync::mpsc::Sender<FileRecord>,
    log_tx: tokio::sync::mpsc::Sender<LogEntry>,
    dry_run: bool,
    index_path: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    while let Some(record) = analyzed_rx.recv().await {
        if let Some(index_path) = &index_path {
            index::append(index_path, &record.input.canonical_path, &record.tracks)
                .await
                .with_context(|| format!("appending {} to the index file", record.input.canonical_path.display()))?;
        }

        if dry_run {
            render_preview(&record);
            let log_entry = LogEntry {
                source: record.input.canonical_path.display().to_string(),
                lines: record.log.clone(),
            };
            if log_tx.send(log_entry).await.is_err() {
                break;
            }
            continue;
        }

        if transform_tx.send(record).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Two-column before/after diff of every track's destination and tags
/// (§4.5 step 9), printed directly to stdout — this is the human-facing
/// preview surface, not a log line.
fn render_preview(record: &FileRecord) {
    println!("{}", record.input.canonical_path.display());
    for track in &record.tracks {
        println!("  -> {}", track.output.destination.display());
        for (key, value) in &track.output.tags.0 {
            println!("     {key} = {value}");
        }
    }
}
