use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clip_harvest::{
    source::path_component, tracing::init_tracing_subscriber, ArchiveSessionBuilder, ExportLists,
    ProgressEvent, ProgressSink, YtDlpFetcher,
};
use clip_store::{FsSidecarStore, SidecarStore};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "clip-harvest", about = "Archive the videos referenced by an account export")]
struct Cli {
    /// Root directory of the archive
    #[arg(long, env = "MEDIA_ROOT", default_value = "media")]
    media_root: PathBuf,

    /// Where per-run work directories are created (defaults to the system temp dir)
    #[arg(long, env = "CLIP_HARVEST_WORKDIR")]
    workdir_parent: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long = "yt-dlp", env = "YTDLP_PATH", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Give up on a single fetch after this many seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS")]
    fetch_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every video referenced by an export file
    Archive {
        /// Exported account data (json)
        #[arg(long)]
        export: PathBuf,

        /// Wipe the archive root before downloading
        #[arg(long)]
        fresh: bool,

        /// Delete the export file once the run is over
        #[arg(long)]
        remove_export: bool,

        /// Print progress as `text/event-stream` frames
        #[arg(long)]
        sse: bool,
    },
    /// List archived videos of a folder (e.g. `liked`, `chats/alice`), newest first
    Feed { folder: PathBuf },
    /// List recipients with a stored chat transcript
    Chats,
    /// Show the transcript of one chat next to the videos archived from it
    Chat { recipient: String },
}

struct Config {
    media_root: PathBuf,
    workdir_parent: Option<PathBuf>,
    yt_dlp: PathBuf,
    fetch_timeout: Option<Duration>,
}

async fn run_archive(
    config: &Config,
    export_path: &Path,
    fresh: bool,
    sse: bool,
) -> anyhow::Result<()> {
    let store = FsSidecarStore::new(&config.media_root);
    let fetcher = YtDlpFetcher::new(&config.yt_dlp);
    fetcher.ensure_available().await?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current record");
            ctrl_c_cancel.cancel();
        }
    });

    let (sink, mut events) = ProgressSink::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if sse {
                print!("{}", event.to_sse_frame());
            } else {
                println!("{event}");
            }
        }
    });

    sink.emit(ProgressEvent::Started).await?;

    let outcome = async {
        let export = ExportLists::load(export_path).await?;
        if fresh {
            store.reset().await?;
        }

        let mut builder = ArchiveSessionBuilder::new()
            .fetcher(fetcher)
            .store(&store)
            .cancellation(cancel);
        if let Some(parent) = &config.workdir_parent {
            builder = builder.workdir_parent(parent);
        }
        if let Some(timeout) = config.fetch_timeout {
            builder = builder.fetch_timeout(timeout);
        }

        let mut session = builder.build();
        session.enter()?;
        let results = session.archive_export(&export, &sink).await;
        session.exit();

        anyhow::Ok(results?)
    }
    .await;

    if let Err(e) = &outcome {
        tracing::error!(error = ?e, "Archive run failed");
        let _ = sink
            .emit(ProgressEvent::Aborted {
                reason: format!("{e:#}"),
            })
            .await;
    }
    drop(sink);
    printer.await.context("Progress printer panicked")?;

    let results = outcome?;
    let (success, total) = results
        .iter()
        .fold((0, 0), |(s, t), r| (s + r.success, t + r.total));
    tracing::info!(lists = results.len(), success, total, "Archive run finished");

    Ok(())
}

async fn run_feed(config: &Config, folder: &Path) -> anyhow::Result<()> {
    let store = FsSidecarStore::new(&config.media_root);
    for video in store.list_records(folder).await? {
        println!("{}", serde_json::to_string(&video)?);
    }
    Ok(())
}

async fn run_chats(config: &Config) -> anyhow::Result<()> {
    let store = FsSidecarStore::new(&config.media_root);
    for recipient in store.list_transcripts().await? {
        println!("{recipient}");
    }
    Ok(())
}

async fn run_chat(config: &Config, recipient: &str) -> anyhow::Result<()> {
    let store = FsSidecarStore::new(&config.media_root);
    for entry in store.read_chat(&path_component(recipient)).await? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let _guard = sentry::init((
        std::env::var("SENTRY_DSN").unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ));

    let cli = Cli::parse();
    init_tracing_subscriber()?;

    let config = Config {
        media_root: cli.media_root,
        workdir_parent: cli.workdir_parent,
        yt_dlp: cli.yt_dlp,
        fetch_timeout: cli.fetch_timeout.map(Duration::from_secs),
    };

    match cli.command {
        Command::Archive {
            export,
            fresh,
            remove_export,
            sse,
        } => {
            tracing::info!(
                export = ?export,
                media_root = ?config.media_root,
                "Archiving export..."
            );
            let result = run_archive(&config, &export, fresh, sse).await;

            if remove_export {
                if let Err(e) = tokio::fs::remove_file(&export).await {
                    tracing::warn!(error = ?e, path = ?export, "Failed to remove export file");
                }
            }
            result?;
        }
        Command::Feed { folder } => run_feed(&config, &folder).await?,
        Command::Chats => run_chats(&config).await?,
        Command::Chat { recipient } => run_chat(&config, &recipient).await?,
    }

    Ok(())
}
