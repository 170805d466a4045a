use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Context;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::fetcher::{FetchedMedia, Fetcher};

/// [`Fetcher`] that shells out to `yt-dlp`.
///
/// Downloads into the session work directory as `[<id>].<ext>` and reads the
/// final info JSON from stdout.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlpFetcher {
    const OUTPUT_TEMPLATE: &str = "[%(id)s].%(ext)s";

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Fails early when the executable cannot be run at all
    pub async fn ensure_available(&self) -> anyhow::Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("{} is not available", self.program.display()))?;

        anyhow::ensure!(
            status.success(),
            "{} --version exited with {status}",
            self.program.display()
        );
        Ok(())
    }
}

impl Fetcher for YtDlpFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str, workdir: &Path) -> anyhow::Result<FetchedMedia> {
        let output_template = workdir.join(Self::OUTPUT_TEMPLATE);

        let output = Command::new(&self.program)
            .arg("--no-simulate")
            .arg("--dump-single-json")
            .arg("--no-progress")
            .arg("--no-playlist")
            .arg("-o")
            .arg(&output_template)
            .arg(url)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .inspect_err(|e| tracing::error!(error = ?e, "Failed to spawn yt-dlp"))
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, stderr = %stderr.trim(), "yt-dlp failed");
            anyhow::bail!("yt-dlp exited with {}: {}", output.status, stderr.trim());
        }

        let metadata: Map<String, Value> =
            serde_json::from_slice(&output.stdout).context("yt-dlp printed invalid info json")?;

        let media_path = downloaded_file_path(&metadata)
            .context("yt-dlp info json does not name a downloaded file")?;
        if !media_path.exists() {
            anyhow::bail!(
                "yt-dlp did not produce expected file: {}",
                media_path.display()
            );
        }

        Ok(FetchedMedia {
            media_path,
            metadata,
        })
    }
}

/// Location of the merged download as reported in the info json
fn downloaded_file_path(info: &Map<String, Value>) -> Option<PathBuf> {
    info.get("requested_downloads")
        .and_then(|downloads| downloads.get(0))
        .and_then(|download| download.get("filepath"))
        .or_else(|| info.get("filepath"))
        .or_else(|| info.get("_filename"))
        .and_then(Value::as_str)
        .map(PathBuf::from)
}
