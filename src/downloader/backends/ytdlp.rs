// yt-dlp extraction capability
//
// resolve:         yt-dlp --dump-json (one round trip, parsed into RawResource)
// fetch:           yt-dlp -f <id> --newline, stdout parsed for progress
// fetch_subtitles: yt-dlp --skip-download --write-subs, renamed into place

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use uuid::Uuid;

use crate::downloader::config::DownloaderConfig;
use crate::downloader::errors::{FetchError, ResolutionCause};
use crate::downloader::models::{FetchProgress, RawResource};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{ExtractionCapability, ProgressEmitter};
use crate::downloader::utils::{network_args, parse_size, run_output_with_timeout, tail_lines};

/// Metadata extraction is slower than a single socket read
const RESOLVE_TIMEOUT_FACTOR: u64 = 4;
const DIAGNOSTIC_LINES: usize = 20;

pub struct YtDlpExtractor {
    ytdlp_path: PathBuf,
    config: Arc<DownloaderConfig>,
}

impl YtDlpExtractor {
    pub fn new(config: Arc<DownloaderConfig>) -> Self {
        let ytdlp_path = ToolManager::new(&config).resolve(ToolType::YtDlp);
        Self { ytdlp_path, config }
    }

    fn resolve_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(network_args(&self.config));
        args.push(url.to_string());
        args
    }

    fn fetch_args(&self, url: &str, representation_id: &str, destination: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            representation_id.to_string(),
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "--no-continue".to_string(),
            "--no-warnings".to_string(),
            "-o".to_string(),
            destination.to_string_lossy().to_string(),
        ];
        args.extend(network_args(&self.config));
        args.push(url.to_string());
        args
    }

    fn subtitle_args(&self, url: &str, language: &str, format: &str, template: &Path) -> Vec<String> {
        let mut args = vec![
            "--skip-download".to_string(),
            "--write-subs".to_string(),
            "--sub-langs".to_string(),
            language.to_string(),
            "--sub-format".to_string(),
            format!("{}/best", format),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        args.extend(network_args(&self.config));
        args.push(url.to_string());
        args
    }

    fn timeout_secs(&self) -> u64 {
        u64::from(self.config.timeout_seconds).saturating_mul(RESOLVE_TIMEOUT_FACTOR)
    }

    fn spawn_error(&self, e: std::io::Error) -> FetchError {
        match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::ToolNotFound(self.ytdlp_path.display().to_string()),
            _ => FetchError::Capability(format!("Failed to start yt-dlp: {}", e)),
        }
    }
}

#[async_trait]
impl ExtractionCapability for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<RawResource, ResolutionCause> {
        let args = self.resolve_args(url);
        tracing::debug!("[YtDlp] {} {}", self.ytdlp_path.display(), args.join(" "));

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.timeout_secs())
            .await
            .map_err(|e| {
                if e.starts_with("Timed out") {
                    ResolutionCause::NetworkTimeout
                } else if e.starts_with("Failed to start") {
                    ResolutionCause::ToolNotFound(e)
                } else {
                    ResolutionCause::Other(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!("[YtDlp] Resolve failed for {}: {}", url, tail_lines(&stderr, 3));
            return Err(ResolutionCause::classify(&stderr));
        }

        let raw: RawResource = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolutionCause::Parse(format!("Invalid JSON: {}", e)))?;
        tracing::info!("[YtDlp] Resolved '{}' with {} raw format(s)", raw.title, raw.formats.len());
        Ok(raw)
    }

    async fn fetch(
        &self,
        url: &str,
        representation_id: &str,
        destination: &Path,
        progress: &ProgressEmitter,
    ) -> Result<(), FetchError> {
        let args = self.fetch_args(url, representation_id, destination);
        tracing::debug!("[YtDlp] {} {}", self.ytdlp_path.display(), args.join(" "));

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Capability("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Capability("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    tracing::debug!(target: "yt-dlp:stderr", "{}", line.trim());
                    collected.push(line);
                }
            }
            collected.join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        let read_result: Result<(), FetchError> = loop {
            if progress.is_cancelled() {
                break Err(FetchError::Cancelled);
            }
            tokio::select! {
                biased;

                _ = progress.cancelled() => break Err(FetchError::Cancelled),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(update) = parse_progress(&line) {
                            progress.emit(update);
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(FetchError::Capability(format!("Failed to read stdout: {}", e))),
                },
            }
        };

        if let Err(e) = read_result {
            if e == FetchError::Cancelled {
                tracing::info!("[YtDlp] Cancelled fetch of {}#{}", url, representation_id);
            }
            let _ = child.kill().await;
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(e);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::Capability(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(FetchError::from_diagnostic(&tail_lines(&stderr_output, DIAGNOSTIC_LINES)))
        }
    }

    async fn fetch_subtitles(
        &self,
        url: &str,
        language: &str,
        format: &str,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let dir = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = format!(".sub-{}", Uuid::new_v4().simple());
        let args = self.subtitle_args(url, language, format, &dir.join(&stem));
        tracing::debug!("[YtDlp] {} {}", self.ytdlp_path.display(), args.join(" "));

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.timeout_secs())
            .await
            .map_err(|e| {
                if e.starts_with("Failed to start") {
                    FetchError::ToolNotFound(e)
                } else {
                    FetchError::Network(e)
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::from_diagnostic(&tail_lines(&stderr, DIAGNOSTIC_LINES)));
        }

        // yt-dlp appends ".<lang>.<ext>" to the template; ext may differ from the request
        let mut produced = None;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| FetchError::disk(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| FetchError::disk(&dir, e))? {
            if entry.file_name().to_string_lossy().starts_with(&stem) {
                produced = Some(entry.path());
                break;
            }
        }
        let produced = produced.ok_or_else(|| {
            FetchError::Capability(format!("no '{}' subtitles were written for {}", language, url))
        })?;

        tokio::fs::rename(&produced, destination)
            .await
            .map_err(|e| FetchError::disk(destination, e))
    }
}

/// Parse one `--newline` progress line
///
/// [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
/// [download] 100% of   10.00MiB in 00:00:03 at 3.10MiB/s
pub fn parse_progress(line: &str) -> Option<FetchProgress> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:.*?\s+at\s+(\d+\.?\d*\s*\w+)/s)?"
        ).unwrap();
    }

    let caps = PROGRESS_RE.captures(line)?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    let total_bytes = caps.get(2).and_then(|m| parse_size(m.as_str()));
    let bytes_per_second = caps.get(3).and_then(|m| parse_size(m.as_str()));

    Some(FetchProgress {
        percent: Some(percent),
        downloaded_bytes: total_bytes.map(|t| (t as f64 * f64::from(percent) / 100.0) as u64),
        total_bytes,
        bytes_per_second,
    })
}
