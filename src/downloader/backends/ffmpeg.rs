// ffmpeg / ffprobe combination capability

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;

use crate::downloader::config::DownloaderConfig;
use crate::downloader::errors::MergeError;
use crate::downloader::models::TrackRole;
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::MediaCombinationCapability;

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

pub struct FfmpegCombiner {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegCombiner {
    pub fn new(config: &DownloaderConfig) -> Self {
        let tools = ToolManager::new(config);
        Self {
            ffmpeg_path: tools.resolve(ToolType::Ffmpeg),
            ffprobe_path: tools.resolve(ToolType::Ffprobe),
        }
    }

    /// Video of the first input, audio of the second, streams copied
    fn combine_args(inputs: &[(TrackRole, &Path)], output: &Path) -> Vec<String> {
        let mut args = vec!["-nostdin".to_string(), "-y".to_string()];
        for (_, path) in inputs {
            args.push("-i".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        args.extend(
            ["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(output.to_string_lossy().to_string());
        args
    }

    async fn output(&self, tool: ToolType, program: &Path, args: &[String]) -> Result<std::process::Output, MergeError> {
        tracing::debug!("[Ffmpeg] {} {}", program.display(), args.join(" "));
        TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MergeError::ToolMissing {
                    tool: tool.as_str().to_string(),
                },
                _ => MergeError::Io(e),
            })
    }
}

fn failed(tool: ToolType, output: &std::process::Output) -> MergeError {
    MergeError::ToolFailed {
        tool: tool.as_str().to_string(),
        code: output.status.code(),
        diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

fn parse_has_video(stdout: &[u8]) -> Result<bool, MergeError> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| MergeError::ToolFailed {
        tool: ToolType::Ffprobe.as_str().to_string(),
        code: None,
        diagnostic: format!("unreadable probe output: {}", e),
    })?;
    Ok(parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video")))
}

#[async_trait]
impl MediaCombinationCapability for FfmpegCombiner {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn has_video_stream(&self, input: &Path) -> Result<bool, MergeError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v".to_string(),
            "-show_entries".to_string(),
            "stream=codec_type".to_string(),
            "-of".to_string(),
            "json".to_string(),
            input.to_string_lossy().to_string(),
        ];
        let output = self.output(ToolType::Ffprobe, &self.ffprobe_path, &args).await?;
        if !output.status.success() {
            return Err(failed(ToolType::Ffprobe, &output));
        }
        parse_has_video(&output.stdout)
    }

    async fn run(&self, inputs: &[(TrackRole, &Path)], output: &Path) -> Result<(), MergeError> {
        let args = Self::combine_args(inputs, output);
        let result = self.output(ToolType::Ffmpeg, &self.ffmpeg_path, &args).await?;
        if !result.status.success() {
            return Err(failed(ToolType::Ffmpeg, &result));
        }
        Ok(())
    }
}
