// External tool discovery (yt-dlp, ffmpeg, ffprobe)

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::config::DownloaderConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
        }
    }

    fn configured<'a>(&self, config: &'a DownloaderConfig) -> Option<&'a PathBuf> {
        match self {
            ToolType::YtDlp => config.ytdlp_path.as_ref(),
            ToolType::Ffmpeg => config.ffmpeg_path.as_ref(),
            ToolType::Ffprobe => config.ffprobe_path.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

pub struct ToolManager<'a> {
    config: &'a DownloaderConfig,
}

impl<'a> ToolManager<'a> {
    pub fn new(config: &'a DownloaderConfig) -> Self {
        Self { config }
    }

    /// Path to invoke: configured, detected, or the bare name for PATH lookup
    pub fn resolve(&self, tool_type: ToolType) -> PathBuf {
        if let Some(path) = tool_type.configured(self.config) {
            return path.clone();
        }
        self.detect(tool_type)
            .unwrap_or_else(|| PathBuf::from(tool_type.as_str()))
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = tool_type
            .configured(self.config)
            .cloned()
            .or_else(|| self.detect(tool_type));
        let version = path.as_deref().and_then(|p| Self::get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
            self.get_tool_info(ToolType::Ffprobe),
        ]
    }

    fn detect(&self, tool_type: ToolType) -> Option<PathBuf> {
        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(PathBuf::from(path));
            }
        }

        // 2. Try PATH
        let finder = if cfg!(windows) { "where" } else { "which" };
        if let Ok(output) = Command::new(finder).arg(binary_name).output() {
            if output.status.success() {
                let found = String::from_utf8_lossy(&output.stdout);
                if let Some(first) = found.lines().map(str::trim).find(|l| !l.is_empty()) {
                    return Some(PathBuf::from(first));
                }
            }
        }

        None
    }

    fn get_version(path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                // ffmpeg prints a banner; the first line carries the version
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins() {
        let mut config = DownloaderConfig::default();
        config.ffmpeg_path = Some(PathBuf::from("/opt/tools/ffmpeg"));
        let manager = ToolManager::new(&config);
        assert_eq!(manager.resolve(ToolType::Ffmpeg), PathBuf::from("/opt/tools/ffmpeg"));
    }

    #[test]
    fn missing_configured_tool_is_unavailable() {
        let mut config = DownloaderConfig::default();
        config.ytdlp_path = Some(PathBuf::from("/definitely/not/here/yt-dlp"));
        let info = ToolManager::new(&config).get_tool_info(ToolType::YtDlp);
        assert!(!info.is_available);
        assert_eq!(info.name, "yt-dlp");
    }
}
