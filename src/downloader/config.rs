// Downloader configuration
//
// Loaded from <config_dir>/sakura-downloader/config.json when present,
// then overridden by SAKURA_* environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const APP_DIR: &str = "sakura-downloader";

/// One rung of the thumbnail ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailTier {
    /// File name stem on the thumbnail host (e.g. "maxresdefault")
    pub name: String,
    /// Display resolution (e.g. "1920x1080")
    pub resolution: String,
    pub height: u32,
}

impl ThumbnailTier {
    fn new(name: &str, resolution: &str, height: u32) -> Self {
        Self {
            name: name.to_string(),
            resolution: resolution.to_string(),
            height,
        }
    }
}

/// Note fragment that marks an audio format as dubbed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DubMarker {
    /// Matched case-insensitively against the format note
    pub marker: String,
    /// Language implied by the marker, when the marker is language specific
    pub language: Option<String>,
}

impl DubMarker {
    fn new(marker: &str, language: Option<&str>) -> Self {
        Self {
            marker: marker.to_string(),
            language: language.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Explicit yt-dlp binary; auto-detected when None
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// yt-dlp socket timeout and resolve timeout, seconds
    pub timeout_seconds: u32,
    /// Thumbnail existence probe timeout, milliseconds
    pub probe_timeout_ms: u64,
    /// Worker pool size for transfers and background jobs
    pub max_concurrent_fetches: usize,
    pub output_dir: PathBuf,
    pub history_path: PathBuf,
    pub history_limit: usize,
    /// `{id}` and `{name}` are substituted
    pub thumbnail_url_template: String,
    /// Largest first
    pub thumbnail_tiers: Vec<ThumbnailTier>,
    /// Bodies starting with any of these prefixes are placeholder images
    pub placeholder_prefixes: Vec<Vec<u8>>,
    pub dub_markers: Vec<DubMarker>,
    pub subtitle_format: String,
    /// Cooperative cancellation of running fetches
    pub cancellation_enabled: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            proxy: None,
            cookies_path: None,
            timeout_seconds: 30,
            probe_timeout_ms: 3000,
            max_concurrent_fetches: 4,
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            history_path: data_dir.join("history").join("history.json"),
            history_limit: 10,
            thumbnail_url_template: "https://img.youtube.com/vi/{id}/{name}.jpg".to_string(),
            thumbnail_tiers: vec![
                ThumbnailTier::new("maxresdefault", "1920x1080", 1080),
                ThumbnailTier::new("sddefault", "1280x720", 720),
                ThumbnailTier::new("hqdefault", "640x480", 480),
                ThumbnailTier::new("mqdefault", "320x180", 180),
                ThumbnailTier::new("default", "120x90", 90),
            ],
            placeholder_prefixes: vec![vec![0x00, 0x00, 0x00]],
            dub_markers: vec![
                DubMarker::new("dubbed", None),
                DubMarker::new("дубляж", Some("ru")),
                DubMarker::new("дублированный", Some("ru")),
                DubMarker::new("doblado", Some("es")),
                DubMarker::new("doublé", Some("fr")),
                DubMarker::new("synchronisiert", Some("de")),
                DubMarker::new("dublado", Some("pt")),
                DubMarker::new("doppiato", Some("it")),
                DubMarker::new("吹き替え", Some("ja")),
                DubMarker::new("더빙", Some("ko")),
            ],
            subtitle_format: "vtt".to_string(),
            cancellation_enabled: false,
        }
    }
}

impl DownloaderConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
    }

    /// Read the config file (if any) and apply environment overrides
    pub fn load() -> Self {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!("[Config] Ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| format!("read failed: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("invalid JSON: {}", e))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("SAKURA_YTDLP") {
            self.ytdlp_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("SAKURA_FFMPEG") {
            self.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("SAKURA_FFPROBE") {
            self.ffprobe_path = Some(PathBuf::from(path));
        }
        if let Ok(proxy) = std::env::var("SAKURA_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy);
            }
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n.max(1);
        self
    }

    pub fn with_cancellation(mut self, enabled: bool) -> Self {
        self.cancellation_enabled = enabled;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn thumbnail_url(&self, resource_id: &str, tier: &ThumbnailTier) -> String {
        self.thumbnail_url_template
            .replace("{id}", resource_id)
            .replace("{name}", &tier.name)
    }

    /// Language of the first dub marker found in `note`
    pub fn match_dub_marker(&self, note: &str) -> Option<&DubMarker> {
        let note = note.to_lowercase();
        self.dub_markers
            .iter()
            .find(|m| note.contains(&m.marker.to_lowercase()))
    }
}
