// Error types for the acquisition pipeline

use std::path::PathBuf;

use thiserror::Error;

use super::models::TrackRole;
use super::selection::SelectionAxis;

/// Why the extractor could not enumerate representations for a URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionCause {
    /// Network timeout while talking to the site
    #[error("network timeout: the site is not responding")]
    NetworkTimeout,

    /// Site refused the request (429, bot detection, geo or private)
    #[error("content unavailable: {0}")]
    Unavailable(String),

    /// yt-dlp binary not found
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// URL not recognised by the extractor
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Extractor output could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Extractor succeeded but returned nothing fetchable
    #[error("no formats returned")]
    NoFormats,

    #[error("{0}")]
    Other(String),
}

impl ResolutionCause {
    /// Classify raw extractor diagnostics
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429")
            || lower.contains("bot")
            || lower.contains("blocked")
            || lower.contains("not available in your country")
            || lower.contains("private video")
            || lower.contains("video unavailable")
        {
            return Self::Unavailable(message.trim().to_string());
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(message.trim().to_string());
        }

        if lower.contains("unsupported url") || lower.contains("invalid url") || lower.contains("is not a valid url") {
            return Self::InvalidUrl(message.trim().to_string());
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::Parse(message.trim().to_string());
        }

        Self::Other(message.trim().to_string())
    }
}

/// Cannot enumerate representations for a URL
#[derive(Debug, Clone, Error)]
#[error("could not resolve {url}: {cause}")]
pub struct ResolutionError {
    pub url: String,
    pub cause: ResolutionCause,
}

impl ResolutionError {
    pub fn new(url: impl Into<String>, cause: ResolutionCause) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }
}

/// Axis/id mismatch. Unreachable through a correct UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSelectionError {
    #[error("representation '{id}' is not available on the {axis} axis")]
    UnknownId { axis: SelectionAxis, id: String },

    #[error("an audio-only track is required while video-only '{video}' is selected")]
    AudioRequired { video: String },

    #[error("nothing selected to download for '{title}'")]
    NothingSelected { title: String },
}

/// Failure of a single fetch task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("failed to write {path}: {message}")]
    Disk { path: PathBuf, message: String },

    #[error("capability reported failure: {0}")]
    Capability(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn disk(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Disk {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Classify stderr of a failed transfer
    pub fn from_diagnostic(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection reset")
            || lower.contains("unable to download")
            || lower.contains("http error")
        {
            return Self::Network(message.trim().to_string());
        }
        if lower.contains("no space left") || lower.contains("permission denied") {
            return Self::Disk {
                path: PathBuf::new(),
                message: message.trim().to_string(),
            };
        }
        Self::Capability(message.trim().to_string())
    }
}

/// External combination capability failed or was not found
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("external tool is missing: {tool}")]
    ToolMissing { tool: String },

    #[error("{tool} failed (code={code:?}):\n{diagnostic}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("merge input for {role} is missing: {path}")]
    MissingInput { role: TrackRole, path: PathBuf },

    #[error("merge plan has no {0} track")]
    IncompletePlan(TrackRole),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for one download invocation
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Selection(#[from] InvalidSelectionError),

    #[error("{} of {total} fetch task(s) failed: {first}", .failures.len())]
    Fetch {
        total: usize,
        failures: Vec<FetchError>,
        first: FetchError,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl DownloadError {
    pub fn from_failures(total: usize, failures: Vec<FetchError>) -> Option<Self> {
        let first = failures.first()?.clone();
        Some(Self::Fetch {
            total,
            failures,
            first,
        })
    }
}

/// Queue bookkeeping errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("{0} is already in the queue")]
    Duplicate(String),

    #[error("{0} is not in the queue")]
    UnknownUrl(String),

    #[error("{0} is already downloading")]
    AlreadyDownloading(String),

    #[error(transparent)]
    Selection(#[from] InvalidSelectionError),
}

/// Recent-URL file could not be read or written
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
