// Common data models for the acquisition pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::selection::SelectionState;

/// What a representation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentationKind {
    VideoOnly,
    AudioOnly,
    Combined,
    Subtitle,
    Thumbnail,
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoOnly => write!(f, "video-only"),
            Self::AudioOnly => write!(f, "audio-only"),
            Self::Combined => write!(f, "combined"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// One selectable, fetchable stream or track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    /// Opaque id as given by the extractor (format id, language, tier name)
    pub id: String,
    /// Container / file extension (mp4, webm, m4a, vtt, jpg)
    pub container: String,
    pub kind: RepresentationKind,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    /// Audio bitrate in kbps
    pub audio_bitrate: Option<f32>,
    pub language_tag: Option<String>,
    pub is_dubbed: bool,
    /// Free-text label surfaced to the user
    pub note: String,
    /// Direct URL, only for representations fetched without the extractor
    pub url: Option<String>,
}

impl Representation {
    /// Human-readable label, e.g. "mp4 1080p 30fps avc1"
    pub fn label(&self) -> String {
        let mut label = self.container.clone();
        if !self.note.is_empty() {
            label.push(' ');
            label.push_str(&self.note);
        }
        if let Some(height) = self.height {
            label.push_str(&format!(" {}p", height));
        }
        if let Some(fps) = self.frame_rate {
            label.push_str(&format!(" {}fps", fps));
        }
        if let Some(abr) = self.audio_bitrate {
            label.push_str(&format!(" audio:{}kbps", abr));
        }
        if let Some(lang) = &self.language_tag {
            label.push_str(&format!(" [{}]", lang));
        }
        if self.kind == RepresentationKind::VideoOnly {
            label.push_str(" (no audio)");
        }
        label
    }
}

/// Representations of one resource, partitioned by axis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Representations {
    pub video_only: Vec<Representation>,
    pub audio_only: Vec<Representation>,
    pub combined: Vec<Representation>,
    pub dubbed_audio: Vec<Representation>,
    pub subtitles: Vec<Representation>,
    pub thumbnails: Vec<Representation>,
    /// Raw format ids that carry no media (storyboards)
    pub skipped: Vec<String>,
}

impl Representations {
    /// Look up any stream/track by id, searching every axis
    pub fn find(&self, id: &str) -> Option<&Representation> {
        self.video_only
            .iter()
            .chain(&self.audio_only)
            .chain(&self.combined)
            .chain(&self.dubbed_audio)
            .chain(&self.subtitles)
            .chain(&self.thumbnails)
            .find(|r| r.id == id)
    }

    pub fn stream_count(&self) -> usize {
        self.video_only.len() + self.audio_only.len() + self.combined.len() + self.dubbed_audio.len()
    }
}

/// One resolved item in the download queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub source_url: String,
    pub title: String,
    /// Extractor-side id (e.g. the YouTube video id)
    pub resource_id: String,
    pub representations: Representations,
    pub selection: SelectionState,
}

impl ResourceEntry {
    /// URL of the chosen (or best) thumbnail, for history records
    pub fn thumbnail_url(&self) -> Option<&str> {
        let chosen = self
            .selection
            .thumbnail()
            .and_then(|id| self.representations.thumbnails.iter().find(|t| t.id == id))
            .or_else(|| self.representations.thumbnails.first());
        chosen.and_then(|t| t.url.as_deref())
    }
}

/// Raw format as reported by the extractor (`yt-dlp --dump-json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    pub format_id: String,
    pub ext: String,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    pub abr: Option<f32>,
    pub tbr: Option<f32>,
    pub language: Option<String>,
    pub format_note: Option<String>,
}

impl RawFormat {
    fn codec_present(codec: &Option<String>) -> Option<bool> {
        codec.as_deref().map(|c| !c.is_empty() && c != "none")
    }

    pub fn has_video(&self) -> Option<bool> {
        Self::codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> Option<bool> {
        Self::codec_present(&self.acodec)
    }
}

/// One offered subtitle file for a language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSubtitle {
    pub ext: String,
    pub url: Option<String>,
    pub name: Option<String>,
}

/// Extractor response for one URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResource {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub formats: Vec<RawFormat>,
    pub subtitles: BTreeMap<String, Vec<RawSubtitle>>,
}

/// Role of a fetched file inside a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackRole {
    Video,
    Audio,
    Dub,
    Subtitle,
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Dub => write!(f, "dub"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// What a fetch task transfers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchSource {
    /// A stream representation, fetched through the extractor
    Stream { representation_id: String },
    /// A subtitle track, fetched through the extractor
    Subtitle { language: String, format: String },
    /// A thumbnail tier, fetched over plain HTTP
    Thumbnail { tier: String, url: String },
}

impl FetchSource {
    /// Representation half of the in-flight key
    pub fn representation_key(&self) -> String {
        match self {
            Self::Stream { representation_id } => representation_id.clone(),
            Self::Subtitle { language, format } => format!("subtitle:{}.{}", language, format),
            Self::Thumbnail { tier, .. } => format!("thumbnail:{}", tier),
        }
    }
}

/// (resource identity, representation) pair; at most one fetch in flight per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub resource: String,
    pub representation: String,
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.resource, self.representation)
    }
}

/// One unit of work for the FetchExecutor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTask {
    pub id: Uuid,
    pub resource_url: String,
    pub source: FetchSource,
    pub destination: PathBuf,
}

impl FetchTask {
    pub fn new(resource_url: impl Into<String>, source: FetchSource, destination: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_url: resource_url.into(),
            source,
            destination,
        }
    }

    pub fn stream(resource_url: impl Into<String>, representation_id: impl Into<String>, destination: PathBuf) -> Self {
        Self::new(
            resource_url,
            FetchSource::Stream {
                representation_id: representation_id.into(),
            },
            destination,
        )
    }

    pub fn key(&self) -> FetchKey {
        FetchKey {
            resource: self.resource_url.clone(),
            representation: self.source.representation_key(),
        }
    }
}

/// Lifecycle of a fetch task: pending -> running -> done | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchState {
    Pending,
    Running,
    Done,
    Failed,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Transfer progress, every field only when known
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchProgress {
    pub percent: Option<f32>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub bytes_per_second: Option<u64>,
}

/// Events emitted by the FetchExecutor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FetchEvent {
    State { task: Uuid, state: FetchState },
    /// Task joined a transfer already in flight for the same key
    Attached { task: Uuid, to: Uuid },
    Progress { task: Uuid, progress: FetchProgress },
}

/// How the fetched tracks become the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Single fetch, the fetched file is the output
    Direct,
    /// Video stream of the primary + audio stream of the secondary
    Mux,
    /// Combined primary whose audio track is replaced by the dub
    ReplaceAudio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTrack {
    pub role: TrackRole,
    pub task: FetchTask,
}

/// Fetch + combine plan for one download invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    pub title: String,
    pub tracks: Vec<PlannedTrack>,
    pub mode: MergeMode,
    /// Roles fed to the combination step, primary first
    pub merge_roles: Vec<TrackRole>,
    pub output: PathBuf,
}

impl MergePlan {
    pub fn tasks(&self) -> Vec<FetchTask> {
        self.tracks.iter().map(|t| t.task.clone()).collect()
    }

    pub fn track(&self, role: TrackRole) -> Option<&PlannedTrack> {
        self.tracks.iter().find(|t| t.role == role)
    }

    /// Every fetched path other than the final output
    pub fn intermediates(&self) -> Vec<PathBuf> {
        self.tracks
            .iter()
            .map(|t| t.task.destination.clone())
            .filter(|p| *p != self.output)
            .collect()
    }
}
