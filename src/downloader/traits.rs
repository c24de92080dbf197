// External capability traits

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::{FetchError, MergeError, ResolutionCause};
use super::models::{FetchEvent, FetchProgress, RawResource, TrackRole};

/// Metadata extraction and stream fetching (yt-dlp)
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Name of the capability (for logging)
    fn name(&self) -> &'static str;

    /// One network round trip: title, id, raw formats, subtitles
    async fn resolve(&self, url: &str) -> Result<RawResource, ResolutionCause>;

    /// Stream one representation to `destination`
    async fn fetch(
        &self,
        url: &str,
        representation_id: &str,
        destination: &Path,
        progress: &ProgressEmitter,
    ) -> Result<(), FetchError>;

    async fn fetch_subtitles(
        &self,
        url: &str,
        language: &str,
        format: &str,
        destination: &Path,
    ) -> Result<(), FetchError>;
}

/// Remux step (ffmpeg / ffprobe)
#[async_trait]
pub trait MediaCombinationCapability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `input` carries at least one video stream
    async fn has_video_stream(&self, input: &Path) -> Result<bool, MergeError>;

    /// Combine `inputs` into `output`; the error carries the tool diagnostic verbatim
    async fn run(&self, inputs: &[(TrackRole, &Path)], output: &Path) -> Result<(), MergeError>;
}

/// Lightweight thumbnail existence check and download
#[async_trait]
pub trait ThumbnailProbe: Send + Sync {
    async fn exists(&self, url: &str) -> bool;

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

/// Progress emitter helper bound to one fetch task
#[derive(Clone)]
pub struct ProgressEmitter {
    task: Uuid,
    events: Option<UnboundedSender<FetchEvent>>,
    cancel: Option<CancellationToken>,
}

impl ProgressEmitter {
    pub fn new(task: Uuid, events: Option<UnboundedSender<FetchEvent>>, cancel: Option<CancellationToken>) -> Self {
        Self { task, events, cancel }
    }

    /// Emitter that drops every event
    pub fn detached() -> Self {
        Self::new(Uuid::nil(), None, None)
    }

    pub fn task(&self) -> Uuid {
        self.task
    }

    pub fn emit(&self, progress: FetchProgress) {
        if let Some(tx) = &self.events {
            let _ = tx.send(FetchEvent::Progress {
                task: self.task,
                progress,
            });
        }
    }

    /// Cooperative cancellation check between chunks
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |c| c.is_cancelled())
    }

    /// Resolves when cancellation is requested; pending forever when disabled
    pub async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
