// Test helpers: representation builders and in-memory capabilities

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::{FetchError, MergeError, ResolutionCause};
use super::models::{
    FetchProgress, RawFormat, RawResource, Representation, RepresentationKind, Representations,
    ResourceEntry, TrackRole,
};
use super::selection::SelectionState;
use super::traits::{ExtractionCapability, MediaCombinationCapability, ProgressEmitter, ThumbnailProbe};

fn rep(id: &str, container: &str, kind: RepresentationKind) -> Representation {
    Representation {
        id: id.to_string(),
        container: container.to_string(),
        kind,
        height: None,
        frame_rate: None,
        audio_bitrate: None,
        language_tag: None,
        is_dubbed: false,
        note: String::new(),
        url: None,
    }
}

pub fn video(id: &str, height: u32) -> Representation {
    Representation {
        height: Some(height),
        ..rep(id, "mp4", RepresentationKind::VideoOnly)
    }
}

pub fn audio(id: &str, bitrate: f32) -> Representation {
    Representation {
        audio_bitrate: Some(bitrate),
        ..rep(id, "m4a", RepresentationKind::AudioOnly)
    }
}

pub fn combined(id: &str, height: u32) -> Representation {
    Representation {
        height: Some(height),
        ..rep(id, "mp4", RepresentationKind::Combined)
    }
}

pub fn dub(id: &str, language: &str) -> Representation {
    Representation {
        audio_bitrate: Some(128.0),
        language_tag: Some(language.to_string()),
        is_dubbed: true,
        note: format!("{} dubbed", language),
        ..rep(id, "m4a", RepresentationKind::AudioOnly)
    }
}

pub fn subtitle(language: &str) -> Representation {
    Representation {
        language_tag: Some(language.to_string()),
        note: language.to_string(),
        ..rep(language, "vtt", RepresentationKind::Subtitle)
    }
}

pub fn thumbnail(id: &str, resolution: &str) -> Representation {
    Representation {
        note: resolution.to_string(),
        url: Some(format!("https://img.youtube.com/vi/sakura/{}.jpg", id)),
        ..rep(id, "jpg", RepresentationKind::Thumbnail)
    }
}

pub fn entry_with(representations: Representations) -> ResourceEntry {
    ResourceEntry {
        source_url: "https://youtu.be/sakura".to_string(),
        title: "Sakura / Test".to_string(),
        resource_id: "sakura".to_string(),
        selection: SelectionState::default_for(&representations),
        representations,
    }
}

pub fn raw_video(id: &str, height: u32) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        ext: "mp4".to_string(),
        height: Some(height),
        fps: Some(30.0),
        vcodec: Some("avc1.640028".to_string()),
        acodec: Some("none".to_string()),
        ..Default::default()
    }
}

pub fn raw_audio(id: &str, bitrate: f32) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        ext: "m4a".to_string(),
        vcodec: Some("none".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        abr: Some(bitrate),
        ..Default::default()
    }
}

pub fn raw_combined(id: &str, height: u32) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        ext: "mp4".to_string(),
        height: Some(height),
        vcodec: Some("avc1.42001E".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        ..Default::default()
    }
}

/// Extractor that serves one canned resource and writes small files
#[derive(Default)]
pub struct FakeExtractor {
    resource: Option<RawResource>,
    failure: Option<ResolutionCause>,
    delay: Duration,
    failing_ids: Vec<String>,
    resolves: AtomicUsize,
    fetches: Mutex<Vec<(String, String)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeExtractor {
    pub fn with_resource(resource: RawResource) -> Self {
        Self {
            resource: Some(resource),
            ..Default::default()
        }
    }

    pub fn failing(cause: ResolutionCause) -> Self {
        Self {
            failure: Some(cause),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_ids(mut self, ids: &[&str]) -> Self {
        self.failing_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetch_count_for(&self, url: &str, id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, i)| u == url && i == id)
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionCapability for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve(&self, _url: &str) -> Result<RawResource, ResolutionCause> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(cause) = &self.failure {
            return Err(cause.clone());
        }
        Ok(self.resource.clone().unwrap_or_default())
    }

    async fn fetch(
        &self,
        url: &str,
        representation_id: &str,
        destination: &Path,
        progress: &ProgressEmitter,
    ) -> Result<(), FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((url.to_string(), representation_id.to_string()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing_ids.iter().any(|id| id == representation_id) {
            return Err(FetchError::Capability(format!(
                "Requested format {} is not available",
                representation_id
            )));
        }
        tokio::fs::write(destination, b"data")
            .await
            .map_err(|e| FetchError::disk(destination, e))?;
        progress.emit(FetchProgress {
            percent: Some(100.0),
            downloaded_bytes: Some(4),
            total_bytes: Some(4),
            bytes_per_second: None,
        });
        Ok(())
    }

    async fn fetch_subtitles(
        &self,
        url: &str,
        language: &str,
        format: &str,
        destination: &Path,
    ) -> Result<(), FetchError> {
        self.fetches
            .lock()
            .unwrap()
            .push((url.to_string(), format!("subtitle:{}.{}", language, format)));
        tokio::fs::write(destination, b"WEBVTT\n")
            .await
            .map_err(|e| FetchError::disk(destination, e))
    }
}

/// Thumbnail probe backed by a fixed set of existing URLs
pub struct FakeThumbnails {
    existing: Vec<String>,
    fetched: Mutex<Vec<String>>,
}

impl FakeThumbnails {
    pub fn existing(urls: &[&str]) -> Self {
        Self {
            existing: urls.iter().map(|s| s.to_string()).collect(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThumbnailProbe for FakeThumbnails {
    async fn exists(&self, url: &str) -> bool {
        self.existing.iter().any(|u| u == url)
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        if !self.exists(url).await {
            return Err(FetchError::Network(format!("HTTP 404 for {}", url)));
        }
        self.fetched.lock().unwrap().push(url.to_string());
        tokio::fs::write(destination, b"\xff\xd8\xff")
            .await
            .map_err(|e| FetchError::disk(destination, e))
    }
}

/// Combiner that concatenates its inputs, or fails with a fixed diagnostic
pub struct FakeCombiner {
    has_video: bool,
    failure: Option<String>,
    probes: AtomicUsize,
    runs: Mutex<Vec<Vec<TrackRole>>>,
}

impl FakeCombiner {
    pub fn with_video() -> Self {
        Self {
            has_video: true,
            failure: None,
            probes: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn without_video() -> Self {
        Self {
            has_video: false,
            ..Self::with_video()
        }
    }

    pub fn failing(mut self, diagnostic: &str) -> Self {
        self.failure = Some(diagnostic.to_string());
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> Vec<Vec<TrackRole>> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaCombinationCapability for FakeCombiner {
    fn name(&self) -> &'static str {
        "fake-mux"
    }

    async fn has_video_stream(&self, _input: &Path) -> Result<bool, MergeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_video)
    }

    async fn run(&self, inputs: &[(TrackRole, &Path)], output: &Path) -> Result<(), MergeError> {
        self.runs
            .lock()
            .unwrap()
            .push(inputs.iter().map(|(role, _)| *role).collect());
        if let Some(diagnostic) = &self.failure {
            return Err(MergeError::ToolFailed {
                tool: "fake-mux".to_string(),
                code: Some(1),
                diagnostic: diagnostic.clone(),
            });
        }
        let mut merged = Vec::new();
        for (_, path) in inputs {
            merged.extend(tokio::fs::read(path).await?);
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}
