// Orchestration: the per-resource pipeline and the queue coordinator
//
// Downloader:    resolve -> plan -> fetch -> merge for one entry
// DownloadQueue: owns the entries; background jobs report back over a
//                completion channel and only the coordinator mutates state

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;

use super::backends::{FfmpegCombiner, HttpThumbnailProbe, YtDlpExtractor};
use super::catalog::RepresentationCatalog;
use super::config::DownloaderConfig;
use super::errors::{DownloadError, HistoryError, InvalidSelectionError, QueueError, ResolutionError};
use super::executor::{FetchExecutor, FetchReport};
use super::history::{RecentEntry, RecentUrls};
use super::merge::MergeEngine;
use super::models::{FetchEvent, FetchTask, MergePlan, ResourceEntry};
use super::planner::AcquisitionPlanner;
use super::selection::SelectionAxis;
use super::traits::{ExtractionCapability, MediaCombinationCapability, ThumbnailProbe};

pub struct Downloader {
    config: Arc<DownloaderConfig>,
    catalog: RepresentationCatalog,
    executor: FetchExecutor,
    merge: MergeEngine,
}

impl Downloader {
    /// yt-dlp + ffmpeg + HTTP thumbnails
    pub fn new(config: DownloaderConfig) -> Self {
        let config = Arc::new(config);
        Self::with_capabilities(
            config.clone(),
            Arc::new(YtDlpExtractor::new(config.clone())),
            Arc::new(FfmpegCombiner::new(&config)),
            Arc::new(HttpThumbnailProbe::new(config.clone())),
        )
    }

    pub fn with_capabilities(
        config: Arc<DownloaderConfig>,
        extractor: Arc<dyn ExtractionCapability>,
        combiner: Arc<dyn MediaCombinationCapability>,
        thumbnails: Arc<dyn ThumbnailProbe>,
    ) -> Self {
        tracing::info!(
            "[Downloader] extractor={} combiner={} pool={}",
            extractor.name(),
            combiner.name(),
            config.max_concurrent_fetches
        );
        let mut executor = FetchExecutor::new(extractor.clone(), thumbnails.clone(), config.max_concurrent_fetches);
        if config.cancellation_enabled {
            executor = executor.with_cancellation();
        }
        Self {
            catalog: RepresentationCatalog::new(extractor, thumbnails, config.clone()),
            executor,
            merge: MergeEngine::new(combiner),
            config,
        }
    }

    /// Forward fetch state and progress events to `events`
    pub fn with_events(mut self, events: UnboundedSender<FetchEvent>) -> Self {
        self.executor = self.executor.with_events(events);
        self
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Cancel running fetches (only when cancellation is enabled)
    pub fn cancel(&self) {
        self.executor.cancel();
    }

    pub async fn resolve(&self, url: &str) -> Result<ResourceEntry, ResolutionError> {
        self.catalog.resolve(url).await
    }

    pub fn plan(&self, entry: &ResourceEntry, output_dir: &Path) -> Result<MergePlan, InvalidSelectionError> {
        AcquisitionPlanner::new(output_dir).plan(entry)
    }

    /// Fetch and merge the entry's current selection; returns the output path
    pub async fn download(&self, entry: &ResourceEntry, output_dir: &Path) -> Result<PathBuf, DownloadError> {
        let plan = self.plan(entry, output_dir)?;
        tracing::info!("[Downloader] {} -> {}", entry.title, plan.output.display());

        let reports = self.executor.run(plan.tasks()).await;
        collect_outputs(reports)?;

        let output = self.merge.execute(&plan).await?;
        tracing::info!("[Downloader] ✓ {}", output.display());
        Ok(output)
    }

    /// Fetch the chosen subtitle track, or `language` when given
    pub async fn download_subtitles(
        &self,
        entry: &ResourceEntry,
        output_dir: &Path,
        language: Option<&str>,
    ) -> Result<Option<PathBuf>, DownloadError> {
        let task = AcquisitionPlanner::new(output_dir).subtitle_task(entry, language);
        self.run_side(task).await
    }

    pub async fn download_thumbnail(
        &self,
        entry: &ResourceEntry,
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, DownloadError> {
        let task = AcquisitionPlanner::new(output_dir).thumbnail_task(entry);
        self.run_side(task).await
    }

    async fn run_side(&self, task: Option<FetchTask>) -> Result<Option<PathBuf>, DownloadError> {
        match task {
            Some(task) => {
                let mut outputs = collect_outputs(self.executor.run(vec![task]).await)?;
                Ok(outputs.pop())
            }
            None => Ok(None),
        }
    }
}

fn collect_outputs(reports: Vec<FetchReport>) -> Result<Vec<PathBuf>, DownloadError> {
    let total = reports.len();
    let mut outputs = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for report in reports {
        match report.result {
            Ok(path) => outputs.push(path),
            Err(e) => failures.push(e),
        }
    }
    match DownloadError::from_failures(total, failures) {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

/// Kind of background job run for a queued entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Video,
    Subtitles,
    Thumbnail,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Subtitles => write!(f, "subtitles"),
            Self::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// Message from a background job to the coordinator
enum JobResult {
    Resolved {
        url: String,
        result: Result<ResourceEntry, ResolutionError>,
    },
    Finished {
        url: String,
        kind: JobKind,
        result: Result<Option<PathBuf>, DownloadError>,
    },
}

/// What the coordinator observed after applying one job result
#[derive(Debug)]
pub enum QueueEvent {
    Added { url: String, title: String },
    AddFailed { url: String, error: ResolutionError },
    Finished { url: String, kind: JobKind, output: Option<PathBuf> },
    Failed { url: String, kind: JobKind, error: DownloadError },
}

pub struct DownloadQueue {
    downloader: Arc<Downloader>,
    output_dir: PathBuf,
    /// Most recently added first
    entries: Vec<ResourceEntry>,
    /// URLs whose resolution is in flight
    pending: HashSet<String>,
    /// URLs with a video job running; two jobs would merge the same intermediates
    downloading: HashSet<String>,
    history: RecentUrls,
    jobs: Arc<Semaphore>,
    results_tx: UnboundedSender<JobResult>,
    results_rx: UnboundedReceiver<JobResult>,
    running: usize,
}

impl DownloadQueue {
    pub fn new(downloader: Downloader) -> Self {
        let config = downloader.config();
        let history = RecentUrls::load_or_empty(&config.history_path, config.history_limit);
        let output_dir = config.output_dir.clone();
        let jobs = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            downloader: Arc::new(downloader),
            output_dir,
            entries: Vec::new(),
            pending: HashSet::new(),
            downloading: HashSet::new(),
            history,
            jobs,
            results_tx,
            results_rx,
            running: 0,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    pub fn get(&self, url: &str) -> Option<&ResourceEntry> {
        self.entries.iter().find(|e| e.source_url == url)
    }

    pub fn is_idle(&self) -> bool {
        self.running == 0
    }

    pub fn cancel(&self) {
        self.downloader.cancel();
    }

    /// Start resolving `url`; the entry appears once its `Added` event is applied
    pub fn request_add(&mut self, url: &str) -> Result<(), QueueError> {
        let url = url.trim().to_string();
        if self.pending.contains(&url) || self.get(&url).is_some() {
            return Err(QueueError::Duplicate(url));
        }
        self.pending.insert(url.clone());

        let downloader = self.downloader.clone();
        self.spawn(async move {
            let result = downloader.resolve(&url).await;
            JobResult::Resolved { url, result }
        });
        Ok(())
    }

    pub fn request_download(&mut self, url: &str) -> Result<(), QueueError> {
        let entry = self.entry_for(url)?;
        if self.downloading.contains(&entry.source_url) {
            return Err(QueueError::AlreadyDownloading(entry.source_url));
        }
        self.spawn_download(entry);
        Ok(())
    }

    pub fn is_downloading(&self, url: &str) -> bool {
        self.downloading.contains(url)
    }

    /// Subtitles for the chosen track, or the first available one
    pub fn request_subtitles(&mut self, url: &str) -> Result<bool, QueueError> {
        let entry = self.entry_for(url)?;
        Ok(self.spawn_subtitles(entry))
    }

    pub fn request_thumbnail(&mut self, url: &str) -> Result<bool, QueueError> {
        let entry = self.entry_for(url)?;
        Ok(self.spawn_thumbnail(entry))
    }

    /// Returns the number of jobs started; entries already downloading are skipped
    pub fn request_download_all(&mut self) -> usize {
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| !self.downloading.contains(&e.source_url))
            .cloned()
            .collect();
        let count = entries.len();
        for entry in entries {
            self.spawn_download(entry);
        }
        count
    }

    pub fn request_subtitles_all(&mut self) -> usize {
        let entries = self.entries.clone();
        entries.into_iter().filter(|e| self.spawn_subtitles(e.clone())).count()
    }

    pub fn request_thumbnails_all(&mut self) -> usize {
        let entries = self.entries.clone();
        entries.into_iter().filter(|e| self.spawn_thumbnail(e.clone())).count()
    }

    pub fn request_everything(&mut self) -> usize {
        self.request_download_all() + self.request_subtitles_all() + self.request_thumbnails_all()
    }

    pub fn remove(&mut self, url: &str) -> Result<ResourceEntry, QueueError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.source_url == url)
            .ok_or_else(|| QueueError::UnknownUrl(url.to_string()))?;
        Ok(self.entries.remove(index))
    }

    pub fn select(&mut self, url: &str, axis: SelectionAxis, id: &str) -> Result<(), QueueError> {
        let entry = self.entry_mut(url)?;
        entry.selection.set(&entry.representations, axis, id)?;
        Ok(())
    }

    pub fn clear_selection(&mut self, url: &str, axis: SelectionAxis) -> Result<(), QueueError> {
        let entry = self.entry_mut(url)?;
        entry.selection.clear(&entry.representations, axis)?;
        Ok(())
    }

    pub fn history(&self) -> &[RecentEntry] {
        self.history.entries()
    }

    pub fn remove_history(&mut self, url: &str) -> Result<bool, HistoryError> {
        self.history.remove(url)
    }

    pub fn clear_history(&mut self) -> Result<(), HistoryError> {
        self.history.clear()
    }

    /// Wait for the next job to finish and apply its result; None when idle
    pub async fn next_event(&mut self) -> Option<QueueEvent> {
        if self.running == 0 {
            return None;
        }
        let result = self.results_rx.recv().await?;
        self.running -= 1;
        Some(self.apply(result))
    }

    /// Drain every outstanding job
    pub async fn run_until_idle(&mut self) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn apply(&mut self, result: JobResult) -> QueueEvent {
        match result {
            JobResult::Resolved { url, result } => {
                self.pending.remove(&url);
                match result {
                    Ok(entry) => {
                        let title = entry.title.clone();
                        if let Err(e) = self.history.add(&url, entry.thumbnail_url().map(str::to_string)) {
                            tracing::warn!("[Queue] Could not record {} in history: {}", url, e);
                        }
                        self.entries.insert(0, entry);
                        tracing::info!("[Queue] Added '{}' ({} in queue)", title, self.entries.len());
                        QueueEvent::Added { url, title }
                    }
                    Err(error) => {
                        tracing::warn!("[Queue] {}", error);
                        QueueEvent::AddFailed { url, error }
                    }
                }
            }
            JobResult::Finished { url, kind, result } => {
                if kind == JobKind::Video {
                    self.downloading.remove(&url);
                }
                match result {
                    Ok(output) => QueueEvent::Finished { url, kind, output },
                    Err(error) => {
                        tracing::warn!("[Queue] {} {} failed: {}", url, kind, error);
                        QueueEvent::Failed { url, kind, error }
                    }
                }
            }
        }
    }

    fn entry_for(&self, url: &str) -> Result<ResourceEntry, QueueError> {
        self.get(url)
            .cloned()
            .ok_or_else(|| QueueError::UnknownUrl(url.to_string()))
    }

    fn entry_mut(&mut self, url: &str) -> Result<&mut ResourceEntry, QueueError> {
        self.entries
            .iter_mut()
            .find(|e| e.source_url == url)
            .ok_or_else(|| QueueError::UnknownUrl(url.to_string()))
    }

    fn spawn_download(&mut self, entry: ResourceEntry) {
        self.downloading.insert(entry.source_url.clone());
        let downloader = self.downloader.clone();
        let dir = self.output_dir.clone();
        self.spawn(async move {
            let result = downloader.download(&entry, &dir).await.map(Some);
            JobResult::Finished {
                url: entry.source_url,
                kind: JobKind::Video,
                result,
            }
        });
    }

    fn spawn_subtitles(&mut self, entry: ResourceEntry) -> bool {
        let language = match entry
            .selection
            .subtitle()
            .or_else(|| entry.representations.subtitles.first().map(|s| s.id.as_str()))
        {
            Some(language) => language.to_string(),
            None => return false,
        };
        let downloader = self.downloader.clone();
        let dir = self.output_dir.clone();
        self.spawn(async move {
            let result = downloader.download_subtitles(&entry, &dir, Some(&language)).await;
            JobResult::Finished {
                url: entry.source_url,
                kind: JobKind::Subtitles,
                result,
            }
        });
        true
    }

    fn spawn_thumbnail(&mut self, entry: ResourceEntry) -> bool {
        if entry.selection.thumbnail().is_none() {
            return false;
        }
        let downloader = self.downloader.clone();
        let dir = self.output_dir.clone();
        self.spawn(async move {
            let result = downloader.download_thumbnail(&entry, &dir).await;
            JobResult::Finished {
                url: entry.source_url,
                kind: JobKind::Thumbnail,
                result,
            }
        });
        true
    }

    fn spawn<F>(&mut self, job: F)
    where
        F: std::future::Future<Output = JobResult> + Send + 'static,
    {
        let jobs = self.jobs.clone();
        let tx = self.results_tx.clone();
        self.running += 1;
        tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = jobs.acquire_owned().await.ok();
            let _ = tx.send(job.await);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ResolutionCause;
    use crate::downloader::models::{RawResource, RawSubtitle};
    use crate::downloader::test_support::{raw_audio, raw_video, FakeCombiner, FakeExtractor, FakeThumbnails};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn raw() -> RawResource {
        let mut subtitles = BTreeMap::new();
        subtitles.insert(
            "en".to_string(),
            vec![RawSubtitle {
                ext: "vtt".into(),
                url: None,
                name: Some("English".into()),
            }],
        );
        RawResource {
            id: "sakura".into(),
            title: "Sakura".into(),
            thumbnail: None,
            formats: vec![raw_video("137", 1080), raw_audio("140", 128.0)],
            subtitles,
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        extractor: Arc<FakeExtractor>,
        combiner: Arc<FakeCombiner>,
    }

    impl Fixture {
        fn new(extractor: FakeExtractor) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                extractor: Arc::new(extractor),
                combiner: Arc::new(FakeCombiner::with_video()),
            }
        }

        fn queue(&self) -> DownloadQueue {
            self.queue_with(|config| config)
        }

        fn queue_with(&self, tweak: impl FnOnce(DownloaderConfig) -> DownloaderConfig) -> DownloadQueue {
            let config = DownloaderConfig::default()
                .with_output_dir(self.dir.path().join("out"))
                .with_history_path(self.dir.path().join("history.json"));
            let downloader = Downloader::with_capabilities(
                Arc::new(tweak(config)),
                self.extractor.clone(),
                self.combiner.clone(),
                Arc::new(FakeThumbnails::existing(&[
                    "https://img.youtube.com/vi/sakura/hqdefault.jpg",
                ])),
            );
            DownloadQueue::new(downloader)
        }
    }

    #[tokio::test]
    async fn added_entries_go_to_the_front_and_into_history() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();

        queue.request_add("https://youtu.be/one").unwrap();
        assert!(queue.next_event().await.is_some());
        queue.request_add(" https://youtu.be/two ").unwrap();
        assert!(matches!(queue.next_event().await, Some(QueueEvent::Added { .. })));

        let urls: Vec<_> = queue.entries().iter().map(|e| e.source_url.as_str()).collect();
        assert_eq!(urls, vec!["https://youtu.be/two", "https://youtu.be/one"]);
        let recent: Vec<_> = queue.history().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(recent, vec!["https://youtu.be/two", "https://youtu.be/one"]);
        assert_eq!(
            queue.history()[0].thumb_url.as_deref(),
            Some("https://img.youtube.com/vi/sakura/hqdefault.jpg")
        );
        assert!(queue.next_event().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_urls_are_rejected() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();

        queue.request_add("https://youtu.be/one").unwrap();
        assert_eq!(
            queue.request_add("https://youtu.be/one"),
            Err(QueueError::Duplicate("https://youtu.be/one".into()))
        );
        queue.run_until_idle().await;
        assert!(queue.request_add("https://youtu.be/one").is_err());
        assert_eq!(fx.extractor.resolve_count(), 1);
    }

    #[tokio::test]
    async fn failed_resolution_inserts_nothing() {
        let fx = Fixture::new(FakeExtractor::failing(ResolutionCause::Unavailable("Private video".into())));
        let mut queue = fx.queue();

        queue.request_add("https://youtu.be/private").unwrap();
        match queue.next_event().await {
            Some(QueueEvent::AddFailed { error, .. }) => {
                assert_eq!(error.cause, ResolutionCause::Unavailable("Private video".into()))
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(queue.entries().is_empty());
        assert!(queue.history().is_empty());
        // the URL may be retried after a failure
        assert!(queue.request_add("https://youtu.be/private").is_ok());
    }

    #[tokio::test]
    async fn download_merges_and_cleans_up() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        queue.request_download("https://youtu.be/one").unwrap();
        let output = match queue.next_event().await {
            Some(QueueEvent::Finished { output: Some(output), kind: JobKind::Video, .. }) => output,
            other => panic!("unexpected event: {other:?}"),
        };

        assert_eq!(output, fx.dir.path().join("out").join("Sakura.mp4"));
        assert!(output.exists());
        assert!(!fx.dir.path().join("out").join("Sakura_video.mp4").exists());
        assert!(!fx.dir.path().join("out").join("Sakura_audio.m4a").exists());
        assert_eq!(fx.combiner.runs().len(), 1);
    }

    #[tokio::test]
    async fn everything_fetches_video_subtitles_and_thumbnail() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        assert_eq!(queue.request_everything(), 3);
        let events = queue.run_until_idle().await;

        let mut kinds: Vec<_> = events
            .iter()
            .map(|e| match e {
                QueueEvent::Finished { kind, .. } => kind.to_string(),
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        kinds.sort();
        assert_eq!(kinds, vec!["subtitles", "thumbnail", "video"]);
        assert!(fx.dir.path().join("out").join("Sakura.en.vtt").exists());
        assert!(fx.dir.path().join("out").join("Sakura_640x480.jpg").exists());
    }

    #[tokio::test]
    async fn fetch_failure_reports_the_cause() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()).failing_ids(&["140"]));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        queue.request_download("https://youtu.be/one").unwrap();
        match queue.next_event().await {
            Some(QueueEvent::Failed { error: DownloadError::Fetch { total, failures, .. }, .. }) => {
                assert_eq!(total, 2);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(fx.combiner.runs().is_empty());
    }

    #[tokio::test]
    async fn selection_edits_are_validated() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        assert!(matches!(
            queue.select("https://youtu.be/one", SelectionAxis::Video, "140"),
            Err(QueueError::Selection(_))
        ));
        queue
            .select("https://youtu.be/one", SelectionAxis::Subtitle, "en")
            .unwrap();
        assert_eq!(
            queue.get("https://youtu.be/one").unwrap().selection.subtitle(),
            Some("en")
        );
        assert!(matches!(
            queue.clear_selection("https://youtu.be/one", SelectionAxis::Audio),
            Err(QueueError::Selection(InvalidSelectionError::AudioRequired { .. }))
        ));
        assert_eq!(
            queue.request_download("https://nope"),
            Err(QueueError::UnknownUrl("https://nope".into()))
        );
    }

    #[tokio::test]
    async fn remove_drops_the_entry_but_keeps_history() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        queue.remove("https://youtu.be/one").unwrap();
        assert!(queue.entries().is_empty());
        assert_eq!(queue.history().len(), 1);
        assert!(queue.remove("https://youtu.be/one").is_err());

        assert!(queue.remove_history("https://youtu.be/one").unwrap());
        assert!(queue.history().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn second_download_of_a_running_entry_is_refused() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()).with_delay(Duration::from_millis(50)));
        let mut queue = fx.queue();
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        queue.request_download("https://youtu.be/one").unwrap();
        assert!(queue.is_downloading("https://youtu.be/one"));
        assert_eq!(
            queue.request_download("https://youtu.be/one"),
            Err(QueueError::AlreadyDownloading("https://youtu.be/one".into()))
        );
        assert_eq!(queue.request_download_all(), 0);

        let events = queue.run_until_idle().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], QueueEvent::Finished { kind: JobKind::Video, .. }));
        assert_eq!(fx.extractor.fetch_count(), 2);
        assert_eq!(fx.combiner.runs().len(), 1);
        assert!(!queue.is_downloading("https://youtu.be/one"));

        // a finished entry can be downloaded again
        queue.request_download("https://youtu.be/one").unwrap();
        let events = queue.run_until_idle().await;
        assert!(matches!(events[0], QueueEvent::Finished { kind: JobKind::Video, .. }));
        assert_eq!(fx.combiner.runs().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn entries_sharing_a_source_merge_independently() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()).with_delay(Duration::from_millis(50)));
        let downloader = Arc::new(Downloader::with_capabilities(
            Arc::new(DownloaderConfig::default()),
            fx.extractor.clone(),
            fx.combiner.clone(),
            Arc::new(FakeThumbnails::existing(&[])),
        ));
        let entry = downloader.resolve("https://youtu.be/one").await.unwrap();
        let (left, right) = (fx.dir.path().join("left"), fx.dir.path().join("right"));

        let (a, b) = tokio::join!(downloader.download(&entry, &left), downloader.download(&entry, &right));

        assert_eq!(a.unwrap(), left.join("Sakura.mp4"));
        assert_eq!(b.unwrap(), right.join("Sakura.mp4"));
        assert_eq!(fx.extractor.fetch_count(), 2);
        assert_eq!(fx.combiner.runs().len(), 2);
        assert!(!left.join("Sakura_audio.m4a").exists());
        assert!(!right.join("Sakura_audio.m4a").exists());
    }

    #[tokio::test]
    async fn downloads_work_again_after_cancel() {
        let fx = Fixture::new(FakeExtractor::with_resource(raw()));
        let mut queue = fx.queue_with(|config| config.with_cancellation(true));
        queue.request_add("https://youtu.be/one").unwrap();
        queue.run_until_idle().await;

        queue.cancel();
        queue.request_download("https://youtu.be/one").unwrap();
        let events = queue.run_until_idle().await;
        assert!(matches!(
            events[0],
            QueueEvent::Finished { kind: JobKind::Video, output: Some(_), .. }
        ));
        assert_eq!(fx.extractor.fetch_count(), 2);
    }
}
