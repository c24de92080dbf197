// RepresentationCatalog - raw extractor formats into typed axes
//
// Handles:
// - Axis classification (video-only, audio-only, combined, dubbed audio)
// - Dub detection from per-language note markers
// - Subtitle tracks, one per language
// - Thumbnail ladder probing (placeholder bodies rejected)
// - Default selection (best height, best bitrate, first seen on ties)

use std::sync::Arc;

use futures::future::join_all;

use super::config::DownloaderConfig;
use super::errors::{ResolutionCause, ResolutionError};
use super::models::{RawFormat, RawResource, Representation, RepresentationKind, Representations, ResourceEntry};
use super::selection::SelectionState;
use super::traits::{ExtractionCapability, ThumbnailProbe};

/// Subtitle "languages" that are not subtitles
const NON_SUBTITLE_TRACKS: &[&str] = &["live_chat", "rechat"];

pub struct RepresentationCatalog {
    extractor: Arc<dyn ExtractionCapability>,
    thumbnails: Arc<dyn ThumbnailProbe>,
    config: Arc<DownloaderConfig>,
}

impl RepresentationCatalog {
    pub fn new(
        extractor: Arc<dyn ExtractionCapability>,
        thumbnails: Arc<dyn ThumbnailProbe>,
        config: Arc<DownloaderConfig>,
    ) -> Self {
        Self {
            extractor,
            thumbnails,
            config,
        }
    }

    /// Enumerate the representations of `url` and apply the default selection
    pub async fn resolve(&self, url: &str) -> Result<ResourceEntry, ResolutionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ResolutionError::new(url, ResolutionCause::InvalidUrl("empty URL".to_string())));
        }

        tracing::info!("[Catalog] Resolving {} via {}", url, self.extractor.name());
        let raw = self
            .extractor
            .resolve(url)
            .await
            .map_err(|cause| ResolutionError::new(url, cause))?;

        let mut representations = classify_formats(&raw.formats, &self.config);
        if representations.stream_count() == 0 {
            return Err(ResolutionError::new(url, ResolutionCause::NoFormats));
        }
        representations.subtitles = subtitle_tracks(&raw, &self.config.subtitle_format);
        representations.thumbnails = self.probe_thumbnails(&raw).await;

        tracing::info!(
            "[Catalog] {}: {} video-only, {} audio-only, {} combined, {} dubbed, {} subtitles, {} thumbnails",
            url,
            representations.video_only.len(),
            representations.audio_only.len(),
            representations.combined.len(),
            representations.dubbed_audio.len(),
            representations.subtitles.len(),
            representations.thumbnails.len(),
        );

        let selection = SelectionState::default_for(&representations);
        let title = if raw.title.trim().is_empty() {
            url.to_string()
        } else {
            raw.title.clone()
        };

        Ok(ResourceEntry {
            source_url: url.to_string(),
            title,
            resource_id: raw.id,
            representations,
            selection,
        })
    }

    /// Probe every ladder tier concurrently, keeping order (largest first)
    async fn probe_thumbnails(&self, raw: &RawResource) -> Vec<Representation> {
        let mut kept = Vec::new();

        if !raw.id.is_empty() {
            let candidates: Vec<_> = self
                .config
                .thumbnail_tiers
                .iter()
                .map(|tier| (tier, self.config.thumbnail_url(&raw.id, tier)))
                .collect();
            let probes = candidates.iter().map(|(_, url)| self.thumbnails.exists(url));
            let results = join_all(probes).await;

            for ((tier, url), exists) in candidates.into_iter().zip(results) {
                if exists {
                    kept.push(thumbnail(&tier.name, &tier.resolution, Some(tier.height), url));
                } else {
                    tracing::debug!("[Catalog] Thumbnail tier {} not available", tier.name);
                }
            }
        }

        if kept.is_empty() {
            if let Some(url) = raw.thumbnail.as_ref().filter(|u| !u.is_empty()) {
                kept.push(thumbnail("source", "source", None, url.clone()));
            }
        }
        kept
    }
}

fn thumbnail(id: &str, resolution: &str, height: Option<u32>, url: String) -> Representation {
    Representation {
        id: id.to_string(),
        container: "jpg".to_string(),
        kind: RepresentationKind::Thumbnail,
        height,
        frame_rate: None,
        audio_bitrate: None,
        language_tag: None,
        is_dubbed: false,
        note: resolution.to_string(),
        url: Some(url),
    }
}

/// Partition raw formats into axes. Every entry lands in exactly one axis,
/// or in `skipped` when both codecs are explicitly absent.
pub fn classify_formats(formats: &[RawFormat], config: &DownloaderConfig) -> Representations {
    let mut reps = Representations::default();

    for raw in formats {
        let note = raw.format_note.clone().unwrap_or_default();
        let mut rep = Representation {
            id: raw.format_id.clone(),
            container: raw.ext.clone(),
            kind: RepresentationKind::Combined,
            height: raw.height,
            frame_rate: raw.fps,
            audio_bitrate: raw.abr,
            language_tag: raw.language.clone(),
            is_dubbed: false,
            note,
            url: None,
        };

        match (raw.has_video(), raw.has_audio()) {
            (Some(true), Some(true)) | (None, None) => {
                reps.combined.push(rep);
            }
            (Some(true), _) | (None, Some(false)) => {
                rep.kind = RepresentationKind::VideoOnly;
                reps.video_only.push(rep);
            }
            (_, Some(true)) | (Some(false), None) => {
                rep.kind = RepresentationKind::AudioOnly;
                match config.match_dub_marker(&rep.note) {
                    Some(marker) => {
                        rep.is_dubbed = true;
                        rep.language_tag = rep
                            .language_tag
                            .take()
                            .or_else(|| marker.language.clone())
                            .or_else(|| Some("und".to_string()));
                        reps.dubbed_audio.push(rep);
                    }
                    None => reps.audio_only.push(rep),
                }
            }
            (Some(false), Some(false)) => {
                tracing::debug!("[Catalog] Skipping format {} (no audio, no video)", raw.format_id);
                reps.skipped.push(raw.format_id.clone());
            }
        }
    }

    reps
}

/// One subtitle representation per language, preferring `preferred` format
pub fn subtitle_tracks(raw: &RawResource, preferred: &str) -> Vec<Representation> {
    raw.subtitles
        .iter()
        .filter(|(lang, _)| !NON_SUBTITLE_TRACKS.contains(&lang.as_str()))
        .filter_map(|(lang, offers)| {
            let offer = offers
                .iter()
                .find(|o| o.ext == preferred)
                .or_else(|| offers.first())?;
            Some(Representation {
                id: lang.clone(),
                container: offer.ext.clone(),
                kind: RepresentationKind::Subtitle,
                height: None,
                frame_rate: None,
                audio_bitrate: None,
                language_tag: Some(lang.clone()),
                is_dubbed: false,
                note: offer.name.clone().unwrap_or_else(|| lang.clone()),
                url: offer.url.clone(),
            })
        })
        .collect()
}

/// First element with the largest key; later equal keys never win
fn first_max_by<T, K: PartialOrd>(items: &[T], key: impl Fn(&T) -> K) -> Option<&T> {
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let k = key(item);
        match &best {
            Some((_, best_key)) if !(k > *best_key) => {}
            _ => best = Some((item, k)),
        }
    }
    best.map(|(item, _)| item)
}

/// Highest video, first seen on ties
pub fn best_video(reps: &[Representation]) -> Option<&Representation> {
    first_max_by(reps, |r| r.height.unwrap_or(0))
}

/// Highest audio bitrate, first seen on ties
pub fn best_audio(reps: &[Representation]) -> Option<&Representation> {
    first_max_by(reps, |r| r.audio_bitrate.unwrap_or(0.0))
}
