// SelectionState - the user's pick on each axis of one resource

use std::fmt;

use serde::{Deserialize, Serialize};

use super::catalog;
use super::errors::InvalidSelectionError;
use super::models::{Representation, RepresentationKind, Representations};

/// Axis a user picks from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionAxis {
    /// Video-only or combined representations
    Video,
    /// Audio-only or combined representations
    Audio,
    Dub,
    Subtitle,
    Thumbnail,
}

impl fmt::Display for SelectionAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Dub => write!(f, "dub"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

impl SelectionAxis {
    fn candidates<'a>(&self, reps: &'a Representations) -> Vec<&'a Representation> {
        match self {
            Self::Video => reps.video_only.iter().chain(&reps.combined).collect(),
            Self::Audio => reps.audio_only.iter().chain(&reps.combined).collect(),
            Self::Dub => reps.dubbed_audio.iter().collect(),
            Self::Subtitle => reps.subtitles.iter().collect(),
            Self::Thumbnail => reps.thumbnails.iter().collect(),
        }
    }
}

/// One chosen id (or none) per axis.
///
/// Invariant: while `video` holds a video-only id, `audio` holds an
/// audio-only id, unless the resource has no audio-only representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    video: Option<String>,
    audio: Option<String>,
    dub: Option<String>,
    subtitle: Option<String>,
    thumbnail: Option<String>,
}

impl SelectionState {
    /// Default policy: best video-only (else first combined), best
    /// audio-only, no dub, no subtitle, largest thumbnail.
    pub fn default_for(reps: &Representations) -> Self {
        let video = catalog::best_video(&reps.video_only)
            .or_else(|| reps.combined.first())
            .map(|r| r.id.clone());
        Self {
            video,
            audio: catalog::best_audio(&reps.audio_only).map(|r| r.id.clone()),
            dub: None,
            subtitle: None,
            thumbnail: reps.thumbnails.first().map(|r| r.id.clone()),
        }
    }

    pub fn get(&self, axis: SelectionAxis) -> Option<&str> {
        match axis {
            SelectionAxis::Video => self.video.as_deref(),
            SelectionAxis::Audio => self.audio.as_deref(),
            SelectionAxis::Dub => self.dub.as_deref(),
            SelectionAxis::Subtitle => self.subtitle.as_deref(),
            SelectionAxis::Thumbnail => self.thumbnail.as_deref(),
        }
    }

    pub fn video(&self) -> Option<&str> {
        self.video.as_deref()
    }

    pub fn audio(&self) -> Option<&str> {
        self.audio.as_deref()
    }

    pub fn dub(&self) -> Option<&str> {
        self.dub.as_deref()
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    /// Record `id` on `axis`, rejecting ids the axis does not offer
    pub fn set(
        &mut self,
        reps: &Representations,
        axis: SelectionAxis,
        id: &str,
    ) -> Result<(), InvalidSelectionError> {
        let chosen = axis
            .candidates(reps)
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| InvalidSelectionError::UnknownId {
                axis,
                id: id.to_string(),
            })?;

        match axis {
            SelectionAxis::Video => {
                self.video = Some(chosen.id.clone());
                if chosen.kind == RepresentationKind::VideoOnly {
                    let audio_is_audio_only = self
                        .audio
                        .as_deref()
                        .map_or(false, |a| reps.audio_only.iter().any(|r| r.id == a));
                    if !audio_is_audio_only {
                        self.audio = catalog::best_audio(&reps.audio_only).map(|r| r.id.clone());
                    }
                }
            }
            SelectionAxis::Audio => {
                if chosen.kind == RepresentationKind::Combined {
                    self.require_audio_slot(reps)?;
                }
                self.audio = Some(chosen.id.clone());
            }
            SelectionAxis::Dub => self.dub = Some(chosen.id.clone()),
            SelectionAxis::Subtitle => self.subtitle = Some(chosen.id.clone()),
            SelectionAxis::Thumbnail => self.thumbnail = Some(chosen.id.clone()),
        }
        Ok(())
    }

    /// Reset `axis` to "none"
    pub fn clear(&mut self, reps: &Representations, axis: SelectionAxis) -> Result<(), InvalidSelectionError> {
        match axis {
            SelectionAxis::Video => self.video = None,
            SelectionAxis::Audio => {
                self.require_audio_slot(reps)?;
                self.audio = None;
            }
            SelectionAxis::Dub => self.dub = None,
            SelectionAxis::Subtitle => self.subtitle = None,
            SelectionAxis::Thumbnail => self.thumbnail = None,
        }
        Ok(())
    }

    /// Audio slot must keep an audio-only id while a video-only video is chosen
    fn require_audio_slot(&self, reps: &Representations) -> Result<(), InvalidSelectionError> {
        match self.video.as_deref() {
            Some(video) if reps.video_only.iter().any(|r| r.id == video) && !reps.audio_only.is_empty() => {
                Err(InvalidSelectionError::AudioRequired {
                    video: video.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether the chosen video is a combined representation
    pub fn video_is_combined(&self, reps: &Representations) -> bool {
        self.video
            .as_deref()
            .map_or(false, |v| reps.combined.iter().any(|r| r.id == v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_support::{audio, combined, dub, video};

    fn reps() -> Representations {
        Representations {
            video_only: vec![video("136", 720), video("137", 1080)],
            audio_only: vec![audio("139", 48.0), audio("140", 128.0)],
            combined: vec![combined("18", 360)],
            dubbed_audio: vec![dub("140-fr", "fr")],
            ..Default::default()
        }
    }

    #[test]
    fn default_selection_picks_best_per_axis() {
        let state = SelectionState::default_for(&reps());
        assert_eq!(state.video(), Some("137"));
        assert_eq!(state.audio(), Some("140"));
        assert_eq!(state.dub(), None);
        assert_eq!(state.subtitle(), None);
    }

    #[test]
    fn rejects_ids_from_other_axes() {
        let reps = reps();
        let mut state = SelectionState::default_for(&reps);
        let err = state.set(&reps, SelectionAxis::Dub, "137").unwrap_err();
        assert_eq!(
            err,
            InvalidSelectionError::UnknownId {
                axis: SelectionAxis::Dub,
                id: "137".into()
            }
        );
        assert_eq!(state.dub(), None);
    }

    #[test]
    fn audio_cannot_be_dropped_under_video_only() {
        let reps = reps();
        let mut state = SelectionState::default_for(&reps);
        assert!(matches!(
            state.clear(&reps, SelectionAxis::Audio),
            Err(InvalidSelectionError::AudioRequired { .. })
        ));
        assert!(state.set(&reps, SelectionAxis::Audio, "18").is_err());
        assert_eq!(state.audio(), Some("140"));
    }

    #[test]
    fn combined_video_frees_the_audio_slot() {
        let reps = reps();
        let mut state = SelectionState::default_for(&reps);
        state.set(&reps, SelectionAxis::Video, "18").unwrap();
        assert!(state.video_is_combined(&reps));
        state.clear(&reps, SelectionAxis::Audio).unwrap();
        assert_eq!(state.audio(), None);

        // back to video-only refills the audio slot with the best audio-only
        state.set(&reps, SelectionAxis::Video, "136").unwrap();
        assert_eq!(state.audio(), Some("140"));
    }

    #[test]
    fn empty_axes_read_as_none() {
        let reps = Representations::default();
        let state = SelectionState::default_for(&reps);
        assert_eq!(state.get(SelectionAxis::Video), None);
        assert_eq!(state.get(SelectionAxis::Thumbnail), None);
    }
}
