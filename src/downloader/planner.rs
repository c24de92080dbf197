// AcquisitionPlanner - selection into fetch tasks + merge plan

use std::path::{Path, PathBuf};

use super::errors::InvalidSelectionError;
use super::models::{
    FetchSource, FetchTask, MergeMode, MergePlan, PlannedTrack, Representation, RepresentationKind,
    ResourceEntry, TrackRole,
};
use super::selection::SelectionAxis;
use super::utils::sanitize_filename;

pub struct AcquisitionPlanner {
    output_dir: PathBuf,
}

impl AcquisitionPlanner {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the fetch + merge plan for the entry's current selection.
    ///
    /// When a dub is chosen the primary audio is fetched but discarded:
    /// only one audio track reaches the output. A combined pick in the audio
    /// slot lends its audio track to a video-only stream, and is skipped
    /// entirely when a dub replaces it.
    pub fn plan(&self, entry: &ResourceEntry) -> Result<MergePlan, InvalidSelectionError> {
        let names = Naming::new(&self.output_dir, &entry.title);
        let reps = &entry.representations;
        let sel = &entry.selection;

        let video = lookup(SelectionAxis::Video, sel.video(), |r| {
            reps.video_only.iter().chain(&reps.combined).find(|c| c.id == r)
        })?;
        let audio = lookup(SelectionAxis::Audio, sel.audio(), |r| {
            reps.audio_only.iter().chain(&reps.combined).find(|c| c.id == r)
        })?;
        let dub = lookup(SelectionAxis::Dub, sel.dub(), |r| {
            reps.dubbed_audio.iter().find(|c| c.id == r)
        })?;

        let url = entry.source_url.as_str();
        let plan = match (video, dub) {
            (Some(v), None) if v.kind == RepresentationKind::Combined => names.direct(url, TrackRole::Video, v),
            (Some(v), Some(d)) if v.kind == RepresentationKind::Combined => {
                let tracks = vec![
                    names.track(url, TrackRole::Video, v, "orig"),
                    names.track(url, TrackRole::Dub, d, "dub"),
                ];
                names.merged(tracks, MergeMode::ReplaceAudio, vec![TrackRole::Video, TrackRole::Dub], v, d)
            }
            (Some(v), dub) => match (
                audio.filter(|a| a.kind == RepresentationKind::AudioOnly || dub.is_none()),
                dub,
            ) {
                (Some(a), Some(d)) => {
                    let tracks = vec![
                        names.track(url, TrackRole::Video, v, "video"),
                        names.track(url, TrackRole::Audio, a, "audio"),
                        names.track(url, TrackRole::Dub, d, "dub"),
                    ];
                    names.merged(tracks, MergeMode::Mux, vec![TrackRole::Video, TrackRole::Dub], v, d)
                }
                (Some(a), None) => {
                    if a.kind == RepresentationKind::Combined {
                        tracing::info!("[Planner] {}: audio taken from combined '{}'", entry.title, a.id);
                    }
                    let tracks = vec![
                        names.track(url, TrackRole::Video, v, "video"),
                        names.track(url, TrackRole::Audio, a, "audio"),
                    ];
                    names.merged(tracks, MergeMode::Mux, vec![TrackRole::Video, TrackRole::Audio], v, a)
                }
                (None, Some(d)) => {
                    let tracks = vec![
                        names.track(url, TrackRole::Video, v, "video"),
                        names.track(url, TrackRole::Dub, d, "dub"),
                    ];
                    names.merged(tracks, MergeMode::Mux, vec![TrackRole::Video, TrackRole::Dub], v, d)
                }
                // no audio-only representation exists: the silent stream is the output
                (None, None) => names.direct(url, TrackRole::Video, v),
            },
            (None, Some(d)) => names.direct(url, TrackRole::Dub, d),
            (None, None) => match audio {
                Some(a) => names.direct(url, TrackRole::Audio, a),
                None => {
                    return Err(InvalidSelectionError::NothingSelected {
                        title: entry.title.clone(),
                    })
                }
            },
        };

        tracing::debug!(
            "[Planner] {}: {:?} with {} fetch(es) -> {}",
            entry.title,
            plan.mode,
            plan.tracks.len(),
            plan.output.display()
        );
        Ok(plan)
    }

    /// Subtitle side plan: the chosen track, or `language` when given
    pub fn subtitle_task(&self, entry: &ResourceEntry, language: Option<&str>) -> Option<FetchTask> {
        let language = language.or_else(|| entry.selection.subtitle())?;
        let track = entry.representations.subtitles.iter().find(|s| s.id == language)?;
        let names = Naming::new(&self.output_dir, &entry.title);
        Some(FetchTask::new(
            entry.source_url.clone(),
            FetchSource::Subtitle {
                language: track.id.clone(),
                format: track.container.clone(),
            },
            names.path(&format!("{}.{}.{}", names.stem, track.id, track.container)),
        ))
    }

    /// Thumbnail side plan for the chosen tier
    pub fn thumbnail_task(&self, entry: &ResourceEntry) -> Option<FetchTask> {
        let tier = entry.selection.thumbnail()?;
        let rep = entry.representations.thumbnails.iter().find(|t| t.id == tier)?;
        let url = rep.url.clone()?;
        let names = Naming::new(&self.output_dir, &entry.title);
        Some(FetchTask::new(
            entry.source_url.clone(),
            FetchSource::Thumbnail {
                tier: rep.id.clone(),
                url,
            },
            names.path(&format!("{}_{}.{}", names.stem, sanitize_filename(&rep.note), rep.container)),
        ))
    }

    /// Subtitle + thumbnail fetches for the current selection
    pub fn side_plans(&self, entry: &ResourceEntry) -> Vec<FetchTask> {
        self.subtitle_task(entry, None)
            .into_iter()
            .chain(self.thumbnail_task(entry))
            .collect()
    }
}

/// Resolve a selected id, treating a stale id as an invalid selection
fn lookup<'a>(
    axis: SelectionAxis,
    id: Option<&str>,
    find: impl Fn(&str) -> Option<&'a Representation>,
) -> Result<Option<&'a Representation>, InvalidSelectionError> {
    match id {
        None => Ok(None),
        Some(id) => find(id).map(Some).ok_or_else(|| InvalidSelectionError::UnknownId {
            axis,
            id: id.to_string(),
        }),
    }
}

/// Output container for a video + audio pair
fn merged_container(video: &Representation, audio: &Representation) -> &'static str {
    match (video.container.as_str(), audio.container.as_str()) {
        ("mp4", "m4a") | ("mp4", "mp4") => "mp4",
        ("webm", "webm") => "webm",
        _ => "mkv",
    }
}

/// Deterministic file names derived from the title
struct Naming<'a> {
    dir: &'a Path,
    stem: String,
}

impl<'a> Naming<'a> {
    fn new(dir: &'a Path, title: &str) -> Self {
        Self {
            dir,
            stem: sanitize_filename(title),
        }
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    fn task(&self, url: &str, rep: &Representation, file_name: String) -> FetchTask {
        FetchTask::stream(url, rep.id.clone(), self.path(&file_name))
    }

    fn track(&self, url: &str, role: TrackRole, rep: &Representation, suffix: &str) -> PlannedTrack {
        PlannedTrack {
            role,
            task: self.task(url, rep, format!("{}_{}.{}", self.stem, suffix, rep.container)),
        }
    }

    fn direct(&self, url: &str, role: TrackRole, rep: &Representation) -> MergePlan {
        let task = self.task(url, rep, format!("{}.{}", self.stem, rep.container));
        MergePlan {
            title: self.stem.clone(),
            output: task.destination.clone(),
            tracks: vec![PlannedTrack { role, task }],
            mode: MergeMode::Direct,
            merge_roles: Vec::new(),
        }
    }

    fn merged(
        &self,
        tracks: Vec<PlannedTrack>,
        mode: MergeMode,
        merge_roles: Vec<TrackRole>,
        video: &Representation,
        audio: &Representation,
    ) -> MergePlan {
        MergePlan {
            title: self.stem.clone(),
            tracks,
            mode,
            merge_roles,
            output: self.path(&format!("{}.{}", self.stem, merged_container(video, audio))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::Representations;
    use crate::downloader::selection::SelectionState;
    use crate::downloader::test_support::{audio, combined, dub, entry_with, subtitle, thumbnail, video};

    fn planner() -> AcquisitionPlanner {
        AcquisitionPlanner::new("/downloads")
    }

    fn full_entry() -> ResourceEntry {
        entry_with(Representations {
            video_only: vec![video("137", 1080)],
            audio_only: vec![audio("140", 128.0)],
            combined: vec![combined("18", 360)],
            dubbed_audio: vec![dub("140-fr", "fr")],
            subtitles: vec![subtitle("en")],
            thumbnails: vec![thumbnail("maxresdefault", "1920x1080")],
            skipped: Vec::new(),
        })
    }

    #[test]
    fn combined_only_is_a_single_direct_fetch() {
        let entry = entry_with(Representations {
            combined: vec![combined("18", 360)],
            ..Default::default()
        });
        let plan = planner().plan(&entry).unwrap();

        assert_eq!(plan.mode, MergeMode::Direct);
        assert_eq!(plan.tracks.len(), 1);
        assert!(plan.merge_roles.is_empty());
        assert_eq!(plan.output, plan.tracks[0].task.destination);
        assert_eq!(plan.output, PathBuf::from("/downloads/Sakura _ Test.mp4"));
        assert!(plan.intermediates().is_empty());
    }

    #[test]
    fn video_audio_and_dub_fetch_three_and_mux_video_with_dub() {
        let reps = full_entry().representations;
        let mut entry = full_entry();
        entry.selection.set(&reps, SelectionAxis::Dub, "140-fr").unwrap();

        let plan = planner().plan(&entry).unwrap();
        assert_eq!(plan.mode, MergeMode::Mux);
        assert_eq!(plan.tracks.len(), 3);
        assert_eq!(plan.merge_roles, vec![TrackRole::Video, TrackRole::Dub]);

        let names: Vec<_> = plan
            .tracks
            .iter()
            .map(|t| t.task.destination.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Sakura _ Test_video.mp4", "Sakura _ Test_audio.m4a", "Sakura _ Test_dub.m4a"]
        );
        assert_eq!(plan.output, PathBuf::from("/downloads/Sakura _ Test.mp4"));
        assert_eq!(plan.intermediates().len(), 3);
    }

    #[test]
    fn video_and_audio_mux_into_one_container() {
        let plan = planner().plan(&full_entry()).unwrap();
        assert_eq!(plan.mode, MergeMode::Mux);
        assert_eq!(plan.merge_roles, vec![TrackRole::Video, TrackRole::Audio]);
        assert_eq!(plan.tracks.len(), 2);
    }

    #[test]
    fn combined_with_dub_replaces_audio() {
        let reps = full_entry().representations;
        let mut entry = full_entry();
        entry.selection.set(&reps, SelectionAxis::Video, "18").unwrap();
        entry.selection.set(&reps, SelectionAxis::Dub, "140-fr").unwrap();

        let plan = planner().plan(&entry).unwrap();
        assert_eq!(plan.mode, MergeMode::ReplaceAudio);
        assert_eq!(plan.merge_roles, vec![TrackRole::Video, TrackRole::Dub]);
        assert!(plan.tracks[0]
            .task
            .destination
            .to_string_lossy()
            .ends_with("Sakura _ Test_orig.mp4"));
    }

    #[test]
    fn webm_pairs_stay_webm_and_mixed_pairs_go_mkv() {
        let mut v = video("248", 1080);
        v.container = "webm".into();
        let mut a = audio("251", 160.0);
        a.container = "webm".into();
        assert_eq!(merged_container(&v, &a), "webm");
        assert_eq!(merged_container(&v, &audio("140", 128.0)), "mkv");
    }

    #[test]
    fn nothing_selected_is_rejected() {
        let entry = entry_with(Representations {
            subtitles: vec![subtitle("en")],
            ..Default::default()
        });
        assert!(matches!(
            planner().plan(&entry),
            Err(InvalidSelectionError::NothingSelected { .. })
        ));
    }

    #[test]
    fn stale_selection_is_rejected() {
        let mut entry = full_entry();
        entry.representations.video_only.clear();
        let err = planner().plan(&entry).unwrap_err();
        assert!(matches!(err, InvalidSelectionError::UnknownId { axis: SelectionAxis::Video, .. }));
    }

    #[test]
    fn side_plans_follow_selection() {
        let reps = full_entry().representations;
        let mut entry = full_entry();
        assert_eq!(planner().side_plans(&entry).len(), 1);

        entry.selection.set(&reps, SelectionAxis::Subtitle, "en").unwrap();
        let tasks = planner().side_plans(&entry);
        let names: Vec<_> = tasks
            .iter()
            .map(|t| t.destination.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Sakura _ Test.en.vtt", "Sakura _ Test_1920x1080.jpg"]);
    }

    #[test]
    fn audio_only_selection_downloads_directly() {
        let reps = Representations {
            audio_only: vec![audio("140", 128.0)],
            ..Default::default()
        };
        let mut entry = entry_with(reps.clone());
        entry.selection = SelectionState::default_for(&reps);
        let plan = planner().plan(&entry).unwrap();
        assert_eq!(plan.mode, MergeMode::Direct);
        assert_eq!(plan.tracks[0].role, TrackRole::Audio);
        assert_eq!(plan.output, PathBuf::from("/downloads/Sakura _ Test.m4a"));
    }

    #[test]
    fn combined_audio_pick_is_muxed_with_video_only() {
        let reps = Representations {
            video_only: vec![video("137", 1080)],
            combined: vec![combined("18", 360)],
            dubbed_audio: vec![dub("140-fr", "fr")],
            ..Default::default()
        };
        let mut entry = entry_with(reps.clone());
        entry.selection = SelectionState::default_for(&reps);
        entry.selection.set(&reps, SelectionAxis::Audio, "18").unwrap();

        let plan = planner().plan(&entry).unwrap();
        assert_eq!(plan.mode, MergeMode::Mux);
        assert_eq!(plan.merge_roles, vec![TrackRole::Video, TrackRole::Audio]);
        assert_eq!(plan.tracks[1].task.key().representation, "18");

        entry.selection.set(&reps, SelectionAxis::Dub, "140-fr").unwrap();
        let plan = planner().plan(&entry).unwrap();
        assert_eq!(plan.tracks.len(), 2);
        assert_eq!(plan.merge_roles, vec![TrackRole::Video, TrackRole::Dub]);
    }
}
