// MergeEngine - runs the combination step of a MergePlan

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::MergeError;
use super::models::{MergeMode, MergePlan, TrackRole};
use super::traits::MediaCombinationCapability;

pub struct MergeEngine {
    combiner: Arc<dyn MediaCombinationCapability>,
}

impl MergeEngine {
    pub fn new(combiner: Arc<dyn MediaCombinationCapability>) -> Self {
        Self { combiner }
    }

    /// Produce the plan's output from its fetched tracks.
    ///
    /// A primary input without a video stream degrades to copying the
    /// secondary input under the output's stem. Intermediates are removed
    /// only after success.
    pub async fn execute(&self, plan: &MergePlan) -> Result<PathBuf, MergeError> {
        if plan.mode == MergeMode::Direct {
            let track = plan
                .tracks
                .first()
                .ok_or(MergeError::IncompletePlan(TrackRole::Video))?;
            ensure_exists(track.role, &track.task.destination).await?;
            return Ok(plan.output.clone());
        }

        let (primary_role, primary) = self.input(plan, 0)?;
        let (secondary_role, secondary) = self.input(plan, 1)?;
        ensure_exists(primary_role, primary).await?;
        ensure_exists(secondary_role, secondary).await?;

        let output = if self.combiner.has_video_stream(primary).await? {
            tracing::info!(
                "[MergeEngine] {} {} + {} -> {}",
                self.combiner.name(),
                primary.display(),
                secondary.display(),
                plan.output.display()
            );
            self.combiner
                .run(&[(primary_role, primary), (secondary_role, secondary)], &plan.output)
                .await?;
            plan.output.clone()
        } else {
            let fallback = match secondary.extension() {
                Some(ext) => plan.output.with_extension(ext),
                None => plan.output.clone(),
            };
            tracing::warn!(
                "[MergeEngine] {} has no video stream, keeping {} as {}",
                primary.display(),
                secondary_role,
                fallback.display()
            );
            tokio::fs::copy(secondary, &fallback).await?;
            fallback
        };

        cleanup(plan, &output).await;
        Ok(output)
    }

    fn input<'p>(&self, plan: &'p MergePlan, index: usize) -> Result<(TrackRole, &'p Path), MergeError> {
        let role = plan
            .merge_roles
            .get(index)
            .copied()
            .ok_or(MergeError::IncompletePlan(if index == 0 {
                TrackRole::Video
            } else {
                TrackRole::Audio
            }))?;
        let track = plan.track(role).ok_or(MergeError::IncompletePlan(role))?;
        Ok((role, track.task.destination.as_path()))
    }
}

async fn ensure_exists(role: TrackRole, path: &Path) -> Result<(), MergeError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        _ => Err(MergeError::MissingInput {
            role,
            path: path.to_path_buf(),
        }),
    }
}

async fn cleanup(plan: &MergePlan, output: &Path) {
    for path in plan.intermediates() {
        if path == output {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("[MergeEngine] Could not remove {}: {}", path.display(), e);
        }
    }
}
