// Downloader module - resolve, select, fetch and merge media representations

pub mod backends;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod history;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod selection;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::RepresentationCatalog;
pub use config::DownloaderConfig;
pub use errors::{
    DownloadError, FetchError, HistoryError, InvalidSelectionError, MergeError, QueueError, ResolutionCause,
    ResolutionError,
};
pub use executor::{FetchExecutor, FetchReport};
pub use history::{RecentEntry, RecentUrls};
pub use merge::MergeEngine;
pub use models::{
    FetchEvent, FetchProgress, FetchState, FetchTask, MergeMode, MergePlan, Representation, RepresentationKind,
    Representations, ResourceEntry, TrackRole,
};
pub use orchestrator::{DownloadQueue, Downloader, JobKind, QueueEvent};
pub use planner::AcquisitionPlanner;
pub use selection::{SelectionAxis, SelectionState};
pub use traits::{ExtractionCapability, MediaCombinationCapability, ProgressEmitter, ThumbnailProbe};
