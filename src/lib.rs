pub mod downloader;

use tracing_subscriber::{fmt, EnvFilter};

pub use downloader::{
    AcquisitionPlanner, DownloadError, DownloadQueue, Downloader, DownloaderConfig, FetchExecutor, MergeEngine,
    QueueEvent, RepresentationCatalog, ResourceEntry, SelectionAxis, SelectionState,
};

/// Install the global tracing subscriber (`RUST_LOG`, default `info`)
pub fn init_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[Logging] subscriber already installed: {}", e);
    }
}
