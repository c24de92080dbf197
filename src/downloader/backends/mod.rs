// Concrete capabilities

pub mod ffmpeg;
pub mod thumbnails;
pub mod ytdlp;

pub use ffmpeg::FfmpegCombiner;
pub use thumbnails::HttpThumbnailProbe;
pub use ytdlp::YtDlpExtractor;
