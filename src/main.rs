use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use sakura_downloader_lib::downloader::models::{FetchEvent, Representation};
use sakura_downloader_lib::downloader::tools::ToolManager;
use sakura_downloader_lib::{DownloadQueue, Downloader, DownloaderConfig, QueueEvent, ResourceEntry, SelectionAxis};

#[derive(Parser)]
#[command(name = "sakura-downloader", version, about)]
struct Cli {
    /// Config file (default: <config dir>/sakura-downloader/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SOCKS5/HTTP proxy for yt-dlp and thumbnail probes
    #[arg(long, global = true)]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a URL and list its representations
    Info { url: String },

    /// Download the selected representations of a URL
    Download {
        url: String,
        /// Video or combined representation id
        #[arg(long)]
        video: Option<String>,
        /// Audio-only representation id
        #[arg(long)]
        audio: Option<String>,
        /// Dubbed audio representation id
        #[arg(long)]
        dub: Option<String>,
        /// Also fetch the subtitle track for this language
        #[arg(long)]
        subtitle: Option<String>,
        /// Also fetch the best available thumbnail
        #[arg(long)]
        thumbnail: bool,
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show or edit the recent-URL list
    History {
        #[arg(long, conflicts_with = "clear")]
        remove: Option<String>,
        #[arg(long)]
        clear: bool,
    },

    /// Report yt-dlp / ffmpeg / ffprobe availability
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    sakura_downloader_lib::init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DownloaderConfig::load_from(path)
            .map_err(|e| anyhow!("{}: {}", path.display(), e))?
            .with_env_overrides(),
        None => DownloaderConfig::load(),
    };
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy.clone());
    }

    match cli.command {
        Command::Info { url } => {
            let mut queue = DownloadQueue::new(Downloader::new(config));
            let entry = add(&mut queue, &url).await?;
            print_entry(&entry);
        }
        Command::Download {
            url,
            video,
            audio,
            dub,
            subtitle,
            thumbnail,
            out,
        } => download(config, &url, [video, audio, dub, subtitle.clone()], subtitle.is_some(), thumbnail, out).await?,
        Command::History { remove, clear } => {
            let mut queue = DownloadQueue::new(Downloader::new(config));
            if clear {
                queue.clear_history()?;
            } else if let Some(url) = remove {
                if !queue.remove_history(&url)? {
                    bail!("{} is not in the history", url);
                }
            }
            for entry in queue.history() {
                match &entry.thumb_url {
                    Some(thumb) => println!("{}  [{}]", entry.url, thumb),
                    None => println!("{}", entry.url),
                }
            }
        }
        Command::Tools => {
            for tool in ToolManager::new(&config).get_all_tools() {
                let location = tool
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "not found".to_string());
                println!(
                    "{:8} {:10} {}",
                    tool.name,
                    tool.version.as_deref().unwrap_or("-"),
                    location
                );
            }
        }
    }

    Ok(())
}

async fn add(queue: &mut DownloadQueue, url: &str) -> Result<ResourceEntry> {
    queue.request_add(url)?;
    match queue.next_event().await {
        Some(QueueEvent::AddFailed { error, .. }) => Err(error.into()),
        Some(QueueEvent::Added { url, .. }) => queue
            .get(&url)
            .cloned()
            .with_context(|| format!("{} vanished from the queue", url)),
        other => bail!("unexpected queue event: {:?}", other),
    }
}

async fn download(
    config: DownloaderConfig,
    url: &str,
    picks: [Option<String>; 4],
    subtitles: bool,
    thumbnail: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Progress { task, progress } => {
                    if let Some(percent) = progress.percent {
                        tracing::info!("[Progress] {} {:.1}%", task, percent);
                    }
                }
                other => tracing::debug!("[Progress] {:?}", other),
            }
        }
    });

    let mut queue = DownloadQueue::new(Downloader::new(config).with_events(tx));
    if let Some(dir) = out {
        queue = queue.with_output_dir(dir);
    }
    let entry = add(&mut queue, url).await?;
    let key = entry.source_url.clone();

    let axes = [
        SelectionAxis::Video,
        SelectionAxis::Audio,
        SelectionAxis::Dub,
        SelectionAxis::Subtitle,
    ];
    for (axis, pick) in axes.into_iter().zip(picks) {
        if let Some(id) = pick {
            queue.select(&key, axis, &id)?;
        }
    }

    queue.request_download(&key)?;
    if subtitles && !queue.request_subtitles(&key)? {
        tracing::warn!("[Cli] No subtitles available for {}", key);
    }
    if thumbnail && !queue.request_thumbnail(&key)? {
        tracing::warn!("[Cli] No thumbnail available for {}", key);
    }

    let mut failed = 0;
    for event in queue.run_until_idle().await {
        match event {
            QueueEvent::Finished { kind, output: Some(path), .. } => println!("{}: {}", kind, path.display()),
            QueueEvent::Failed { kind, error, .. } => {
                eprintln!("{} failed: {}", kind, error);
                failed += 1;
            }
            _ => {}
        }
    }
    if failed > 0 {
        bail!("{} job(s) failed", failed);
    }
    Ok(())
}

fn print_entry(entry: &ResourceEntry) {
    let reps = &entry.representations;
    let sel = &entry.selection;
    println!("{}\n{}", entry.title, entry.source_url);

    let sections: [(&str, &[Representation], Option<&str>); 6] = [
        ("video-only", reps.video_only.as_slice(), sel.video()),
        ("combined", reps.combined.as_slice(), sel.video()),
        ("audio-only", reps.audio_only.as_slice(), sel.audio()),
        ("dubbed audio", reps.dubbed_audio.as_slice(), sel.dub()),
        ("subtitles", reps.subtitles.as_slice(), sel.subtitle()),
        ("thumbnails", reps.thumbnails.as_slice(), sel.thumbnail()),
    ];
    for (name, list, chosen) in sections {
        if list.is_empty() {
            continue;
        }
        println!("\n{}:", name);
        for rep in list {
            let mark = if chosen == Some(rep.id.as_str()) { '*' } else { ' ' };
            println!(" {} {:12} {}", mark, rep.id, rep.label());
        }
    }
    if !reps.skipped.is_empty() {
        println!("\nskipped: {}", reps.skipped.join(", "));
    }
}
