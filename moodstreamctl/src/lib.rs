use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use moodstream_core::{
    load_moodstream_config, validate_mood, AssembledPlaylist, ClipRef, ConcatWriter, Credentials,
    MoodstreamConfig, Pipeline, PipelineReport, PlaylistBuilder, SceneFetcher, StreamEncoder,
    StreamUploader, TransferProgress, UploadOutcome,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] moodstream_core::ConfigError),
    #[error("fetch error: {0}")]
    Fetch(#[from] moodstream_core::FetchError),
    #[error("playlist error: {0}")]
    Playlist(#[from] moodstream_core::PlaylistError),
    #[error("{0}")]
    Pipeline(#[from] moodstream_core::PipelineError),
    #[error("upload error: {0}")]
    Upload(#[from] moodstream_core::UploadError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Builds mood streams and uploads them to the media host", long_about = None)]
pub struct Cli {
    /// Path to moodstream.toml; built-in defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch scenes, build the playlist, encode and upload one mood
    Run(RunArgs),
    /// Build a playlist and write the concat list without encoding
    Playlist(PlaylistArgs),
    /// Upload a finished file
    Upload(UploadArgs),
    /// Ask the media host how much of a checkpointed upload it holds
    Offset(OffsetArgs),
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Mood slug, e.g. `calm`
    #[arg(long)]
    pub mood: String,
    /// Number of numbered scenes to download
    #[arg(long, default_value_t = 12)]
    pub scenes: usize,
    /// Seed for a reproducible shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PlaylistArgs {
    #[arg(long)]
    pub mood: String,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Overrides [playlist].target_seconds
    #[arg(long)]
    pub target_seconds: Option<f64>,
    /// Clips to shuffle; defaults to the .mp4 files already in the mood directory
    pub clips: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub file: PathBuf,
    /// Fail unless a matching checkpoint exists
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

#[derive(Args, Debug)]
pub struct OffsetArgs {
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        clap_complete::generate(args.shell, &mut command, name, &mut std::io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Run(args) => {
            let report = context.run_pipeline(args).await?;
            render(&report, cli.format)?;
        }
        Commands::Playlist(args) => {
            let summary = context.playlist(args)?;
            render(&summary, cli.format)?;
        }
        Commands::Upload(args) => {
            let outcome = context.upload(args).await?;
            render(&outcome, cli.format)?;
        }
        Commands::Offset(args) => {
            let report = context.offset(args).await?;
            render(&report, cli.format)?;
        }
        Commands::Completions(_) => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: MoodstreamConfig,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_moodstream_config(path)?,
            None => MoodstreamConfig::default(),
        };
        Ok(Self { config })
    }

    fn uploader(&self) -> Result<StreamUploader> {
        let credentials = Credentials::from_env(&self.config.upload)?;
        let uploader = StreamUploader::from_config(&self.config.upload, credentials)?
            .with_engine(|engine| engine.with_observer(Arc::new(log_progress)));
        Ok(uploader)
    }

    async fn run_pipeline(&self, args: &RunArgs) -> Result<PipelineReport> {
        let fetcher = SceneFetcher::from_config(&self.config.fetch, &self.config.paths.moods_dir)?;
        let encoder = StreamEncoder::new(&self.config.encode.ffmpeg, None);
        let uploader = self.uploader()?;
        let _interrupt = cancel_on_ctrl_c(&uploader);
        let mut pipeline = Pipeline::new(self.config.clone(), fetcher, encoder, uploader)
            .with_builder(builder(args.seed));
        Ok(pipeline.run(&args.mood, args.scenes).await?)
    }

    fn playlist(&self, args: &PlaylistArgs) -> Result<AssembledPlaylist> {
        let mood = validate_mood(&args.mood)?;
        let mood_dir = self.config.mood_dir(mood);
        let clips = if args.clips.is_empty() {
            scan_clips(&mood_dir)?
        } else {
            args.clips.iter().cloned().map(ClipRef::from).collect()
        };
        if clips.is_empty() {
            return Err(AppError::MissingResource(format!(
                "no clips found in {}",
                mood_dir.display()
            )));
        }

        let target = args
            .target_seconds
            .unwrap_or(self.config.playlist.target_seconds);
        let playlist =
            builder(args.seed).build(&clips, self.config.playlist.per_clip_seconds, target)?;
        let concat_path = ConcatWriter::in_dir(&mood_dir).write(&playlist)?;
        info!(mood, entries = playlist.len(), path = %concat_path.display(), "playlist written");
        Ok(AssembledPlaylist {
            playlist,
            concat_path,
        })
    }

    async fn upload(&self, args: &UploadArgs) -> Result<UploadOutcome> {
        let uploader = self.uploader()?;
        let _interrupt = cancel_on_ctrl_c(&uploader);
        let outcome = if args.resume {
            uploader.resume(&args.file).await?
        } else {
            uploader.upload(&args.file).await?
        };
        Ok(outcome)
    }

    async fn offset(&self, args: &OffsetArgs) -> Result<OffsetReport> {
        let uploader = self.uploader()?;
        let (checkpoint, server_offset) = uploader.checkpointed_offset(&args.file).await?;
        Ok(OffsetReport {
            file: args.file.clone(),
            content_id: checkpoint.session.content_id,
            endpoint: checkpoint.session.endpoint,
            total_length: checkpoint.session.total_length,
            checkpoint_offset: checkpoint.confirmed_offset,
            server_offset,
        })
    }
}

fn builder(seed: Option<u64>) -> PlaylistBuilder {
    match seed {
        Some(seed) => PlaylistBuilder::with_seed(seed),
        None => PlaylistBuilder::from_entropy(),
    }
}

fn scan_clips(dir: &Path) -> Result<Vec<ClipRef>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "mp4") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(ClipRef::from).collect())
}

fn log_progress(progress: &TransferProgress) {
    info!(
        offset = progress.confirmed_offset(),
        total = progress.total_length(),
        percent = progress.percent(),
        "upload progress"
    );
}

/// Routes Ctrl-C into the uploader's cancellation flag until the guard drops.
/// The pipeline checks the flag between stages and the transfer between chunks.
fn cancel_on_ctrl_c(uploader: &StreamUploader) -> InterruptGuard {
    let flag = uploader.cancellation().clone();
    InterruptGuard(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next stage or chunk boundary");
            flag.cancel();
        }
    }))
}

struct InterruptGuard(tokio::task::JoinHandle<()>);

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Serialize)]
pub struct OffsetReport {
    pub file: PathBuf,
    pub content_id: String,
    pub endpoint: String,
    pub total_length: u64,
    pub checkpoint_offset: u64,
    pub server_offset: u64,
}

impl DisplayFallback for OffsetReport {
    fn display(&self) -> String {
        let percent = if self.total_length == 0 {
            100.0
        } else {
            self.server_offset as f64 * 100.0 / self.total_length as f64
        };
        format!(
            "{}\n  content: {}\n  endpoint: {}\n  server offset: {} / {} bytes ({percent:.1}%)\n  checkpoint offset: {}",
            self.file.display(),
            self.content_id,
            self.endpoint,
            self.server_offset,
            self.total_length,
            self.checkpoint_offset
        )
    }
}

impl DisplayFallback for UploadOutcome {
    fn display(&self) -> String {
        format!(
            "uploaded {} bytes in {} chunk(s)\ncontent id: {}",
            self.bytes_sent, self.chunks_sent, self.content_id
        )
    }
}

impl DisplayFallback for AssembledPlaylist {
    fn display(&self) -> String {
        let mut out = format!(
            "{} entries, {} pass(es), ~{:.0}s (target {:.0}s)\nconcat list: {}",
            self.playlist.len(),
            self.playlist.passes(),
            self.playlist.estimated_seconds(),
            self.playlist.target_seconds(),
            self.concat_path.display()
        );
        for (idx, clip) in self.playlist.iter().enumerate() {
            let _ = write!(out, "\n{:>4}. {}", idx + 1, clip);
        }
        out
    }
}

impl DisplayFallback for PipelineReport {
    fn display(&self) -> String {
        format!(
            "mood {}: {} scene(s), {} playlist entries (~{:.0}s)\nencoded: {}\n{}",
            self.mood,
            self.scenes,
            self.playlist_entries,
            self.estimated_seconds,
            self.output_path.display(),
            self.upload.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn prepare_context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let config_path = root.join("moodstream.toml");
        fs::write(
            &config_path,
            format!(
                "[paths]\nmoods_dir = \"{}\"\noutput_dir = \"{}\"\n\n[playlist]\nper_clip_seconds = 10.0\ntarget_seconds = 60.0\n",
                root.join("moods").display(),
                root.join("output").display()
            ),
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "moodstreamctl",
            "--config",
            config_path.to_str().unwrap(),
            "playlist",
            "--mood",
            "calm",
        ])
        .unwrap();
        let context = AppContext::new(&cli).unwrap();
        (temp, context)
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "moodstreamctl",
            "upload",
            "out/calm_30min.mp4",
            "--resume",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Upload(args) => {
                assert!(args.resume);
                assert_eq!(args.file, PathBuf::from("out/calm_30min.mp4"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn playlist_scans_mood_directory() {
        let (temp, context) = prepare_context();
        let mood_dir = temp.path().join("moods/calm");
        fs::create_dir_all(&mood_dir).unwrap();
        for idx in 1..=3 {
            fs::write(mood_dir.join(format!("scene_{idx}.mp4")), b"clip").unwrap();
        }
        fs::write(mood_dir.join("notes.txt"), b"skip").unwrap();

        let assembled = context
            .playlist(&PlaylistArgs {
                mood: "calm".into(),
                seed: Some(9),
                target_seconds: None,
                clips: Vec::new(),
            })
            .unwrap();
        assert_eq!(assembled.playlist.len(), 6);
        assert_eq!(assembled.concat_path, mood_dir.join("concat_list.txt"));
        let listing = fs::read_to_string(&assembled.concat_path).unwrap();
        assert!(!listing.contains("notes.txt"));
        assert!(assembled.display().contains("6 entries, 2 pass(es)"));
    }

    #[test]
    fn playlist_without_clips_is_reported() {
        let (temp, context) = prepare_context();
        fs::create_dir_all(temp.path().join("moods/quiet")).unwrap();
        let result = context.playlist(&PlaylistArgs {
            mood: "quiet".into(),
            seed: None,
            target_seconds: None,
            clips: Vec::new(),
        });
        assert!(matches!(result, Err(AppError::MissingResource(_))));
    }

    #[test]
    fn invalid_mood_is_rejected() {
        let (_temp, context) = prepare_context();
        let result = context.playlist(&PlaylistArgs {
            mood: "../etc".into(),
            seed: None,
            target_seconds: None,
            clips: vec![PathBuf::from("a.mp4")],
        });
        assert!(matches!(result, Err(AppError::Fetch(_))));
    }

    #[test]
    fn offset_report_text_shows_percentage() {
        let report = OffsetReport {
            file: PathBuf::from("calm_30min.mp4"),
            content_id: "abc".into(),
            endpoint: "https://upload.test/tus/abc".into(),
            total_length: 200,
            checkpoint_offset: 40,
            server_offset: 50,
        };
        let text = report.display();
        assert!(text.contains("50 / 200 bytes (25.0%)"));
        assert!(text.contains("checkpoint offset: 40"));
    }
}
