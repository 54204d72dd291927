// framecull-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Args, Parser, Subcommand};
use framecull_core::{CoreError, FrameImageFormat, OutputFormat, SimilarityStrategy};
use std::path::PathBuf;
use std::str::FromStr;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "framecull: drop duplicate video frames",
    long_about = "Samples a video, keeps only frames that differ from the previously kept frame, \
                  and optionally extracts their text, re-assembles them into a video and uploads it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug output to the console and the log file
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for log files (defaults to WORK_DIR/logs)
    #[arg(long, global = true, value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Do not write a log file
    #[arg(long, global = true)]
    pub no_log: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decodes a video and keeps the frames that are not duplicates
    Dedupe(DedupeArgs),
    /// Re-assembles the kept frames of a run into video files
    Assemble(AssembleArgs),
    /// Sends every kept frame of a run to a vision model and tabulates the text
    ExtractText(ExtractTextArgs),
    /// Uploads a file to blob storage
    Upload(UploadArgs),
    /// Runs dedup and every requested later stage in one go
    Process(ProcessArgs),
    /// Deletes a run directory and its frames
    Cleanup(CleanupArgs),
}

impl Commands {
    /// Short name used in log file names.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Dedupe(_) => "dedupe",
            Commands::Assemble(_) => "assemble",
            Commands::ExtractText(_) => "extract-text",
            Commands::Upload(_) => "upload",
            Commands::Process(_) => "process",
            Commands::Cleanup(_) => "cleanup",
        }
    }
}

/// Parses any core enum that implements `FromStr`.
fn parse_value<T: FromStr<Err = CoreError>>(s: &str) -> Result<T, String> {
    s.parse().map_err(|e: CoreError| e.to_string())
}

#[derive(Args, Debug, Clone)]
pub struct DedupeOptions {
    /// Local video file, streaming-platform URL or direct download URL
    #[arg(short = 'i', long = "input", required = true, value_name = "PATH_OR_URL")]
    pub input: String,

    /// Directory under which run directories are created
    #[arg(short = 'w', long, value_name = "WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Consider only about this many frames per second of video
    #[arg(long, value_name = "FPS")]
    pub target_fps: Option<f64>,

    /// Override the frame rate declared by the source
    #[arg(long, value_name = "FPS")]
    pub source_fps: Option<f64>,

    /// Duplicate test: histogram (exact) or pixel (distance threshold)
    #[arg(long, value_name = "STRATEGY", value_parser = parse_value::<SimilarityStrategy>)]
    pub strategy: Option<SimilarityStrategy>,

    /// Pixel distance below which two frames count as duplicates
    #[arg(long, value_name = "DISTANCE")]
    pub threshold: Option<f64>,

    /// Image encoding of kept frames (jpeg or png)
    #[arg(long, value_name = "FORMAT", value_parser = parse_value::<FrameImageFormat>)]
    pub image_format: Option<FrameImageFormat>,
}

#[derive(Parser, Debug)]
pub struct DedupeArgs {
    #[command(flatten)]
    pub options: DedupeOptions,
}

#[derive(Args, Debug, Clone)]
pub struct AssembleOptions {
    /// Frame rate of the re-assembled video
    #[arg(long, value_name = "FPS")]
    pub output_fps: Option<f64>,

    /// Output container; repeat for more than one (the first is encoded, the rest transcoded)
    #[arg(long = "format", value_name = "FORMAT", value_parser = parse_value::<OutputFormat>)]
    pub formats: Vec<OutputFormat>,
}

#[derive(Parser, Debug)]
pub struct AssembleArgs {
    /// Run directory produced by `dedupe`
    #[arg(short = 'r', long = "run", required = true, value_name = "RUN_DIR")]
    pub run_dir: PathBuf,

    /// Where to write the videos (defaults to the run directory)
    #[arg(short = 'o', long, value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub assemble: AssembleOptions,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractionOptions {
    /// API key for the vision model
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Vision model name
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Maximum number of concurrent extraction calls
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: Option<u16>,
}

#[derive(Parser, Debug)]
pub struct ExtractTextArgs {
    /// Run directory produced by `dedupe`
    #[arg(short = 'r', long = "run", required = true, value_name = "RUN_DIR")]
    pub run_dir: PathBuf,

    /// CSV result table (defaults to RUN_DIR/results.csv)
    #[arg(long, value_name = "FILE")]
    pub results: Option<PathBuf>,

    /// Also write the results as JSON
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    #[command(flatten)]
    pub extraction: ExtractionOptions,
}

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// File to upload
    #[arg(short = 'f', long = "file", required = true, value_name = "FILE")]
    pub file: PathBuf,

    /// Container URL including its SAS token
    #[arg(long, value_name = "URL", env = "FRAMECULL_BLOB_CONTAINER_URL", hide_env_values = true)]
    pub container_url: String,
}

#[derive(Parser, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub options: DedupeOptions,

    /// Extract text from the kept frames
    #[arg(long)]
    pub extract_text: bool,

    /// Re-assemble the kept frames into video files
    #[arg(long)]
    pub assemble: bool,

    /// Upload the re-assembled videos
    #[arg(long, requires = "assemble")]
    pub upload: bool,

    /// Delete a downloaded source video once the run is done
    #[arg(long)]
    pub remove_source: bool,

    #[command(flatten)]
    pub assemble_options: AssembleOptions,

    #[command(flatten)]
    pub extraction: ExtractionOptions,

    /// Container URL including its SAS token
    #[arg(long, value_name = "URL", env = "FRAMECULL_BLOB_CONTAINER_URL", hide_env_values = true)]
    pub container_url: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Run directory to delete
    #[arg(short = 'r', long = "run", required = true, value_name = "RUN_DIR")]
    pub run_dir: PathBuf,
}
