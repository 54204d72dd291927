//! Implementation of the 'assemble' subcommand.

use crate::cli::{AssembleArgs, AssembleOptions};
use crate::error::CliResult;
use crate::terminal;

use framecull_core::external::SidecarSpawner;
use framecull_core::{
    CoreConfig, CoreError, FfmpegVideoEncoder, Pipeline, PipelineRun, Reporter, VideoArtifact,
    check_dependency, format_bytes, format_duration,
};

use std::path::Path;

/// Applies re-assembly options to `config`.
pub fn apply_assemble_options(config: &mut CoreConfig, options: &AssembleOptions) {
    if let Some(fps) = options.output_fps {
        config.output_fps = fps;
    }
    if !options.formats.is_empty() {
        let mut formats = Vec::with_capacity(options.formats.len());
        for format in &options.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        config.output_formats = formats;
    }
}

pub(crate) fn print_artifacts(artifacts: &[VideoArtifact]) {
    terminal::print_section("Re-assembly");
    for artifact in artifacts {
        let size = std::fs::metadata(&artifact.path).map(|m| m.len()).unwrap_or(0);
        terminal::print_status(
            &artifact.format.to_string(),
            &format!(
                "{} ({} frames, {}, {})",
                artifact.path.display(),
                artifact.frame_count,
                format_duration(artifact.duration_secs()),
                format_bytes(size)
            ),
            false,
        );
    }
}

pub fn run_assemble(args: AssembleArgs, reporter: &dyn Reporter) -> CliResult<()> {
    let mut run = PipelineRun::open(&args.run_dir)?;
    if run.frames().is_empty() {
        return Err(CoreError::EmptyFrameSet(args.run_dir.display().to_string()));
    }
    check_dependency("ffmpeg")?;

    let work_dir = args.run_dir.parent().unwrap_or_else(|| Path::new("."));
    let mut config = CoreConfig::new(work_dir.to_path_buf());
    apply_assemble_options(&mut config, &args.assemble);

    let pipeline = Pipeline::new(config)?.reporter(reporter);
    let encoder = FfmpegVideoEncoder::new(SidecarSpawner);
    let artifacts = pipeline.assemble(&encoder, &mut run, args.output_dir.as_deref())?;

    print_artifacts(&artifacts);
    terminal::print_success(&format!("{} video file(s) written", artifacts.len()));
    Ok(())
}
