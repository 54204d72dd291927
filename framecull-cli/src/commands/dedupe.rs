//! Implementation of the 'dedupe' subcommand.
//!
//! Acquires the input, decodes it and writes the kept frames plus the run
//! index into a fresh run directory.

use crate::cli::{DedupeArgs, DedupeOptions};
use crate::commands::{preflight, print_dedup_summary};
use crate::error::{CliErrorContext, CliResult};
use crate::terminal;

use framecull_core::external::{CrateFfprobeExecutor, SidecarSpawner};
use framecull_core::{
    CoreConfig, CoreConfigBuilder, DefaultAcquirer, Pipeline, Reporter, VideoAcquirer,
    format_duration,
};

use log::debug;
use std::time::Instant;

/// Creates a CoreConfig from the dedup options. Validation happens when the
/// pipeline is built.
pub fn build_config(options: &DedupeOptions) -> CoreConfig {
    let mut builder = CoreConfigBuilder::new();
    if let Some(dir) = &options.work_dir {
        builder = builder.work_dir(dir.clone());
    }
    if let Some(fps) = options.target_fps {
        builder = builder.target_fps(fps);
    }
    if let Some(fps) = options.source_fps {
        builder = builder.source_fps_override(fps);
    }
    if let Some(strategy) = options.strategy {
        builder = builder.similarity_strategy(strategy);
    }
    if let Some(threshold) = options.threshold {
        builder = builder.duplicate_threshold(threshold);
    }
    if let Some(format) = options.image_format {
        builder = builder.frame_image_format(format);
    }
    builder.build()
}

pub fn run_dedupe(args: DedupeArgs, reporter: &dyn Reporter) -> CliResult<()> {
    let started = Instant::now();
    let source = preflight(&args.options.input)?;
    let config = build_config(&args.options);
    debug!("Dedup config: {:?}", config);

    let acquirer = DefaultAcquirer::new(config.download_timeout)?;
    let acquired = acquirer.acquire_video(&source, &config.work_dir.join("downloads"))?;

    let pipeline = Pipeline::new(config)?.reporter(reporter);
    let run = pipeline.dedupe(
        &SidecarSpawner,
        &CrateFfprobeExecutor::new(),
        &acquired.path,
        &source.to_string(),
    )?;

    let index = run
        .index()
        .cli_context("dedup finished without a run index")?;
    print_dedup_summary(run.dir(), index);
    terminal::print_status(
        "Total time",
        &format_duration(started.elapsed().as_secs_f64()),
        false,
    );
    Ok(())
}
