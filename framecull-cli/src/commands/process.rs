//! Implementation of the 'process' subcommand.
//!
//! Runs acquisition and dedup, then every stage that was asked for, against
//! one run. A stage with nothing to process is skipped and does not fail the
//! command.

use crate::cli::ProcessArgs;
use crate::commands::assemble::{apply_assemble_options, print_artifacts};
use crate::commands::dedupe::build_config;
use crate::commands::extract_text::{apply_extraction_options, build_extractor, print_extraction};
use crate::commands::{preflight, print_dedup_summary};
use crate::error::{CliErrorContext, CliResult};
use crate::terminal;

use framecull_core::external::{CrateFfprobeExecutor, SidecarSpawner};
use framecull_core::run::load_index;
use framecull_core::{
    ArtifactUploader, AzureBlobUploader, CoreError, DefaultAcquirer, FfmpegVideoEncoder, Pipeline,
    Reporter, Stages, TextExtractor, VideoEncoder, format_duration,
};

use log::debug;
use std::time::Instant;

pub fn run_process(args: ProcessArgs, reporter: &dyn Reporter) -> CliResult<()> {
    let started = Instant::now();
    let source = preflight(&args.options.input)?;
    if args.remove_source && !source.is_remote() {
        terminal::print_warning(&format!(
            "--remove-source only deletes downloaded sources; {source} is kept"
        ));
    }

    let mut config = build_config(&args.options);
    apply_assemble_options(&mut config, &args.assemble_options);
    apply_extraction_options(&mut config, &args.extraction);
    config.remove_source_after_run = args.remove_source;
    debug!("Process config: {:?}", config);

    // Collaborators are built before any work starts so a missing key or URL
    // fails fast.
    let extractor = if args.extract_text {
        Some(build_extractor(&args.extraction, &config)?)
    } else {
        None
    };
    let encoder = args
        .assemble
        .then(|| FfmpegVideoEncoder::new(SidecarSpawner));
    let uploader = if args.upload {
        let url = args
            .container_url
            .as_deref()
            .cli_context("--upload needs a container URL (--container-url or FRAMECULL_BLOB_CONTAINER_URL)")?;
        Some(AzureBlobUploader::new(url, config.upload_timeout)?)
    } else {
        None
    };

    let acquirer = DefaultAcquirer::new(config.download_timeout)?;
    let pipeline = Pipeline::new(config)?.reporter(reporter);
    let stages = Stages {
        extractor: extractor.as_ref().map(|e| e as &dyn TextExtractor),
        encoder: encoder.as_ref().map(|e| e as &dyn VideoEncoder),
        uploader: uploader.as_ref().map(|u| u as &dyn ArtifactUploader),
    };

    let result = pipeline.process(
        &args.options.input,
        &acquirer,
        &SidecarSpawner,
        &CrateFfprobeExecutor::new(),
        &stages,
    )?;

    let index = load_index(&result.run_dir)?;
    print_dedup_summary(&result.run_dir, &index);
    if let (Some(entries), Some(table)) = (&result.extracted_text, &result.results_table) {
        print_extraction(entries, table);
    }
    if !result.artifacts.is_empty() {
        print_artifacts(&result.artifacts);
    }
    if !result.uploaded_urls.is_empty() {
        terminal::print_section("Upload");
        for url in &result.uploaded_urls {
            terminal::print_status("URL", url, true);
        }
    }
    if let Some(reason) = &result.upload_failure {
        terminal::print_warning(&format!(
            "Upload stopped after {} of {} artifacts",
            result.uploaded_urls.len(),
            result.artifacts.len()
        ));
        return Err(CoreError::UploadFailed(reason.clone()));
    }
    for stage in &result.skipped_stages {
        terminal::print_warning(&format!("{stage}: nothing to process"));
    }

    terminal::print_status(
        "Total time",
        &format_duration(started.elapsed().as_secs_f64()),
        false,
    );
    Ok(())
}
