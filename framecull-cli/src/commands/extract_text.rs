//! Implementation of the 'extract-text' subcommand.

use crate::cli::{ExtractTextArgs, ExtractionOptions};
use crate::error::{CliErrorContext, CliResult};
use crate::terminal;

use framecull_core::pipeline::RESULTS_CSV_FILE;
use framecull_core::{
    CoreConfig, CoreError, ExtractionEntry, OpenAiVisionExtractor, Pipeline, PipelineRun, Reporter,
    write_results_csv, write_results_json,
};

use std::path::Path;

/// Builds the vision-model extractor from CLI options.
pub fn build_extractor(
    options: &ExtractionOptions,
    config: &CoreConfig,
) -> CliResult<OpenAiVisionExtractor> {
    let api_key = options
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .cli_context("an API key is required (--api-key or OPENAI_API_KEY)")?;
    let mut extractor = OpenAiVisionExtractor::new(api_key, config.extraction_timeout)?;
    if let Some(model) = &options.model {
        extractor = extractor.model(model.clone());
    }
    Ok(extractor)
}

/// Applies extraction options to `config`.
pub fn apply_extraction_options(config: &mut CoreConfig, options: &ExtractionOptions) {
    if let Some(concurrency) = options.concurrency {
        config.extraction_concurrency = usize::from(concurrency);
    }
}

pub(crate) fn print_extraction(entries: &[ExtractionEntry], table: &Path) {
    let failed = entries.iter().filter(|e| e.is_failed()).count();
    terminal::print_section("Text extraction");
    terminal::print_status("Frames", &entries.len().to_string(), false);
    terminal::print_status("Failed", &failed.to_string(), failed > 0);
    terminal::print_status("Result table", &table.display().to_string(), true);
    if failed > 0 {
        terminal::print_warning(&format!(
            "{failed} frame(s) could not be read; their rows start with ERROR:"
        ));
    }
}

pub fn run_extract_text(args: ExtractTextArgs, reporter: &dyn Reporter) -> CliResult<()> {
    let run = PipelineRun::open(&args.run_dir)?;
    if run.frames().is_empty() {
        return Err(CoreError::EmptyFrameSet(args.run_dir.display().to_string()));
    }

    let mut config = CoreConfig::new(run.dir().to_path_buf());
    apply_extraction_options(&mut config, &args.extraction);
    let extractor = build_extractor(&args.extraction, &config)?;
    let pipeline = Pipeline::new(config)?.reporter(reporter);

    let entries = pipeline.extract_all_text(&extractor, &run)?;

    let csv_path = args
        .results
        .unwrap_or_else(|| run.dir().join(RESULTS_CSV_FILE));
    write_results_csv(&entries, &csv_path)?;
    if let Some(json_path) = &args.json {
        write_results_json(&entries, json_path)?;
    }

    print_extraction(&entries, &csv_path);
    Ok(())
}
