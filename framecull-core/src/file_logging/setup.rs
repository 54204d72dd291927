use anyhow::Result;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use std::path::Path;

/// Pattern used for log files.
pub const FILE_LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}";

/// Installs the global logger.
///
/// Records at `log_level` and above go to `log_file` when one is given.
/// stderr only shows `console_level` and above, so the terminal reporter
/// stays readable.
pub fn setup_file_logging(
    log_file: Option<&Path>,
    log_level: LevelFilter,
    console_level: LevelFilter,
) -> Result<()> {
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{h({l})}] {m}{n}")))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(console_level)))
            .build("console", Box::new(console)),
    );
    let mut root = Root::builder().appender("console");

    if let Some(log_file) = log_file {
        // Create log directory if it doesn't exist
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file_appender = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_LOG_PATTERN)))
            .build(log_file)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file_appender)));
        root = root.appender("file");
    }

    let root_level = if log_file.is_some() {
        log_level.max(console_level)
    } else {
        console_level
    };
    let config = builder.build(root.build(root_level))?;
    log4rs::init_config(config)?;

    Ok(())
}
