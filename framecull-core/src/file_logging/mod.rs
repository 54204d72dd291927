//! log4rs configuration for framecull binaries.

pub mod setup;

pub use setup::setup_file_logging;
