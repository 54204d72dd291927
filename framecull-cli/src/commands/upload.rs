//! Implementation of the 'upload' subcommand.

use crate::cli::UploadArgs;
use crate::error::CliResult;
use crate::terminal;

use framecull_core::config::DEFAULT_UPLOAD_TIMEOUT;
use framecull_core::{ArtifactUploader, AzureBlobUploader, CoreError, format_bytes};

pub fn run_upload(args: UploadArgs) -> CliResult<()> {
    if !args.file.is_file() {
        return Err(CoreError::UploadFailed(format!(
            "{} is not a file",
            args.file.display()
        )));
    }
    let size = std::fs::metadata(&args.file)?.len();

    let uploader = AzureBlobUploader::new(&args.container_url, DEFAULT_UPLOAD_TIMEOUT)?;
    let url = uploader.upload_artifact(&args.file)?;

    terminal::print_section("Upload");
    terminal::print_status("File", &args.file.display().to_string(), false);
    terminal::print_status("Size", &format_bytes(size), false);
    terminal::print_status("URL", &url, true);
    Ok(())
}
