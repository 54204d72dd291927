// ============================================================================
// framecull-core/src/acquisition.rs
// ============================================================================
//
// VIDEO ACQUISITION: Turning a User-Supplied Source into a Local File
//
// The input string is classified once into a `VideoSource` variant; every
// later decision is an exhaustive match on that variant. All failures at this
// boundary are reported as `SourceUnreachable` with the cause attached, and
// nothing is retried here.

use crate::error::{CoreError, CoreResult};
use crate::external::check_dependency;
use crate::temp_files;
use crate::utils::sanitize_file_name;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// Hosts handled by the streaming-platform downloader.
const STREAMING_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

const YT_DLP: &str = "yt-dlp";
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where a source video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    LocalFile(PathBuf),
    RemoteStreamingPlatform(Url),
    DirectBlobDownload(Url),
}

impl VideoSource {
    /// Classifies user input. http(s) URLs on a streaming host go to the
    /// platform downloader, other http(s) URLs are fetched directly, and
    /// anything else is a local path.
    pub fn classify(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::SourceUnreachable("empty source".to_string()));
        }

        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
                if STREAMING_HOSTS.contains(&host.as_str()) {
                    Ok(VideoSource::RemoteStreamingPlatform(url))
                } else {
                    Ok(VideoSource::DirectBlobDownload(url))
                }
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(VideoSource::LocalFile)
                .map_err(|_| CoreError::SourceUnreachable(format!("invalid file URL {trimmed}"))),
            _ => Ok(VideoSource::LocalFile(PathBuf::from(trimmed))),
        }
    }

    /// True when acquiring the source downloads it.
    pub fn is_remote(&self) -> bool {
        !matches!(self, VideoSource::LocalFile(_))
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::LocalFile(path) => write!(f, "{}", path.display()),
            VideoSource::RemoteStreamingPlatform(url) | VideoSource::DirectBlobDownload(url) => {
                write!(f, "{url}")
            }
        }
    }
}

/// A source video available on the local file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredVideo {
    pub path: PathBuf,
    /// True when the file was fetched for this run and may be deleted after it.
    pub downloaded: bool,
}

/// Collaborator that makes a `VideoSource` available locally.
pub trait VideoAcquirer {
    fn acquire_video(&self, source: &VideoSource, download_dir: &Path) -> CoreResult<AcquiredVideo>;
}

/// Acquirer using yt-dlp for streaming platforms and HTTP GET for blobs.
pub struct DefaultAcquirer {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl DefaultAcquirer {
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn local(path: &Path) -> CoreResult<AcquiredVideo> {
        if path.is_file() {
            Ok(AcquiredVideo {
                path: path.to_path_buf(),
                downloaded: false,
            })
        } else {
            Err(CoreError::SourceUnreachable(format!(
                "{} does not exist",
                path.display()
            )))
        }
    }

    fn streaming(&self, url: &Url, download_dir: &Path) -> CoreResult<AcquiredVideo> {
        check_dependency(YT_DLP)
            .map_err(|e| CoreError::SourceUnreachable(format!("{url}: {e}")))?;
        std::fs::create_dir_all(download_dir)?;

        let template = download_dir.join("%(title)s.%(ext)s");
        log::info!("Downloading {} with {}", url, YT_DLP);
        let mut child = Command::new(YT_DLP)
            .args(["-f", "best", "--no-playlist", "--no-progress"])
            .arg("-o")
            .arg(&template)
            .args(["--print", "after_move:filepath"])
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::SourceUnreachable(format!("cannot start {YT_DLP}: {e}")))?;

        let stdout = child.stdout.take().map(drain_in_background);
        let stderr = child.stderr.take().map(drain_in_background);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    log::error!("{} timed out after {:?}; killing it", YT_DLP, self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CoreError::SourceUnreachable(format!(
                        "{url}: download timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
                None => thread::sleep(WAIT_POLL_INTERVAL),
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            return Err(CoreError::SourceUnreachable(format!(
                "{url}: {YT_DLP} exited with {status}: {}",
                stderr.trim()
            )));
        }

        let path = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| {
                CoreError::SourceUnreachable(format!("{url}: {YT_DLP} reported no output file"))
            })?;
        if !path.is_file() {
            return Err(CoreError::SourceUnreachable(format!(
                "{url}: downloaded file {} is missing",
                path.display()
            )));
        }
        log::info!("Downloaded {} to {}", url, path.display());
        Ok(AcquiredVideo {
            path,
            downloaded: true,
        })
    }

    fn blob(&self, url: &Url, download_dir: &Path) -> CoreResult<AcquiredVideo> {
        let unreachable = |cause: String| CoreError::SourceUnreachable(format!("{url}: {cause}"));

        log::info!("Downloading {}", url);
        let mut response = self.client.get(url.clone()).send().map_err(|e| {
            if e.is_timeout() {
                unreachable(format!("download timed out after {}s", self.timeout.as_secs()))
            } else {
                unreachable(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("server returned {status}")));
        }

        let file_name = blob_file_name(url);
        let mut temp = temp_files::create_temp_file(download_dir, "download", "part")?;
        let bytes = response
            .copy_to(temp.as_file_mut())
            .map_err(|e| unreachable(format!("transfer failed: {e}")))?;
        let path = download_dir.join(&file_name);
        temp_files::persist_replace(temp, &path)?;
        log::info!("Downloaded {} bytes to {}", bytes, path.display());
        Ok(AcquiredVideo {
            path,
            downloaded: true,
        })
    }
}

impl VideoAcquirer for DefaultAcquirer {
    fn acquire_video(&self, source: &VideoSource, download_dir: &Path) -> CoreResult<AcquiredVideo> {
        match source {
            VideoSource::LocalFile(path) => Self::local(path),
            VideoSource::RemoteStreamingPlatform(url) => self.streaming(url, download_dir),
            VideoSource::DirectBlobDownload(url) => self.blob(url, download_dir),
        }
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = reader.read_to_string(&mut buf);
        buf
    })
}

/// Local file name for a blob URL: its last path segment, sanitized.
#[must_use]
pub fn blob_file_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("video.mp4");
    sanitize_file_name(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_streaming_hosts() {
        let source = VideoSource::classify("https://www.youtube.com/watch?v=abc").unwrap();
        assert!(matches!(source, VideoSource::RemoteStreamingPlatform(_)));
        let source = VideoSource::classify("https://youtu.be/abc").unwrap();
        assert!(matches!(source, VideoSource::RemoteStreamingPlatform(_)));
    }

    #[test]
    fn classifies_other_urls_as_blobs() {
        let source =
            VideoSource::classify("https://account.blob.core.windows.net/videos/talk.mp4?sv=1")
                .unwrap();
        assert!(matches!(source, VideoSource::DirectBlobDownload(_)));
    }

    #[test]
    fn classifies_paths_as_local() {
        assert_eq!(
            VideoSource::classify("clips/talk.mp4").unwrap(),
            VideoSource::LocalFile(PathBuf::from("clips/talk.mp4"))
        );
        assert!(!VideoSource::classify("/tmp/a.mp4").unwrap().is_remote());
    }

    #[test]
    fn empty_input_is_unreachable() {
        assert!(matches!(
            VideoSource::classify("  "),
            Err(CoreError::SourceUnreachable(_))
        ));
    }

    #[test]
    fn missing_local_file_is_unreachable() {
        let acquirer = DefaultAcquirer::new(Duration::from_secs(1)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = VideoSource::LocalFile(dir.path().join("missing.mp4"));
        assert!(matches!(
            acquirer.acquire_video(&source, dir.path()),
            Err(CoreError::SourceUnreachable(_))
        ));
    }

    #[test]
    fn blob_names_come_from_last_segment() {
        let url = Url::parse("https://host/container/my%20talk.mp4?sig=x").unwrap();
        assert_eq!(blob_file_name(&url), "my%20talk.mp4");
        let url = Url::parse("https://host/").unwrap();
        assert_eq!(blob_file_name(&url), "video.mp4");
    }
}
