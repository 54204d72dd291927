// ============================================================================
// framecull-core/src/extraction.rs
// ============================================================================
//
// TEXT EXTRACTION: Per-Frame Calls to a Vision Model
//
// `extract_all` returns exactly one entry per kept frame, in sequence order.
// A failed call is recorded on its entry and never aborts the batch. Calls are
// independent, so they fan out over a bounded rayon pool; rayon's indexed
// collect puts the results back in input order.

use crate::config::FrameImageFormat;
use crate::error::{CoreError, CoreResult};
use crate::reporting::{ExtractionProgress, Reporter};
use crate::temp_files;
use crate::writer::FrameRecord;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Collaborator that turns an image into the text visible in it.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, image_bytes: &[u8], mime_type: &str) -> CoreResult<String>;
}

/// Text found in a frame, or why it could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Text(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEntry {
    pub sequence: u64,
    pub file_name: String,
    pub outcome: ExtractionOutcome,
}

impl ExtractionEntry {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Failed(_))
    }
}

/// MIME type of a frame file, from its extension. Unknown extensions are
/// sent as JPEG, the default frame encoding.
fn mime_type_for(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<FrameImageFormat>().ok())
        .unwrap_or_default()
        .mime_type()
}

/// Runs the extractor over every frame with at most `concurrency` calls in flight.
///
/// Fails only with `EmptyFrameSet` (no frames) or when the worker pool cannot
/// be built; per-frame failures are reported inside the entries.
pub fn extract_all<T: TextExtractor + ?Sized>(
    extractor: &T,
    frames: &[FrameRecord],
    concurrency: usize,
    reporter: &dyn Reporter,
) -> CoreResult<Vec<ExtractionEntry>> {
    if frames.is_empty() {
        log::warn!("Text extraction requested with no kept frames");
        return Err(CoreError::EmptyFrameSet("text extraction".to_string()));
    }

    let mut ordered: Vec<&FrameRecord> = frames.iter().collect();
    ordered.sort_by_key(|record| record.sequence);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("framecull-extract-{i}"))
        .build()
        .map_err(|e| CoreError::OperationFailed(format!("extraction pool: {e}")))?;

    let total = ordered.len();
    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    log::info!(
        "Extracting text from {} frames ({} concurrent calls)",
        total,
        concurrency
    );

    let entries: Vec<ExtractionEntry> = pool.install(|| {
        ordered
            .par_iter()
            .map(|record| {
                let outcome = match extract_one(extractor, record) {
                    Ok(text) => ExtractionOutcome::Text(text),
                    Err(e) => {
                        log::warn!("Text extraction failed for {}: {}", record.file_name, e);
                        failed.fetch_add(1, Ordering::SeqCst);
                        ExtractionOutcome::Failed(e.to_string())
                    }
                };
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.text_extracted(&ExtractionProgress {
                    completed: done,
                    failed: failed.load(Ordering::SeqCst),
                    total,
                });
                ExtractionEntry {
                    sequence: record.sequence,
                    file_name: record.file_name.clone(),
                    outcome,
                }
            })
            .collect()
    });

    log::info!(
        "Text extraction finished: {} entries, {} failed",
        entries.len(),
        failed.load(Ordering::SeqCst)
    );
    Ok(entries)
}

fn extract_one<T: TextExtractor + ?Sized>(extractor: &T, record: &FrameRecord) -> CoreResult<String> {
    let bytes = std::fs::read(&record.path).map_err(|e| {
        CoreError::ExtractionFailed(format!("cannot read {}: {}", record.path.display(), e))
    })?;
    extractor.extract_text(&bytes, mime_type_for(&record.path))
}

// ============================================================================
// RESULT TABLES
// ============================================================================

/// Header row of the CSV result table.
pub const RESULTS_CSV_HEADER: [&str; 2] = ["Image_Name", "Extracted_Text"];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Renders entries as a two-column CSV table (RFC 4180 quoting).
#[must_use]
pub fn results_csv(entries: &[ExtractionEntry]) -> String {
    let mut out = format!("{},{}\r\n", RESULTS_CSV_HEADER[0], RESULTS_CSV_HEADER[1]);
    for entry in entries {
        let text = match &entry.outcome {
            ExtractionOutcome::Text(text) => text.clone(),
            ExtractionOutcome::Failed(reason) => format!("ERROR: {reason}"),
        };
        out.push_str(&csv_field(&entry.file_name));
        out.push(',');
        out.push_str(&csv_field(&text));
        out.push_str("\r\n");
    }
    out
}

/// Writes the CSV result table to `path`.
pub fn write_results_csv(entries: &[ExtractionEntry], path: &Path) -> CoreResult<()> {
    write_table(path, "results", "csv", results_csv(entries).as_bytes())
}

/// Writes the entries as a JSON array to `path`.
pub fn write_results_json(entries: &[ExtractionEntry], path: &Path) -> CoreResult<()> {
    let json = serde_json::to_vec_pretty(entries)?;
    write_table(path, "results", "json", &json)
}

fn write_table(path: &Path, prefix: &str, extension: &str, data: &[u8]) -> CoreResult<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut temp = temp_files::create_temp_file(dir, prefix, extension)?;
    temp.write_all(data)?;
    temp.flush()?;
    temp_files::persist_replace(temp, path)?;
    log::info!("Wrote result table {}", path.display());
    Ok(())
}

// ============================================================================
// OPENAI VISION EXTRACTOR
// ============================================================================

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_EXTRACTION_PROMPT: &str = "Extract the text from the image?";
pub const DEFAULT_MAX_TOKENS: u32 = 300;

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// `TextExtractor` backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiVisionExtractor {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
    prompt: String,
    max_tokens: u32,
}

impl OpenAiVisionExtractor {
    /// Creates an extractor whose every call is bounded by `timeout`.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
            prompt: DEFAULT_EXTRACTION_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Points the extractor at another OpenAI-compatible endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    fn request_body(&self, image_bytes: &[u8], mime_type: &str) -> serde_json::Value {
        let data_url = format!("data:{mime_type};base64,{}", BASE64.encode(image_bytes));
        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": self.max_tokens
        })
    }
}

impl TextExtractor for OpenAiVisionExtractor {
    fn extract_text(&self, image_bytes: &[u8], mime_type: &str) -> CoreResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image_bytes, mime_type))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::ExtractionFailed(format!("vision request timed out: {e}"))
                } else {
                    CoreError::ExtractionFailed(format!("vision request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CoreError::ExtractionFailed(format!(
                "vision endpoint returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| CoreError::ExtractionFailed(format!("malformed vision response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                CoreError::ExtractionFailed("vision response contained no text".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sequence: u64, outcome: ExtractionOutcome) -> ExtractionEntry {
        ExtractionEntry {
            sequence,
            file_name: format!("frame_{sequence:06}.jpg"),
            outcome,
        }
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = results_csv(&[
            entry(0, ExtractionOutcome::Text("plain".to_string())),
            entry(1, ExtractionOutcome::Text("a, \"quoted\"\nline".to_string())),
            entry(2, ExtractionOutcome::Failed("timeout".to_string())),
        ]);
        let expected = "Image_Name,Extracted_Text\r\n\
                        frame_000000.jpg,plain\r\n\
                        frame_000001.jpg,\"a, \"\"quoted\"\"\nline\"\r\n\
                        frame_000002.jpg,ERROR: timeout\r\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn request_body_inlines_image() {
        let extractor = OpenAiVisionExtractor::new("key", Duration::from_secs(1)).unwrap();
        let body = extractor.request_body(b"abc", "image/jpeg");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,YWJj"
        );
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(mime_type_for(Path::new("frame_000001.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("frame_000001.jpg")), "image/jpeg");
    }
}
