//! Export packaging: two serializations from one bundle
//!
//! Packaging is pure (no network I/O, everything derived from the
//! in-memory [`ExportBundle`]) and it always runs, no matter how many
//! groups partially failed upstream. The closure form is a structured JSON
//! document sufficient for fully offline reconstruction; the transcript
//! form is a list of synthetic request descriptions sufficient for an
//! external tool to re-derive the same data by replaying them.

use crate::config::Config;
use crate::error::Result;
use crate::transport::{ACCEPT_ANY, CONTENT_TYPE_JSON};
use crate::types::ExportBundle;
use std::path::PathBuf;
use tracing::info;

/// One synthetic request description in the replay transcript
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayRequest {
    /// HTTP method token
    pub method: String,
    /// Absolute target URL
    pub url: String,
    /// Headers the replay must send, credential included
    pub headers: Vec<(String, String)>,
}

impl std::fmt::Display for ReplayRequest {
    /// Renders the fetch-call text format replay tooling consumes
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "fetch(\"{}\", {{", self.url)?;
        writeln!(f, "    \"headers\": {{")?;
        for (i, (name, value)) in self.headers.iter().enumerate() {
            let comma = if i + 1 == self.headers.len() { "" } else { "," };
            writeln!(f, "      \"{name}\": \"{value}\"{comma}")?;
        }
        writeln!(f, "    }},")?;
        writeln!(f, "    \"body\": null,")?;
        writeln!(f, "    \"method\": \"{}\"", self.method)?;
        write!(f, "  }});")
    }
}

/// Paths of the emitted output artifacts
#[derive(Clone, Debug)]
pub struct ExportArtifacts {
    /// The full closure form (`capture_<root>_<timestamp>.json`)
    pub closure_path: PathBuf,
    /// The replay transcript form (`capture_<root>_<timestamp>.txt`)
    pub transcript_path: PathBuf,
}

/// Assembles and emits both export forms
pub struct ExportPackager {
    base_url: String,
    output_dir: PathBuf,
}

impl ExportPackager {
    /// Create a packager from configuration
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            output_dir: config.export.output_dir.clone(),
        }
    }

    /// Serialize the full closure form
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the bundle cannot be encoded, which
    /// would indicate a bug rather than bad input.
    pub fn render_closure(bundle: &ExportBundle) -> Result<String> {
        Ok(serde_json::to_string_pretty(bundle)?)
    }

    /// Parse a closure-form document back into a bundle
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the text is not a closure form.
    pub fn parse_closure(text: &str) -> Result<ExportBundle> {
        Ok(serde_json::from_str(text)?)
    }

    /// The synthetic requests making up the replay transcript: one leading
    /// benign probe carrying the credential (so the credential is
    /// recoverable from the transcript alone), then one problem-instance
    /// request per captured group.
    pub fn replay_requests(&self, bundle: &ExportBundle) -> Vec<ReplayRequest> {
        let headers = vec![
            ("accept".to_string(), ACCEPT_ANY.to_string()),
            (
                "authorization".to_string(),
                bundle.credential.as_str().to_string(),
            ),
            ("content-type".to_string(), CONTENT_TYPE_JSON.to_string()),
        ];

        let mut requests = vec![ReplayRequest {
            method: "GET".to_string(),
            url: format!("{}/time", self.base_url),
            headers: headers.clone(),
        }];
        for group in &bundle.group_assessments {
            requests.push(ReplayRequest {
                method: "GET".to_string(),
                url: format!(
                    "{}/groupAssessments/{}/problemInstances",
                    self.base_url, group.id
                ),
                headers: headers.clone(),
            });
        }
        requests
    }

    /// Render the replay transcript form
    pub fn render_transcript(&self, bundle: &ExportBundle) -> String {
        let blocks: Vec<String> = self
            .replay_requests(bundle)
            .iter()
            .map(ReplayRequest::to_string)
            .collect();
        blocks.join("\n")
    }

    /// Emit both output artifacts, uniquely named per run.
    ///
    /// Names embed the root identifier and the capture timestamp in epoch
    /// milliseconds: `capture_<root>_<timestamp>.json` / `.txt`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the output directory cannot be created or
    /// either file cannot be written.
    pub async fn write(&self, bundle: &ExportBundle) -> Result<ExportArtifacts> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stamp = bundle.captured_at.timestamp_millis();
        let closure_path = self
            .output_dir
            .join(format!("capture_{}_{}.json", bundle.root, stamp));
        let transcript_path = self
            .output_dir
            .join(format!("capture_{}_{}.txt", bundle.root, stamp));

        tokio::fs::write(&closure_path, Self::render_closure(bundle)?).await?;
        tokio::fs::write(&transcript_path, self.render_transcript(bundle)).await?;

        info!(
            closure = %closure_path.display(),
            transcript = %transcript_path.display(),
            "export artifacts written"
        );
        Ok(ExportArtifacts {
            closure_path,
            transcript_path,
        })
    }
}
