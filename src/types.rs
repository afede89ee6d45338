//! Core types and events for coursecap
//!
//! Wire models mirror the remote API's camelCase payloads. Every collection
//! and optional field carries `#[serde(default)]`: listing and instance
//! payloads are semi-structured and frequently omit fields, and a missing
//! field must never fail a fetch that otherwise succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Opaque bearer credential authorizing API calls.
///
/// Produced once by credential discovery, read-only afterward, and embedded
/// verbatim in both export forms for replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Create a credential, normalizing the `Bearer ` prefix if the raw
    /// value omits it (operators tend to paste just the token).
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.starts_with("Bearer ") {
            Self(trimmed.to_string())
        } else {
            Self(format!("Bearer {trimmed}"))
        }
    }

    /// The full header value, including the `Bearer ` prefix
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root identifier the crawl is scoped to (a course/workspace id)
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RootId(pub i64);

impl std::fmt::Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RootId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for an assessment group
///
/// Deduplication across discovery sources is by numeric identity: each id
/// appears at most once in the working set no matter how many sources
/// surfaced it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl GroupId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for GroupId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GroupId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Metadata for one assessment group, fetched once per working-set id
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    /// Group identifier
    pub id: GroupId,

    /// Display name
    pub name: String,

    /// Type tag reported by the API (e.g., "Practice")
    #[serde(default)]
    pub typename: Option<String>,

    /// When the group opens
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// When the group closes
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl GroupMetadata {
    /// Synthesize placeholder metadata for a group whose metadata fetch
    /// failed. The crawl continues with this instead of aborting.
    pub fn placeholder(id: GroupId) -> Self {
        Self {
            id,
            name: format!("Assessment {id}"),
            typename: None,
            start_date: None,
            end_date: None,
        }
    }
}

/// A content artifact reference: externally hosted content addressed by URL
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    /// Absolute URL of the artifact content
    pub url: String,
}

/// One answer choice within a solution instance
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Position of the choice within its solution
    #[serde(default)]
    pub ordinal: Option<u32>,

    /// Whether the API revealed this choice as correct
    #[serde(default)]
    pub is_correct: Option<bool>,

    /// Rendered choice content, if hosted externally
    #[serde(default)]
    pub content_artifact: Option<ArtifactRef>,
}

/// One solution slot of a statement, with its choices
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionInstance {
    /// Response kind reported by the API (e.g., "MultipleChoice")
    #[serde(default)]
    pub response_type: Option<String>,

    /// Answer choices (empty for free-response solutions)
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One statement of a problem instance
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Statement label (e.g., "1a")
    #[serde(default)]
    pub label: String,

    /// Rendered statement content, if hosted externally
    #[serde(default)]
    pub content_artifact: Option<ArtifactRef>,

    /// Nested solution instances
    #[serde(default)]
    pub solution_instances: Vec<SolutionInstance>,
}

/// One instantiated problem with its statements and session variable values
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemInstance {
    /// Position of the problem within its group
    pub ordinal: u32,

    /// Problem statements
    #[serde(default)]
    pub statements: Vec<Statement>,

    /// Variable artifact references owned by this problem
    #[serde(default)]
    pub variable_artifacts: Vec<ArtifactRef>,

    /// Serialized variable-value mapping, verbatim from the API.
    ///
    /// Untrusted text; use [`variable_values`](Self::variable_values) for a
    /// parsed view.
    #[serde(default)]
    pub formatted_variable_values: String,
}

impl ProblemInstance {
    /// Parse the serialized variable-value mapping defensively.
    ///
    /// Malformed or empty text yields an empty mapping; a broken field on
    /// one problem must never fail the run.
    pub fn variable_values(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.formatted_variable_values).unwrap_or_default()
    }
}

/// Mapping from artifact URL to fetched content.
///
/// Keyed by URL: a URL referenced N times across the whole graph is fetched
/// exactly once, and all N references resolve to the same cached content.
/// Failed fetches are present with empty content.
pub type ArtifactCache = BTreeMap<String, String>;

/// One fully captured group as it appears in the export
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedGroup {
    /// Group identifier
    pub id: GroupId,

    /// Display name (or synthesized placeholder)
    pub name: String,

    /// Type tag, if the metadata fetch yielded one
    #[serde(default)]
    pub typename: Option<String>,

    /// When the group opens
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    /// When the group closes
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    /// Problem instances belonging to this group
    pub problems: Vec<ProblemInstance>,

    /// Artifact content referenced from this group's problems
    pub artifact_cache: ArtifactCache,
}

/// The complete capture closure, assembled once and immutable afterward.
///
/// Both serialized forms (full closure JSON and replay transcript) derive
/// from one instance of this type without re-querying anything.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// The credential used for the capture, embedded verbatim for replay
    pub credential: Credential,

    /// When the capture completed
    pub captured_at: DateTime<Utc>,

    /// The root identifier the crawl was scoped to
    pub root: RootId,

    /// Captured groups, in working-set order
    pub group_assessments: Vec<CapturedGroup>,
}

/// Which discovery strategy produced the credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStrategy {
    /// Supplied by the caller; discovery skipped entirely
    Provided,
    /// Found by walking the host's runtime state
    Introspection,
    /// Passively captured by the transport observer
    Observer,
    /// Captured after the single benign probe request
    Probe,
    /// Entered manually by the operator
    Prompt,
}

impl std::fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Provided => "provided",
            Self::Introspection => "introspection",
            Self::Observer => "observer",
            Self::Probe => "probe",
            Self::Prompt => "prompt",
        };
        write!(f, "{name}")
    }
}

/// Progress events emitted during a capture run
///
/// Subscribe via [`CourseCapture::subscribe`](crate::CourseCapture::subscribe).
/// Events form the per-group, per-artifact progress narrative; a slow
/// consumer may miss events (broadcast semantics) without affecting the run.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A credential was obtained
    CredentialLocated {
        /// Which strategy produced it
        strategy: CredentialStrategy,
    },

    /// ID reconciliation finished
    DiscoveryComplete {
        /// Size of the deduplicated working set
        group_ids: usize,
    },

    /// A group's metadata and problem instances were fetched
    GroupFetched {
        /// Group identifier
        id: GroupId,
        /// Display name
        name: String,
        /// Number of problem instances
        problems: usize,
    },

    /// A group was skipped (problem-instance fetch failed or came back empty)
    GroupSkipped {
        /// Group identifier
        id: GroupId,
        /// Diagnostic reason
        reason: String,
    },

    /// One artifact batch fully resolved
    ArtifactBatchComplete {
        /// 1-based batch index
        batch: usize,
        /// URLs fetched so far, across all batches
        fetched: usize,
        /// Total URLs in the deduplicated set
        total: usize,
    },

    /// A single artifact fetch failed; an empty placeholder was recorded
    ArtifactFailed {
        /// The artifact URL that failed
        url: String,
    },

    /// Both output artifacts were written
    ExportWritten {
        /// Path of the full closure form
        closure_path: PathBuf,
        /// Path of the replay transcript form
        transcript_path: PathBuf,
    },

    /// Final summary for the run
    CaptureComplete {
        /// Groups present in the export
        groups: usize,
        /// Groups skipped due to fetch failures
        skipped: usize,
        /// Artifact URLs fetched (including failed placeholders)
        artifacts: usize,
    },
}
