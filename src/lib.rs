//! # coursecap
//!
//! Backend library for capturing an assessment resource graph from a
//! token-protected API into a portable, replayable export bundle.
//!
//! Given a root identifier (a course/workspace id), one run discovers a
//! credential through an ordered fallback chain, reconciles every available
//! ID-discovery source into a working set of assessment groups, fetches each
//! group's metadata and problem instances, downloads all referenced content
//! artifacts in bounded batches, and emits the full closure plus a replay
//! transcript as timestamped output files.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Partial-failure tolerant** - One broken endpoint never aborts a run;
//!   the only fatal error is an unobtainable credential
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//! - **Bounded** - Exactly one crawl per invocation, batch-limited fetching
//!
//! ## Quick Start
//!
//! ```no_run
//! use coursecap::{Config, CourseCapture, CrawlContext, Credential};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("https://school.api.example.org/api");
//!     let capture = CourseCapture::new(config)?;
//!
//!     // Watch progress
//!     let mut events = capture.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let context = CrawlContext::new(1492)
//!         .with_credential(Credential::new("Bearer CfDJ8..."));
//!     let report = capture.run(context).await?;
//!     println!("captured {} groups", report.groups_captured);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact reference collection and bounded batch fetching
pub mod artifacts;
/// Capture orchestration (client, session, report)
pub mod capture;
/// Configuration types
pub mod config;
/// Resource-graph crawling and ID reconciliation
pub mod crawler;
/// Credential discovery fallback chain
pub mod credentials;
/// Error types
pub mod error;
/// Export packaging (closure form and replay transcript)
pub mod export;
/// Transport observation and passive credential capture
pub mod observer;
/// Transport boundary and API client
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use artifacts::{
    ArtifactAggregator, ArtifactFetchOutcome, collect_problem_references, collect_references,
    group_cache_view,
};
pub use capture::{CaptureReport, CaptureSession, CourseCapture};
pub use config::{ApiConfig, ArtifactConfig, Config, DiscoveryConfig, ExportConfig};
pub use crawler::{CrawlContext, CrawlOutcome, FetchedGroup, ResourceGraphCrawler};
pub use credentials::{
    CredentialLocator, IntrospectionProvider, JsonStateProvider, OperatorPrompt, StdinPrompt,
};
pub use error::{Error, Result};
pub use export::{ExportArtifacts, ExportPackager, ReplayRequest};
pub use observer::{CredentialSlot, ObservedTransport};
pub use transport::{ApiClient, HttpTransport, Transport, TransportRequest, TransportResponse};
pub use types::{
    ArtifactCache, ArtifactRef, CapturedGroup, Choice, Credential, CredentialStrategy, Event,
    ExportBundle, GroupId, GroupMetadata, ProblemInstance, RootId, SolutionInstance, Statement,
};
