//! Capture orchestration
//!
//! [`CourseCapture`] owns the wired-together pipeline: observed transport,
//! credential discovery, crawl, aggregation, packaging. One call to
//! [`run`](CourseCapture::run) performs exactly one bounded crawl and
//! terminates; the session state backing it is created at run construction
//! and discarded with the client.

use crate::artifacts::{ArtifactAggregator, collect_references, group_cache_view};
use crate::config::Config;
use crate::crawler::{CrawlContext, ResourceGraphCrawler};
use crate::credentials::{CredentialLocator, IntrospectionProvider, OperatorPrompt, StdinPrompt};
use crate::error::Result;
use crate::export::ExportPackager;
use crate::observer::{CredentialSlot, ObservedTransport};
use crate::transport::{ApiClient, HttpTransport, Transport};
use crate::types::{CapturedGroup, CredentialStrategy, Event, ExportBundle, RootId};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Broadcast capacity for progress events; slow consumers lag, the run
/// never blocks on them
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Caller-owned state for one capture run: the credential slot the observer
/// publishes into, and the progress event channel.
#[derive(Clone, Debug)]
pub struct CaptureSession {
    slot: CredentialSlot,
    events: broadcast::Sender<Event>,
}

impl CaptureSession {
    /// Create a fresh session
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            slot: CredentialSlot::new(),
            events,
        }
    }

    /// The slot passive credential capture publishes into
    pub fn credential_slot(&self) -> &CredentialSlot {
        &self.slot
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one completed capture run
#[derive(Clone, Debug)]
pub struct CaptureReport {
    /// The root identifier the run was scoped to
    pub root: RootId,
    /// Which strategy produced the credential
    pub strategy: CredentialStrategy,
    /// Groups present in the export
    pub groups_captured: usize,
    /// Working-set entries that were skipped
    pub groups_skipped: usize,
    /// Artifact URLs fetched (failed placeholders included)
    pub artifacts_fetched: usize,
    /// Artifact URLs whose fetch failed
    pub artifact_failures: usize,
    /// Path of the emitted closure form
    pub closure_path: PathBuf,
    /// Path of the emitted replay transcript
    pub transcript_path: PathBuf,
}

/// The capture client: discovers a credential, crawls the resource graph
/// below a root identifier, aggregates referenced artifacts, and emits the
/// export bundle in both serialized forms.
pub struct CourseCapture {
    config: Config,
    session: CaptureSession,
    observed: Arc<dyn Transport>,
    api: ApiClient,
    introspection: Option<Box<dyn IntrospectionProvider>>,
    prompt: Box<dyn OperatorPrompt>,
}

impl CourseCapture {
    /// Create a capture client with the library's own HTTP transport
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid [`Config`], or a network
    /// error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config.api)?);
        Self::with_transport(config, transport)
    }

    /// Create a capture client over a host-supplied transport.
    ///
    /// The transport is wrapped in the observer exactly once, here; hosts
    /// that want passive credential capture to see their own traffic should
    /// route it through [`observed_transport`](Self::observed_transport).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid [`Config`].
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let session = CaptureSession::new();
        let observed: Arc<dyn Transport> = Arc::new(ObservedTransport::new(
            transport,
            config.api.path_markers.clone(),
            session.credential_slot().clone(),
        ));
        let api = ApiClient::new(observed.clone(), &config.api);
        Ok(Self {
            config,
            session,
            observed,
            api,
            introspection: None,
            prompt: Box::new(StdinPrompt),
        })
    }

    /// Attach a runtime introspection provider (credential strategy 1)
    #[must_use]
    pub fn with_introspection(mut self, provider: Box<dyn IntrospectionProvider>) -> Self {
        self.introspection = Some(provider);
        self
    }

    /// Replace the operator prompt (credential strategy 4)
    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Subscribe to progress events for this client's runs
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.session.subscribe()
    }

    /// The observer-wrapped transport.
    ///
    /// Every call through it executes normally; matching calls additionally
    /// feed passive credential capture. A host embedding the library can
    /// substitute this for its own outbound primitive for the lifetime of
    /// the client; the wrapper dissolves when the client is dropped.
    pub fn observed_transport(&self) -> Arc<dyn Transport> {
        self.observed.clone()
    }

    /// Run one bounded crawl-and-export pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialUnavailable`](crate::Error::CredentialUnavailable)
    /// when no credential can be obtained (the only failure that aborts a
    /// run before crawling), or an I/O error if the export artifacts cannot
    /// be written. Every other failure downstream is absorbed as a skip or
    /// placeholder.
    pub async fn run(&self, context: CrawlContext) -> Result<CaptureReport> {
        let (credential, strategy) = match &context.credential {
            Some(credential) => (credential.clone(), CredentialStrategy::Provided),
            None => {
                let locator = CredentialLocator::new(&self.config.discovery)?;
                locator
                    .locate(
                        self.session.credential_slot(),
                        &self.api,
                        self.introspection.as_deref(),
                        self.prompt.as_ref(),
                    )
                    .await?
            }
        };
        self.session.emit(Event::CredentialLocated { strategy });
        info!(%strategy, root = %context.root, "starting capture");

        let crawler = ResourceGraphCrawler::new(&self.api, &self.session, self.config.api.page_size);
        let outcome = crawler.crawl(&credential, &context).await;

        let references = collect_references(&outcome.groups);
        let aggregator =
            ArtifactAggregator::new(&self.api, &self.session, self.config.artifacts.batch_size);
        let fetched = aggregator.fetch_all(&references).await;

        let group_assessments: Vec<CapturedGroup> = outcome
            .groups
            .iter()
            .map(|group| CapturedGroup {
                id: group.meta.id,
                name: group.meta.name.clone(),
                typename: group.meta.typename.clone(),
                start_date: group.meta.start_date,
                end_date: group.meta.end_date,
                problems: group.problems.clone(),
                artifact_cache: group_cache_view(&group.problems, &fetched.cache),
            })
            .collect();

        let bundle = ExportBundle {
            credential,
            captured_at: Utc::now(),
            root: context.root,
            group_assessments,
        };

        let packager = ExportPackager::new(&self.config);
        let artifacts = packager.write(&bundle).await?;
        self.session.emit(Event::ExportWritten {
            closure_path: artifacts.closure_path.clone(),
            transcript_path: artifacts.transcript_path.clone(),
        });

        for group in &bundle.group_assessments {
            let answer_values: usize = group
                .problems
                .iter()
                .map(|p| p.variable_values().len())
                .sum();
            info!(
                id = %group.id,
                name = %group.name,
                problems = group.problems.len(),
                answer_values,
                "captured group"
            );
        }

        let report = CaptureReport {
            root: context.root,
            strategy,
            groups_captured: bundle.group_assessments.len(),
            groups_skipped: outcome.discovered - bundle.group_assessments.len(),
            artifacts_fetched: fetched.cache.len(),
            artifact_failures: fetched.failures,
            closure_path: artifacts.closure_path,
            transcript_path: artifacts.transcript_path,
        };
        self.session.emit(Event::CaptureComplete {
            groups: report.groups_captured,
            skipped: report.groups_skipped,
            artifacts: report.artifacts_fetched,
        });
        info!(
            groups = report.groups_captured,
            skipped = report.groups_skipped,
            artifacts = report.artifacts_fetched,
            failures = report.artifact_failures,
            "capture complete"
        );
        Ok(report)
    }
}
