//! Artifact aggregation: reference collection and bounded batch fetching
//!
//! Every externally-referenced content URL across the fetched graph is
//! collected into one deduplicated set, cross-group included, so content
//! shared between two groups is fetched once. Fetching proceeds in
//! fixed-size batches with a hard barrier between them: batch N+1 never
//! starts before batch N fully resolves. The bound is policy (keeping load
//! on the remote predictable), not a runtime limitation.

use crate::capture::CaptureSession;
use crate::crawler::FetchedGroup;
use crate::transport::ApiClient;
use crate::types::{ArtifactCache, Event, ProblemInstance};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of one aggregation pass
#[derive(Debug)]
pub struct ArtifactFetchOutcome {
    /// URL → content for every referenced artifact; failed fetches are
    /// present with empty content
    pub cache: ArtifactCache,
    /// Number of URLs whose fetch failed and got a placeholder
    pub failures: usize,
}

/// Collect every artifact URL referenced by a slice of problem instances
///
/// Walks statements, their optional content references, nested solution
/// instances' choices, and the problems' own variable-artifact references.
pub fn collect_problem_references(problems: &[ProblemInstance]) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for problem in problems {
        for statement in &problem.statements {
            if let Some(artifact) = &statement.content_artifact {
                refs.insert(artifact.url.clone());
            }
            for solution in &statement.solution_instances {
                for choice in &solution.choices {
                    if let Some(artifact) = &choice.content_artifact {
                        refs.insert(artifact.url.clone());
                    }
                }
            }
        }
        for artifact in &problem.variable_artifacts {
            refs.insert(artifact.url.clone());
        }
    }
    refs
}

/// Collect the deduplicated artifact URL set across all fetched groups
pub fn collect_references(groups: &[FetchedGroup]) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for group in groups {
        refs.extend(collect_problem_references(&group.problems));
    }
    refs
}

/// The per-group view of the session-global cache, for export assembly
pub fn group_cache_view(problems: &[ProblemInstance], cache: &ArtifactCache) -> ArtifactCache {
    collect_problem_references(problems)
        .into_iter()
        .filter_map(|url| cache.get(&url).map(|content| (url, content.clone())))
        .collect()
}

/// Fetches deduplicated artifact URLs in concurrency-bounded batches
pub struct ArtifactAggregator<'a> {
    api: &'a ApiClient,
    session: &'a CaptureSession,
    batch_size: usize,
}

impl<'a> ArtifactAggregator<'a> {
    /// Create an aggregator with the given batch size
    pub fn new(api: &'a ApiClient, session: &'a CaptureSession, batch_size: usize) -> Self {
        Self {
            api,
            session,
            batch_size: batch_size.max(1),
        }
    }

    /// Fetch every URL in the set, batch by batch.
    ///
    /// A single URL's failure yields an empty-content placeholder for that
    /// URL only; it never fails the batch or the run.
    pub async fn fetch_all(&self, urls: &BTreeSet<String>) -> ArtifactFetchOutcome {
        let urls: Vec<&String> = urls.iter().collect();
        let total = urls.len();
        info!(total, batch_size = self.batch_size, "fetching artifacts");

        let mut cache = ArtifactCache::new();
        let mut failures = 0;
        for (index, batch) in urls.chunks(self.batch_size).enumerate() {
            // The await on join_all is the batch barrier.
            let results = join_all(batch.iter().map(|url| self.api.fetch_artifact(url))).await;
            for (url, result) in batch.iter().zip(results) {
                match result {
                    Some(content) => {
                        cache.insert((*url).clone(), content);
                    }
                    None => {
                        warn!(%url, "artifact fetch failed, recording empty placeholder");
                        failures += 1;
                        self.session.emit(Event::ArtifactFailed {
                            url: (*url).clone(),
                        });
                        cache.insert((*url).clone(), String::new());
                    }
                }
            }
            debug!(batch = index + 1, fetched = cache.len(), total, "artifact batch resolved");
            self.session.emit(Event::ArtifactBatchComplete {
                batch: index + 1,
                fetched: cache.len(),
                total,
            });
        }

        ArtifactFetchOutcome { cache, failures }
    }
}
