//! Resource-graph crawling: ID reconciliation and per-group fetching
//!
//! Any single discovery source may be stale, paginated, or permission-scoped,
//! so the working set is the union of everything: two listing endpoints, the
//! identifiers embedded in the current navigation context, and identifiers
//! found in hyperlink-like references. Over-collection is harmless: a
//! candidate that turns out to have no problem instances is skipped with a
//! diagnostic, and no candidate's failure aborts the loop.

use crate::capture::CaptureSession;
use crate::transport::ApiClient;
use crate::types::{Credential, Event, GroupId, GroupMetadata, ProblemInstance, RootId};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Invocation inputs for one capture run
#[derive(Clone, Debug, Default)]
pub struct CrawlContext {
    /// Root identifier the crawl is scoped to
    pub root: RootId,
    /// Identifiers embedded in the current navigation context
    pub navigation_ids: Vec<GroupId>,
    /// Hyperlink-like references scanned for embedded group identifiers
    pub link_refs: Vec<String>,
    /// Pre-supplied credential; when present, discovery is skipped entirely
    pub credential: Option<Credential>,
}

impl CrawlContext {
    /// Context scoped to an explicit root identifier
    pub fn new(root: impl Into<RootId>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Derive a context from a navigation path such as
    /// `/courses/1492/groupAssessments/13873`.
    ///
    /// The root is the `courses/<id>` capture; every identifier embedded in
    /// the path (the root included) becomes a navigation-context candidate.
    /// Returns `None` when the path carries no root identifier.
    pub fn from_path(path: &str) -> Option<Self> {
        let root = ids_after_marker(path, "courses/").into_iter().next()?;
        let mut navigation_ids: Vec<GroupId> = vec![GroupId(root)];
        navigation_ids.extend(ids_after_marker(path, "groupAssessments/").into_iter().map(GroupId));
        Some(Self {
            root: RootId(root),
            navigation_ids,
            link_refs: Vec::new(),
            credential: None,
        })
    }

    /// Add hyperlink-like references to scan for group identifiers
    #[must_use]
    pub fn with_link_refs(mut self, refs: Vec<String>) -> Self {
        self.link_refs = refs;
        self
    }

    /// Supply a credential up front, skipping discovery
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// One group that survived the crawl: metadata plus its problem instances
#[derive(Clone, Debug)]
pub struct FetchedGroup {
    /// Group metadata (possibly a synthesized placeholder)
    pub meta: GroupMetadata,
    /// The group's problem instances (never empty)
    pub problems: Vec<ProblemInstance>,
}

/// Result of one crawl pass
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Groups that yielded problem instances, in working-set order
    pub groups: Vec<FetchedGroup>,
    /// Size of the reconciled working set before per-group fetching
    pub discovered: usize,
}

/// Crawls the resource graph below one root identifier
pub struct ResourceGraphCrawler<'a> {
    api: &'a ApiClient,
    session: &'a CaptureSession,
    page_size: u32,
}

impl<'a> ResourceGraphCrawler<'a> {
    /// Create a crawler over the given API client and session
    pub fn new(api: &'a ApiClient, session: &'a CaptureSession, page_size: u32) -> Self {
        Self {
            api,
            session,
            page_size,
        }
    }

    /// Reconcile the four discovery sources into one deduplicated working set.
    ///
    /// Sources: the `groupAssessments` listing, the `assessments` listing
    /// (which contributes both `groupAssessmentId` and `id` per item), the
    /// navigation-context identifiers, and identifiers embedded in link
    /// references. Each listing tolerates zero, partial, or malformed
    /// results; a non-array response counts as an empty contribution.
    pub async fn discover_group_ids(
        &self,
        credential: &Credential,
        context: &CrawlContext,
    ) -> BTreeSet<GroupId> {
        let mut ids = BTreeSet::new();

        let listing_path = format!(
            "groupAssessments?groupId={}&pageSize={}",
            context.root, self.page_size
        );
        if let Some(value) = self.api.get_json(credential, &listing_path).await {
            let items = listing_items(value);
            info!(count = items.len(), "groupAssessments listing contributed items");
            for item in items {
                if let Some(id) = item.get("id").and_then(serde_json::Value::as_i64) {
                    ids.insert(GroupId(id));
                }
            }
        }

        let assessments_path = format!(
            "assessments?groupId={}&pageSize={}",
            context.root, self.page_size
        );
        if let Some(value) = self.api.get_json(credential, &assessments_path).await {
            for item in listing_items(value) {
                for key in ["groupAssessmentId", "id"] {
                    if let Some(id) = item.get(key).and_then(serde_json::Value::as_i64) {
                        ids.insert(GroupId(id));
                    }
                }
            }
        }

        ids.extend(context.navigation_ids.iter().copied());

        for reference in &context.link_refs {
            for id in extract_link_ids(reference) {
                ids.insert(id);
            }
        }

        ids
    }

    /// Fetch one group's metadata and problem instances.
    ///
    /// Metadata failure degrades to a placeholder; a failed, malformed, or
    /// empty problem-instance fetch skips the group entirely; it must not
    /// appear in the export with null data.
    async fn fetch_group(&self, credential: &Credential, id: GroupId) -> Option<FetchedGroup> {
        let meta = match self.api.get_json(credential, &format!("groupAssessments/{id}")).await {
            Some(value) => match serde_json::from_value::<GroupMetadata>(value) {
                Ok(mut meta) => {
                    // The working-set id is canonical regardless of what the
                    // metadata payload claims.
                    meta.id = id;
                    meta
                }
                Err(e) => {
                    warn!(%id, error = %e, "group metadata malformed, using placeholder");
                    GroupMetadata::placeholder(id)
                }
            },
            None => GroupMetadata::placeholder(id),
        };

        let problems: Vec<ProblemInstance> = match self
            .api
            .get_json(credential, &format!("groupAssessments/{id}/problemInstances"))
            .await
        {
            Some(value) => match serde_json::from_value(value) {
                Ok(problems) => problems,
                Err(e) => {
                    self.skip(id, format!("problem instances malformed: {e}"));
                    return None;
                }
            },
            None => {
                self.skip(id, "problem instance fetch failed".to_string());
                return None;
            }
        };

        if problems.is_empty() {
            self.skip(id, "no problem instances".to_string());
            return None;
        }

        info!(%id, name = %meta.name, problems = problems.len(), "fetched group");
        self.session.emit(Event::GroupFetched {
            id,
            name: meta.name.clone(),
            problems: problems.len(),
        });
        Some(FetchedGroup { meta, problems })
    }

    fn skip(&self, id: GroupId, reason: String) {
        warn!(%id, %reason, "skipping group");
        self.session.emit(Event::GroupSkipped { id, reason });
    }

    /// Run the full crawl: reconcile ids, then fetch each in set order
    pub async fn crawl(&self, credential: &Credential, context: &CrawlContext) -> CrawlOutcome {
        let ids = self.discover_group_ids(credential, context).await;
        let discovered = ids.len();
        self.session.emit(Event::DiscoveryComplete {
            group_ids: discovered,
        });
        if ids.is_empty() {
            warn!("no assessment group ids discovered; nothing to capture");
        }

        let mut groups = Vec::new();
        for id in ids {
            if let Some(group) = self.fetch_group(credential, id).await {
                groups.push(group);
            }
        }
        CrawlOutcome { groups, discovered }
    }
}

/// Interpret a listing response: a bare array, an `{items: [...]}` envelope,
/// or anything else (treated as empty)
fn listing_items(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Extract every group identifier embedded in a hyperlink-like reference
pub fn extract_link_ids(reference: &str) -> Vec<GroupId> {
    ids_after_marker(reference, "groupAssessments/")
        .into_iter()
        .map(GroupId)
        .collect()
}

/// All numeric identifiers directly following a path marker
fn ids_after_marker(text: &str, marker: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(marker) {
        rest = &rest[pos + marker.len()..];
        let digits: &str = &rest[..rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(rest.len(), |(i, _)| i)];
        if let Ok(id) = digits.parse::<i64>() {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::HttpTransport;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential::new("Bearer test-token")
    }

    async fn api_for(server: &MockServer) -> ApiClient {
        let config = Config::new(format!("{}/api", server.uri()));
        let transport = Arc::new(HttpTransport::new(&config.api).unwrap());
        ApiClient::new(transport, &config.api)
    }

    #[test]
    fn from_path_extracts_root_and_embedded_ids() {
        let context = CrawlContext::from_path("/courses/1492/groupAssessments/13873").unwrap();
        assert_eq!(context.root, RootId(1492));
        assert_eq!(context.navigation_ids, vec![GroupId(1492), GroupId(13873)]);
    }

    #[test]
    fn from_path_without_root_yields_none() {
        assert!(CrawlContext::from_path("/dashboard").is_none());
    }

    #[test]
    fn extract_link_ids_finds_every_embedded_id() {
        let ids = extract_link_ids(
            "https://school.example.org/courses/1492/groupAssessments/13873 and \
             /courses/1492/groupAssessments/14001",
        );
        assert_eq!(ids, vec![GroupId(13873), GroupId(14001)]);
    }

    #[test]
    fn extract_link_ids_ignores_marker_without_digits() {
        assert!(extract_link_ids("/groupAssessments/new").is_empty());
    }

    #[test]
    fn listing_items_tolerates_every_shape() {
        use serde_json::json;
        assert_eq!(listing_items(json!([{"id": 1}])).len(), 1);
        assert_eq!(listing_items(json!({"items": [{"id": 1}, {"id": 2}]})).len(), 2);
        assert!(listing_items(json!({"error": "denied"})).is_empty());
        assert!(listing_items(json!("unexpected")).is_empty());
        assert!(listing_items(json!(null)).is_empty());
    }

    #[tokio::test]
    async fn working_set_is_the_union_of_all_four_sources() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/groupAssessments"))
            .and(query_param("groupId", "1492"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"id": 100}, {"id": 101}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/assessments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 101, "groupAssessmentId": 102},
                {"groupAssessmentId": 100}
            ])))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let session = CaptureSession::new();
        let crawler = ResourceGraphCrawler::new(&api, &session, 200);

        let mut context = CrawlContext::new(1492);
        context.navigation_ids = vec![GroupId(103), GroupId(100)];
        context.link_refs = vec!["/courses/1492/groupAssessments/104".to_string()];

        let ids = crawler.discover_group_ids(&credential(), &context).await;
        let expected: BTreeSet<GroupId> =
            [100, 101, 102, 103, 104].into_iter().map(GroupId).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn navigation_root_survives_empty_listings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/(groupAssessments|assessments)$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let session = CaptureSession::new();
        let crawler = ResourceGraphCrawler::new(&api, &session, 200);

        let context = CrawlContext::from_path("/courses/1492").unwrap();
        let ids = crawler.discover_group_ids(&credential(), &context).await;

        assert_eq!(ids, [GroupId(1492)].into_iter().collect());
    }

    #[tokio::test]
    async fn malformed_listings_count_as_empty_contributions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "permission denied"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/assessments"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let session = CaptureSession::new();
        let crawler = ResourceGraphCrawler::new(&api, &session, 200);

        let ids = crawler
            .discover_group_ids(&credential(), &CrawlContext::new(1492))
            .await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn failing_group_is_skipped_while_others_survive() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/api/(groupAssessments|assessments)$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1, "name": "Broken Group"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/1/problemInstances"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 2, "name": "Healthy Group", "typename": "Practice"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/2/problemInstances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"ordinal": 1, "formattedVariableValues": "{\"order\":\"5\"}"},
                {"ordinal": 2}
            ])))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let session = CaptureSession::new();
        let crawler = ResourceGraphCrawler::new(&api, &session, 200);

        let mut context = CrawlContext::new(1492);
        context.navigation_ids = vec![GroupId(1), GroupId(2)];

        let outcome = crawler.crawl(&credential(), &context).await;

        assert_eq!(outcome.discovered, 2);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].meta.id, GroupId(2));
        assert_eq!(outcome.groups[0].meta.name, "Healthy Group");
        assert_eq!(outcome.groups[0].problems.len(), 2);
    }

    #[tokio::test]
    async fn metadata_failure_degrades_to_placeholder_not_skip() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/api/(groupAssessments|assessments)$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/groupAssessments/7/problemInstances"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"ordinal": 1}
            ])))
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let session = CaptureSession::new();
        let crawler = ResourceGraphCrawler::new(&api, &session, 200);

        let mut context = CrawlContext::new(1492);
        context.navigation_ids = vec![GroupId(7)];

        let outcome = crawler.crawl(&credential(), &context).await;
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].meta.name, "Assessment 7");
    }
}
