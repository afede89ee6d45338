//! Credential discovery: ordered fallback chain
//!
//! Four strategies, tried strictly in order, each only if the previous one
//! yielded nothing; first success wins:
//!
//! 1. introspect the host's live runtime state (if a provider is wired in),
//! 2. consult the transport observer's passively captured value,
//! 3. issue one benign probe request and wait a short fixed interval for the
//!    observer to see the resulting traffic (single attempt, no retry),
//! 4. prompt the operator.
//!
//! Strategy 4 yielding nothing is the only fatal failure in the pipeline.

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::observer::CredentialSlot;
use crate::transport::ApiClient;
use crate::types::{Credential, CredentialStrategy};
use regex::Regex;
use std::io::{BufRead, Write};
use tracing::{debug, info};

/// Benign, side-effect-free API path used by the probe strategy
const PROBE_PATH: &str = "time";

/// Read-only view into a host application's runtime state.
///
/// Host-specific and optional: the locator works without one, and a provider
/// may legitimately find nothing. Implementations must bound their own
/// traversal by `max_depth`; host state graphs can be cyclic or
/// self-referential.
pub trait IntrospectionProvider: Send + Sync {
    /// Attempt to find an embedded authorization value.
    ///
    /// Returns raw text that may contain a credential somewhere inside it;
    /// the locator extracts and validates the bearer pattern itself.
    fn find_credential(&self, max_depth: usize) -> Option<String>;
}

/// Introspection provider over a JSON snapshot of host state.
///
/// Walks the value tree depth-first, bounded by the configured depth, and
/// returns the first string containing a recognizable bearer value.
pub struct JsonStateProvider {
    snapshot: serde_json::Value,
}

impl JsonStateProvider {
    /// Create a provider over the given state snapshot
    pub fn new(snapshot: serde_json::Value) -> Self {
        Self { snapshot }
    }

    fn walk(value: &serde_json::Value, depth: usize) -> Option<String> {
        if depth == 0 {
            return None;
        }
        match value {
            serde_json::Value::String(s) if s.contains("Bearer ") => Some(s.clone()),
            serde_json::Value::Array(items) => {
                items.iter().find_map(|v| Self::walk(v, depth - 1))
            }
            serde_json::Value::Object(map) => {
                map.values().find_map(|v| Self::walk(v, depth - 1))
            }
            _ => None,
        }
    }
}

impl IntrospectionProvider for JsonStateProvider {
    fn find_credential(&self, max_depth: usize) -> Option<String> {
        Self::walk(&self.snapshot, max_depth)
    }
}

/// Synchronous manual credential entry
pub trait OperatorPrompt: Send + Sync {
    /// Ask the operator for a credential. `None` means no input was given.
    fn request_credential(&self) -> Option<String>;
}

/// [`OperatorPrompt`] reading one line from standard input
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn request_credential(&self) -> Option<String> {
        let mut stderr = std::io::stderr();
        let _ = writeln!(
            stderr,
            "Could not auto-capture a credential. Paste the Authorization header value \
             (starts with \"Bearer \"):"
        );
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

/// Runs the ordered fallback chain
pub struct CredentialLocator {
    pattern: Regex,
    introspection_depth: usize,
    probe_wait: std::time::Duration,
}

impl CredentialLocator {
    /// Create a locator from discovery configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the bearer pattern cannot be compiled
    /// from the configured minimum token length.
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"Bearer\s+[A-Za-z0-9+/=_\-]{{{},}}",
            config.token_min_length
        ))
        .map_err(|e| {
            Error::config(
                format!("bearer pattern failed to compile: {e}"),
                Some("token_min_length"),
            )
        })?;
        Ok(Self {
            pattern,
            introspection_depth: config.introspection_depth,
            probe_wait: config.probe_wait(),
        })
    }

    /// Extract a validated bearer value out of arbitrary text
    fn extract(&self, raw: &str) -> Option<Credential> {
        self.pattern
            .find(raw)
            .map(|m| Credential::new(m.as_str()))
    }

    /// Run the fallback chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialUnavailable`] when every strategy,
    /// including the operator prompt, yields nothing.
    pub async fn locate(
        &self,
        slot: &CredentialSlot,
        api: &ApiClient,
        introspection: Option<&dyn IntrospectionProvider>,
        prompt: &dyn OperatorPrompt,
    ) -> Result<(Credential, CredentialStrategy)> {
        // 1. Host runtime introspection
        if let Some(provider) = introspection
            && let Some(raw) = provider.find_credential(self.introspection_depth)
        {
            if let Some(credential) = self.extract(&raw) {
                info!("credential located via runtime introspection");
                return Ok((credential, CredentialStrategy::Introspection));
            }
            debug!("introspection yielded text without a recognizable bearer value");
        }

        // 2. Passively captured value, if the observer already saw one
        if let Some(credential) = slot.get() {
            info!("credential located via transport observer");
            return Ok((credential, CredentialStrategy::Observer));
        }

        // 3. Single benign probe, then one fixed wait for the observer.
        // Deliberately not retried.
        debug!("probing API to provoke observable traffic");
        api.probe(PROBE_PATH).await;
        tokio::time::sleep(self.probe_wait).await;
        if let Some(credential) = slot.get() {
            info!("credential located after probe");
            return Ok((credential, CredentialStrategy::Probe));
        }

        // 4. Operator prompt, the last resort and the only fatal exit
        match prompt.request_credential() {
            Some(raw) if !raw.trim().is_empty() => {
                info!("credential entered by operator");
                Ok((Credential::new(raw), CredentialStrategy::Prompt))
            }
            _ => Err(Error::CredentialUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DiscoveryConfig};
    use crate::transport::{Transport, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn long_token() -> String {
        "a".repeat(120)
    }

    fn bearer() -> String {
        format!("Bearer {}", long_token())
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn execute(&self, _request: TransportRequest) -> crate::error::Result<TransportResponse> {
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    fn api() -> ApiClient {
        let config = Config::new("https://api.example.org/api");
        ApiClient::new(Arc::new(NullTransport), &config.api)
    }

    fn fast_locator() -> CredentialLocator {
        CredentialLocator::new(&DiscoveryConfig {
            probe_wait_ms: 10,
            ..DiscoveryConfig::default()
        })
        .unwrap()
    }

    struct FixedProvider {
        value: Option<String>,
        calls: AtomicUsize,
    }

    impl IntrospectionProvider for FixedProvider {
        fn find_credential(&self, _max_depth: usize) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value.clone()
        }
    }

    struct CountingPrompt {
        value: Option<String>,
        calls: AtomicUsize,
    }

    impl OperatorPrompt for CountingPrompt {
        fn request_credential(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value.clone()
        }
    }

    #[tokio::test]
    async fn introspection_hit_short_circuits_every_later_strategy() {
        let locator = fast_locator();
        let slot = CredentialSlot::new();
        // The observer also has a value; it must not be consulted.
        slot.publish(Credential::new("Bearer observer-value"));
        let provider = FixedProvider {
            value: Some(format!("noise before {} noise after", bearer())),
            calls: AtomicUsize::new(0),
        };
        let prompt = CountingPrompt {
            value: None,
            calls: AtomicUsize::new(0),
        };

        let (credential, strategy) = locator
            .locate(&slot, &api(), Some(&provider), &prompt)
            .await
            .unwrap();

        assert_eq!(strategy, CredentialStrategy::Introspection);
        assert_eq!(credential.as_str(), bearer());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0, "prompt must never run");
    }

    #[tokio::test]
    async fn observer_value_used_when_introspection_absent() {
        let locator = fast_locator();
        let slot = CredentialSlot::new();
        slot.publish(Credential::new(bearer()));
        let prompt = CountingPrompt {
            value: None,
            calls: AtomicUsize::new(0),
        };

        let (_, strategy) = locator.locate(&slot, &api(), None, &prompt).await.unwrap();

        assert_eq!(strategy, CredentialStrategy::Observer);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_strategy_picks_up_value_published_during_wait() {
        let locator = CredentialLocator::new(&DiscoveryConfig {
            probe_wait_ms: 200,
            ..DiscoveryConfig::default()
        })
        .unwrap();
        let slot = CredentialSlot::new();
        let prompt = CountingPrompt {
            value: None,
            calls: AtomicUsize::new(0),
        };

        // Simulate host traffic the observer captures shortly after the probe.
        let background_slot = slot.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            background_slot.publish(Credential::new(bearer()));
        });

        let (_, strategy) = locator.locate(&slot, &api(), None, &prompt).await.unwrap();
        handle.await.unwrap();

        assert_eq!(strategy, CredentialStrategy::Probe);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_is_last_resort_and_normalizes_input() {
        let locator = fast_locator();
        let prompt = CountingPrompt {
            value: Some(long_token()),
            calls: AtomicUsize::new(0),
        };

        let (credential, strategy) = locator
            .locate(&CredentialSlot::new(), &api(), None, &prompt)
            .await
            .unwrap();

        assert_eq!(strategy, CredentialStrategy::Prompt);
        assert_eq!(credential.as_str(), bearer());
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_prompt_input_is_the_fatal_path() {
        let locator = fast_locator();
        let prompt = CountingPrompt {
            value: None,
            calls: AtomicUsize::new(0),
        };

        let err = locator
            .locate(&CredentialSlot::new(), &api(), None, &prompt)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
    }

    #[test]
    fn json_state_provider_finds_nested_bearer_value() {
        let provider = JsonStateProvider::new(json!({
            "view": {
                "session": {
                    "headers": ["accept: */*", format!("authorization: {}", bearer())]
                }
            }
        }));
        let found = provider.find_credential(500).unwrap();
        assert!(found.contains("Bearer "));
    }

    #[test]
    fn json_state_provider_respects_depth_bound() {
        // Value nested four levels deep is invisible at depth 2.
        let provider = JsonStateProvider::new(json!({
            "a": { "b": { "c": { "d": bearer() } } }
        }));
        assert!(provider.find_credential(2).is_none());
        assert!(provider.find_credential(10).is_some());
    }

    #[test]
    fn extract_rejects_short_tokens() {
        let locator = fast_locator();
        assert!(locator.extract("Bearer tooshort").is_none());
        assert!(locator.extract(&bearer()).is_some());
    }
}
