//! Health check aggregation.
//!
//! Checks the tool-discovery path through the shared cache (so a fresh tool
//! set is reused rather than refetched) and the model endpoint's model
//! listing. Each failing check contributes an issue string; nothing aborts the
//! whole check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::completion::ChatCompletion;
use super::error::ModelError;
use crate::core::config::Config;
use crate::domains::discovery::{DiscoveryConnector, McpConnector, ToolCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Connection settings safe to show to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSettings {
    pub model_endpoint: String,
    pub model: String,
    /// API key reduced to its last characters.
    pub model_key: String,
    pub discovery_url: String,
}

impl PublicSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model_endpoint: config.model.endpoint.clone(),
            model: config.model.model.clone(),
            model_key: config.model.masked_key(),
            discovery_url: config.discovery.url.clone(),
        }
    }
}

/// The tool set the health check saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsSummary {
    pub names: Vec<String>,
    /// When the tool set was fetched from the discovery service.
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub config: PublicSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsSummary>,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct HealthAggregator<C: DiscoveryConnector = McpConnector> {
    tools: Arc<ToolCache<C>>,
    model: Arc<dyn ChatCompletion>,
    settings: PublicSettings,
    timeout: Duration,
}

impl<C: DiscoveryConnector> HealthAggregator<C> {
    pub fn new(tools: Arc<ToolCache<C>>, model: Arc<dyn ChatCompletion>, config: &Config) -> Self {
        Self {
            tools,
            model,
            settings: PublicSettings::from_config(config),
            timeout: config.health.timeout,
        }
    }

    pub fn settings(&self) -> &PublicSettings {
        &self.settings
    }

    pub async fn check(&self, cancel: &CancellationToken) -> HealthReport {
        let ((tools, tool_issue), model_issue) =
            tokio::join!(self.check_tools(cancel), self.check_model());
        let issues: Vec<String> = tool_issue.into_iter().chain(model_issue).collect();

        let status = if issues.is_empty() {
            HealthStatus::Healthy
        } else {
            warn!("Health check degraded: {}", issues.join("; "));
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            config: self.settings.clone(),
            tools,
            issues,
            checked_at: Utc::now(),
        }
    }

    /// Check the shared tool cache, bounded by the health timeout.
    async fn check_tools(
        &self,
        cancel: &CancellationToken,
    ) -> (Option<ToolsSummary>, Option<String>) {
        let fetched = match tokio::time::timeout(self.timeout, self.tools.get_current(cancel)).await
        {
            Ok(result) => result,
            Err(_) => {
                return (
                    None,
                    Some(format!(
                        "MCP unreachable at '{}': Timeout: no tool set within {}s",
                        self.settings.discovery_url,
                        self.timeout.as_secs()
                    )),
                );
            }
        };

        match fetched {
            Ok(snapshot) => {
                debug!("Health: {} tools available", snapshot.len());
                let summary = ToolsSummary {
                    names: snapshot.tools().iter().map(|t| t.name.to_string()).collect(),
                    fetched_at: snapshot.fetched_at_wall(),
                };
                let issue = snapshot.is_empty().then(|| {
                    "MCP connected but returned 0 tools. The discovery service may have no entities configured."
                        .to_string()
                });
                (Some(summary), issue)
            }
            Err(e) => (
                None,
                Some(format!(
                    "MCP unreachable at '{}': {}: {}",
                    self.settings.discovery_url,
                    e.error_type(),
                    e
                )),
            ),
        }
    }

    async fn check_model(&self) -> Option<String> {
        let models = match tokio::time::timeout(self.timeout, self.model.list_models()).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                endpoint: self.settings.model_endpoint.clone(),
            }),
        };

        match models {
            Ok(ids) => {
                let wanted = &self.settings.model;
                if ids.iter().any(|id| id.eq_ignore_ascii_case(wanted)) {
                    None
                } else {
                    Some(format!(
                        "AI endpoint is reachable but deployment '{}' was not found in /models response.",
                        wanted
                    ))
                }
            }
            Err(ModelError::Http {
                endpoint, status, ..
            }) => Some(format!(
                "AI models endpoint returned {} at '{}'.",
                status, endpoint
            )),
            Err(ModelError::InvalidResponse { .. }) => {
                Some("AI /models endpoint returned non-JSON response.".to_string())
            }
            Err(e) => Some(format!(
                "AI endpoint unreachable at '{}': {}: {}",
                self.settings.model_endpoint,
                e.error_type(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::chat::testing::{DISCOVERY_URL, MODEL_ENDPOINT, ScriptedModel, test_config};
    use crate::domains::discovery::testing::{FakeConnector, FakeState};
    use crate::domains::discovery::{CachePolicy, ClientLifecycleManager};
    use std::sync::atomic::Ordering;

    fn aggregator(tool_count: usize) -> (HealthAggregator<FakeConnector>, Arc<ScriptedModel>, Arc<FakeState>) {
        let config = test_config(false);
        let connector = FakeConnector::with_tools(tool_count);
        let discovery = Arc::clone(&connector.state);
        let lifecycle = Arc::new(ClientLifecycleManager::new(connector, DISCOVERY_URL));
        let cache = Arc::new(ToolCache::new(lifecycle, CachePolicy::from(&config.discovery)));
        let model = Arc::new(ScriptedModel::answering("unused"));
        (
            HealthAggregator::new(cache, model.clone(), &config),
            model,
            discovery,
        )
    }

    #[tokio::test]
    async fn test_healthy_when_everything_answers() {
        let (health, _, _) = aggregator(2);
        let report = health.check(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
        assert_eq!(report.config.model_key, "...56789");

        let tools = report.tools.unwrap();
        assert_eq!(tools.names, ["tool_0", "tool_1"]);
        assert!(tools.fetched_at <= report.checked_at);
    }

    #[tokio::test]
    async fn test_reuses_fresh_tool_set() {
        let (health, _, discovery) = aggregator(2);
        health.check(&CancellationToken::new()).await;
        health.check(&CancellationToken::new()).await;
        assert_eq!(discovery.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_tools_is_an_issue() {
        let (health, _, _) = aggregator(0);
        let report = health.check(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.issues[0].contains("0 tools"));
    }

    #[tokio::test]
    async fn test_both_failures_reported() {
        let (health, model, discovery) = aggregator(2);
        discovery.set_fail_connect(true);
        model.set_models(Err(ModelError::Http {
            endpoint: format!("{}/openai/v1/models", MODEL_ENDPOINT),
            status: 401,
            body: String::new(),
        }));

        let report = health.check(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0].contains(DISCOVERY_URL));
        assert!(report.issues[0].contains("ConnectError"));
        assert!(report.issues[1].contains("401"));
        assert!(report.issues[1].contains("/openai/v1/models"));
    }

    #[tokio::test]
    async fn test_model_match_is_case_insensitive() {
        let (health, model, _) = aggregator(1);
        model.set_models(Ok(vec!["GPT-4o-Mini".to_string()]));
        assert!(health.check(&CancellationToken::new()).await.issues.is_empty());

        model.set_models(Ok(vec!["gpt-4o".to_string()]));
        let report = health.check(&CancellationToken::new()).await;
        assert!(report.issues[0].contains("'gpt-4o-mini' was not found"));
    }

    #[tokio::test]
    async fn test_non_json_listing() {
        let (health, model, _) = aggregator(1);
        model.set_models(Err(ModelError::invalid_response(MODEL_ENDPOINT, "non-JSON response")));
        let report = health.check(&CancellationToken::new()).await;
        assert_eq!(report.issues, ["AI /models endpoint returned non-JSON response."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_check_bounded_by_timeout() {
        let (health, model, _) = aggregator(1);
        model.set_models_delay(Duration::from_secs(60));

        let report = health.check(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.issues[0].contains("Timeout"));
        assert_eq!(model.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_discovery_bounded_by_timeout() {
        let (health, _, discovery) = aggregator(2);
        discovery.set_list_delay(Duration::from_secs(3600));
        let started = tokio::time::Instant::now();

        let report = health.check(&CancellationToken::new()).await;
        assert!(started.elapsed() <= Duration::from_secs(3));
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.tools.is_none());
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains(DISCOVERY_URL));
        assert!(report.issues[0].contains("Timeout"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(HealthStatus::Degraded).unwrap(),
            "degraded"
        );
    }
}
