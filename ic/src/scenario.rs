//! Offline interception scenarios
//!
//! A scenario is a YAML file listing requests and URL rules. Each rule
//! becomes an independent observer, so several rules matching one request
//! compete exactly like independent browser plugins would:
//!
//! ```yaml
//! requests:
//!   - url: https://z-na.associates-amazon.com/widget.js
//!   - url: https://example.com/index.html
//! rules:
//!   - name: adblock
//!     url-pattern: associates-amazon
//!     action: { kind: abort, reason: blockedbyclient }
//!   - name: inject
//!     url-pattern: \.js$
//!     delay-ms: 20
//!     action: { kind: respond, payload: { body: "console.log('hi')" } }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coordinator::{
    ContinueOverrides, Coordinator, CoordinatorConfig, CoordinatorMetrics, ErrorCode, FinalizeReport, RecordingSink,
    RequestHandle, ResponsePayload, Topic,
};
use crate::dispatch::{Dispatcher, RequestInfo, RequestObserver};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub requests: Vec<RequestInfo>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Scenario::load: called");
        let content = std::fs::read_to_string(path).context(format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml(&content).context(format!("Failed to parse scenario {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(content)?;
        Ok(scenario)
    }
}

/// A URL rule and what it asks for on match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(rename = "url-pattern")]
    pub url_pattern: String,
    pub action: RuleAction,
    /// Simulated async latency before the rule acts
    #[serde(rename = "delay-ms", default)]
    pub delay_ms: Option<u64>,
    /// Fail after acting, to exercise handler-fault containment
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleAction {
    Abort {
        #[serde(default)]
        reason: ErrorCode,
    },
    Respond {
        #[serde(default)]
        payload: ResponsePayload,
    },
    Continue {
        #[serde(default)]
        overrides: Option<ContinueOverrides>,
    },
}

/// Observer applying one [`Rule`]
pub struct RuleObserver {
    rule: Rule,
    pattern: Regex,
}

impl RuleObserver {
    pub fn new(rule: Rule) -> Result<Self> {
        let pattern = Regex::new(&rule.url_pattern).context(format!("Invalid url-pattern for rule '{}'", rule.name))?;
        Ok(Self { rule, pattern })
    }
}

#[async_trait]
impl RequestObserver for RuleObserver {
    fn name(&self) -> &str {
        &self.rule.name
    }

    async fn on_request(&self, request: &RequestInfo, handle: &RequestHandle) -> Result<()> {
        if !self.pattern.is_match(&request.url) {
            return Ok(());
        }
        debug!(rule = %self.rule.name, url = %request.url, "RuleObserver::on_request: matched");

        if let Some(delay_ms) = self.rule.delay_ms {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match &self.rule.action {
            RuleAction::Abort { reason } => handle.request_abort(*reason)?,
            RuleAction::Respond { payload } => handle.request_respond(payload.clone())?,
            RuleAction::Continue { overrides } => handle.request_continue(overrides.clone())?,
        }

        if self.rule.fail {
            return Err(eyre!("rule '{}' failed after acting", self.rule.name));
        }
        Ok(())
    }
}

/// Result for one scenario request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub url: String,
    pub report: FinalizeReport,
    /// Topics observed, in publication order
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub outcomes: Vec<ScenarioOutcome>,
    pub metrics: CoordinatorMetrics,
    #[serde(rename = "sink-calls")]
    pub sink_calls: usize,
}

/// Run every scenario request through a fresh coordinator
pub async fn run_scenario(scenario: &Scenario, config: CoordinatorConfig) -> Result<ScenarioRun> {
    info!(requests = scenario.requests.len(), rules = scenario.rules.len(), "Running scenario");

    let sink = Arc::new(RecordingSink::new());
    let coordinator = Arc::new(Coordinator::new(sink.clone(), config));
    let mut dispatcher = Dispatcher::new(coordinator.clone());
    for rule in &scenario.rules {
        dispatcher.add_observer(Arc::new(RuleObserver::new(rule.clone())?));
    }

    let runs = scenario.requests.iter().cloned().map(|request| {
        let dispatcher = &dispatcher;
        async move {
            let url = request.url.clone();
            let topics = Arc::new(Mutex::new(Vec::new()));
            let log = topics.clone();
            let report = dispatcher
                .dispatch_with(request, move |handle| {
                    for topic in Topic::ALL {
                        let log = log.clone();
                        handle.subscribe(topic, move |n| {
                            log.lock().unwrap_or_else(PoisonError::into_inner).push(n.topic)
                        });
                    }
                })
                .await
                .context(format!("Failed to dispatch {}", url))?
                .ok_or_else(|| eyre!("{} was finalized elsewhere", url))?;

            let topics = topics.lock().unwrap_or_else(PoisonError::into_inner).clone();
            Ok::<_, eyre::Report>(ScenarioOutcome { url, report, topics })
        }
    });

    let outcomes = join_all(runs).await.into_iter().collect::<Result<Vec<_>>>()?;
    coordinator.log_summary();

    Ok(ScenarioRun {
        outcomes,
        metrics: coordinator.metrics(),
        sink_calls: sink.calls().len(),
    })
}
