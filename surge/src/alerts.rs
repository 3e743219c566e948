//! Alert ingestion load test (requires `alerts` feature)
//!
//! Each request posts one synthetic alert event as JSON to the configured endpoint.
use crate::stop::StopHandle;
use crate::tester::LoadTester;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use surge_core::{BreakpointReport, ConfigError, Failure, FailureKind, LoadTestConfig};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

/// Consecutive failing steps before an alert ramp declares a breakpoint.
pub const ALERT_MAX_CONSECUTIVE_FAILURES: usize = 3;

const DEFAULT_CLASS_ID: u32 = 104;
const DEFAULT_SEVERITY: u8 = 3;
const DEFAULT_SOURCE: &str = "surge";

/// Shared by every sender in the process so concurrent testers never reuse an id.
static ALERT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("invalid load test configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid alert endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Target endpoint and alert template.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub endpoint: String,
    pub class_id: u32,
    pub severity: u8,
    pub source: String,
    pub bearer_token: Option<String>,
}

impl AlertConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            class_id: DEFAULT_CLASS_ID,
            severity: DEFAULT_SEVERITY,
            source: DEFAULT_SOURCE.to_string(),
            bearer_token: None,
        }
    }

    pub fn class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn bearer_token(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }
}

/// Body of a single alert POST.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub alert_id: String,
    pub class_id: u32,
    pub severity: u8,
    pub source: String,
    pub alerts_amount: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Sends alerts and counts how many it issued.
#[derive(Debug)]
pub(crate) struct AlertSender {
    client: Client,
    endpoint: Url,
    config: AlertConfig,
    sent: AtomicU64,
}

impl AlertSender {
    fn new(config: AlertConfig, load: &LoadTestConfig) -> Result<Self, AlertError> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = Client::builder().timeout(load.request_timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            config,
            sent: AtomicU64::new(0),
        })
    }

    /// Builds the next alert. Ids combine the process-wide sequence with the current time in
    /// milliseconds.
    pub(crate) fn next_event(&self) -> AlertEvent {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let counter = ALERT_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
        let now = OffsetDateTime::now_utc();
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        AlertEvent {
            alert_id: format!("load-test-{counter}-{millis}"),
            class_id: self.config.class_id,
            severity: self.config.severity,
            source: self.config.source.clone(),
            alerts_amount: 1,
            created_at: now,
        }
    }

    pub(crate) async fn send(&self) -> Result<(), Failure> {
        let event = self.next_event();
        let mut request = self.client.post(self.endpoint.clone()).json(&event);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let res = request.send().await.map_err(classify)?;
        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Failure::new(
                FailureKind::from_status(status.as_u16()),
                format!("{status} for url ({})", self.endpoint),
            ))
        }
    }
}

/// Typed classification of transport errors; falls back to the message heuristic.
fn classify(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::new(FailureKind::Timeout, err.to_string())
    } else if let Some(status) = err.status() {
        Failure::new(FailureKind::from_status(status.as_u16()), err.to_string())
    } else if err.is_connect() {
        Failure::new(FailureKind::ConnectionError, err.to_string())
    } else {
        // The url may contain digits that look like status codes.
        Failure::from(err.without_url())
    }
}

/// Load tester posting one alert per request.
///
/// # Example
/// ```no_run
/// use surge::prelude::*;
///
/// # async fn check() -> Result<(), surge::alerts::AlertError> {
/// let alerts = AlertConfig::new("http://focus-server:5000/alerts").bearer_token("secret");
/// let tester = AlertLoadTester::new(alerts, AlertLoadTester::default_config())?;
/// let report = tester.run().await;
/// assert!(!report.detected(), "{report}");
/// # Ok(())
/// # }
/// ```
pub struct AlertLoadTester {
    config: LoadTestConfig,
    sender: Arc<AlertSender>,
    stop: StopHandle,
}

impl AlertLoadTester {
    pub fn new(alerts: AlertConfig, config: LoadTestConfig) -> Result<Self, AlertError> {
        config.validate()?;
        let sender = AlertSender::new(alerts, &config)?;
        Ok(Self {
            config,
            sender: Arc::new(sender),
            stop: StopHandle::new(),
        })
    }

    /// Defaults for alert ramps: the generic defaults with a shorter consecutive-failure window.
    pub fn default_config() -> LoadTestConfig {
        LoadTestConfig::new("alerts").max_consecutive_failures(ALERT_MAX_CONSECUTIVE_FAILURES)
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Alerts issued so far by this tester.
    pub fn alerts_sent(&self) -> u64 {
        self.sender.sent.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn run(&self) -> BreakpointReport {
        let sender = self.sender.clone();
        let tester = LoadTester::from_parts(
            self.config.clone(),
            move || {
                let sender = sender.clone();
                async move { sender.send().await }
            },
            self.stop.clone(),
        );
        tester.run().await
    }
}
