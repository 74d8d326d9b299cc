//! HTTP health probe for the supervised worker
//!
//! Every error path resolves to a [`HealthStatus`]; the probe never fails past
//! its own boundary so the control loop is not disturbed by network noise.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::error::Result;

/// Classification of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Worker answered and reports itself active
    Healthy,
    /// Worker answered but reports itself inactive
    Idle,
    /// Timeout or connection failure
    Unreachable,
    /// Worker answered with a non-2xx status
    Unhealthy(u16),
}

impl HealthStatus {
    /// Healthy and Idle both count as alive for restart purposes
    pub fn is_alive(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Idle)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_alive()
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Idle => write!(f, "idle"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
            HealthStatus::Unhealthy(code) => write!(f, "unhealthy (HTTP {})", code),
        }
    }
}

/// Where an alive classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    /// The worker sent the liveness flag itself
    Reported,
    /// Fail-open default: the flag was missing or the payload unparseable
    Assumed,
}

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub evidence: Evidence,
}

impl ProbeResult {
    pub fn reported(status: HealthStatus) -> Self {
        Self {
            status,
            evidence: Evidence::Reported,
        }
    }

    pub fn assumed_healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            evidence: Evidence::Assumed,
        }
    }

    pub fn unreachable() -> Self {
        Self::reported(HealthStatus::Unreachable)
    }

    /// True when this result is a genuine success signal from the worker
    pub fn is_reported_success(&self) -> bool {
        self.status.is_alive() && self.evidence == Evidence::Reported
    }
}

/// Source of health signals for the supervisor
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Run one bounded-time probe
    async fn check(&self) -> ProbeResult;
}

/// Classify a 2xx response body.
///
/// Only `field` is interpreted; anything else in the payload is ignored.
pub fn classify_payload(body: &[u8], field: &str) -> ProbeResult {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => match map.get(field).and_then(Value::as_bool) {
            Some(true) => ProbeResult::reported(HealthStatus::Healthy),
            Some(false) => ProbeResult::reported(HealthStatus::Idle),
            None => {
                debug!("Health payload has no boolean '{}' field, assuming healthy", field);
                ProbeResult::assumed_healthy()
            }
        },
        Ok(_) => {
            debug!("Health payload is not a JSON object, assuming healthy");
            ProbeResult::assumed_healthy()
        }
        Err(e) => {
            debug!("Health payload is not valid JSON ({}), assuming healthy", e);
            ProbeResult::assumed_healthy()
        }
    }
}

/// Probe that issues `GET <url>` with a hard timeout
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    liveness_field: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, liveness_field: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
            liveness_field: liveness_field.into(),
        })
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self> {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.liveness_field.clone(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe an arbitrary URL with its own timeout
    pub async fn check_url(&self, url: &str, timeout: Duration) -> ProbeResult {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Health check: no response from {} ({})", url, e);
                return ProbeResult::unreachable();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Health check: {} returned HTTP {}", url, status.as_u16());
            return ProbeResult::reported(HealthStatus::Unhealthy(status.as_u16()));
        }

        match response.bytes().await {
            Ok(body) => classify_payload(&body, &self.liveness_field),
            Err(e) => {
                warn!("Health check: body from {} could not be read ({})", url, e);
                ProbeResult::unreachable()
            }
        }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProbe {
    async fn check(&self) -> ProbeResult {
        self.check_url(&self.url, self.timeout).await
    }
}
