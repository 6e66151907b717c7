//! Security event reporting.
//!
//! Middleware reports authentication failures and similar incidents through the
//! [`SecurityMonitor`] trait. The default sink, [`TracingSecurityMonitor`], writes each event
//! to the `security` tracing target as structured fields. A sink failure must never change
//! the response the caller receives; callers use [`report`] which logs and swallows it.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug, Clone)]
pub enum MonitorError {
    /// The event sink rejected or lost the event
    #[error("Security event sink unavailable: {0}")]
    SinkUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single security-relevant occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    /// Machine-readable event name, e.g. `api_key_auth_error`
    pub event_type: &'static str,
    pub severity: Severity,
    /// RFC 3339 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(event_type: &'static str, severity: Severity) -> Self {
        Self {
            event_type,
            severity,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Sink for security events.
#[async_trait]
pub trait SecurityMonitor: Send + Sync {
    /// Records `event`. Returns whether the event was accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if the sink is unavailable.
    async fn log_security_event(&self, event: SecurityEvent) -> Result<bool, MonitorError>;
}

/// Writes events to the `security` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSecurityMonitor;

#[async_trait]
impl SecurityMonitor for TracingSecurityMonitor {
    async fn log_security_event(&self, event: SecurityEvent) -> Result<bool, MonitorError> {
        match event.severity {
            Severity::High | Severity::Critical => warn!(
                target: "security",
                event_type = event.event_type,
                severity = %event.severity,
                timestamp = %event.timestamp,
                details = ?event.details,
                "security_event"
            ),
            Severity::Low | Severity::Medium => info!(
                target: "security",
                event_type = event.event_type,
                severity = %event.severity,
                timestamp = %event.timestamp,
                details = ?event.details,
                "security_event"
            ),
        }
        Ok(true)
    }
}

/// Sends `event` to `monitor`, logging and discarding any sink failure.
pub async fn report(monitor: &dyn SecurityMonitor, event: SecurityEvent) {
    let event_type = event.event_type;
    if let Err(e) = monitor.log_security_event(event).await {
        error!(error = %e, event_type, "failed to record security event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingMonitor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecurityMonitor for FailingMonitor {
        async fn log_security_event(&self, _event: SecurityEvent) -> Result<bool, MonitorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MonitorError::SinkUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_tracing_monitor_accepts_events() {
        let event = SecurityEvent::new("api_key_auth_error", Severity::High)
            .with_details(serde_json::json!({ "error": "store offline" }));
        assert!(TracingSecurityMonitor.log_security_event(event).await.unwrap());
    }

    #[tokio::test]
    async fn test_report_swallows_sink_failure() {
        let monitor = FailingMonitor { calls: AtomicUsize::new(0) };
        report(&monitor, SecurityEvent::new("x", Severity::Low)).await;
        assert_eq!(monitor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = SecurityEvent::new("api_key_auth_error", Severity::Critical);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "api_key_auth_error");
        assert_eq!(json["severity"], "critical");
        assert!(json.get("details").is_none());
    }
}
