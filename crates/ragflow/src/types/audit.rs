//! Audit events for compliance logging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of audit events emitted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    PiiRedacted,
    PromptInjectionDetected,
    ValidationFailed,
    QueryProcessed,
    QueryFailed,
    EscalationCreated,
    CacheHit,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PiiRedacted => "pii_redacted",
            Self::PromptInjectionDetected => "prompt_injection_detected",
            Self::ValidationFailed => "validation_failed",
            Self::QueryProcessed => "query_processed",
            Self::QueryFailed => "query_failed",
            Self::EscalationCreated => "escalation_created",
            Self::CacheHit => "cache_hit",
        }
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A logged pipeline action, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: AuditEventType,
    /// Component or worker that triggered the event
    pub actor: String,
    pub entity_type: String,
    pub entity_id: String,
    pub severity: Severity,
    pub success: bool,
    pub error_message: Option<String>,
    /// Event-specific detail
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event for a query entity
    pub fn for_query(
        event_type: AuditEventType,
        actor: impl Into<String>,
        query_id: Uuid,
        severity: Severity,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            actor: actor.into(),
            entity_type: "query".to_string(),
            entity_id: query_id.to_string(),
            severity,
            success: severity == Severity::Info,
            error_message: None,
            detail,
            created_at: Utc::now(),
        }
    }

    /// Attach an error message
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}
