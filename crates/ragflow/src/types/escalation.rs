//! Human escalation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason a query was routed to human support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    ValidationFailure,
    UserRequest,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::ValidationFailure => "validation_failure",
            Self::UserRequest => "user_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low_confidence" => Some(Self::LowConfidence),
            "validation_failure" => Some(Self::ValidationFailure),
            "user_request" => Some(Self::UserRequest),
            _ => None,
        }
    }

    /// Severity weight used for priority scoring (0-40)
    fn severity_weight(&self) -> f32 {
        match self {
            Self::ValidationFailure => 25.0,
            Self::UserRequest => 20.0,
            Self::LowConfidence => 15.0,
        }
    }
}

/// Assignment status, mutated by the human-support collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Queued,
    Assigned,
    Resolved,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "assigned" => Some(Self::Assigned),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A query escalated to human support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub id: Uuid,
    pub query_id: Uuid,
    /// Attempted answer, attached for human context when one exists
    pub answer_id: Option<Uuid>,
    pub reason: EscalationReason,
    /// Confidence at the moment of escalation
    pub confidence: Option<f32>,
    /// Priority in [0, 100]; higher is more urgent
    pub priority: f32,
    pub assignment_status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
}

impl EscalationRequest {
    /// Create a queued escalation with priority derived from the reason
    /// severity and the confidence gap
    pub fn new(query_id: Uuid, answer_id: Option<Uuid>, reason: EscalationReason, confidence: Option<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query_id,
            answer_id,
            reason,
            confidence,
            priority: Self::calculate_priority(reason, confidence),
            assignment_status: AssignmentStatus::Queued,
            created_at: Utc::now(),
        }
    }

    /// Priority = reason severity (0-40) + confidence gap (0-10) + a fixed
    /// standard-tier base (10), clamped to [0, 100]
    fn calculate_priority(reason: EscalationReason, confidence: Option<f32>) -> f32 {
        let mut priority = reason.severity_weight() + 10.0;
        if let Some(c) = confidence {
            priority += (1.0 - c.clamp(0.0, 1.0)) * 10.0;
        }
        priority.clamp(0.0, 100.0)
    }
}
