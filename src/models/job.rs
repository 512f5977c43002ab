use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Real incident, default search options.
    Standard,
    /// Real incident, caller-tuned search options.
    Custom,
    /// Virtual incident, no tracker ticket.
    Manual,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Standard => "standard",
            JobKind::Custom => "custom",
            JobKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(JobKind::Standard),
            "custom" => Some(JobKind::Custom),
            "manual" => Some(JobKind::Manual),
            _ => None,
        }
    }
}

/// Run phase reported alongside the done/total counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Connecting,
    Extracting,
    Scoring,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connecting => "connecting",
            Phase::Extracting => "extracting",
            Phase::Scoring => "scoring",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        }
    }
}

/// Live progress of a running job. `done` is monotonic within a run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSnapshot {
    pub done: u64,
    pub total: u64,
    pub phase: Phase,
}

/// A job row as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    /// Incident key, or the virtual analysis name.
    pub inc: String,
    pub window: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Percent complete, 0-100.
    pub progress: i64,
    pub total_candidates: Option<i64>,
    pub error: Option<String>,
    pub username: Option<String>,
    pub search_summary: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}
