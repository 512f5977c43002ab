use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::Deserializer, ser::Serializer};
use std::collections::BTreeSet;

/// Fixed tag recorded in `ExtractionMeta::version` for every ticket the
/// normalizer produces.
pub const EXTRACTION_VERSION: &str = "1.1";

/// Ticket category derived from the tracker's issue-type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketKind {
    Incident,
    Change,
    ExternalMaintenance,
    /// Anything else, carried as the upper-cased raw type name.
    Other(String),
}

impl TicketKind {
    /// Case-insensitive substring match on the raw issue-type name.
    pub fn from_issue_type(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("incident") {
            TicketKind::Incident
        } else if lower.contains("external maintenance") {
            TicketKind::ExternalMaintenance
        } else if lower.contains("change") {
            TicketKind::Change
        } else {
            TicketKind::Other(name.to_uppercase())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TicketKind::Incident => "INCIDENT",
            TicketKind::Change => "CHANGE",
            TicketKind::ExternalMaintenance => "EXTERNAL MAINTENANCE",
            TicketKind::Other(name) => name,
        }
    }
}

impl Serialize for TicketKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for TicketKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(match label.as_str() {
            "INCIDENT" => TicketKind::Incident,
            "CHANGE" => TicketKind::Change,
            "EXTERNAL MAINTENANCE" => TicketKind::ExternalMaintenance,
            _ => TicketKind::Other(label),
        })
    }
}

/// An actual execution window reported in a change ticket's comments.
/// Invariant: `start <= end` (the normalizer drops reversed pairs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LiveInterval {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Minutes from `t` to the nearest edge of the interval; 0 if inside.
    pub fn distance_minutes(&self, t: DateTime<Utc>) -> f64 {
        if t < self.start {
            (self.start - t).num_seconds() as f64 / 60.0
        } else if t > self.end {
            (t - self.end).num_seconds() as f64 / 60.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketTimes {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// For incidents, the first timeline entry in the description.
    pub first_impact_time: Option<DateTime<Utc>>,
    /// For changes, the planned execution window.
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    /// Actual execution windows parsed from comments. May overlap.
    #[serde(default)]
    pub live_intervals: Vec<LiveInterval>,
}

/// Canonical entity sets. All values lower-cased, no duplicates, no empties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub services: BTreeSet<String>,
    pub hosts: BTreeSet<String>,
    pub technologies: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    pub team: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub owner: Option<String>,
    /// Lower-cased identifiers: assignee, reporter, comment authors with
    /// whitespace stripped, timeline users, escalation lists.
    pub people_involved: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    pub cause: Option<String>,
    pub effect: Option<String>,
    pub resolution: Option<String>,
    pub change_category: Option<String>,
    pub customer_impact: Option<String>,
    #[serde(default)]
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub version: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub timeline_entries: usize,
    pub comments: usize,
}

/// A normalized ticket. Immutable once produced by the normalizer;
/// rescoring with different weights reuses the same ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub key: String,
    pub kind: TicketKind,
    pub summary: String,
    pub times: TicketTimes,
    pub entities: Entities,
    pub organization: Organization,
    pub classification: Classification,
    pub extraction: ExtractionMeta,
}

impl Ticket {
    pub fn is_incident(&self) -> bool {
        self.kind == TicketKind::Incident
    }

    pub fn is_change(&self) -> bool {
        self.kind == TicketKind::Change
    }
}

/// Raw issue as returned by the tracker. Only the normalizer interprets
/// the `fields` map.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub key: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Raw comment as returned by the tracker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    pub id: String,
    /// Author display name; empty when the tracker omits it.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_issue_type() {
        assert_eq!(TicketKind::from_issue_type("Incident"), TicketKind::Incident);
        assert_eq!(TicketKind::from_issue_type("Major Incident"), TicketKind::Incident);
        assert_eq!(TicketKind::from_issue_type("Technical Change"), TicketKind::Change);
        assert_eq!(
            TicketKind::from_issue_type("External Maintenance"),
            TicketKind::ExternalMaintenance
        );
        assert_eq!(
            TicketKind::from_issue_type("Service Request"),
            TicketKind::Other("SERVICE REQUEST".to_string())
        );
    }

    #[test]
    fn kind_round_trips_through_serde() {
        for kind in [
            TicketKind::Incident,
            TicketKind::Change,
            TicketKind::ExternalMaintenance,
            TicketKind::Other("TASK".to_string()),
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let back: TicketKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }

    #[test]
    fn interval_distance() {
        let start = "2025-07-22T12:00:00Z".parse().unwrap();
        let end = "2025-07-22T13:00:00Z".parse().unwrap();
        let iv = LiveInterval { start, end };

        assert!(iv.contains("2025-07-22T12:20:00Z".parse().unwrap()));
        assert_eq!(iv.distance_minutes("2025-07-22T12:20:00Z".parse().unwrap()), 0.0);
        assert_eq!(iv.distance_minutes("2025-07-22T11:30:00Z".parse().unwrap()), 30.0);
        assert_eq!(iv.distance_minutes("2025-07-22T14:00:00Z".parse().unwrap()), 60.0);
    }
}
