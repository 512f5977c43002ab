use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Advanced candidate-search options. Every field has a sensible default so
/// the request body can omit the whole object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Window reaching back from the incident, e.g. "48h", "2d", "120m".
    #[serde(default = "default_window_before")]
    pub window_before: String,
    /// Window reaching forward from the incident.
    #[serde(default = "default_window_after")]
    pub window_after: String,
    /// Include changes active at the incident instant.
    #[serde(default = "default_true")]
    pub include_active: bool,
    /// Include changes with a start but no end date.
    #[serde(default = "default_true")]
    pub include_no_end: bool,
    /// Score EXTERNAL MAINTENANCE tickets alongside changes.
    #[serde(default)]
    pub include_external_maintenance: bool,
    /// Per-query result cap; clamped to [10, 2000] before use.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Opaque query fragment AND-ed onto every discovery query.
    #[serde(default)]
    pub extra_filter: String,
    /// Tracker project holding the change tickets.
    #[serde(default = "default_project")]
    pub project: String,
}

fn default_window_before() -> String {
    "48h".to_string()
}

fn default_window_after() -> String {
    "2h".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> u32 {
    500
}

fn default_project() -> String {
    "TECCM".to_string()
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            window_before: default_window_before(),
            window_after: default_window_after(),
            include_active: true,
            include_no_end: true,
            include_external_maintenance: false,
            max_results: default_max_results(),
            extra_filter: String::new(),
            project: default_project(),
        }
    }
}

impl SearchOptions {
    pub fn clamped_max_results(&self) -> u32 {
        self.max_results.clamp(10, 2000)
    }

    /// Parse both window strings. Rejects the request before any tracker I/O.
    pub fn windows(&self) -> Result<(Duration, Duration), String> {
        let before = parse_window(&self.window_before)?;
        let after = parse_window(&self.window_after)?;
        Ok((before, after))
    }

    /// Brief human summary of non-default options, for the job list.
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.include_active {
            parts.push("no active".to_string());
        }
        if !self.include_no_end {
            parts.push("no open-ended".to_string());
        }
        if self.include_external_maintenance {
            parts.push("+ext.maint".to_string());
        }
        if !self.extra_filter.is_empty() {
            parts.push("extra filter".to_string());
        }
        if self.project != default_project() {
            parts.push(format!("proj:{}", self.project));
        }
        if parts.is_empty() { None } else { Some(parts.join(", ")) }
    }
}

/// Parse a time-window string: `^\d+[hdm]$` (hours/days/minutes).
pub fn parse_window(window: &str) -> Result<Duration, String> {
    let s = window.trim().to_lowercase();
    let (digits, unit) = s.split_at(s.len().saturating_sub(1));
    let value: i64 = digits
        .parse()
        .map_err(|_| format!("invalid time window: {window}"))?;
    if digits.is_empty() || value < 0 {
        return Err(format!("invalid time window: {window}"));
    }
    match unit {
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        "m" => Ok(Duration::minutes(value)),
        _ => Err(format!("invalid time window: {window}")),
    }
}

/// Parse a user-supplied impact time. Accepts RFC 3339 or a naive
/// `YYYY-MM-DDTHH:MM[:SS]`, interpreted as UTC.
pub fn parse_impact_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid impact time: {raw}"))
}

/// What anchors a correlation run: a real incident ticket, or a virtual
/// incident synthesized from user input with no tracker lookup.
#[derive(Debug, Clone)]
pub enum IncidentSeed {
    Real(String),
    Virtual(VirtualIncident),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualIncident {
    #[serde(default)]
    pub name: Option<String>,
    pub impact_time: DateTime<Utc>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub team: Option<String>,
}
