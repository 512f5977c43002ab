use chrono::{DateTime, NaiveDateTime, Utc};

use super::rules::ExtractionRules;
use crate::models::ticket::{LiveInterval, RawComment};

/// Parse a tracker datetime. The tracker reports zone offsets, but the
/// original pipeline reads only the leading seconds-resolution prefix and
/// treats it as UTC; that behavior is kept.
pub fn parse_tracker_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() < 19 {
        return None;
    }
    NaiveDateTime::parse_from_str(&raw[..19], "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse a `DD/MM/YYYY HH:MM` pair from a live-interval match.
fn parse_interval_datetime(date: &str, time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%d/%m/%Y %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Extract actual execution windows from comment bodies. When the second
/// date is omitted it defaults to the first. Pairs where either endpoint
/// fails to parse are dropped; reversed pairs are dropped with a warning.
pub fn extract_live_intervals(
    comments: &[RawComment],
    rules: &ExtractionRules,
    warnings: &mut Vec<String>,
) -> Vec<LiveInterval> {
    let mut intervals = Vec::new();
    for comment in comments {
        if comment.body.is_empty() {
            continue;
        }
        for caps in rules.live_interval.captures_iter(&comment.body) {
            let start_date = &caps[1];
            let start_time = &caps[2];
            let end_date = caps.get(3).map(|m| m.as_str()).unwrap_or(start_date);
            let end_time = &caps[4];

            let start = parse_interval_datetime(start_date, start_time);
            let end = parse_interval_datetime(end_date, end_time);
            match (start, end) {
                (Some(start), Some(end)) if start <= end => {
                    intervals.push(LiveInterval { start, end });
                }
                (Some(start), Some(end)) => {
                    warnings.push(format!(
                        "dropped reversed live interval [{start} .. {end}]"
                    ));
                }
                _ => {}
            }
        }
    }
    intervals
}

/// One `YYYYMMDD HH:MM - USER: ACTION` line from an incident description.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
}

/// Extract timeline entries from the description. The first entry's
/// timestamp becomes the incident's first impact time.
pub fn extract_timeline_entries(description: &str, rules: &ExtractionRules) -> Vec<TimelineEntry> {
    let mut entries = Vec::new();
    if description.is_empty() {
        return entries;
    }
    for caps in rules.timeline_entry.captures_iter(description) {
        let stamp = format!("{} {}", &caps[1], &caps[2]);
        let Ok(naive) = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d %H:%M") else {
            continue;
        };
        entries.push(TimelineEntry {
            timestamp: naive.and_utc(),
            user: caps[3].to_lowercase(),
            action: caps[4].trim().to_string(),
        });
    }
    entries
}
