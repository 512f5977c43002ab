pub mod hosts;
pub mod people;
pub mod rules;
pub mod services;
pub mod times;

pub use rules::ExtractionRules;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::config::FieldMap;
use crate::models::search::VirtualIncident;
use crate::models::ticket::{
    Classification, Entities, ExtractionMeta, Organization, RawComment, RawIssue, Ticket,
    TicketKind, TicketTimes, EXTRACTION_VERSION,
};

/// Normalize a raw tracker issue into a [`Ticket`]. Pure and deterministic:
/// identical inputs (including `extracted_at`) produce byte-identical
/// tickets under canonical serialization. This is the only place raw
/// tracker shapes are interpreted.
pub fn normalize(
    raw: &RawIssue,
    comments: &[RawComment],
    rules: &ExtractionRules,
    field_map: &FieldMap,
    extracted_at: DateTime<Utc>,
) -> Ticket {
    let fields = &raw.fields;
    let mut warnings = Vec::new();

    let issue_type = nested_name(fields, "issuetype").unwrap_or_default();
    let kind = TicketKind::from_issue_type(&issue_type);

    let summary = str_field(fields, "summary").unwrap_or_default();
    let description = str_field(fields, "description").unwrap_or_default();
    let comments_text: Vec<&str> = comments.iter().map(|c| c.body.as_str()).collect();
    let full_text = format!("{summary} {description} {}", comments_text.join(" "));

    let timeline = times::extract_timeline_entries(&description, rules);
    let live_intervals = times::extract_live_intervals(comments, rules, &mut warnings);

    let planned_start = parse_custom_datetime(fields, &field_map.start_datetime, "planned start", &mut warnings);
    let planned_end = parse_custom_datetime(fields, &field_map.end_datetime, "planned end", &mut warnings);
    let (planned_start, planned_end) = match (planned_start, planned_end) {
        (Some(start), Some(end)) if start > end => {
            warnings.push(format!(
                "dropped reversed planned window [{start} .. {end}]"
            ));
            (None, None)
        }
        pair => pair,
    };

    if kind == TicketKind::Change && live_intervals.is_empty() {
        warnings.push("no live intervals found in comments, using planned window".to_string());
    }

    let affected_bu = custom_list(fields, &field_map.affected_business_units);

    let entities = Entities {
        services: services::extract_services(&full_text, &affected_bu, rules),
        hosts: hosts::extract_hosts(&full_text, rules),
        technologies: extract_technologies(&full_text, rules),
    };

    let assignee = nested_name(fields, "assignee");
    let reporter = nested_name(fields, "reporter");
    let escalation_lists = vec![
        custom_list(fields, &field_map.tech_escalation),
        custom_list(fields, &field_map.permitted_users),
    ];
    let people_involved = people::extract_people_involved(
        assignee.as_deref(),
        reporter.as_deref(),
        comments,
        &timeline,
        &escalation_lists,
    );

    let organization = Organization {
        team: custom_string(fields, &field_map.responsible_entity),
        assignee,
        reporter,
        owner: custom_string(fields, &field_map.change_owner)
            .or_else(|| custom_string(fields, &field_map.incident_owner)),
        people_involved,
    };

    let classification = Classification {
        cause: custom_string(fields, &field_map.cause),
        effect: custom_string(fields, &field_map.effect),
        resolution: nested_name(fields, "resolution"),
        change_category: custom_string(fields, &field_map.change_category),
        customer_impact: custom_string(fields, &field_map.customer_impact),
        environments: custom_list(fields, &field_map.environments),
    };

    let timeline_count = timeline.len();
    let times = TicketTimes {
        created_at: str_field(fields, "created")
            .and_then(|s| times::parse_tracker_datetime(&s)),
        updated_at: str_field(fields, "updated")
            .and_then(|s| times::parse_tracker_datetime(&s)),
        resolved_at: str_field(fields, "resolutiondate")
            .and_then(|s| times::parse_tracker_datetime(&s)),
        first_impact_time: timeline.first().map(|e| e.timestamp),
        planned_start,
        planned_end,
        live_intervals,
    };

    Ticket {
        key: raw.key.clone(),
        kind,
        summary,
        times,
        entities,
        organization,
        classification,
        extraction: ExtractionMeta {
            version: EXTRACTION_VERSION.to_string(),
            extracted_at,
            warnings,
            timeline_entries: timeline_count,
            comments: comments.len(),
        },
    }
}

/// Synthesize an incident ticket from user input, bypassing the tracker.
pub fn virtual_incident_ticket(incident: &VirtualIncident, extracted_at: DateTime<Utc>) -> Ticket {
    let lower_set = |values: &[String]| -> BTreeSet<String> {
        values
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect()
    };

    Ticket {
        key: "VIRTUAL".to_string(),
        kind: TicketKind::Incident,
        summary: incident
            .name
            .clone()
            .unwrap_or_else(|| "Manual analysis".to_string()),
        times: TicketTimes {
            created_at: Some(incident.impact_time),
            first_impact_time: Some(incident.impact_time),
            ..TicketTimes::default()
        },
        entities: Entities {
            services: lower_set(&incident.services),
            hosts: lower_set(&incident.hosts),
            technologies: lower_set(&incident.technologies),
        },
        organization: Organization {
            team: incident.team.clone(),
            ..Organization::default()
        },
        classification: Classification::default(),
        extraction: ExtractionMeta {
            version: EXTRACTION_VERSION.to_string(),
            extracted_at,
            warnings: Vec::new(),
            timeline_entries: 0,
            comments: 0,
        },
    }
}

fn extract_technologies(text: &str, rules: &ExtractionRules) -> BTreeSet<String> {
    if text.is_empty() {
        return BTreeSet::new();
    }
    let lower = text.to_lowercase();
    rules
        .technologies
        .iter()
        .filter(|(_, pattern)| pattern.is_match(&lower))
        .map(|(token, _)| token.clone())
        .collect()
}

fn str_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name)?.as_str().map(|s| s.to_string())
}

/// `fields[outer]["name"]`, the shape of issuetype/assignee/reporter/resolution.
fn nested_name(fields: &Map<String, Value>, outer: &str) -> Option<String> {
    fields
        .get(outer)?
        .get("name")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// A custom field's scalar value: a plain string, or an object carrying
/// `name` or `value`.
fn custom_string(fields: &Map<String, Value>, field_id: &str) -> Option<String> {
    value_to_string(fields.get(field_id)?)
}

/// A custom field's list value. Scalar values become one-element lists.
fn custom_list(fields: &Map<String, Value>, field_id: &str) -> Vec<String> {
    match fields.get(field_id) {
        Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
        Some(value) => value_to_string(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("value"))
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_custom_datetime(
    fields: &Map<String, Value>,
    field_id: &str,
    label: &str,
    warnings: &mut Vec<String>,
) -> Option<DateTime<Utc>> {
    let raw = custom_string(fields, field_id)?;
    match times::parse_tracker_datetime(&raw) {
        Some(dt) => Some(dt),
        None => {
            warnings.push(format!("could not parse {label} '{raw}'"));
            None
        }
    }
}
