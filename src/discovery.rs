use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::search::SearchOptions;
use crate::tracker::Tracker;

/// Find candidate change keys around an incident instant with up to three
/// queries: changes that started inside the window, changes active at the
/// instant, and open-ended changes that started before it. The result is
/// the union, first-seen order. A failing query is logged and contributes
/// nothing; only the candidates' keys are fetched here, never their bodies.
pub async fn discover_candidates(
    tracker: &dyn Tracker,
    anchor: DateTime<Utc>,
    options: &SearchOptions,
) -> Result<Vec<String>, String> {
    let (window_before, window_after) = options.windows()?;
    let max_results = options.clamped_max_results();

    let anchor_str = format_query_instant(anchor);
    let from_str = format_query_instant(anchor - window_before);
    let to_str = format_query_instant(anchor + window_after);

    let mut keys: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let window_query = compose_query(
        &options.project,
        &format!(
            "\"Start Date/Time\" >= \"{from_str}\" AND \"Start Date/Time\" <= \"{to_str}\""
        ),
        &options.extra_filter,
    );
    run_query(tracker, "window", &window_query, max_results, &mut keys, &mut seen).await;

    if options.include_active {
        let active_query = compose_query(
            &options.project,
            &format!(
                "\"Start Date/Time\" <= \"{anchor_str}\" AND \"End Date/Time\" >= \"{anchor_str}\""
            ),
            &options.extra_filter,
        );
        run_query(tracker, "active-at", &active_query, max_results, &mut keys, &mut seen).await;
    }

    if options.include_no_end {
        let no_end_query = compose_query(
            &options.project,
            &format!(
                "\"Start Date/Time\" <= \"{anchor_str}\" AND \"End Date/Time\" IS EMPTY"
            ),
            &options.extra_filter,
        );
        run_query(tracker, "open-ended", &no_end_query, max_results, &mut keys, &mut seen).await;
    }

    tracing::info!("candidate discovery: {} unique keys", keys.len());
    Ok(keys)
}

fn format_query_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

/// Project scope + time predicate + the caller's opaque conjunct.
fn compose_query(project: &str, predicate: &str, extra_filter: &str) -> String {
    let mut query = format!("project = {project} AND {predicate}");
    let extra = extra_filter.trim();
    if !extra.is_empty() {
        query.push_str(&format!(" AND ({extra})"));
    }
    query.push_str(" ORDER BY \"Start Date/Time\" DESC");
    query
}

async fn run_query(
    tracker: &dyn Tracker,
    label: &str,
    query: &str,
    max_results: u32,
    keys: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    tracing::debug!("{label} query: {query}");
    match tracker.search(query, max_results).await {
        Ok(found) => {
            let mut new = 0usize;
            let total = found.len();
            for key in found {
                if seen.insert(key.clone()) {
                    keys.push(key);
                    new += 1;
                }
            }
            tracing::info!("{label} query: {total} keys ({new} new)");
        }
        Err(e) => {
            tracing::warn!("{label} query failed, continuing without it: {e}");
        }
    }
}
