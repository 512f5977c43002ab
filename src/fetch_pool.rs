use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::FieldMap;
use crate::extract::{self, ExtractionRules};
use crate::models::ticket::Ticket;
use crate::tracker::{Tracker, TrackerError};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_BASE_SECS: u64 = 2;

/// Thread-safe progress callback, invoked with `(done, total)` after every
/// key completes.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub tickets: Vec<Ticket>,
    /// Keys that failed definitively, with the final error text.
    pub failed: Vec<(String, String)>,
    pub cancelled: bool,
}

enum KeyOutcome {
    Fetched(Box<Ticket>),
    Failed(String, String),
    AuthFailure(String),
    Skipped,
}

/// Fetch and normalize a set of tickets with bounded parallelism.
///
/// Exactly `min(concurrency, |keys|)` fetches are outstanding at any time.
/// Each key gets up to three attempts: rate-limit errors back off
/// exponentially (2s, 4s), other retryable errors linearly (2s, 4s);
/// 404s are definitive per-key failures. An auth failure aborts the whole
/// pool. Cancellation is honored between keys and wakes pending backoff
/// sleeps; the normalizer runs at most once per key.
pub async fn fetch_tickets(
    tracker: Arc<dyn Tracker>,
    keys: Vec<String>,
    concurrency: usize,
    rules: Arc<ExtractionRules>,
    field_map: Arc<FieldMap>,
    cancel: CancellationToken,
    progress: ProgressFn,
) -> Result<FetchOutcome, TrackerError> {
    let total = keys.len() as u64;
    if keys.is_empty() {
        return Ok(FetchOutcome::default());
    }
    let workers = concurrency.max(1).min(keys.len());
    tracing::info!("fetch pool: {total} keys with {workers} workers");

    // Child token so an auth failure can drain the pool without cancelling
    // the caller's token.
    let pool_cancel = cancel.child_token();
    let done = Arc::new(Mutex::new(0u64));

    let outcomes: Vec<KeyOutcome> = stream::iter(keys)
        .map(|key| {
            let tracker = tracker.clone();
            let rules = rules.clone();
            let field_map = field_map.clone();
            let pool_cancel = pool_cancel.clone();
            let done = done.clone();
            let progress = progress.clone();
            async move {
                let outcome =
                    fetch_one(tracker.as_ref(), &key, &rules, &field_map, &pool_cancel).await;
                if !matches!(outcome, KeyOutcome::Skipped) {
                    // Invoked under the lock so reported `done` values are
                    // monotonic across workers.
                    let mut done = done.lock().unwrap();
                    *done += 1;
                    progress(*done, total);
                }
                outcome
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut result = FetchOutcome::default();
    let mut auth_error: Option<String> = None;
    for outcome in outcomes {
        match outcome {
            KeyOutcome::Fetched(ticket) => result.tickets.push(*ticket),
            KeyOutcome::Failed(key, error) => result.failed.push((key, error)),
            KeyOutcome::AuthFailure(error) => auth_error = Some(error),
            KeyOutcome::Skipped => {}
        }
    }

    if let Some(error) = auth_error {
        return Err(TrackerError::Auth(error));
    }

    result.cancelled = cancel.is_cancelled();
    if result.cancelled {
        tracing::warn!(
            "fetch pool cancelled: {} tickets fetched before stop",
            result.tickets.len()
        );
    } else if !result.failed.is_empty() {
        tracing::warn!("fetch pool: {} of {total} keys failed", result.failed.len());
    }
    Ok(result)
}

async fn fetch_one(
    tracker: &dyn Tracker,
    key: &str,
    rules: &ExtractionRules,
    field_map: &FieldMap,
    cancel: &CancellationToken,
) -> KeyOutcome {
    if cancel.is_cancelled() {
        return KeyOutcome::Skipped;
    }

    for attempt in 1..=MAX_ATTEMPTS {
        match fetch_and_normalize(tracker, key, rules, field_map).await {
            Ok(ticket) => return KeyOutcome::Fetched(Box::new(ticket)),
            Err(TrackerError::Auth(error)) => {
                tracing::error!("{key}: authentication failed, aborting pool: {error}");
                cancel.cancel();
                return KeyOutcome::AuthFailure(error);
            }
            Err(e @ TrackerError::NotFound(_)) => {
                tracing::warn!("{key}: {e}");
                return KeyOutcome::Failed(key.to_string(), e.to_string());
            }
            Err(e) => {
                if attempt == MAX_ATTEMPTS {
                    tracing::error!("{key}: giving up after {MAX_ATTEMPTS} attempts: {e}");
                    return KeyOutcome::Failed(key.to_string(), e.to_string());
                }
                let delay_secs = if e.is_rate_limit() {
                    RETRY_DELAY_BASE_SECS * 2u64.pow(attempt - 1)
                } else {
                    RETRY_DELAY_BASE_SECS * attempt as u64
                };
                tracing::warn!(
                    "{key}: attempt {attempt}/{MAX_ATTEMPTS} failed ({e}), retrying in {delay_secs}s"
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                    _ = cancel.cancelled() => return KeyOutcome::Skipped,
                }
            }
        }
    }

    KeyOutcome::Skipped
}

async fn fetch_and_normalize(
    tracker: &dyn Tracker,
    key: &str,
    rules: &ExtractionRules,
    field_map: &FieldMap,
) -> Result<Ticket, TrackerError> {
    let raw = tracker.issue(key).await?;
    // A comment fetch failure degrades the ticket, it doesn't fail the key
    let comments = match tracker.comments(key).await {
        Ok(comments) => comments,
        Err(e) => {
            tracing::warn!("{key}: comments unavailable: {e}");
            Vec::new()
        }
    };
    Ok(extract::normalize(
        &raw,
        &comments,
        rules,
        field_map,
        chrono::Utc::now(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTracker;
    use serde_json::json;

    fn change_fields(summary: &str) -> serde_json::Value {
        json!({
            "issuetype": { "name": "Change" },
            "summary": summary,
            "created": "2025-07-21T09:00:00.000+0200",
        })
    }

    fn pool_args() -> (Arc<ExtractionRules>, Arc<FieldMap>, CancellationToken) {
        (
            Arc::new(ExtractionRules::default()),
            Arc::new(FieldMap::default()),
            CancellationToken::new(),
        )
    }

    fn progress_recorder() -> (ProgressFn, Arc<Mutex<Vec<(u64, u64)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        let callback: ProgressFn = Arc::new(move |done, total| {
            writer.lock().unwrap().push((done, total));
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn fetches_all_keys_once() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-1", change_fields("one"))
                .with_issue("TECCM-2", change_fields("two"))
                .with_issue("TECCM-3", change_fields("three")),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, seen) = progress_recorder();

        let keys = vec!["TECCM-1".into(), "TECCM-2".into(), "TECCM-3".into()];
        let outcome = fetch_tickets(tracker.clone(), keys, 2, rules, fields, cancel, progress)
            .await
            .unwrap();

        assert_eq!(outcome.tickets.len(), 3);
        assert!(outcome.failed.is_empty());
        assert!(!outcome.cancelled);
        assert_eq!(tracker.total_issue_calls(), 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&(3, 3)));
        // done is monotonic
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_then_succeeds() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-42", change_fields("retry me"))
                .with_issue_errors(
                    "TECCM-42",
                    vec![TrackerError::RateLimit("429".to_string())],
                ),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, _) = progress_recorder();

        let outcome = fetch_tickets(
            tracker.clone(),
            vec!["TECCM-42".into()],
            8,
            rules,
            fields,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.tickets.len(), 1);
        assert_eq!(outcome.tickets[0].key, "TECCM-42");
        assert!(outcome.failed.is_empty());
        assert_eq!(tracker.issue_call_count("TECCM-42"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_after_three_attempts() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-9", change_fields("never"))
                .with_issue_errors(
                    "TECCM-9",
                    vec![
                        TrackerError::Transient("503".to_string()),
                        TrackerError::Transient("503".to_string()),
                        TrackerError::Transient("503".to_string()),
                    ],
                ),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, seen) = progress_recorder();

        let outcome = fetch_tickets(
            tracker.clone(),
            vec!["TECCM-9".into()],
            8,
            rules,
            fields,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert!(outcome.tickets.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(tracker.issue_call_count("TECCM-9"), 3);
        // failed keys still advance progress
        assert_eq!(seen.lock().unwrap().last(), Some(&(1, 1)));
    }

    #[tokio::test]
    async fn not_found_is_definitive() {
        let tracker = Arc::new(
            MockTracker::new().with_issue("TECCM-1", change_fields("ok")),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, _) = progress_recorder();

        let keys = vec!["TECCM-1".into(), "TECCM-404".into()];
        let outcome = fetch_tickets(tracker.clone(), keys, 2, rules, fields, cancel, progress)
            .await
            .unwrap();

        assert_eq!(outcome.tickets.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "TECCM-404");
        assert_eq!(tracker.issue_call_count("TECCM-404"), 1);
    }

    #[tokio::test]
    async fn auth_failure_aborts_pool() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-1", change_fields("ok"))
                .with_issue_errors(
                    "TECCM-1",
                    vec![TrackerError::Auth("403".to_string())],
                ),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, _) = progress_recorder();

        let result = fetch_tickets(
            tracker,
            vec!["TECCM-1".into()],
            8,
            rules,
            fields,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(TrackerError::Auth(_))));
    }

    #[tokio::test]
    async fn pre_cancelled_pool_fetches_nothing() {
        let tracker = Arc::new(
            MockTracker::new().with_issue("TECCM-1", change_fields("ok")),
        );
        let (rules, fields, cancel) = pool_args();
        cancel.cancel();
        let (progress, seen) = progress_recorder();

        let outcome = fetch_tickets(
            tracker.clone(),
            vec!["TECCM-1".into()],
            8,
            rules,
            fields,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.tickets.is_empty());
        assert_eq!(tracker.total_issue_calls(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wakes_pending_retry() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-1", change_fields("ok"))
                .with_issue_errors(
                    "TECCM-1",
                    vec![TrackerError::RateLimit("429".to_string())],
                ),
        );
        let (rules, fields, cancel) = pool_args();
        let (progress, _) = progress_recorder();

        let pool = tokio::spawn(fetch_tickets(
            tracker.clone(),
            vec!["TECCM-1".into()],
            8,
            rules,
            fields,
            cancel.clone(),
            progress,
        ));

        // Let the first attempt fail and the retry sleep start, then cancel.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let outcome = pool.await.unwrap().unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.tickets.is_empty());
        assert_eq!(tracker.issue_call_count("TECCM-1"), 1);
    }
}
