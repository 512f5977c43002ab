use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{AppSettings, FieldMap};
use crate::config_db::ConfigDb;
use crate::discovery;
use crate::extract::{self, ExtractionRules};
use crate::fetch_pool;
use crate::models::job::{JobStatus, Phase, ProgressSnapshot};
use crate::models::scoring::{Ranking, ScoringConfig};
use crate::models::search::{IncidentSeed, SearchOptions};
use crate::models::ticket::{Ticket, TicketKind, EXTRACTION_VERSION};
use crate::scorer;
use crate::tracker::{JiraTracker, Tracker, TrackerError};

/// Terminal failure reasons of a correlation run. Everything else is
/// handled inside the run (per-candidate failures shrink the ranking, they
/// don't abort it).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid incident seed: {0}")]
    Seed(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("incident {0} not found")]
    IncidentNotFound(String),
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("job cancelled")]
    Cancelled,
}

/// Thread-safe progress reporter: `(done, total, phase)`.
pub type ProgressReporter = Arc<dyn Fn(u64, u64, Phase) + Send + Sync>;

/// The normalized tickets of one run, serialized to the blob store as a
/// single JSON document. Rankings are recomputable from this plus a
/// [`ScoringConfig`], with no tracker I/O.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionDocument {
    pub info: ExtractionInfo,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionInfo {
    pub version: String,
    pub extracted_at: DateTime<Utc>,
    /// Incident key, or the virtual analysis name.
    pub seed: String,
    pub search_options: SearchOptions,
    pub total_tickets: usize,
    /// Candidate keys that failed definitively during the fetch.
    pub errors: usize,
}

impl ExtractionDocument {
    pub fn incident(&self) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.is_incident())
    }

    pub fn find(&self, key: &str) -> Option<&Ticket> {
        self.tickets
            .iter()
            .find(|t| t.key.eq_ignore_ascii_case(key))
    }

    /// The tickets eligible for scoring under the stored search options.
    pub fn scorable_candidates(&self) -> Vec<Ticket> {
        self.tickets
            .iter()
            .filter(|t| {
                t.kind == TicketKind::Change
                    || (self.info.search_options.include_external_maintenance
                        && t.kind == TicketKind::ExternalMaintenance)
            })
            .cloned()
            .collect()
    }
}

/// Recompute a ranking from a stored extraction with the given config.
pub fn rescore_document(
    doc: &ExtractionDocument,
    config: &ScoringConfig,
) -> Result<Ranking, EngineError> {
    let incident = doc
        .incident()
        .ok_or_else(|| EngineError::Seed("stored extraction has no incident".to_string()))?;
    let candidates = doc.scorable_candidates();
    Ok(scorer::rank_candidates(incident, &candidates, config, Utc::now()))
}

pub struct CorrelationOutcome {
    pub incident: Ticket,
    /// Incident plus every fetched ticket, unfiltered.
    pub tickets: Vec<Ticket>,
    pub ranking: Ranking,
    pub candidate_count: usize,
    pub errors: usize,
}

/// Drive one extraction + scoring run: validate, discover, fetch, score.
/// Always terminates with a ranking or a single terminal error; progress is
/// reported as `(done, total, phase)` with monotonic `done`.
pub async fn run_correlation(
    tracker: Arc<dyn Tracker>,
    seed: IncidentSeed,
    options: &SearchOptions,
    scoring: ScoringConfig,
    rules: Arc<ExtractionRules>,
    field_map: Arc<FieldMap>,
    concurrency: usize,
    cancel: CancellationToken,
    progress: ProgressReporter,
) -> Result<CorrelationOutcome, EngineError> {
    scoring.validate().map_err(EngineError::Config)?;
    options.windows().map_err(EngineError::Config)?;

    progress(0, 0, Phase::Connecting);

    // Resolve the seed into an incident ticket and its anchor instant
    let (incident, anchor, counts_in_total) = match seed {
        IncidentSeed::Real(key) => {
            let key = key.trim().to_uppercase();
            if !is_valid_incident_key(&key) {
                return Err(EngineError::Seed(format!(
                    "'{key}' does not look like an incident key (expected INC-<number>)"
                )));
            }
            let incident = fetch_incident(tracker.as_ref(), &key, &rules, &field_map).await?;
            if !incident.is_incident() {
                return Err(EngineError::Seed(format!(
                    "{key} is a {} ticket, not an incident",
                    incident.kind.label()
                )));
            }
            let anchor = incident.times.created_at.ok_or_else(|| {
                EngineError::Seed(format!("{key} has no creation time to anchor the search"))
            })?;
            (incident, anchor, true)
        }
        IncidentSeed::Virtual(virtual_incident) => {
            let ticket = extract::virtual_incident_ticket(&virtual_incident, Utc::now());
            let anchor = virtual_incident.impact_time;
            (ticket, anchor, false)
        }
    };

    let keys = discovery::discover_candidates(tracker.as_ref(), anchor, options)
        .await
        .map_err(EngineError::Config)?;

    let offset: u64 = if counts_in_total { 1 } else { 0 };
    let total = offset + keys.len() as u64;
    progress(offset, total, Phase::Extracting);

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let pool_progress: fetch_pool::ProgressFn = {
        let progress = progress.clone();
        Arc::new(move |done, _pool_total| {
            progress(offset + done, total, Phase::Extracting);
        })
    };
    let outcome = fetch_pool::fetch_tickets(
        tracker,
        keys,
        concurrency,
        rules,
        field_map,
        cancel.clone(),
        pool_progress,
    )
    .await
    .map_err(|e| match e {
        TrackerError::Auth(message) => EngineError::Auth(message),
        other => EngineError::Tracker(other),
    })?;

    if outcome.cancelled || cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let candidates: Vec<Ticket> = outcome
        .tickets
        .iter()
        .filter(|t| {
            t.kind == TicketKind::Change
                || (options.include_external_maintenance
                    && t.kind == TicketKind::ExternalMaintenance)
        })
        .cloned()
        .collect();
    tracing::info!(
        "scoring {} candidates ({} fetched, {} failed)",
        candidates.len(),
        outcome.tickets.len(),
        outcome.failed.len()
    );

    progress(total, total, Phase::Scoring);
    let ranking = scorer::rank_candidates(&incident, &candidates, &scoring, Utc::now());

    let mut tickets = Vec::with_capacity(1 + outcome.tickets.len());
    tickets.push(incident.clone());
    tickets.extend(outcome.tickets);

    Ok(CorrelationOutcome {
        incident,
        tickets,
        candidate_count: candidates.len(),
        errors: outcome.failed.len(),
        ranking,
    })
}

pub(crate) fn is_valid_incident_key(key: &str) -> bool {
    key.strip_prefix("INC-")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

async fn fetch_incident(
    tracker: &dyn Tracker,
    key: &str,
    rules: &ExtractionRules,
    field_map: &FieldMap,
) -> Result<Ticket, EngineError> {
    let raw = tracker.issue(key).await.map_err(|e| match e {
        TrackerError::Auth(message) => EngineError::Auth(message),
        TrackerError::NotFound(_) => EngineError::IncidentNotFound(key.to_string()),
        other => EngineError::Tracker(other),
    })?;
    let comments = match tracker.comments(key).await {
        Ok(comments) => comments,
        Err(e) => {
            tracing::warn!("{key}: comments unavailable: {e}");
            Vec::new()
        }
    };
    Ok(extract::normalize(&raw, &comments, rules, field_map, Utc::now()))
}

// ── Background job plumbing ──

struct ActiveJob {
    snapshot: ProgressSnapshot,
    cancel: CancellationToken,
}

/// Live progress and cancellation handles of running jobs. Rows in the job
/// table are the durable record; this is the in-memory view handlers poll.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, ActiveJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: &str) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.jobs.lock().unwrap().insert(
            job_id.to_string(),
            ActiveJob {
                snapshot: ProgressSnapshot {
                    done: 0,
                    total: 0,
                    phase: Phase::Connecting,
                },
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    pub fn update(&self, job_id: &str, done: u64, total: u64, phase: Phase) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            // Treat non-increases as no-ops so late worker updates can't
            // walk progress backwards.
            if done >= job.snapshot.done || phase != job.snapshot.phase {
                job.snapshot = ProgressSnapshot {
                    done: done.max(job.snapshot.done),
                    total,
                    phase,
                };
            }
        }
    }

    pub fn snapshot(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.jobs.lock().unwrap().get(job_id).map(|j| j.snapshot)
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        match self.jobs.lock().unwrap().get(job_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, job_id: &str) {
        self.jobs.lock().unwrap().remove(job_id);
    }
}

/// Everything a background job needs from the application.
#[derive(Clone)]
pub struct JobEnv {
    pub settings: Arc<AppSettings>,
    pub db: Arc<ConfigDb>,
    pub registry: Arc<JobRegistry>,
}

/// Launch a correlation job in the background. The job row must already
/// exist; this drives it to a terminal status and stores the extraction
/// and ranking on success.
pub fn spawn_correlation_job(
    env: JobEnv,
    job_id: String,
    seed: IncidentSeed,
    options: SearchOptions,
    username: String,
    password: String,
) {
    let cancel = env.registry.register(&job_id);
    tokio::spawn(async move {
        let result = run_job(&env, &job_id, seed, options, &username, &password, cancel).await;
        match result {
            Ok(candidate_count) => {
                tracing::info!("job {job_id}: completed with {candidate_count} candidates");
            }
            Err(EngineError::Cancelled) => {
                tracing::info!("job {job_id}: cancelled");
                let _ = env
                    .db
                    .update_job_status(&job_id, JobStatus::Cancelled, None, None, None);
            }
            Err(e) => {
                tracing::error!("job {job_id}: failed: {e}");
                let _ = env.db.update_job_status(
                    &job_id,
                    JobStatus::Failed,
                    None,
                    None,
                    Some(&e.to_string()),
                );
            }
        }
        env.registry.finish(&job_id);
    });
}

#[allow(clippy::too_many_arguments)]
async fn run_job(
    env: &JobEnv,
    job_id: &str,
    seed: IncidentSeed,
    options: SearchOptions,
    username: &str,
    password: &str,
    cancel: CancellationToken,
) -> Result<usize, EngineError> {
    env.db
        .update_job_status(job_id, JobStatus::Running, Some(0), None, None)
        .map_err(|e| EngineError::Config(e.to_string()))?;

    let scoring = env
        .db
        .scoring_config()
        .map_err(|e| EngineError::Config(e.to_string()))?;
    let rules = Arc::new(ExtractionRules::new(scoring.service_synonyms.clone()));
    let field_map = Arc::new(env.settings.fields.clone());

    let tracker: Arc<dyn Tracker> = Arc::new(JiraTracker::new(
        &env.settings.tracker.url,
        username,
        password,
        env.settings.tracker.timeout_secs,
    ));

    // Validate credentials before any heavier work
    let display_name = tracker.myself().await.map_err(|e| match e {
        TrackerError::Auth(message) => EngineError::Auth(message),
        other => EngineError::Tracker(other),
    })?;
    tracing::info!("job {job_id}: connected to tracker as {display_name}");

    let counts_incident = matches!(seed, IncidentSeed::Real(_));
    let progress: ProgressReporter = {
        let registry = env.registry.clone();
        let db = env.db.clone();
        let job_id = job_id.to_string();
        Arc::new(move |done, total, phase| {
            registry.update(&job_id, done, total, phase);
            let pct = if total > 0 {
                ((done as f64 / total as f64) * 100.0) as i64
            } else {
                0
            };
            let candidates = if total > 0 {
                Some(total as i64 - if counts_incident { 1 } else { 0 })
            } else {
                None
            };
            let _ = db.update_job_status(&job_id, JobStatus::Running, Some(pct), candidates, None);
        })
    };

    let outcome = run_correlation(
        tracker,
        seed,
        &options,
        scoring.clone(),
        rules,
        field_map,
        env.settings.tracker.concurrency,
        cancel,
        progress,
    )
    .await?;

    let seed_label = outcome.incident.key.clone();
    let document = ExtractionDocument {
        info: ExtractionInfo {
            version: EXTRACTION_VERSION.to_string(),
            extracted_at: Utc::now(),
            seed: seed_label,
            search_options: options,
            total_tickets: outcome.tickets.len(),
            errors: outcome.errors,
        },
        tickets: outcome.tickets,
    };

    let doc_json =
        serde_json::to_string(&document).map_err(|e| EngineError::Config(e.to_string()))?;
    env.db
        .save_extraction(job_id, &doc_json)
        .map_err(|e| EngineError::Config(e.to_string()))?;

    let ranking_json =
        serde_json::to_string(&outcome.ranking).map_err(|e| EngineError::Config(e.to_string()))?;
    env.db
        .save_ranking(job_id, &scoring.weights.hash(), &ranking_json)
        .map_err(|e| EngineError::Config(e.to_string()))?;

    env.db
        .update_job_status(
            job_id,
            JobStatus::Completed,
            Some(100),
            Some(outcome.candidate_count as i64),
            None,
        )
        .map_err(|e| EngineError::Config(e.to_string()))?;
    let total = document.tickets.len() as u64;
    env.registry.update(job_id, total, total, Phase::Completed);

    Ok(outcome.candidate_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::search::VirtualIncident;
    use crate::testing::MockTracker;
    use serde_json::json;

    fn incident_fields() -> serde_json::Value {
        json!({
            "issuetype": { "name": "Incident" },
            "summary": "Object storage degraded",
            "description": "20250722 12:20 - jdoe: alarms firing",
            "created": "2025-07-22T12:30:00.000+0200",
        })
    }

    fn change_fields(summary: &str) -> serde_json::Value {
        json!({
            "issuetype": { "name": "Technical Change" },
            "summary": summary,
            "created": "2025-07-21T09:00:00.000+0200",
            "customfield_10303": "2025-07-22T12:00:00.000+0200",
            "customfield_10304": "2025-07-22T13:00:00.000+0200",
        })
    }

    fn progress_recorder() -> (ProgressReporter, Arc<Mutex<Vec<(u64, u64, Phase)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        let reporter: ProgressReporter = Arc::new(move |done, total, phase| {
            writer.lock().unwrap().push((done, total, phase));
        });
        (reporter, seen)
    }

    fn run_args() -> (Arc<ExtractionRules>, Arc<FieldMap>, CancellationToken) {
        (
            Arc::new(ExtractionRules::default()),
            Arc::new(FieldMap::default()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn real_seed_end_to_end() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("INC-117346", incident_fields())
                .with_issue("TECCM-1", change_fields("change one"))
                .with_issue("TECCM-2", change_fields("change two"))
                .with_search_results(vec![
                    Ok(vec!["TECCM-1".to_string()]),
                    Ok(vec!["TECCM-2".to_string()]),
                    Ok(vec![]),
                ]),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, seen) = progress_recorder();

        let outcome = run_correlation(
            tracker.clone(),
            IncidentSeed::Real("inc-117346".to_string()),
            &SearchOptions::default(),
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.incident.key, "INC-117346");
        assert_eq!(outcome.candidate_count, 2);
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.ranking.ranking.len(), 2);
        assert_eq!(outcome.tickets.len(), 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (0, 0, Phase::Connecting));
        // Total = 1 (incident) + 2 candidates; the incident counts as done
        assert!(seen.contains(&(1, 3, Phase::Extracting)));
        assert_eq!(*seen.last().unwrap(), (3, 3, Phase::Scoring));
    }

    #[tokio::test]
    async fn invalid_incident_key_rejected_before_io() {
        let tracker = Arc::new(MockTracker::new());
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let result = run_correlation(
            tracker.clone(),
            IncidentSeed::Real("TECCM-7".to_string()),
            &SearchOptions::default(),
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(EngineError::Seed(_))));
        assert_eq!(tracker.total_issue_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_weights_rejected_before_io() {
        let tracker = Arc::new(MockTracker::new());
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let mut scoring = ScoringConfig::default();
        scoring.weights.time = 7.0;

        let result = run_correlation(
            tracker.clone(),
            IncidentSeed::Real("INC-1".to_string()),
            &SearchOptions::default(),
            scoring,
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(EngineError::Config(_))));
        assert_eq!(tracker.total_issue_calls(), 0);
    }

    #[tokio::test]
    async fn missing_incident_fails_the_run() {
        let tracker = Arc::new(MockTracker::new());
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let result = run_correlation(
            tracker,
            IncidentSeed::Real("INC-404".to_string()),
            &SearchOptions::default(),
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(EngineError::IncidentNotFound(k)) if k == "INC-404"));
    }

    #[tokio::test]
    async fn seed_resolving_to_non_incident_rejected() {
        let tracker = Arc::new(
            MockTracker::new().with_issue("INC-9", change_fields("mislabeled")),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let result = run_correlation(
            tracker,
            IncidentSeed::Real("INC-9".to_string()),
            &SearchOptions::default(),
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(EngineError::Seed(_))));
    }

    #[tokio::test]
    async fn non_change_kinds_filtered_from_scoring() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("INC-1", incident_fields())
                .with_issue("TECCM-1", change_fields("real change"))
                .with_issue(
                    "TECCM-2",
                    json!({
                        "issuetype": { "name": "External Maintenance" },
                        "summary": "provider maintenance",
                        "created": "2025-07-21T09:00:00.000+0200",
                    }),
                )
                .with_search_results(vec![
                    Ok(vec!["TECCM-1".to_string(), "TECCM-2".to_string()]),
                ]),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let outcome = run_correlation(
            tracker,
            IncidentSeed::Real("INC-1".to_string()),
            &SearchOptions {
                include_active: false,
                include_no_end: false,
                ..SearchOptions::default()
            },
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await
        .unwrap();

        // External maintenance fetched but not scored by default
        assert_eq!(outcome.tickets.len(), 3);
        assert_eq!(outcome.candidate_count, 1);
        assert_eq!(outcome.ranking.ranking[0].key, "TECCM-1");
    }

    #[tokio::test]
    async fn virtual_seed_skips_incident_fetch() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("TECCM-1", change_fields("candidate"))
                .with_search_results(vec![Ok(vec!["TECCM-1".to_string()])]),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, seen) = progress_recorder();

        let seed = IncidentSeed::Virtual(VirtualIncident {
            name: Some("storage outage".to_string()),
            impact_time: "2025-07-22T12:20:00Z".parse().unwrap(),
            services: vec!["s3 object storage".to_string()],
            hosts: vec![],
            technologies: vec![],
            team: None,
        });

        let outcome = run_correlation(
            tracker.clone(),
            seed,
            &SearchOptions {
                include_active: false,
                include_no_end: false,
                ..SearchOptions::default()
            },
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.incident.key, "VIRTUAL");
        assert_eq!(tracker.issue_call_count("TECCM-1"), 1);
        assert_eq!(tracker.total_issue_calls(), 1);

        // Virtual totals exclude the incident
        let seen = seen.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), (1, 1, Phase::Scoring));
    }

    #[tokio::test]
    async fn cancellation_yields_no_ranking() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("INC-1", incident_fields())
                .with_search_results(vec![Ok(vec!["TECCM-1".to_string()])]),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();
        cancel.cancel();

        let result = run_correlation(
            tracker,
            IncidentSeed::Real("INC-1".to_string()),
            &SearchOptions::default(),
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn per_candidate_failures_shrink_the_ranking() {
        let tracker = Arc::new(
            MockTracker::new()
                .with_issue("INC-1", incident_fields())
                .with_issue("TECCM-1", change_fields("good"))
                .with_search_results(vec![
                    Ok(vec!["TECCM-1".to_string(), "TECCM-404".to_string()]),
                ]),
        );
        let (rules, fields, cancel) = run_args();
        let (progress, _) = progress_recorder();

        let outcome = run_correlation(
            tracker,
            IncidentSeed::Real("INC-1".to_string()),
            &SearchOptions {
                include_active: false,
                include_no_end: false,
                ..SearchOptions::default()
            },
            ScoringConfig::default(),
            rules,
            fields,
            4,
            cancel,
            progress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.candidate_count, 1);
        assert_eq!(outcome.ranking.ranking.len(), 1);
    }

    #[test]
    fn incident_key_validation() {
        assert!(is_valid_incident_key("INC-117346"));
        assert!(is_valid_incident_key("INC-1"));
        assert!(!is_valid_incident_key("INC-"));
        assert!(!is_valid_incident_key("TECCM-1"));
        assert!(!is_valid_incident_key("INC-12x"));
    }

    #[test]
    fn document_scorable_candidates_respect_external_flag() {
        let incident_raw: crate::models::ticket::RawIssue =
            serde_json::from_value(json!({ "key": "INC-1", "fields": incident_fields() })).unwrap();
        let ext_raw: crate::models::ticket::RawIssue = serde_json::from_value(json!({
            "key": "TECCM-2",
            "fields": {
                "issuetype": { "name": "External Maintenance" },
                "summary": "x",
            }
        }))
        .unwrap();
        let rules = ExtractionRules::default();
        let field_map = FieldMap::default();
        let now = Utc::now();
        let tickets = vec![
            extract::normalize(&incident_raw, &[], &rules, &field_map, now),
            extract::normalize(&ext_raw, &[], &rules, &field_map, now),
        ];

        let mut doc = ExtractionDocument {
            info: ExtractionInfo {
                version: EXTRACTION_VERSION.to_string(),
                extracted_at: now,
                seed: "INC-1".to_string(),
                search_options: SearchOptions::default(),
                total_tickets: 2,
                errors: 0,
            },
            tickets,
        };

        assert!(doc.scorable_candidates().is_empty());
        doc.info.search_options.include_external_maintenance = true;
        assert_eq!(doc.scorable_candidates().len(), 1);
        assert!(doc.incident().is_some());
        assert!(doc.find("teccm-2").is_some());

        // Rankings are recomputable from the stored document alone
        let ranking = rescore_document(&doc, &ScoringConfig::default()).unwrap();
        assert_eq!(ranking.analysis.candidates_analyzed, 1);
        assert_eq!(ranking.incident.key, "INC-1");
    }

    #[test]
    fn rescore_requires_an_incident() {
        let doc = ExtractionDocument {
            info: ExtractionInfo {
                version: EXTRACTION_VERSION.to_string(),
                extracted_at: Utc::now(),
                seed: "INC-1".to_string(),
                search_options: SearchOptions::default(),
                total_tickets: 0,
                errors: 0,
            },
            tickets: Vec::new(),
        };
        assert!(matches!(
            rescore_document(&doc, &ScoringConfig::default()),
            Err(EngineError::Seed(_))
        ));
    }

    #[test]
    fn registry_progress_is_monotonic() {
        let registry = JobRegistry::new();
        registry.register("job-1");
        registry.update("job-1", 2, 10, Phase::Extracting);
        registry.update("job-1", 1, 10, Phase::Extracting); // late update, ignored
        let snapshot = registry.snapshot("job-1").unwrap();
        assert_eq!(snapshot.done, 2);

        assert!(registry.cancel("job-1"));
        registry.finish("job-1");
        assert!(registry.snapshot("job-1").is_none());
        assert!(!registry.cancel("job-1"));
    }
}
