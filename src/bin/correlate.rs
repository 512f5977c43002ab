//! One-shot CLI: correlate an incident with candidate changes and print the
//! ranking, without going through the HTTP surface.
//!
//! Usage:
//!   correlate INC-117346 [window]
//!
//! Credentials come from TRACKER_USER / TRACKER_PASSWORD (or JIRA_USER /
//! JIRA_PASSWORD); the tracker URL from TRACKER_URL or correlator.toml.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use correlator_api::config::AppSettings;
use correlator_api::extract::ExtractionRules;
use correlator_api::jobs::{self, ProgressReporter};
use correlator_api::models::scoring::ScoringConfig;
use correlator_api::models::search::{IncidentSeed, SearchOptions};
use correlator_api::tracker::{JiraTracker, Tracker};

fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("correlator_api=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(inc_key) = args.next() else {
        eprintln!("usage: correlate INC-<number> [window, e.g. 48h]");
        std::process::exit(2);
    };
    let window = args.next().unwrap_or_else(|| "48h".to_string());

    let config_path =
        std::env::var("CORRELATOR_CONFIG").unwrap_or_else(|_| "./correlator.toml".to_string());
    let mut settings = AppSettings::load(&config_path)?;
    if let Ok(url) = std::env::var("TRACKER_URL") {
        settings.tracker.url = url;
    }

    let Some(username) = env_any(&["TRACKER_USER", "JIRA_USER"]) else {
        anyhow::bail!("set TRACKER_USER (and TRACKER_PASSWORD) in the environment");
    };
    let Some(password) = env_any(&["TRACKER_PASSWORD", "JIRA_PASSWORD"]) else {
        anyhow::bail!("set TRACKER_PASSWORD in the environment");
    };

    let tracker: Arc<dyn Tracker> = Arc::new(JiraTracker::new(
        &settings.tracker.url,
        &username,
        &password,
        settings.tracker.timeout_secs,
    ));
    let display_name = tracker.myself().await?;
    eprintln!("connected to {} as {display_name}", settings.tracker.url);

    let options = SearchOptions {
        window_before: window,
        ..SearchOptions::default()
    };
    let scoring = ScoringConfig::default();
    let rules = Arc::new(ExtractionRules::new(scoring.service_synonyms.clone()));
    let field_map = Arc::new(settings.fields.clone());

    let progress: ProgressReporter = Arc::new(|done, total, phase| {
        if total > 0 {
            eprint!("\r{}: {done}/{total}    ", phase.as_str());
        }
    });

    let outcome = jobs::run_correlation(
        tracker,
        IncidentSeed::Real(inc_key),
        &options,
        scoring,
        rules,
        field_map,
        settings.tracker.concurrency,
        CancellationToken::new(),
        progress,
    )
    .await?;
    eprintln!();

    let ranking = &outcome.ranking;
    println!(
        "incident {}: {}",
        ranking.incident.key, ranking.incident.summary
    );
    println!(
        "analyzed {} candidates, {} ranked ({} fetch errors)",
        ranking.analysis.candidates_analyzed, ranking.analysis.candidates_ranked, outcome.errors
    );
    println!();

    for candidate in ranking.ranking.iter().take(20) {
        println!(
            "{:>3}. {:<12} {:>6.1}  {}",
            candidate.rank, candidate.key, candidate.final_score, candidate.summary
        );
        println!(
            "     time={:.1} service={:.1} infra={:.1} org={:.1}",
            candidate.time.score, candidate.service.score, candidate.infra.score, candidate.org.score
        );
        if !candidate.penalties_applied.is_empty() {
            println!("     penalties: {}", candidate.penalties_applied.join(", "));
        }
        if !candidate.bonuses_applied.is_empty() {
            println!("     bonuses: {}", candidate.bonuses_applied.join(", "));
        }
    }

    Ok(())
}
