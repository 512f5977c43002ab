use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::models::scoring::{
    IncidentSummary, RankedCandidate, Ranking, RankingAnalysis, ScoringConfig, SubScore,
};
use crate::models::ticket::Ticket;

/// Changes touching more than this many services are considered generic.
const GENERIC_CHANGE_THRESHOLD: usize = 10;

const DURATION_WEEK_HOURS: f64 = 168.0;
const DURATION_MONTH_HOURS: f64 = 720.0;
const DURATION_QUARTER_HOURS: f64 = 2160.0;

/// A strong service+infra match exempts a change from duration penalties.
const STRONG_MATCH_THRESHOLD: f64 = 80.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union > 0.0 { intersection / union } else { 0.0 }
}

/// Time proximity of the candidate's execution to the incident's impact.
///
/// Live intervals (actual execution) dominate; the planned window is the
/// fallback, at reduced ceilings. Distances decay on a square root over
/// `time_decay_hours`.
fn time_score(incident: &Ticket, candidate: &Ticket, decay_hours: f64) -> SubScore {
    let impact = incident
        .times
        .first_impact_time
        .or(incident.times.created_at);
    let Some(impact) = impact else {
        return SubScore {
            score: 0.0,
            reason: "could not determine incident impact time".to_string(),
            matches: Vec::new(),
        };
    };

    let decay_minutes = decay_hours * 60.0;
    let intervals = &candidate.times.live_intervals;

    if !intervals.is_empty() {
        for interval in intervals {
            if interval.contains(impact) {
                return SubScore {
                    score: 100.0,
                    reason: format!(
                        "impact {} inside live interval [{} .. {}]",
                        impact.format("%H:%M"),
                        interval.start.format("%H:%M"),
                        interval.end.format("%H:%M"),
                    ),
                    matches: vec![format!(
                        "{} - {}",
                        interval.start.format("%Y-%m-%d %H:%M"),
                        interval.end.format("%H:%M")
                    )],
                };
            }
        }

        let min_distance = intervals
            .iter()
            .map(|i| i.distance_minutes(impact))
            .fold(f64::INFINITY, f64::min);
        let score = if min_distance >= decay_minutes {
            0.0
        } else {
            100.0 * (1.0 - (min_distance / decay_minutes).sqrt())
        };
        return SubScore {
            score: round1(score),
            reason: format!("distance to nearest live interval: {} min", min_distance as i64),
            matches: Vec::new(),
        };
    }

    let planned_start = candidate.times.planned_start;
    let planned_end = candidate.times.planned_end;

    if let (Some(start), Some(end)) = (planned_start, planned_end)
        && start <= impact
        && impact <= end
    {
        return SubScore {
            score: 90.0,
            reason: format!(
                "impact inside planned window [{} .. {}]",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            matches: Vec::new(),
        };
    }

    if let Some(end) = planned_end
        && impact > end
    {
        let distance = (impact - end).num_seconds() as f64 / 60.0;
        let score = if distance >= decay_minutes {
            0.0
        } else {
            80.0 * (1.0 - (distance / decay_minutes).sqrt())
        };
        return SubScore {
            score: round1(score),
            reason: format!("distance to planned end: {} min", distance as i64),
            matches: Vec::new(),
        };
    }

    if planned_end.is_none()
        && let Some(start) = planned_start
        && impact >= start
    {
        let distance = (impact - start).num_seconds() as f64 / 60.0;
        let score = if distance >= decay_minutes {
            0.0
        } else {
            70.0 * (1.0 - (distance / decay_minutes).sqrt())
        };
        return SubScore {
            score: round1(score),
            reason: format!("distance to planned start: {} min", distance as i64),
            matches: Vec::new(),
        };
    }

    if planned_start.is_some() || planned_end.is_some() {
        return SubScore {
            score: 0.0,
            reason: "impact before the planned change".to_string(),
            matches: Vec::new(),
        };
    }

    SubScore {
        score: 0.0,
        reason: "no timing information on the change".to_string(),
        matches: Vec::new(),
    }
}

/// Exact service intersection scores a 50-point floor plus Jaccard; services
/// that only share an ecosystem earn partial credit.
fn service_score(incident: &Ticket, candidate: &Ticket, config: &ScoringConfig) -> SubScore {
    let inc = &incident.entities.services;
    let cand = &candidate.entities.services;

    if inc.is_empty() || cand.is_empty() {
        return SubScore {
            score: 0.0,
            reason: "no services to compare".to_string(),
            matches: Vec::new(),
        };
    }

    let matches: Vec<String> = inc.intersection(cand).cloned().collect();
    if !matches.is_empty() {
        let similarity = jaccard(inc, cand);
        return SubScore {
            score: round1(50.0 + similarity * 50.0),
            reason: format!("exact service match, jaccard {similarity:.2}"),
            matches,
        };
    }

    // Partial credit when both sides live in the same ecosystem
    let mut best: Option<(&String, Vec<String>, Vec<String>)> = None;
    for (group, members) in &config.related_groups {
        let inc_in: Vec<String> = inc.iter().filter(|s| members.contains(*s)).cloned().collect();
        let cand_in: Vec<String> = cand.iter().filter(|s| members.contains(*s)).cloned().collect();
        if inc_in.is_empty() || cand_in.is_empty() {
            continue;
        }
        let size = inc_in.len() + cand_in.len();
        if best
            .as_ref()
            .is_none_or(|(_, bi, bc)| size > bi.len() + bc.len())
        {
            best = Some((group, inc_in, cand_in));
        }
    }

    if let Some((group, inc_in, cand_in)) = best {
        let mut matches = inc_in.clone();
        matches.extend(cand_in.clone());
        return SubScore {
            score: 25.0,
            reason: format!("same ecosystem: {group} ({inc_in:?} vs {cand_in:?})"),
            matches,
        };
    }

    SubScore {
        score: 0.0,
        reason: "no service match".to_string(),
        matches: Vec::new(),
    }
}

/// Shared hosts are a strong signal (0 or 100); shared technologies a
/// weaker, Jaccard-graded one. Combined 60/40.
fn infra_score(incident: &Ticket, candidate: &Ticket) -> SubScore {
    let inc_hosts = &incident.entities.hosts;
    let cand_hosts = &candidate.entities.hosts;
    let host_matches: Vec<String> = inc_hosts.intersection(cand_hosts).cloned().collect();
    let host_score = if !inc_hosts.is_empty() && !cand_hosts.is_empty() && !host_matches.is_empty()
    {
        100.0
    } else {
        0.0
    };

    let inc_tech = &incident.entities.technologies;
    let cand_tech = &candidate.entities.technologies;
    let tech_matches: Vec<String> = inc_tech.intersection(cand_tech).cloned().collect();
    let tech_score = if !inc_tech.is_empty() && !cand_tech.is_empty() && !tech_matches.is_empty() {
        50.0 + jaccard(inc_tech, cand_tech) * 50.0
    } else {
        0.0
    };

    let mut reason_parts = Vec::new();
    if !host_matches.is_empty() {
        reason_parts.push(format!("hosts: {}", host_matches.join(", ")));
    }
    if !tech_matches.is_empty() {
        reason_parts.push(format!("tech: {}", tech_matches.join(", ")));
    }
    let reason = if reason_parts.is_empty() {
        "no infrastructure overlap".to_string()
    } else {
        reason_parts.join(" | ")
    };

    let mut matches = host_matches;
    matches.extend(tech_matches);

    SubScore {
        score: round1(host_score * 0.6 + tech_score * 0.4),
        reason,
        matches,
    }
}

/// Same or related team plus shared people, capped at 100.
fn org_score(incident: &Ticket, candidate: &Ticket) -> SubScore {
    let mut score = 0.0;
    let mut matches = Vec::new();
    let mut reasons = Vec::new();

    if let (Some(inc_team), Some(cand_team)) =
        (&incident.organization.team, &candidate.organization.team)
    {
        let inc_lower = inc_team.trim().to_lowercase();
        let cand_lower = cand_team.trim().to_lowercase();
        if inc_lower == cand_lower {
            score += 50.0;
            reasons.push("same team".to_string());
            matches.push(inc_team.clone());
        } else if inc_lower.contains(&cand_lower) || cand_lower.contains(&inc_lower) {
            score += 25.0;
            reasons.push("related team".to_string());
        }
    }

    let people: Vec<String> = incident
        .organization
        .people_involved
        .intersection(&candidate.organization.people_involved)
        .cloned()
        .collect();
    if !people.is_empty() {
        score += (people.len() as f64 * 15.0).min(50.0);
        reasons.push(format!("{} people in common", people.len()));
        matches.extend(people);
    }

    SubScore {
        score: round1(score.min(100.0)),
        reason: if reasons.is_empty() {
            "no organizational overlap".to_string()
        } else {
            reasons.join(" | ")
        },
        matches,
    }
}

/// Score one candidate against the incident. `rank` is filled in by
/// [`rank_candidates`].
pub fn score_candidate(
    incident: &Ticket,
    candidate: &Ticket,
    config: &ScoringConfig,
) -> RankedCandidate {
    let weights = config.weights.normalized();
    let penalties = &config.penalties;
    let bonuses = &config.bonuses;

    let time = time_score(incident, candidate, config.thresholds.time_decay_hours);
    let service = service_score(incident, candidate, config);
    let infra = infra_score(incident, candidate);
    let org = org_score(incident, candidate);

    let mut final_score = weights.time * time.score
        + weights.service * service.score
        + weights.infra * infra.score
        + weights.org * org.score;

    let mut penalties_applied = Vec::new();

    if candidate.times.live_intervals.is_empty() {
        final_score *= penalties.no_live_intervals;
        penalties_applied.push(format!("no_live_intervals (x{})", penalties.no_live_intervals));
    }
    if candidate.entities.hosts.is_empty() {
        final_score *= penalties.no_hosts;
        penalties_applied.push(format!("no_hosts (x{})", penalties.no_hosts));
    }
    if candidate.entities.services.is_empty() {
        final_score *= penalties.no_services;
        penalties_applied.push(format!("no_services (x{})", penalties.no_services));
    }
    if candidate.entities.services.len() > GENERIC_CHANGE_THRESHOLD {
        final_score *= penalties.generic_change;
        penalties_applied.push(format!(
            "generic_change ({} services, x{})",
            candidate.entities.services.len(),
            penalties.generic_change
        ));
    }

    // Long-running changes are less specific, unless service + infra already
    // point firmly at this candidate.
    let strong_match = service.score + infra.score > STRONG_MATCH_THRESHOLD;
    if let (Some(start), Some(end)) = (candidate.times.planned_start, candidate.times.planned_end)
        && !strong_match
    {
        let duration_hours = (end - start).num_seconds() as f64 / 3600.0;
        if duration_hours > DURATION_QUARTER_HOURS {
            final_score *= penalties.long_duration_quarter;
            penalties_applied.push(format!(
                "long_duration ({}h > 3 months, x{})",
                duration_hours as i64, penalties.long_duration_quarter
            ));
        } else if duration_hours > DURATION_MONTH_HOURS {
            final_score *= penalties.long_duration_month;
            penalties_applied.push(format!(
                "long_duration ({}h > 1 month, x{})",
                duration_hours as i64, penalties.long_duration_month
            ));
        } else if duration_hours > DURATION_WEEK_HOURS {
            final_score *= penalties.long_duration_week;
            penalties_applied.push(format!(
                "long_duration ({}h > 1 week, x{})",
                duration_hours as i64, penalties.long_duration_week
            ));
        }
    }

    // Proximity of the planned start to the incident. Deliberately symmetric:
    // a change starting shortly after the impact earns the same bonus as one
    // starting shortly before.
    let mut bonuses_applied = Vec::new();
    let incident_anchor = incident
        .times
        .first_impact_time
        .or(incident.times.planned_start)
        .or(incident.times.created_at);
    if let (Some(anchor), Some(start)) = (incident_anchor, candidate.times.planned_start) {
        let diff_hours = (anchor - start).num_seconds().abs() as f64 / 3600.0;
        let bonus = if diff_hours <= 0.5 {
            Some(("proximity_exact", bonuses.proximity_exact))
        } else if diff_hours <= 1.0 {
            Some(("proximity_1h", bonuses.proximity_1h))
        } else if diff_hours <= 2.0 {
            Some(("proximity_2h", bonuses.proximity_2h))
        } else if diff_hours <= 4.0 {
            Some(("proximity_4h", bonuses.proximity_4h))
        } else {
            None
        };
        if let Some((name, multiplier)) = bonus {
            final_score *= multiplier;
            bonuses_applied.push(format!("{name} ({diff_hours:.1}h, x{multiplier})"));
        }
    }

    RankedCandidate {
        rank: 0,
        key: candidate.key.clone(),
        summary: candidate.summary.clone(),
        final_score: round1(final_score),
        time,
        service,
        infra,
        org,
        penalties_applied,
        bonuses_applied,
        ticket: candidate.clone(),
    }
}

/// Produce the full ranking: score every candidate, drop those below the
/// minimum, sort by score descending with key as the deterministic tie
/// breaker, and number ranks from 1.
pub fn rank_candidates(
    incident: &Ticket,
    candidates: &[Ticket],
    config: &ScoringConfig,
    scored_at: DateTime<Utc>,
) -> Ranking {
    let mut scored: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| score_candidate(incident, candidate, config))
        .filter(|c| c.final_score >= config.thresholds.min_score)
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    for (index, candidate) in scored.iter_mut().enumerate() {
        candidate.rank = index + 1;
    }

    Ranking {
        incident: IncidentSummary::from(incident),
        analysis: RankingAnalysis {
            candidates_analyzed: candidates.len(),
            candidates_ranked: scored.len(),
            scored_at,
            weights: config.weights.normalized(),
            thresholds: config.thresholds,
            penalties: config.penalties,
            bonuses: config.bonuses,
        },
        ranking: scored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scoring::Weights;
    use crate::models::ticket::{
        Classification, Entities, ExtractionMeta, LiveInterval, Organization, TicketKind,
        TicketTimes, EXTRACTION_VERSION,
    };

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn ticket(key: &str, kind: TicketKind) -> Ticket {
        Ticket {
            key: key.to_string(),
            kind,
            summary: format!("{key} summary"),
            times: TicketTimes::default(),
            entities: Entities::default(),
            organization: Organization::default(),
            classification: Classification::default(),
            extraction: ExtractionMeta {
                version: EXTRACTION_VERSION.to_string(),
                extracted_at: at("2025-07-22T15:00:00Z"),
                warnings: Vec::new(),
                timeline_entries: 0,
                comments: 0,
            },
        }
    }

    fn incident() -> Ticket {
        let mut t = ticket("INC-117346", TicketKind::Incident);
        t.times.created_at = Some(at("2025-07-22T12:30:00Z"));
        t.times.first_impact_time = Some(at("2025-07-22T12:20:00Z"));
        t
    }

    #[test]
    fn exact_live_interval_match_scenario() {
        let mut inc = incident();
        inc.entities.services = set(&["s3 object storage"]);
        inc.entities.hosts = set(&["s3-node-91"]);

        let mut cand = ticket("TECCM-42", TicketKind::Change);
        cand.times.live_intervals = vec![LiveInterval {
            start: at("2025-07-22T12:00:00Z"),
            end: at("2025-07-22T13:00:00Z"),
        }];
        cand.times.planned_start = Some(at("2025-07-22T11:30:00Z"));
        cand.entities.services = set(&["s3 object storage"]);
        cand.entities.hosts = set(&["s3-node-91"]);

        let config = ScoringConfig::default();
        let scored = score_candidate(&inc, &cand, &config);

        assert_eq!(scored.time.score, 100.0);
        assert_eq!(scored.service.score, 100.0);
        assert_eq!(scored.infra.score, 60.0);
        assert_eq!(scored.org.score, 0.0);
        // 0.35*100 + 0.30*100 + 0.20*60 = 77.0, then proximity_1h x1.3
        assert!(scored.bonuses_applied[0].starts_with("proximity_1h"));
        assert!(scored.penalties_applied.is_empty());
        assert_eq!(scored.final_score, 100.1);

        let ranking = rank_candidates(&inc, &[cand], &config, at("2025-07-22T15:00:00Z"));
        assert_eq!(ranking.ranking[0].rank, 1);
    }

    #[test]
    fn related_ecosystem_scenario() {
        let mut inc = incident();
        inc.entities.services = set(&["compute"]);

        let mut cand = ticket("TECCM-7", TicketKind::Change);
        cand.entities.services = set(&["network"]);
        // Far-away execution and unrelated host keep every other factor at
        // zero without tripping the emptiness penalties.
        cand.times.live_intervals = vec![LiveInterval {
            start: at("2025-07-20T01:00:00Z"),
            end: at("2025-07-20T02:00:00Z"),
        }];
        cand.entities.hosts = set(&["unrelated01"]);

        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert_eq!(scored.service.score, 25.0);
        assert!(scored.service.reason.contains("ionos-cloud"));
        assert_eq!(scored.time.score, 0.0);
        assert_eq!(scored.final_score, 7.5);
    }

    #[test]
    fn generic_change_penalty_scenario() {
        let services: Vec<String> = (0..11).map(|i| format!("service-{i:02}")).collect();
        let service_set: BTreeSet<String> = services.iter().cloned().collect();

        let mut inc = incident();
        inc.entities.services = service_set.clone();

        let mut cand = ticket("TECCM-9", TicketKind::Change);
        cand.entities.services = service_set;
        cand.times.live_intervals = vec![LiveInterval {
            start: at("2025-07-20T01:00:00Z"),
            end: at("2025-07-20T02:00:00Z"),
        }];
        cand.entities.hosts = set(&["unrelated01"]);

        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert_eq!(scored.service.score, 100.0);
        assert!(
            scored
                .penalties_applied
                .iter()
                .any(|p| p.starts_with("generic_change"))
        );
        // 0.30 * 100 = 30, halved by generic_change
        assert_eq!(scored.final_score, 15.0);
    }

    #[test]
    fn long_duration_exempt_on_strong_match() {
        let mut inc = incident();
        inc.entities.services = set(&["mail"]);
        inc.entities.hosts = set(&["mx01"]);
        inc.entities.technologies = set(&["postfix"]);

        let mut cand = ticket("TECCM-11", TicketKind::Change);
        cand.entities.services = set(&["mail", "dns"]);
        cand.entities.hosts = set(&["mx01"]);
        cand.entities.technologies = set(&["postfix"]);
        cand.times.planned_start = Some(at("2025-07-14T00:00:00Z"));
        cand.times.planned_end = Some(at("2025-07-22T08:00:00Z")); // 200h

        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert!(scored.service.score + scored.infra.score > 80.0);
        assert!(
            !scored
                .penalties_applied
                .iter()
                .any(|p| p.starts_with("long_duration"))
        );
    }

    #[test]
    fn long_duration_penalty_buckets() {
        let inc = incident();

        let mut cand = ticket("TECCM-12", TicketKind::Change);
        cand.times.planned_start = Some(at("2025-07-10T00:00:00Z"));
        cand.times.planned_end = Some(at("2025-07-18T08:00:00Z")); // 200h > week
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert!(
            scored
                .penalties_applied
                .iter()
                .any(|p| p.contains("1 week"))
        );

        cand.times.planned_start = Some(at("2025-05-01T00:00:00Z")); // > month
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert!(
            scored
                .penalties_applied
                .iter()
                .any(|p| p.contains("1 month"))
        );

        cand.times.planned_start = Some(at("2025-01-01T00:00:00Z")); // > quarter
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert!(
            scored
                .penalties_applied
                .iter()
                .any(|p| p.contains("3 months"))
        );
    }

    #[test]
    fn service_floor_and_identity() {
        let mut inc = incident();
        inc.entities.services = set(&["mail", "dns"]);

        let mut cand = ticket("TECCM-13", TicketKind::Change);
        cand.entities.services = set(&["mail", "webhosting", "compute"]);
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert!(scored.service.score >= 50.0);

        cand.entities.services = set(&["mail", "dns"]);
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert_eq!(scored.service.score, 100.0);
    }

    #[test]
    fn time_zero_when_impact_precedes_planned_change() {
        let mut inc = incident();
        inc.times.first_impact_time = Some(at("2025-07-22T08:00:00Z"));

        let mut cand = ticket("TECCM-14", TicketKind::Change);
        cand.times.planned_start = Some(at("2025-07-22T10:00:00Z"));
        cand.times.planned_end = Some(at("2025-07-22T12:00:00Z"));

        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert_eq!(scored.time.score, 0.0);
    }

    #[test]
    fn time_decays_after_planned_end() {
        let mut inc = incident();
        inc.times.first_impact_time = Some(at("2025-07-22T13:00:00Z"));

        let mut cand = ticket("TECCM-15", TicketKind::Change);
        cand.times.planned_start = Some(at("2025-07-22T10:00:00Z"));
        cand.times.planned_end = Some(at("2025-07-22T12:00:00Z"));

        // 60 min past the end with a 240-min decay: 80 * (1 - 0.5) = 40
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        assert_eq!(scored.time.score, 40.0);
    }

    #[test]
    fn weight_scaling_leaves_ranking_unchanged() {
        let mut inc = incident();
        inc.entities.services = set(&["mail"]);

        let mut a = ticket("TECCM-1", TicketKind::Change);
        a.entities.services = set(&["mail"]);
        let mut b = ticket("TECCM-2", TicketKind::Change);
        b.entities.services = set(&["dns"]);
        let candidates = vec![a, b];

        let base = ScoringConfig::default();
        let mut scaled = base.clone();
        scaled.weights = Weights {
            time: base.weights.time * 3.0,
            service: base.weights.service * 3.0,
            infra: base.weights.infra * 3.0,
            org: base.weights.org * 3.0,
        };

        let now = at("2025-07-22T15:00:00Z");
        let r1 = rank_candidates(&inc, &candidates, &base, now);
        let r2 = rank_candidates(&inc, &candidates, &scaled, now);

        let keys1: Vec<&str> = r1.ranking.iter().map(|c| c.key.as_str()).collect();
        let keys2: Vec<&str> = r2.ranking.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys1, keys2);
        for (c1, c2) in r1.ranking.iter().zip(r2.ranking.iter()) {
            assert_eq!(c1.final_score, c2.final_score);
        }
    }

    #[test]
    fn removing_a_candidate_preserves_relative_order() {
        let mut inc = incident();
        inc.entities.services = set(&["mail"]);

        let mut a = ticket("TECCM-1", TicketKind::Change);
        a.entities.services = set(&["mail"]);
        let mut b = ticket("TECCM-2", TicketKind::Change);
        b.entities.services = set(&["mail", "dns"]);
        let mut c = ticket("TECCM-3", TicketKind::Change);
        c.entities.services = set(&["dns"]);

        let config = ScoringConfig::default();
        let now = at("2025-07-22T15:00:00Z");

        let full = rank_candidates(&inc, &[a.clone(), b.clone(), c.clone()], &config, now);
        let reduced = rank_candidates(&inc, &[a, c], &config, now);

        let full_keys: Vec<&str> = full
            .ranking
            .iter()
            .map(|x| x.key.as_str())
            .filter(|k| *k != "TECCM-2")
            .collect();
        let reduced_keys: Vec<&str> = reduced.ranking.iter().map(|x| x.key.as_str()).collect();
        assert_eq!(full_keys, reduced_keys);
    }

    #[test]
    fn penalty_never_raises_and_bonus_never_lowers() {
        let mut inc = incident();
        inc.entities.services = set(&["mail"]);

        let mut cand = ticket("TECCM-20", TicketKind::Change);
        cand.entities.services = set(&["mail"]);
        cand.times.planned_start = Some(at("2025-07-22T12:00:00Z"));

        let config = ScoringConfig::default();
        let scored = score_candidate(&inc, &cand, &config);

        let mut no_penalties = config.clone();
        no_penalties.penalties.no_live_intervals = 1.0;
        no_penalties.penalties.no_hosts = 1.0;
        let unpenalized = score_candidate(&inc, &cand, &no_penalties);
        assert!(scored.final_score <= unpenalized.final_score);

        let mut no_bonus = config.clone();
        no_bonus.bonuses.proximity_exact = 1.0;
        no_bonus.bonuses.proximity_1h = 1.0;
        let unboosted = score_candidate(&inc, &cand, &no_bonus);
        assert!(scored.final_score >= unboosted.final_score);
    }

    #[test]
    fn ties_break_on_key_ascending() {
        let inc = incident();
        let a = ticket("TECCM-200", TicketKind::Change);
        let b = ticket("TECCM-100", TicketKind::Change);

        let ranking = rank_candidates(
            &inc,
            &[a, b],
            &ScoringConfig::default(),
            at("2025-07-22T15:00:00Z"),
        );
        assert_eq!(ranking.ranking[0].key, "TECCM-100");
        assert_eq!(ranking.ranking[1].key, "TECCM-200");
        assert_eq!(ranking.ranking[0].rank, 1);
        assert_eq!(ranking.ranking[1].rank, 2);
    }

    #[test]
    fn min_score_filters_candidates() {
        let mut inc = incident();
        inc.entities.services = set(&["mail"]);

        let mut strong = ticket("TECCM-1", TicketKind::Change);
        strong.entities.services = set(&["mail"]);
        let weak = ticket("TECCM-2", TicketKind::Change);

        let mut config = ScoringConfig::default();
        config.thresholds.min_score = 5.0;

        let ranking = rank_candidates(
            &inc,
            &[strong, weak],
            &config,
            at("2025-07-22T15:00:00Z"),
        );
        assert_eq!(ranking.analysis.candidates_analyzed, 2);
        assert_eq!(ranking.analysis.candidates_ranked, 1);
        assert_eq!(ranking.ranking[0].key, "TECCM-1");
    }

    #[test]
    fn org_score_components() {
        let mut inc = incident();
        inc.organization.team = Some("Storage SRE".to_string());
        inc.organization.people_involved = set(&["jdoe", "asmith", "bob", "carol"]);

        let mut cand = ticket("TECCM-30", TicketKind::Change);
        cand.organization.team = Some("storage sre".to_string());
        cand.organization.people_involved = set(&["jdoe", "asmith", "bob", "carol", "dave"]);

        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        // 50 for the team + min(50, 4 * 15) for people, clamped
        assert_eq!(scored.org.score, 100.0);

        cand.organization.team = Some("Storage SRE Platform".to_string());
        cand.organization.people_involved = set(&["jdoe"]);
        let scored = score_candidate(&inc, &cand, &ScoringConfig::default());
        // 25 related team + 15 one shared person
        assert_eq!(scored.org.score, 40.0);
    }
}
