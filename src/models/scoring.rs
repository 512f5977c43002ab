use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use super::ticket::Ticket;

/// Relative importance of the four correlation factors. Normalized so the
/// weights sum to 1 before use; scaling all four by the same constant leaves
/// the ranking unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_w_time")]
    pub time: f64,
    #[serde(default = "default_w_service")]
    pub service: f64,
    #[serde(default = "default_w_infra")]
    pub infra: f64,
    #[serde(default = "default_w_org")]
    pub org: f64,
}

fn default_w_time() -> f64 {
    0.35
}

fn default_w_service() -> f64 {
    0.30
}

fn default_w_infra() -> f64 {
    0.20
}

fn default_w_org() -> f64 {
    0.15
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            time: default_w_time(),
            service: default_w_service(),
            infra: default_w_infra(),
            org: default_w_org(),
        }
    }
}

impl Weights {
    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("time", self.time),
            ("service", self.service),
            ("infra", self.infra),
            ("org", self.org),
        ] {
            if !(0.0..=1.0).contains(&w) || !w.is_finite() {
                return Err(format!("weight '{name}' must be in [0, 1], got {w}"));
            }
        }
        if self.time + self.service + self.infra + self.org <= 0.0 {
            return Err("weights must not all be zero".to_string());
        }
        Ok(())
    }

    pub fn normalized(&self) -> Weights {
        let total = self.time + self.service + self.infra + self.org;
        Weights {
            time: self.time / total,
            service: self.service / total,
            infra: self.infra / total,
            org: self.org / total,
        }
    }

    /// Stable identifier for a weight set; rankings are stored per hash.
    pub fn hash(&self) -> String {
        let canonical = format!(
            "time={:.6},service={:.6},infra={:.6},org={:.6}",
            self.time, self.service, self.infra, self.org
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    /// Hours until a near-miss time score decays to zero. Range 1–48.
    #[serde(default = "default_decay_hours")]
    pub time_decay_hours: f64,
    /// Candidates scoring below this are omitted from the ranking.
    #[serde(default)]
    pub min_score: f64,
}

fn default_decay_hours() -> f64 {
    4.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            time_decay_hours: default_decay_hours(),
            min_score: 0.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !(1.0..=48.0).contains(&self.time_decay_hours) {
            return Err(format!(
                "time_decay_hours must be in [1, 48], got {}",
                self.time_decay_hours
            ));
        }
        if !(0.0..=100.0).contains(&self.min_score) {
            return Err(format!("min_score must be in [0, 100], got {}", self.min_score));
        }
        Ok(())
    }
}

/// Multiplicative score reductions, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Penalties {
    #[serde(default = "default_p_no_live_intervals")]
    pub no_live_intervals: f64,
    #[serde(default = "default_p_no_hosts")]
    pub no_hosts: f64,
    #[serde(default = "default_p_no_services")]
    pub no_services: f64,
    /// Change touching more than 10 services.
    #[serde(default = "default_p_generic_change")]
    pub generic_change: f64,
    #[serde(default = "default_p_week")]
    pub long_duration_week: f64,
    #[serde(default = "default_p_month")]
    pub long_duration_month: f64,
    #[serde(default = "default_p_quarter")]
    pub long_duration_quarter: f64,
}

fn default_p_no_live_intervals() -> f64 {
    0.8
}

fn default_p_no_hosts() -> f64 {
    0.95
}

fn default_p_no_services() -> f64 {
    0.90
}

fn default_p_generic_change() -> f64 {
    0.5
}

fn default_p_week() -> f64 {
    0.8
}

fn default_p_month() -> f64 {
    0.6
}

fn default_p_quarter() -> f64 {
    0.4
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            no_live_intervals: default_p_no_live_intervals(),
            no_hosts: default_p_no_hosts(),
            no_services: default_p_no_services(),
            generic_change: default_p_generic_change(),
            long_duration_week: default_p_week(),
            long_duration_month: default_p_month(),
            long_duration_quarter: default_p_quarter(),
        }
    }
}

impl Penalties {
    pub fn validate(&self) -> Result<(), String> {
        for (name, p) in [
            ("no_live_intervals", self.no_live_intervals),
            ("no_hosts", self.no_hosts),
            ("no_services", self.no_services),
            ("generic_change", self.generic_change),
            ("long_duration_week", self.long_duration_week),
            ("long_duration_month", self.long_duration_month),
            ("long_duration_quarter", self.long_duration_quarter),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("penalty '{name}' must be in [0, 1], got {p}"));
            }
        }
        Ok(())
    }
}

/// Multiplicative boosts for changes starting near the incident, each in [1, 3].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bonuses {
    /// Change start within 30 minutes of the incident.
    #[serde(default = "default_b_exact")]
    pub proximity_exact: f64,
    #[serde(default = "default_b_1h")]
    pub proximity_1h: f64,
    #[serde(default = "default_b_2h")]
    pub proximity_2h: f64,
    #[serde(default = "default_b_4h")]
    pub proximity_4h: f64,
}

fn default_b_exact() -> f64 {
    1.5
}

fn default_b_1h() -> f64 {
    1.3
}

fn default_b_2h() -> f64 {
    1.2
}

fn default_b_4h() -> f64 {
    1.1
}

impl Default for Bonuses {
    fn default() -> Self {
        Self {
            proximity_exact: default_b_exact(),
            proximity_1h: default_b_1h(),
            proximity_2h: default_b_2h(),
            proximity_4h: default_b_4h(),
        }
    }
}

impl Bonuses {
    pub fn validate(&self) -> Result<(), String> {
        for (name, b) in [
            ("proximity_exact", self.proximity_exact),
            ("proximity_1h", self.proximity_1h),
            ("proximity_2h", self.proximity_2h),
            ("proximity_4h", self.proximity_4h),
        ] {
            if !(1.0..=3.0).contains(&b) {
                return Err(format!("bonus '{name}' must be in [1, 3], got {b}"));
            }
        }
        Ok(())
    }
}

/// Everything the scorer needs, passed by value so a config reload never
/// mutates an in-flight job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub penalties: Penalties,
    #[serde(default)]
    pub bonuses: Bonuses,
    /// Canonical service name -> aliases. Consumed by the normalizer.
    #[serde(default = "default_synonyms")]
    pub service_synonyms: BTreeMap<String, Vec<String>>,
    /// Ecosystem name -> canonical services in it. Partial credit when the
    /// exact service intersection is empty.
    #[serde(default = "default_groups")]
    pub related_groups: BTreeMap<String, BTreeSet<String>>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            thresholds: Thresholds::default(),
            penalties: Penalties::default(),
            bonuses: Bonuses::default(),
            service_synonyms: default_synonyms(),
            related_groups: default_groups(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.weights.validate()?;
        self.thresholds.validate()?;
        self.penalties.validate()?;
        self.bonuses.validate()?;
        Ok(())
    }
}

pub fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("customer area", &["adc", "area de clientes", "customer system", "arsys customer panel"]),
        ("control panel", &["pdc", "panel de control", "control panels"]),
        ("s3 object storage", &["s3", "object storage", "ic-s3", "cloudian", "hyperstore"]),
        ("block storage", &["ic-block storage", "block storage"]),
        ("compute", &["ic-compute", "compute platform", "compute provisioning"]),
        ("network", &["ic-network", "network platform", "network provisioning"]),
        ("mail", &["email", "e-mail", "mail platform", "dovecot", "postfix"]),
        ("dns", &["domain", "dns platform"]),
        ("dedicated server", &["dedicated", "bare metal", "physical server"]),
        ("cloud server", &["ngcs", "vps", "v-server", "cloud nx"]),
        ("webhosting", &["shared hosting", "sharedhosting", "web hosting"]),
        ("kubernetes", &["k8s", "container registry", "ic-kubernetes", "keycloak"]),
    ];
    table
        .iter()
        .map(|(canonical, aliases)| {
            (
                canonical.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

pub fn default_groups() -> BTreeMap<String, BTreeSet<String>> {
    let table: &[(&str, &[&str])] = &[
        (
            "ionos-cloud",
            &[
                "ic-cis", "ic-sre", "ic-oss", "ic-pss", "ic-bss", "ic-ess",
                "cloud api", "dcd", "dcd api", "compute", "network", "block storage",
                "s3 object storage", "kubernetes", "sre", "iam", "keycloak",
                "iaas provisioning", "storage provisioning", "compute provisioning",
                "network provisioning", "compute platform", "network platform",
                "storage platform", "ic-s3 object storage",
            ],
        ),
        (
            "arsys",
            &[
                "customer area", "control panel", "mail", "dns", "webhosting",
                "dedicated server", "cloud server", "ar-cis", "ar-pss", "ar-oss",
            ],
        ),
        (
            "strato",
            &["strato-mail", "strato-webmail", "strato-server", "str-cis", "str-pss"],
        ),
    ];
    table
        .iter()
        .map(|(group, services)| {
            (
                group.to_string(),
                services.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

/// One factor's contribution, with the concrete evidence behind it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubScore {
    pub score: f64,
    pub reason: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub key: String,
    pub summary: String,
    pub final_score: f64,
    pub time: SubScore,
    pub service: SubScore,
    pub infra: SubScore,
    pub org: SubScore,
    #[serde(default)]
    pub penalties_applied: Vec<String>,
    #[serde(default)]
    pub bonuses_applied: Vec<String>,
    pub ticket: Ticket,
}

/// Condensed incident header repeated at the top of every ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub key: String,
    pub summary: String,
    pub first_impact_time: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub services: BTreeSet<String>,
    pub hosts: BTreeSet<String>,
    pub technologies: BTreeSet<String>,
}

impl From<&Ticket> for IncidentSummary {
    fn from(t: &Ticket) -> Self {
        Self {
            key: t.key.clone(),
            summary: t.summary.clone(),
            first_impact_time: t.times.first_impact_time,
            created_at: t.times.created_at,
            services: t.entities.services.clone(),
            hosts: t.entities.hosts.clone(),
            technologies: t.entities.technologies.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingAnalysis {
    pub candidates_analyzed: usize,
    pub candidates_ranked: usize,
    pub scored_at: chrono::DateTime<chrono::Utc>,
    pub weights: Weights,
    pub thresholds: Thresholds,
    pub penalties: Penalties,
    pub bonuses: Bonuses,
}

/// The scorer's output: recomputable from stored tickets + config with no
/// tracker I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub incident: IncidentSummary,
    pub analysis: RankingAnalysis,
    pub ranking: Vec<RankedCandidate>,
}
