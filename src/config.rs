use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `correlator.toml`, with env-var overrides
/// applied in `main`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the ticket tracker's REST API.
    #[serde(default = "default_tracker_url")]
    pub url: String,
    /// Request timeout in seconds for tracker calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Parallel fetch workers in the extraction pool.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_tracker_url() -> String {
    "https://hosting-jira.1and1.org".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: default_tracker_url(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Session lifetime before a new login is required.
    #[serde(default = "default_session_hours")]
    pub session_expire_hours: i64,
}

fn default_db_path() -> String {
    "./correlator.db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_hours() -> i64 {
    24
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: default_port(),
            session_expire_hours: default_session_hours(),
        }
    }
}

/// Installation-specific custom-field ids. The normalizer reads raw tickets
/// only through this map, so a different tracker installation is a config
/// change, not a code change.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMap {
    #[serde(default = "default_start_datetime")]
    pub start_datetime: String,
    #[serde(default = "default_end_datetime")]
    pub end_datetime: String,
    #[serde(default = "default_tech_escalation")]
    pub tech_escalation: String,
    #[serde(default = "default_permitted_users")]
    pub permitted_users: String,
    #[serde(default = "default_responsible_entity")]
    pub responsible_entity: String,
    #[serde(default = "default_cause")]
    pub cause: String,
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default = "default_customer_impact")]
    pub customer_impact: String,
    #[serde(default = "default_change_category")]
    pub change_category: String,
    #[serde(default = "default_environments")]
    pub environments: String,
    #[serde(default = "default_affected_business_units")]
    pub affected_business_units: String,
    #[serde(default = "default_causing_business_units")]
    pub causing_business_units: String,
    #[serde(default = "default_change_owner")]
    pub change_owner: String,
    #[serde(default = "default_incident_owner")]
    pub incident_owner: String,
}

fn default_start_datetime() -> String {
    "customfield_10303".to_string()
}

fn default_end_datetime() -> String {
    "customfield_10304".to_string()
}

fn default_tech_escalation() -> String {
    "customfield_12913".to_string()
}

fn default_permitted_users() -> String {
    "customfield_10800".to_string()
}

fn default_responsible_entity() -> String {
    "customfield_15000".to_string()
}

fn default_cause() -> String {
    "customfield_12915".to_string()
}

fn default_effect() -> String {
    "customfield_12918".to_string()
}

fn default_customer_impact() -> String {
    "customfield_12919".to_string()
}

fn default_change_category() -> String {
    "customfield_12990".to_string()
}

fn default_environments() -> String {
    "customfield_13028".to_string()
}

fn default_affected_business_units() -> String {
    "customfield_12921".to_string()
}

fn default_causing_business_units() -> String {
    "customfield_12922".to_string()
}

fn default_change_owner() -> String {
    "customfield_12984".to_string()
}

fn default_incident_owner() -> String {
    "customfield_12909".to_string()
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            start_datetime: default_start_datetime(),
            end_datetime: default_end_datetime(),
            tech_escalation: default_tech_escalation(),
            permitted_users: default_permitted_users(),
            responsible_entity: default_responsible_entity(),
            cause: default_cause(),
            effect: default_effect(),
            customer_impact: default_customer_impact(),
            change_category: default_change_category(),
            environments: default_environments(),
            affected_business_units: default_affected_business_units(),
            causing_business_units: default_causing_business_units(),
            change_owner: default_change_owner(),
            incident_owner: default_incident_owner(),
        }
    }
}

impl AppSettings {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let settings: AppSettings = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(settings)
    }
}
