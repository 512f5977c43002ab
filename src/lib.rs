pub mod config;
pub mod config_db;
pub mod discovery;
pub mod extract;
pub mod fetch_pool;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod scorer;
pub mod sessions;
pub mod tracker;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use config::AppSettings;
use config_db::ConfigDb;
use jobs::JobRegistry;
use sessions::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub db: Arc<ConfigDb>,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<JobRegistry>,
}
