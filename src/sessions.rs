use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// A logged-in user's tracker credentials, held only in memory and replayed
/// on every tracker request made on their behalf.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory token store. Tokens are opaque UUIDs; expired entries are
/// dropped lazily on lookup.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    expire_hours: i64,
}

impl SessionStore {
    pub fn new(expire_hours: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            expire_hours,
        }
    }

    pub fn create(&self, username: &str, password: &str, display_name: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
        };
        self.sessions.lock().unwrap().insert(token.clone(), session);
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get(token)?;
        if Utc::now() - session.created_at > Duration::hours(self.expire_hours) {
            sessions.remove(token);
            return None;
        }
        Some(session.clone())
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().remove(token).is_some()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}
