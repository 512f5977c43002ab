//! Scriptable in-memory tracker for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::ticket::{RawComment, RawIssue};
use crate::tracker::{Tracker, TrackerError};

/// Mock tracker: issues and comments are looked up from fixed maps, errors
/// can be queued per key (consumed before the canned success), and search
/// responses are consumed in call order.
#[derive(Default)]
pub struct MockTracker {
    issues: HashMap<String, RawIssue>,
    comments: HashMap<String, Vec<RawComment>>,
    error_plan: Mutex<HashMap<String, VecDeque<TrackerError>>>,
    search_plan: Mutex<VecDeque<Result<Vec<String>, TrackerError>>>,
    pub issue_calls: Mutex<HashMap<String, usize>>,
    pub search_queries: Mutex<Vec<String>>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(mut self, key: &str, fields: serde_json::Value) -> Self {
        let raw: RawIssue =
            serde_json::from_value(serde_json::json!({ "key": key, "fields": fields })).unwrap();
        self.issues.insert(key.to_string(), raw);
        self
    }

    pub fn with_comments(mut self, key: &str, comments: Vec<RawComment>) -> Self {
        self.comments.insert(key.to_string(), comments);
        self
    }

    /// Queue errors returned by `issue(key)` before the canned success.
    pub fn with_issue_errors(self, key: &str, errors: Vec<TrackerError>) -> Self {
        self.error_plan
            .lock()
            .unwrap()
            .insert(key.to_string(), errors.into());
        self
    }

    /// Queue the next `search` responses, consumed in call order.
    pub fn with_search_results(self, results: Vec<Result<Vec<String>, TrackerError>>) -> Self {
        *self.search_plan.lock().unwrap() = results.into();
        self
    }

    pub fn issue_call_count(&self, key: &str) -> usize {
        self.issue_calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_issue_calls(&self) -> usize {
        self.issue_calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Tracker for MockTracker {
    async fn issue(&self, key: &str) -> Result<RawIssue, TrackerError> {
        *self
            .issue_calls
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;

        if let Some(queue) = self.error_plan.lock().unwrap().get_mut(key)
            && let Some(error) = queue.pop_front()
        {
            return Err(error);
        }

        self.issues
            .get(key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }

    async fn comments(&self, key: &str) -> Result<Vec<RawComment>, TrackerError> {
        Ok(self.comments.get(key).cloned().unwrap_or_default())
    }

    async fn search(&self, filter: &str, _max_results: u32) -> Result<Vec<String>, TrackerError> {
        self.search_queries.lock().unwrap().push(filter.to_string());
        self.search_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn myself(&self) -> Result<String, TrackerError> {
        Ok("Mock User".to_string())
    }
}
