//! In-memory [`ProxmoxApi`] with canned responses
//!
//! Every request is recorded. Responses are registered per method and path;
//! several responses for the same route are returned in order and the last
//! one repeats. Unregistered GETs fail with a 404, unregistered writes
//! succeed with `null`.

use super::{normalize_path, ApiMethod, Params, ProxmoxApi, ProxmoxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// A request seen by the fake
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: ApiMethod,
    pub path: String,
    pub params: Params,
}

type Route = (ApiMethod, String);

/// Scriptable Proxmox API stand-in
#[derive(Default)]
pub struct FakeApi {
    routes: Mutex<HashMap<Route, VecDeque<Result<Value, ProxmoxError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a route
    pub fn respond(&self, method: ApiMethod, path: &str, response: Result<Value, ProxmoxError>) {
        self.routes
            .lock()
            .entry((method, canonical(path)))
            .or_default()
            .push_back(response);
    }

    pub fn on_get(&self, path: &str, data: Value) {
        self.respond(ApiMethod::Get, path, Ok(data));
    }

    pub fn on_post(&self, path: &str, data: Value) {
        self.respond(ApiMethod::Post, path, Ok(data));
    }

    pub fn on_put(&self, path: &str, data: Value) {
        self.respond(ApiMethod::Put, path, Ok(data));
    }

    pub fn on_delete(&self, path: &str, data: Value) {
        self.respond(ApiMethod::Delete, path, Ok(data));
    }

    /// Make a route fail
    pub fn fail(&self, method: ApiMethod, path: &str, error: ProxmoxError) {
        self.respond(method, path, Err(error));
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Recorded POST/PUT/DELETE calls
    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method != ApiMethod::Get)
            .cloned()
            .collect()
    }

    /// Recorded calls for one method and path
    pub fn calls_to(&self, method: ApiMethod, path: &str) -> Vec<RecordedCall> {
        let path = canonical(path);
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .cloned()
            .collect()
    }

    fn answer(&self, method: ApiMethod, path: String, params: Params) -> Result<Value, ProxmoxError> {
        self.calls.lock().push(RecordedCall {
            method,
            path: path.clone(),
            params,
        });

        let mut routes = self.routes.lock();
        match routes.get_mut(&(method, path.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(Value::Null)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(Value::Null)),
            None if method == ApiMethod::Get => Err(ProxmoxError::Api {
                status: 404,
                message: format!("no such path: {}", path),
            }),
            None => Ok(Value::Null),
        }
    }
}

fn canonical(path: &str) -> String {
    normalize_path(path)
        .map(|segments| segments.join("/"))
        .unwrap_or_else(|_| path.to_string())
}

#[async_trait]
impl ProxmoxApi for FakeApi {
    async fn request(
        &self,
        method: ApiMethod,
        path: &str,
        params: Params,
    ) -> Result<Value, ProxmoxError> {
        let segments = normalize_path(path)?;
        self.answer(method, segments.join("/"), params)
    }

    async fn upload(
        &self,
        path: &str,
        mut fields: Params,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<Value, ProxmoxError> {
        let segments = normalize_path(path)?;
        fields.insert("filename".to_string(), Value::String(file_name.to_string()));
        fields.insert("size".to_string(), Value::from(content.len()));
        self.answer(ApiMethod::Post, segments.join("/"), fields)
    }
}
