#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use notes_server::{
    app,
    config::{Config, Mode, RateLimitConfig},
    database::{NoteStore, StoreError},
    note::{Note, NoteDraft},
    rate_limit::{LimiterError, RateLimit, RateLimitOutcome},
    state::State,
};
use serde_json::Value;
use tower::ServiceExt;

pub fn test_config(mode: Mode) -> Config {
    Config {
        port: 0,
        mongo_uri: "mongodb://unused".to_string(),
        mongo_db: "notes_test".to_string(),
        rate_limit: RateLimitConfig {
            redis_url: None,
            max_requests: 100,
            window: Duration::from_secs(60),
            prefix: "test".to_string(),
        },
        trust_proxy: false,
        mode,
        cors_origin: "http://localhost:5173".to_string(),
        frontend_dist: PathBuf::from("missing-dist"),
    }
}

pub fn test_app(notes: Arc<dyn NoteStore>, limiter: Option<Arc<dyn RateLimit>>) -> Router {
    app(State::from_parts(test_config(Mode::Development), notes, limiter))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    send_from(app, method, uri, body, "127.0.0.1:40000").await
}

pub async fn send_from(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    peer: &str,
) -> Reply {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    send_request(app, request, peer).await
}

pub async fn send_request(app: &Router, mut request: Request<Body>, peer: &str) -> Reply {
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Reply {
        status,
        headers,
        body,
    }
}

/// Keeps notes in insertion order and mirrors the id rules of the Mongo store.
#[derive(Default)]
pub struct MemoryNoteStore {
    notes: Mutex<Vec<Note>>,
    next_id: AtomicU64,
    pub writes: AtomicUsize,
}

impl MemoryNoteStore {
    pub fn len(&self) -> usize {
        self.notes.lock().unwrap().len()
    }

    fn check_id(id: &str) -> Result<(), StoreError> {
        if id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(())
        } else {
            Err(StoreError::InvalidId(id.to_string()))
        }
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn list(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.notes.lock().unwrap().iter().rev().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError> {
        Self::check_id(id)?;
        Ok(self.notes.lock().unwrap().iter().find(|n| n.id == id).cloned())
    }

    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let note = Note {
            id: format!("{:024x}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            title: draft.title().to_string(),
            content: draft.content().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn update(&self, id: &str, draft: NoteDraft) -> Result<Option<Note>, StoreError> {
        Self::check_id(id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut notes = self.notes.lock().unwrap();
        Ok(notes.iter_mut().find(|n| n.id == id).map(|note| {
            note.title = draft.title().to_string();
            note.content = draft.content().to_string();
            note.updated_at = Utc::now();
            note.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<Option<Note>, StoreError> {
        Self::check_id(id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut notes = self.notes.lock().unwrap();
        let position = notes.iter().position(|n| n.id == id);
        Ok(position.map(|index| notes.remove(index)))
    }
}

/// Every call fails, as if the database went away after startup.
pub struct FailingNoteStore;

#[async_trait]
impl NoteStore for FailingNoteStore {
    async fn list(&self) -> Result<Vec<Note>, StoreError> {
        Err(StoreError::Backend("connection closed".to_string()))
    }

    async fn get(&self, _id: &str) -> Result<Option<Note>, StoreError> {
        Err(StoreError::Backend("connection closed".to_string()))
    }

    async fn create(&self, _draft: NoteDraft) -> Result<Note, StoreError> {
        Err(StoreError::Backend("connection closed".to_string()))
    }

    async fn update(&self, _id: &str, _draft: NoteDraft) -> Result<Option<Note>, StoreError> {
        Err(StoreError::Backend("connection closed".to_string()))
    }

    async fn delete(&self, _id: &str) -> Result<Option<Note>, StoreError> {
        Err(StoreError::Backend("connection closed".to_string()))
    }
}

/// Fixed window counter that never expires during a test.
pub struct MemoryRateLimiter {
    max_requests: u32,
    hits: Mutex<HashMap<String, u32>>,
}

pub const TEST_RESET: i64 = 1_700_000_060_000;

impl MemoryRateLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self {
            max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimit for MemoryRateLimiter {
    async fn limit(&self, identifier: &str) -> Result<RateLimitOutcome, LimiterError> {
        let mut hits = self.hits.lock().unwrap();
        let count = hits.entry(identifier.to_string()).or_insert(0);
        *count += 1;

        Ok(RateLimitOutcome {
            success: *count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(*count),
            reset: TEST_RESET,
        })
    }
}

pub struct FailingRateLimiter;

#[async_trait]
impl RateLimit for FailingRateLimiter {
    async fn limit(&self, _identifier: &str) -> Result<RateLimitOutcome, LimiterError> {
        Err(LimiterError::MalformedReply("empty reply".to_string()))
    }
}
