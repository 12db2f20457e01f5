//! RemoteStore trait abstraction for the draft's backing store.
//!
//! The remote store is an opaque collaborator with exactly two operations:
//! persist a save payload and fetch a draft by id. Failure is an `Err`, never
//! a sentinel value. `InMemoryRemote` implements the trait for tests with
//! programmable failures, latency, and call recording.

use async_trait::async_trait;
use draft_core::document::DraftDocument;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Acknowledgement returned by a successful remote save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAck {
    pub token_id: String,
    /// Server-side persistence time in milliseconds since epoch.
    pub saved_at: u64,
}

/// Wire payload for a remote save, built from a draft plus the client's
/// version bookkeeping for conflict detection on the server side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    pub token_id: String,
    pub input_text: String,
    pub validated_fields: Map<String, Value>,
    pub features: Vec<Value>,
    pub hidden_inferred_fields: Map<String, Value>,
    pub confirmed_fields: Map<String, Value>,
    pub title: String,
    pub include_page_data: bool,
    pub local_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<u64>,
    /// Set when the serialized payload exceeds the compression threshold.
    pub compressed: bool,
}

impl SavePayload {
    pub fn from_draft(draft: &DraftDocument, local_version: u64, last_saved: Option<u64>) -> Self {
        let onboarding = draft.onboarding.clone().unwrap_or_default();
        Self {
            token_id: draft.token_id.clone(),
            input_text: draft.input_text.clone().unwrap_or_default(),
            validated_fields: onboarding.validated_fields,
            features: onboarding.features,
            hidden_inferred_fields: onboarding.hidden_inferred_fields,
            confirmed_fields: onboarding.confirmed_fields,
            title: draft.title_or_default().to_string(),
            include_page_data: true,
            local_version,
            last_saved,
            compressed: false,
        }
    }

    /// Serialized size in bytes, for the compression decision.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// The draft's backing store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persist a payload. Returns the server's acknowledgement.
    async fn save(&self, payload: &SavePayload) -> Result<SaveAck>;

    /// Fetch the full draft by id, including its server-side
    /// last-modified timestamp.
    async fn load(&self, token_id: &str) -> Result<DraftDocument>;
}

// Allow sharing one remote between the manager and test assertions.
#[async_trait]
impl<T: RemoteStore + Send + Sync> RemoteStore for std::sync::Arc<T> {
    async fn save(&self, payload: &SavePayload) -> Result<SaveAck> {
        (**self).save(payload).await
    }

    async fn load(&self, token_id: &str) -> Result<DraftDocument> {
        (**self).load(token_id).await
    }
}

/// In-memory remote store for tests.
///
/// Supports programmable save failures (`fail_next_saves`, `fail_all_saves`),
/// artificial latency, and records every accepted payload with its arrival
/// instant so tests can assert ordering and backoff timing.
#[derive(Default)]
pub struct InMemoryRemote {
    documents: RwLock<std::collections::HashMap<String, DraftDocument>>,
    saves: RwLock<Vec<(SavePayload, Instant)>>,
    attempts: RwLock<Vec<Instant>>,
    loads: AtomicU32,
    fail_remaining: AtomicU32,
    fail_all: AtomicBool,
    save_delay: RwLock<Option<Duration>>,
    active_saves: AtomicUsize,
    max_active_saves: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a server-side draft.
    pub fn insert_document(&self, draft: DraftDocument) {
        self.documents
            .write()
            .expect("documents lock poisoned")
            .insert(draft.token_id.clone(), draft);
    }

    /// Fail the next `n` save calls with an HTTP 500.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail every save call until turned off.
    pub fn fail_all_saves(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Hold each save for `delay` before acknowledging.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        *self.save_delay.write().expect("delay lock poisoned") = delay;
    }

    /// Accepted payloads in arrival order.
    pub fn recorded_saves(&self) -> Vec<SavePayload> {
        self.saves
            .read()
            .expect("saves lock poisoned")
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Arrival instants of every save attempt, accepted or rejected.
    pub fn attempt_instants(&self) -> Vec<Instant> {
        self.attempts.read().expect("attempts lock poisoned").clone()
    }

    /// Save attempts seen, including rejected ones.
    pub fn attempt_count(&self) -> usize {
        self.attempts.read().expect("attempts lock poisoned").len()
    }

    /// Accepted saves only.
    pub fn save_count(&self) -> usize {
        self.saves.read().expect("saves lock poisoned").len()
    }

    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Highest number of save calls ever in flight at once.
    pub fn max_concurrent_saves(&self) -> usize {
        self.max_active_saves.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.fail_all.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn now_ms() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn save(&self, payload: &SavePayload) -> Result<SaveAck> {
        let active = self.active_saves.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_saves.fetch_max(active, Ordering::SeqCst);

        let arrived = Instant::now();
        self.attempts
            .write()
            .expect("attempts lock poisoned")
            .push(arrived);
        let delay = *self.save_delay.read().expect("delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.should_fail() {
            Err(RemoteError::Http {
                status: 500,
                message: "injected save failure".to_string(),
            })
        } else {
            self.saves
                .write()
                .expect("saves lock poisoned")
                .push((payload.clone(), arrived));
            Ok(SaveAck {
                token_id: payload.token_id.clone(),
                saved_at: Self::now_ms(),
            })
        };

        self.active_saves.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn load(&self, token_id: &str) -> Result<DraftDocument> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.documents
            .read()
            .expect("documents lock poisoned")
            .get(token_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(token_id.to_string()))
    }
}
