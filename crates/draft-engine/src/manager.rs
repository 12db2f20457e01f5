//! Persistence manager: owns the save/load lifecycle for one draft session.
//!
//! The manager decides *when* writes happen (debounce, background sweep,
//! immediate), guards the single write slot, reconciles against a remote copy
//! that may have diverged, and recovers from failures with bounded retries.
//! It composes the load cache, the save queue, and the version store.
//!
//! Concurrency model: overlapping async operations on the tokio runtime.
//! `in_flight` is the sole write-path guard — it is checked and set under the
//! state lock, and the lock is never held across an await. Arrivals while a
//! write is in flight are parked on the save queue and drained one at a time.
//!
//! Construct one manager per open draft and inject it where needed; there is
//! no global instance. `destroy()` must be called once to tear down timers.

use crate::cache::LoadCache;
use crate::config::PersistenceConfig;
use crate::debounce::Debouncer;
use crate::events::{EventBus, PersistenceEvent, Subscription};
use crate::metrics::PersistenceMetrics;
use crate::queue::{SaveOperation, SaveQueue, SaveTrigger, FORCE_PRIORITY};
use crate::remote::{RemoteStore, SavePayload};
use crate::result::{LoadError, LoadOutcome, LoadResult, SaveError, SaveReceipt, SaveResult};
use crate::retry::RetryPolicy;
use draft_core::conflict::{ConflictRecord, ResolutionStrategy};
use draft_core::document::DraftDocument;
use draft_core::validate::{DraftValidator, StructuralValidator};
use draft_core::version::{self, HistorySummary, SnapshotOrigin, VersionSnapshot, VersionStore};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Read-only view of the persistence state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub is_dirty: bool,
    pub is_saving: bool,
    pub is_loading: bool,
    /// Milliseconds since epoch.
    pub last_saved: Option<u64>,
    pub last_loaded: Option<u64>,
    pub save_error: Option<String>,
    pub load_error: Option<String>,
    /// Failures of the current logical save.
    pub retry_count: u32,
    pub local_version: u64,
    pub queued_saves: usize,
    pub cached_loads: usize,
    /// Whether a conflict-detection baseline has been loaded.
    pub has_server_baseline: bool,
}

/// Mutable state owned by the manager. Mutated only through manager methods,
/// with the lock never held across a suspension point.
struct Inner {
    dirty: bool,
    in_flight: bool,
    loading: bool,
    last_saved: Option<u64>,
    last_loaded: Option<u64>,
    save_error: Option<String>,
    load_error: Option<String>,
    retry_count: u32,
    local_version: u64,
    /// Last server-observed draft; baseline for conflict detection.
    server_version: Option<DraftDocument>,
    /// Server last-modified time folded in by conflict resolution, so an
    /// accepted resolution does not immediately re-flag the same divergence.
    reconciled_at: Option<u64>,
    /// Most recently submitted draft; what the background sweep persists.
    latest: Option<DraftDocument>,
    queue: SaveQueue,
    cache: LoadCache,
    versions: VersionStore,
    metrics: PersistenceMetrics,
    debounce: Debouncer,
    debounce_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    background_task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl Inner {
    fn new(config: &PersistenceConfig) -> Self {
        Self {
            dirty: false,
            in_flight: false,
            loading: false,
            last_saved: None,
            last_loaded: None,
            save_error: None,
            load_error: None,
            retry_count: 0,
            local_version: 1,
            server_version: None,
            reconciled_at: None,
            latest: None,
            queue: SaveQueue::new(),
            cache: LoadCache::new(),
            versions: VersionStore::new(config.version.clone()),
            metrics: PersistenceMetrics::default(),
            debounce: Debouncer::new(),
            debounce_task: None,
            retry_task: None,
            background_task: None,
            destroyed: false,
        }
    }
}

/// The persistence orchestrator. Cheap to clone; all clones share state.
pub struct PersistenceManager<R> {
    config: Arc<PersistenceConfig>,
    remote: Arc<R>,
    validator: Arc<dyn DraftValidator>,
    events: Arc<EventBus>,
    retry_policy: RetryPolicy,
    inner: Arc<Mutex<Inner>>,
}

impl<R> Clone for PersistenceManager<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            remote: Arc::clone(&self.remote),
            validator: Arc::clone(&self.validator),
            events: Arc::clone(&self.events),
            retry_policy: self.retry_policy,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteStore + 'static> PersistenceManager<R> {
    /// Create a manager with the default structural validator.
    ///
    /// Must be called inside a tokio runtime: the background save timer is
    /// spawned here.
    pub fn new(config: PersistenceConfig, remote: R) -> Self {
        Self::with_validator(config, remote, StructuralValidator)
    }

    pub fn with_validator(
        config: PersistenceConfig,
        remote: R,
        validator: impl DraftValidator + 'static,
    ) -> Self {
        let retry_policy = RetryPolicy::new(config.max_retries, config.retry_delay);
        let inner = Inner::new(&config);
        let manager = Self {
            config: Arc::new(config),
            remote: Arc::new(remote),
            validator: Arc::new(validator),
            events: Arc::new(EventBus::new()),
            retry_policy,
            inner: Arc::new(Mutex::new(inner)),
        };

        let period = manager.config.background_interval;
        let background = manager.clone();
        let task = tokio::spawn(async move {
            // First tick after one full period; the timer is a safety net,
            // not a startup save.
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                background.background_tick().await;
            }
        });
        manager.lock_inner().background_task = Some(task);

        manager
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("persistence state mutex poisoned")
    }

    // ==================== public save methods ====================

    /// Explicit user save: cancels any pending debounced save, takes a named
    /// snapshot, then saves immediately at manual priority. If a write is in
    /// flight the save is queued and this call resolves with its eventual
    /// outcome.
    pub async fn save_manual(
        &self,
        draft: DraftDocument,
        description: Option<&str>,
    ) -> SaveResult {
        debug!(description, "manual save requested");
        if self.lock_inner().destroyed {
            return Err(SaveError::ShuttingDown);
        }
        self.cancel_debounce();
        self.snapshot(&draft, description.unwrap_or("Manual save"), SnapshotOrigin::User);
        self.lock_inner().latest = Some(draft.clone());
        self.perform_save(draft, SaveTrigger::Manual, SaveTrigger::Manual.priority())
            .await
    }

    /// Fire-and-forget save on edit activity. Calls within the debounce
    /// window collapse into one save carrying the latest draft; calls while
    /// a write is in flight are queued instead.
    pub fn save_auto(&self, draft: DraftDocument) {
        let generation = {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                warn!("save_auto ignored after destroy");
                return;
            }
            inner.latest = Some(draft.clone());
            if inner.in_flight {
                debug!("save in flight, queueing auto-save");
                let operation = SaveOperation::new(
                    SaveTrigger::Auto,
                    draft,
                    SaveTrigger::Auto.priority(),
                    crate::now_ms(),
                    None,
                );
                inner.queue.enqueue(operation);
                return;
            }
            inner.dirty = true;
            if let Some(task) = inner.debounce_task.take() {
                task.abort();
            }
            inner.debounce.schedule(
                draft,
                self.config.debounce_delay.as_millis() as u64,
                crate::now_ms(),
            )
        };

        let delay = self.config.debounce_delay;
        let manager = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.debounce_fire(generation).await;
        });
        self.lock_inner().debounce_task = Some(task);
    }

    /// Save-before-navigating-away: cancels the debounce and any scheduled
    /// retry, drops every queued save, snapshots, and saves at the highest
    /// priority. A physically in-flight write still completes first — the
    /// at-most-one-in-flight invariant outranks the bypass — after which the
    /// forced save runs alone.
    pub async fn force_save(
        &self,
        draft: DraftDocument,
        description: Option<&str>,
    ) -> SaveResult {
        debug!(description, "force save requested");
        {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                return Err(SaveError::ShuttingDown);
            }
            if let Some(task) = inner.debounce_task.take() {
                task.abort();
            }
            inner.debounce.cancel();
            // A scheduled retry belongs to a superseded logical save.
            if let Some(task) = inner.retry_task.take() {
                task.abort();
                inner.in_flight = false;
                inner.retry_count = 0;
            }
            inner.queue.clear();
            inner.latest = Some(draft.clone());
        }
        self.snapshot(&draft, description.unwrap_or("Force save"), SnapshotOrigin::User);
        self.perform_save(draft, SaveTrigger::Manual, FORCE_PRIORITY).await
    }

    /// Periodic safety net against lost edits: saves the latest submitted
    /// draft, but only if it is dirty and no write is in flight.
    async fn background_tick(&self) {
        let draft = {
            let inner = self.lock_inner();
            if inner.destroyed || !inner.dirty || inner.in_flight {
                return;
            }
            match &inner.latest {
                Some(draft) => draft.clone(),
                None => return,
            }
        };
        debug!("background save sweeping dirty draft");
        let _ = self
            .perform_save(draft, SaveTrigger::Background, SaveTrigger::Background.priority())
            .await;
    }

    // ==================== core save implementation ====================

    /// Acquire the write slot or park on the queue, then run the save.
    async fn perform_save(
        &self,
        draft: DraftDocument,
        trigger: SaveTrigger,
        priority: u8,
    ) -> SaveResult {
        enum Slot {
            Run(DraftDocument),
            Queued(oneshot::Receiver<SaveResult>),
            Shutdown,
        }

        let slot = {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                Slot::Shutdown
            } else if inner.in_flight {
                let (tx, rx) = oneshot::channel();
                let operation =
                    SaveOperation::new(trigger, draft, priority, crate::now_ms(), Some(tx));
                inner.queue.enqueue(operation);
                Slot::Queued(rx)
            } else {
                inner.in_flight = true;
                inner.retry_count = 0;
                Slot::Run(draft)
            }
        };

        match slot {
            Slot::Shutdown => Err(SaveError::ShuttingDown),
            // The queue was cleared (force save or destroy) if the sender
            // is gone.
            Slot::Queued(rx) => rx.await.unwrap_or(Err(SaveError::Cancelled)),
            Slot::Run(draft) => self.run_attempt(draft, trigger).await,
        }
    }

    /// One save attempt holding the write slot. Failures schedule a retry
    /// while the policy allows; the logical save spans its retries.
    // Returns an explicitly-boxed future rather than an `async fn` so the
    // retry cycle (run_attempt spawns a task that awaits retry_fire, which
    // awaits run_attempt) does not form an infinitely-sized opaque future
    // type. Purely a representation change; behavior is unchanged.
    fn run_attempt<'a>(
        &'a self,
        draft: DraftDocument,
        trigger: SaveTrigger,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = SaveResult> + Send + 'a>> {
        Box::pin(async move {
        let attempt_started = Instant::now();
        {
            let mut inner = self.lock_inner();
            inner.save_error = None;
            inner.metrics.total_saves += 1;
        }
        self.events
            .emit(PersistenceEvent::save_started(trigger, crate::now_ms()));
        debug!(trigger = trigger.as_str(), "save started");

        // Validation gates the write before any network call. Not retried.
        let validation = self.validator.validate_save(&draft);
        if !validation.is_valid {
            warn!(errors = ?validation.errors, "save rejected by validation");
            let error = SaveError::Validation {
                errors: validation.errors,
            };
            self.finish_failed_terminal(&error, trigger);
            return Err(error);
        }

        // With a baseline loaded, ask the server whether it moved on.
        if self.config.enable_conflict_detection {
            let has_baseline = self.lock_inner().server_version.is_some();
            if has_baseline {
                if let Some(error) = self.check_conflict(&draft).await {
                    self.drain_queue();
                    return Err(error);
                }
            }
        }

        // Wire payload; oversized payloads are marked for compression.
        let (local_version, last_saved) = {
            let inner = self.lock_inner();
            (inner.local_version, inner.last_saved)
        };
        let mut payload = SavePayload::from_draft(&draft, local_version, last_saved);
        let size = payload.serialized_size();
        if size > self.config.compression_threshold {
            debug!(size, "marking save payload for compression");
            payload.compressed = true;
        }

        match self.remote.save(&payload).await {
            Ok(_ack) => {
                let duration_ms = attempt_started.elapsed().as_millis() as u64;
                let completed_at = crate::now_ms();

                let (version, successful_saves) = {
                    let mut inner = self.lock_inner();
                    inner.in_flight = false;
                    inner.dirty = false;
                    inner.last_saved = Some(completed_at);
                    inner.retry_count = 0;
                    inner.local_version += 1;
                    inner.metrics.record_success(duration_ms);
                    (inner.local_version, inner.metrics.successful_saves)
                };

                self.maybe_auto_snapshot(&draft, successful_saves, completed_at);
                self.drain_queue();

                self.events.emit(PersistenceEvent::SaveCompleted {
                    trigger: trigger.as_str(),
                    version,
                    duration_ms,
                    compressed: payload.compressed,
                    timestamp: completed_at,
                });
                info!(
                    trigger = trigger.as_str(),
                    version, duration_ms, "save successful"
                );

                Ok(SaveReceipt {
                    timestamp: completed_at,
                    version,
                    duration_ms,
                    compressed: payload.compressed,
                    trigger,
                })
            }
            Err(remote_error) => {
                let message = remote_error.to_string();
                let failures = {
                    let mut inner = self.lock_inner();
                    inner.save_error = Some(message.clone());
                    inner.retry_count += 1;
                    inner.metrics.failed_saves += 1;
                    inner.retry_count
                };

                if self.retry_policy.should_retry(failures) {
                    let delay = self.retry_policy.delay_for(failures);
                    warn!(
                        error = %message,
                        attempt = failures,
                        ?delay,
                        "save failed, retrying"
                    );
                    self.events.emit(PersistenceEvent::SaveFailed {
                        trigger: trigger.as_str(),
                        error: message.clone(),
                        attempt: failures,
                        will_retry: true,
                        timestamp: crate::now_ms(),
                    });

                    let manager = self.clone();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        manager.retry_fire(draft, trigger).await;
                    });
                    self.lock_inner().retry_task = Some(task);

                    Err(SaveError::Remote {
                        message,
                        attempts: failures,
                        will_retry: true,
                    })
                } else {
                    error!(
                        error = %message,
                        attempts = failures,
                        "save failed, retries exhausted"
                    );
                    self.events.emit(PersistenceEvent::SaveFailed {
                        trigger: trigger.as_str(),
                        error: message.clone(),
                        attempt: failures,
                        will_retry: false,
                        timestamp: crate::now_ms(),
                    });
                    self.lock_inner().in_flight = false;
                    self.drain_queue();

                    Err(SaveError::Remote {
                        message,
                        attempts: failures,
                        will_retry: false,
                    })
                }
            }
        }
        })
    }

    /// Fetch the server's copy and compare its last-modified time against
    /// our last save. Returns the conflict error when the server is ahead.
    /// A failed conflict-check fetch is logged and the save proceeds.
    async fn check_conflict(&self, draft: &DraftDocument) -> Option<SaveError> {
        let server = match self.remote.load(&draft.token_id).await {
            Ok(server) => server,
            Err(fetch_error) => {
                warn!(%fetch_error, "conflict check fetch failed, proceeding with save");
                return None;
            }
        };

        let server_modified = server.last_updated.unwrap_or(0);
        let last_saved = {
            let inner = self.lock_inner();
            // The reconciliation watermark counts as "seen": without it an
            // accepted resolution would re-detect the same divergence on the
            // very next save.
            inner
                .last_saved
                .unwrap_or(0)
                .max(inner.reconciled_at.unwrap_or(0))
        };
        if server_modified <= last_saved {
            return None;
        }

        let detected_at = crate::now_ms();
        let record = {
            let mut inner = self.lock_inner();
            match inner
                .versions
                .detect_conflicts_with_server(draft, &server, detected_at)
            {
                Ok(record) => {
                    inner.metrics.conflicts_detected += 1;
                    inner.in_flight = false;
                    record
                }
                Err(analysis_error) => {
                    // Diffing is best-effort; a failure here must not wedge
                    // the save path.
                    error!(%analysis_error, "conflict analysis failed, proceeding with save");
                    return None;
                }
            }
        };

        warn!(
            conflict_id = %record.conflict_id,
            server_modified,
            last_saved,
            "save conflict detected, write aborted"
        );
        self.events.emit(PersistenceEvent::ConflictDetected {
            conflict_id: record.conflict_id.clone(),
            fields: record.fields.len(),
            timestamp: detected_at,
        });

        Some(SaveError::Conflict {
            conflict_id: record.conflict_id,
            server: Box::new(server),
        })
    }

    /// Retry wakeup: re-run the attempt with the same draft. The write slot
    /// is still held by this logical save.
    async fn retry_fire(&self, draft: DraftDocument, trigger: SaveTrigger) {
        {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                return;
            }
            inner.retry_task = None;
        }
        let _ = self.run_attempt(draft, trigger).await;
    }

    /// Debounce wakeup: fire the pending save if this timer is still the
    /// current one.
    async fn debounce_fire(&self, generation: u64) {
        let draft = {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                return;
            }
            inner.debounce_task = None;
            inner.debounce.fire(generation)
        };
        if let Some(draft) = draft {
            debug!("debounced auto-save firing");
            let _ = self
                .perform_save(draft, SaveTrigger::Auto, SaveTrigger::Auto.priority())
                .await;
        }
    }

    /// Record a terminal (non-retried) failure and free the write slot.
    fn finish_failed_terminal(&self, error: &SaveError, trigger: SaveTrigger) {
        let attempt = {
            let mut inner = self.lock_inner();
            inner.save_error = Some(error.to_string());
            inner.metrics.failed_saves += 1;
            inner.in_flight = false;
            inner.retry_count
        };
        self.events.emit(PersistenceEvent::SaveFailed {
            trigger: trigger.as_str(),
            error: error.to_string(),
            attempt,
            will_retry: false,
            timestamp: crate::now_ms(),
        });
        self.drain_queue();
    }

    /// Hand the freed write slot to the highest-priority queued save, if
    /// any. Its completion drains the next in turn.
    fn drain_queue(&self) {
        let operation = {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                return;
            }
            inner.queue.dequeue()
        };
        let Some(operation) = operation else { return };

        debug!(
            id = %operation.id,
            trigger = operation.trigger.as_str(),
            "processing queued save"
        );
        let manager = self.clone();
        tokio::spawn(async move {
            let SaveOperation {
                draft,
                trigger,
                priority,
                notify,
                ..
            } = operation;
            let result = manager.perform_save(draft, trigger, priority).await;
            if let Some(notify) = notify {
                let _ = notify.send(result);
            }
        });
    }

    fn maybe_auto_snapshot(&self, draft: &DraftDocument, successful_saves: u64, now_ms: u64) {
        if !self.config.enable_version_control {
            return;
        }
        let snapshot_id = {
            let mut inner = self.lock_inner();
            if !inner.versions.should_create_auto_snapshot(successful_saves) {
                return;
            }
            inner.versions.create_snapshot(
                draft,
                format!("Auto-snapshot after {successful_saves} saves"),
                SnapshotOrigin::AutoSave,
                now_ms,
            )
        };
        self.events.emit(PersistenceEvent::SnapshotCreated {
            snapshot_id,
            origin: SnapshotOrigin::AutoSave.as_str(),
            timestamp: now_ms,
        });
    }

    fn cancel_debounce(&self) {
        let mut inner = self.lock_inner();
        if let Some(task) = inner.debounce_task.take() {
            task.abort();
        }
        if inner.debounce.cancel().is_some() {
            debug!("pending debounced save discarded");
        }
    }

    fn snapshot(
        &self,
        draft: &DraftDocument,
        description: &str,
        origin: SnapshotOrigin,
    ) -> Option<String> {
        if !self.config.enable_version_control {
            return None;
        }
        let timestamp = crate::now_ms();
        let snapshot_id = {
            let mut inner = self.lock_inner();
            inner
                .versions
                .create_snapshot(draft, description, origin, timestamp)
        };
        self.events.emit(PersistenceEvent::SnapshotCreated {
            snapshot_id: snapshot_id.clone(),
            origin: origin.as_str(),
            timestamp,
        });
        Some(snapshot_id)
    }

    // ==================== loading ====================

    /// Load a draft, cache-first. A cache hit never touches the network; a
    /// miss fetches, resets the conflict baseline, and populates the cache.
    pub async fn load_from_server(&self, token_id: &str, use_cache: bool) -> LoadResult {
        let now = crate::now_ms();
        {
            let mut inner = self.lock_inner();
            if inner.destroyed {
                return Err(LoadError::ShuttingDown);
            }
            inner.loading = true;
            inner.load_error = None;
            inner.metrics.total_loads += 1;

            let cached = if use_cache {
                inner
                    .cache
                    .get(token_id, now)
                    .map(|(document, cached_at)| (document.clone(), cached_at))
            } else {
                None
            };

            if let Some((document, cached_at)) = cached {
                inner.metrics.cache_hits += 1;
                inner.loading = false;
                inner.last_loaded = Some(now);
                debug!(token_id, age_ms = now - cached_at, "load served from cache");
                drop(inner);
                self.events.emit(PersistenceEvent::LoadCompleted {
                    token_id: token_id.to_string(),
                    from_cache: true,
                    timestamp: now,
                });
                return Ok(LoadOutcome {
                    document,
                    from_cache: true,
                    timestamp: cached_at,
                    warnings: Vec::new(),
                });
            }
            inner.metrics.cache_misses += 1;
        }

        debug!(token_id, "loading draft from server");
        match self.remote.load(token_id).await {
            Ok(document) => {
                let validation = self.validator.validate_load(&document);
                let warnings = validation.findings();
                for warning in &warnings {
                    warn!(token_id, warning = %warning, "loaded draft shape warning");
                }

                let completed_at = crate::now_ms();
                {
                    let mut inner = self.lock_inner();
                    inner.server_version = Some(document.clone());
                    inner.cache.insert(
                        token_id,
                        document.clone(),
                        self.config.cache_ttl.as_millis() as u64,
                        completed_at,
                    );
                    inner.loading = false;
                    inner.last_loaded = Some(completed_at);
                }
                self.events.emit(PersistenceEvent::LoadCompleted {
                    token_id: token_id.to_string(),
                    from_cache: false,
                    timestamp: completed_at,
                });
                info!(token_id, "load successful");

                Ok(LoadOutcome {
                    document,
                    from_cache: false,
                    timestamp: completed_at,
                    warnings,
                })
            }
            Err(remote_error) => {
                let message = remote_error.to_string();
                {
                    let mut inner = self.lock_inner();
                    inner.loading = false;
                    inner.load_error = Some(message.clone());
                }
                error!(token_id, error = %message, "load failed");
                Err(LoadError::Remote(message))
            }
        }
    }

    // ==================== conflicts & history ====================

    /// Apply a resolution strategy to a pending conflict, returning the
    /// accepted draft. The caller decides whether to save it.
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: &ResolutionStrategy,
    ) -> version::Result<DraftDocument> {
        let merged = {
            let mut inner = self.lock_inner();
            let server_seen = inner
                .versions
                .conflict(conflict_id)
                .and_then(|record| record.server.last_updated);
            let merged = inner.versions.resolve(conflict_id, strategy)?;
            inner.metrics.conflicts_resolved += 1;
            if let Some(seen) = server_seen {
                inner.reconciled_at = Some(inner.reconciled_at.unwrap_or(0).max(seen));
            }
            merged
        };
        self.events.emit(PersistenceEvent::ConflictResolved {
            conflict_id: conflict_id.to_string(),
            strategy: strategy.name(),
            timestamp: crate::now_ms(),
        });
        info!(conflict_id, strategy = strategy.name(), "conflict resolved");
        Ok(merged)
    }

    pub fn active_conflicts(&self) -> Vec<ConflictRecord> {
        self.lock_inner().versions.active_conflicts()
    }

    /// Named user checkpoint. `None` when version control is disabled.
    pub fn create_snapshot(&self, draft: &DraftDocument, description: &str) -> Option<String> {
        self.snapshot(draft, description, SnapshotOrigin::User)
    }

    pub fn can_undo(&self) -> bool {
        self.lock_inner().versions.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.lock_inner().versions.can_redo()
    }

    pub fn undo(&self) -> Option<VersionSnapshot> {
        self.lock_inner().versions.undo()
    }

    pub fn redo(&self) -> Option<VersionSnapshot> {
        self.lock_inner().versions.redo()
    }

    pub fn history_summary(&self) -> HistorySummary {
        self.lock_inner().versions.summary()
    }

    // ==================== state & lifecycle ====================

    pub fn state(&self) -> StateSnapshot {
        let inner = self.lock_inner();
        StateSnapshot {
            is_dirty: inner.dirty,
            is_saving: inner.in_flight,
            is_loading: inner.loading,
            last_saved: inner.last_saved,
            last_loaded: inner.last_loaded,
            save_error: inner.save_error.clone(),
            load_error: inner.load_error.clone(),
            retry_count: inner.retry_count,
            local_version: inner.local_version,
            queued_saves: inner.queue.len(),
            cached_loads: inner.cache.len(),
            has_server_baseline: inner.server_version.is_some(),
        }
    }

    pub fn metrics(&self) -> PersistenceMetrics {
        self.lock_inner().metrics.clone()
    }

    pub fn clear_save_error(&self) {
        self.lock_inner().save_error = None;
    }

    /// Subscribe to persistence lifecycle events.
    pub fn subscribe(
        &self,
        callback: impl Fn(PersistenceEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Tear down: cancels the background timer, the debounce, and any
    /// scheduled retry; drops queued saves and empties the cache. Call
    /// exactly once; the manager rejects work afterwards.
    pub fn destroy(&self) {
        let mut inner = self.lock_inner();
        if inner.destroyed {
            warn!("destroy called more than once");
            return;
        }
        inner.destroyed = true;
        if let Some(task) = inner.background_task.take() {
            task.abort();
        }
        if let Some(task) = inner.debounce_task.take() {
            task.abort();
        }
        if let Some(task) = inner.retry_task.take() {
            task.abort();
        }
        inner.debounce.cancel();
        inner.queue.clear();
        inner.cache.clear();
        info!("persistence manager destroyed");
    }
}
