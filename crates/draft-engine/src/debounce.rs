//! Debounce state machine for auto-saves.
//!
//! Collapses bursts of edit events into one save carrying only the latest
//! draft. The machine is explicit state (`Idle` / `Pending`) plus a
//! generation counter: every (re)schedule bumps the generation, so a timer
//! armed for an earlier schedule wakes up stale and fires nothing. The
//! manager drives it with a tokio sleep; the machine itself never touches a
//! clock, which keeps it testable with synthetic deadlines.

use draft_core::document::DraftDocument;
use tracing::debug;

#[derive(Debug)]
struct PendingSave {
    draft: DraftDocument,
    deadline_ms: u64,
    generation: u64,
}

/// Idle → Pending(draft, deadline) → fired (back to Idle).
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<PendingSave>,
    generation: u64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the debounce window with the latest draft.
    ///
    /// Earlier pending data is replaced — within a burst only the most
    /// recent draft is ever persisted. Returns the generation the caller's
    /// timer must present to [`fire`](Self::fire).
    pub fn schedule(&mut self, draft: DraftDocument, delay_ms: u64, now_ms: u64) -> u64 {
        self.generation += 1;
        let deadline_ms = now_ms + delay_ms;
        debug!(generation = self.generation, deadline_ms, "debounce armed");
        self.pending = Some(PendingSave {
            draft,
            deadline_ms,
            generation: self.generation,
        });
        self.generation
    }

    /// Take the pending draft if `generation` is still current.
    ///
    /// A stale generation means the window was re-armed or cancelled after
    /// this timer was set; the wakeup is ignored.
    pub fn fire(&mut self, generation: u64) -> Option<DraftDocument> {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                let pending = self.pending.take().expect("pending, checked above");
                Some(pending.draft)
            }
            _ => None,
        }
    }

    /// Discard pending data and invalidate outstanding timers.
    ///
    /// Returns the discarded draft, if any. Used by manual and forced saves,
    /// which supersede the debounced data with their own.
    pub fn cancel(&mut self) -> Option<DraftDocument> {
        self.generation += 1;
        self.pending.take().map(|p| p.draft)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline of the pending window, in milliseconds since epoch.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.deadline_ms)
    }
}
