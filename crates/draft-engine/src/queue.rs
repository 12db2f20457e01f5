//! Priority queue of pending save requests.
//!
//! Used only while a save is already in flight: arrivals are parked here and
//! drained one at a time as the write slot frees up. Lower priority number is
//! served first; ties keep submission order. The queue does not coalesce
//! duplicates — the manager prevents them by checking the in-flight flag
//! before enqueueing.

use crate::result::SaveResult;
use draft_core::document::DraftDocument;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// What requested a save. Determines queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// Explicit user action.
    Manual,
    /// Debounced edit activity.
    Auto,
    /// Periodic background sweep.
    Background,
}

impl SaveTrigger {
    /// Queue priority; lower is served sooner. Forced saves use
    /// [`FORCE_PRIORITY`], ahead of everything.
    pub fn priority(&self) -> u8 {
        match self {
            SaveTrigger::Manual => 1,
            SaveTrigger::Auto => 2,
            SaveTrigger::Background => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaveTrigger::Manual => "manual",
            SaveTrigger::Auto => "auto",
            SaveTrigger::Background => "background",
        }
    }
}

/// Priority of a forced save: jumps ahead of every trigger.
pub const FORCE_PRIORITY: u8 = 0;

/// A save parked while another write is in flight.
#[derive(Debug)]
pub struct SaveOperation {
    pub id: String,
    pub trigger: SaveTrigger,
    pub draft: DraftDocument,
    /// Submission time in milliseconds since epoch.
    pub queued_at: u64,
    pub priority: u8,
    pub retries: u32,
    /// Delivers the eventual outcome to a waiting caller, when present.
    /// Dropped unsent if the queue is cleared, which the waiter observes as
    /// a shutdown.
    pub notify: Option<oneshot::Sender<SaveResult>>,
}

impl SaveOperation {
    pub fn new(
        trigger: SaveTrigger,
        draft: DraftDocument,
        priority: u8,
        queued_at: u64,
        notify: Option<oneshot::Sender<SaveResult>>,
    ) -> Self {
        Self {
            id: format!("queued-{}", Uuid::new_v4()),
            trigger,
            draft,
            queued_at,
            priority,
            retries: 0,
            notify,
        }
    }
}

/// Priority-ordered pending saves, ascending priority number first.
#[derive(Debug, Default)]
pub struct SaveQueue {
    operations: Vec<SaveOperation>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert and restore the ordering invariant. The sort is stable, so
    /// equal priorities stay FIFO.
    pub fn enqueue(&mut self, operation: SaveOperation) {
        debug!(
            id = %operation.id,
            trigger = operation.trigger.as_str(),
            priority = operation.priority,
            "queueing save"
        );
        self.operations.push(operation);
        self.operations.sort_by_key(|op| op.priority);
    }

    /// Remove and return the highest-priority operation.
    pub fn dequeue(&mut self) -> Option<SaveOperation> {
        if self.operations.is_empty() {
            None
        } else {
            Some(self.operations.remove(0))
        }
    }

    /// Drop everything. Pending notifiers are dropped unsent.
    pub fn clear(&mut self) {
        if !self.operations.is_empty() {
            debug!(dropped = self.operations.len(), "clearing save queue");
        }
        self.operations.clear();
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(trigger: SaveTrigger, marker: &str) -> SaveOperation {
        let mut draft = DraftDocument::new("tok");
        draft.input_text = Some(marker.to_string());
        SaveOperation::new(trigger, draft, trigger.priority(), 0, None)
    }

    fn marker(operation: &SaveOperation) -> &str {
        operation.draft.input_text.as_deref().unwrap()
    }

    #[test]
    fn test_priority_ordering() {
        let mut queue = SaveQueue::new();
        queue.enqueue(op(SaveTrigger::Background, "bg"));
        queue.enqueue(op(SaveTrigger::Auto, "auto"));
        queue.enqueue(op(SaveTrigger::Manual, "manual"));

        assert_eq!(marker(&queue.dequeue().unwrap()), "manual");
        assert_eq!(marker(&queue.dequeue().unwrap()), "auto");
        assert_eq!(marker(&queue.dequeue().unwrap()), "bg");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_manual_jumps_ahead_of_earlier_background() {
        let mut queue = SaveQueue::new();
        queue.enqueue(op(SaveTrigger::Background, "bg"));
        queue.enqueue(op(SaveTrigger::Manual, "manual"));

        assert_eq!(marker(&queue.dequeue().unwrap()), "manual");
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut queue = SaveQueue::new();
        queue.enqueue(op(SaveTrigger::Auto, "first"));
        queue.enqueue(op(SaveTrigger::Auto, "second"));

        assert_eq!(marker(&queue.dequeue().unwrap()), "first");
        assert_eq!(marker(&queue.dequeue().unwrap()), "second");
    }

    #[test]
    fn test_force_priority_beats_manual() {
        let mut queue = SaveQueue::new();
        queue.enqueue(op(SaveTrigger::Manual, "manual"));

        let mut forced = op(SaveTrigger::Manual, "forced");
        forced.priority = FORCE_PRIORITY;
        queue.enqueue(forced);

        assert_eq!(marker(&queue.dequeue().unwrap()), "forced");
    }

    #[test]
    fn test_clear_drops_waiters() {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let mut queue = SaveQueue::new();
        queue.enqueue(SaveOperation::new(
            SaveTrigger::Manual,
            DraftDocument::new("tok"),
            1,
            0,
            Some(tx),
        ));

        queue.clear();

        assert!(queue.is_empty());
        // The sender was dropped unsent.
        assert!(rx.try_recv().is_err());
    }
}
