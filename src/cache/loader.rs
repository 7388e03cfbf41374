//! Background index loading
//!
//! The startup scan queues one load per file found in the cache directory and
//! a few loader threads drain the queue. Each queued file has exactly one
//! shared [`PendingLoad`] that any number of callers can block on. Waiting on
//! a load that has not started yet moves it to the front of the queue, most
//! recently requested first, so interactive lookups are not stuck behind the
//! bulk scan.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::record::CacheIndexEntry;

/// Outcome of loading one file: the published index entry, if any
pub(crate) type LoadResult = Option<CacheIndexEntry>;

/// Single-assignment result handle for one in-flight load
#[derive(Debug)]
pub(crate) struct PendingLoad {
    file_name: String,
    result: Mutex<Option<LoadResult>>,
    done: Condvar,
}

impl PendingLoad {
    fn new(file_name: String) -> Self {
        Self {
            file_name,
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Set the result and wake all waiters; later calls are ignored
    pub(crate) fn complete(&self, result: LoadResult) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.done.notify_all();
        }
    }

    /// Block until the result is set
    pub(crate) fn wait(&self) -> LoadResult {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

/// A file waiting to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadTask {
    pub file_name: String,
    pub path: PathBuf,
}

/// Heap slot. Higher `touches` first; among equals, higher `rank` first.
///
/// Untouched loads get a negative rank from their queue position so they
/// run in discovery order; a touch pushes a fresh slot with a positive rank
/// from the current tick. Slots whose task was already taken are skipped.
#[derive(Debug, PartialEq, Eq)]
struct QueueSlot {
    touches: u32,
    rank: i64,
    file_name: String,
}

impl Ord for QueueSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.touches
            .cmp(&other.touches)
            .then(self.rank.cmp(&other.rank))
    }
}

impl PartialOrd for QueueSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct LoadQueue {
    heap: BinaryHeap<QueueSlot>,
    /// Tasks not yet taken by a worker, with their touch counts
    waiting: HashMap<String, (LoadTask, u32)>,
    tick: i64,
}

/// Queue of pending loads plus the handles callers wait on
#[derive(Debug, Default)]
pub(crate) struct Loader {
    queue: Mutex<LoadQueue>,
    /// Handles by file name, removed once the load is published
    pending: Mutex<HashMap<String, Arc<PendingLoad>>>,
}

impl Loader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue loads in discovery order
    pub(crate) fn schedule(&self, tasks: impl IntoIterator<Item = LoadTask>) {
        let mut queue = self.queue.lock();
        let mut pending = self.pending.lock();

        for task in tasks {
            if pending.contains_key(&task.file_name) {
                continue;
            }
            queue.tick += 1;
            let rank = -queue.tick;
            pending.insert(
                task.file_name.clone(),
                Arc::new(PendingLoad::new(task.file_name.clone())),
            );
            queue.heap.push(QueueSlot {
                touches: 0,
                rank,
                file_name: task.file_name.clone(),
            });
            queue.waiting.insert(task.file_name.clone(), (task, 0));
        }
    }

    /// Take the highest priority task, or `None` when the queue is drained
    pub(crate) fn next_task(&self) -> Option<LoadTask> {
        let mut queue = self.queue.lock();
        while let Some(slot) = queue.heap.pop() {
            if let Some((task, _)) = queue.waiting.remove(&slot.file_name) {
                return Some(task);
            }
        }
        None
    }

    /// Publish a finished load: drop its handle, then wake its waiters
    ///
    /// Callers must have published any index entry before calling this.
    pub(crate) fn finish(&self, file_name: &str, result: LoadResult) {
        let handle = self.pending.lock().remove(file_name);
        if let Some(handle) = handle {
            handle.complete(result);
        }
    }

    /// Move a queued load to the front
    fn touch(&self, file_name: &str) {
        let mut queue = self.queue.lock();
        queue.tick += 1;
        let rank = queue.tick;

        let touches = match queue.waiting.get_mut(file_name) {
            Some((_, touches)) => {
                *touches += 1;
                *touches
            }
            None => return,
        };
        trace!(file = file_name, touches = touches, "Reordering pending cache load");
        queue.heap.push(QueueSlot {
            touches,
            rank,
            file_name: file_name.to_string(),
        });
    }

    /// Block until the load for `file_name` (if any) has been published
    pub(crate) fn wait_for(&self, file_name: &str) -> Option<LoadResult> {
        let handle = self.pending.lock().get(file_name).cloned()?;
        self.touch(file_name);
        Some(handle.wait())
    }

    /// Block until every scheduled load has been published
    pub(crate) fn wait_all(&self) {
        loop {
            let next = self.pending.lock().values().next().cloned();
            match next {
                Some(handle) => {
                    self.touch(&handle.file_name);
                    handle.wait();
                }
                None => return,
            }
        }
    }

    pub(crate) fn is_pending(&self, file_name: &str) -> bool {
        self.pending.lock().contains_key(file_name)
    }

    /// Whether the startup scan has been fully published
    pub(crate) fn is_loaded(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
