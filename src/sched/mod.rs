//! Batched redraw scheduling.
//!
//! Style, selection and hover changes do not repaint immediately; they
//! enqueue tile keys here. A single-shot debounce timer (one frame
//! quantum) resets on every enqueue, so a burst of mutations coalesces
//! into one repaint per affected tile. The flush handler is installed by
//! the source facade and replays each pending tile.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::coord::TileKey;

/// One frame at ~60 Hz.
pub const DEBOUNCE: Duration = Duration::from_millis(16);

/// Handler invoked with the drained pending set.
pub type FlushHandler = Arc<dyn Fn(Vec<TileKey>) + Send + Sync>;

/// Coalescing redraw queue with a resetting debounce timer.
#[derive(Default)]
pub struct RedrawScheduler {
    pending: Mutex<HashSet<TileKey>>,
    epoch: AtomicU64,
    flush_count: AtomicU64,
    on_flush: Mutex<Option<FlushHandler>>,
    cancel: CancellationToken,
    debounce: Option<Duration>,
}

impl RedrawScheduler {
    /// Create a scheduler with the standard frame quantum.
    pub fn new() -> Arc<Self> {
        Self::with_debounce(DEBOUNCE)
    }

    /// Create a scheduler with an explicit debounce, for tests.
    pub fn with_debounce(debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            debounce: Some(debounce),
            ..Default::default()
        })
    }

    /// Install the flush handler. Replaces any previous handler.
    pub fn set_flush_handler(&self, handler: FlushHandler) {
        *self.on_flush.lock().unwrap() = Some(handler);
    }

    /// Enqueue one tile and (re)arm the timer.
    pub fn enqueue(self: &Arc<Self>, key: TileKey) {
        self.pending.lock().unwrap().insert(key);
        self.arm();
    }

    /// Enqueue many tiles (the `"all"` scope) and (re)arm the timer.
    pub fn enqueue_many(self: &Arc<Self>, keys: impl IntoIterator<Item = TileKey>) {
        {
            let mut pending = self.pending.lock().unwrap();
            pending.extend(keys);
        }
        self.arm();
    }

    fn arm(self: &Arc<Self>) {
        let debounce = match self.debounce {
            Some(d) => d,
            None => return,
        };
        // Every enqueue supersedes earlier timers; only the newest epoch
        // fires.
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = this.cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            if this.epoch.load(Ordering::SeqCst) == epoch {
                this.flush_now();
            }
        });
    }

    /// Drain the queue and run the handler synchronously.
    ///
    /// No-op when nothing is pending or no handler is installed.
    pub fn flush_now(&self) {
        let handler = match self.on_flush.lock().unwrap().clone() {
            Some(handler) => handler,
            None => return,
        };
        let keys: Vec<TileKey> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };
        if keys.is_empty() {
            return;
        }
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        handler(keys);
    }

    /// Number of flushes performed, for tests.
    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::SeqCst)
    }

    /// Number of tiles currently pending.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Stop all timers and drop pending work.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.pending.lock().unwrap().clear();
        *self.on_flush.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{advance, sleep};

    fn key(x: u32) -> TileKey {
        TileKey::new(5, x, 0)
    }

    fn counting_handler() -> (FlushHandler, Arc<Mutex<Vec<Vec<TileKey>>>>) {
        let batches: Arc<Mutex<Vec<Vec<TileKey>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let handler: FlushHandler = Arc::new(move |keys| {
            sink.lock().unwrap().push(keys);
        });
        (handler, batches)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_enqueues_flushes_once() {
        let scheduler = RedrawScheduler::new();
        let (handler, batches) = counting_handler();
        scheduler.set_flush_handler(handler);

        // Ten enqueues of the same tile inside 5 ms.
        for _ in 0..10 {
            scheduler.enqueue(key(1));
            advance(Duration::from_micros(500)).await;
        }

        // Not yet: the timer resets on every enqueue.
        assert_eq!(scheduler.flush_count(), 0);

        sleep(DEBOUNCE + Duration::from_millis(1)).await;
        assert_eq!(scheduler.flush_count(), 1);

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![key(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_tiles_coalesce_into_one_batch() {
        let scheduler = RedrawScheduler::new();
        let (handler, batches) = counting_handler();
        scheduler.set_flush_handler(handler);

        scheduler.enqueue(key(1));
        scheduler.enqueue(key(2));
        scheduler.enqueue(key(1));
        sleep(DEBOUNCE + Duration::from_millis(1)).await;

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let mut keys = batches[0].clone();
        keys.sort();
        assert_eq!(keys, vec![key(1), key(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_a_full_quantum_after_last_enqueue() {
        let scheduler = RedrawScheduler::new();
        let (handler, _batches) = counting_handler();
        scheduler.set_flush_handler(handler);

        scheduler.enqueue(key(1));
        advance(Duration::from_millis(10)).await;
        scheduler.enqueue(key(1));
        advance(Duration::from_millis(10)).await;
        // 10 ms after the second enqueue: not yet.
        assert_eq!(scheduler.flush_count(), 0);

        advance(Duration::from_millis(7)).await;
        // Give the spawned timer task a chance to run.
        sleep(Duration::from_millis(1)).await;
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_many_is_one_batch() {
        let scheduler = RedrawScheduler::new();
        let (handler, batches) = counting_handler();
        scheduler.set_flush_handler(handler);

        scheduler.enqueue_many([key(1), key(2), key(3)]);
        sleep(DEBOUNCE + Duration::from_millis(1)).await;

        assert_eq!(batches.lock().unwrap().len(), 1);
        assert_eq!(batches.lock().unwrap()[0].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_now_drains_synchronously() {
        let scheduler = RedrawScheduler::new();
        let (handler, batches) = counting_handler();
        scheduler.set_flush_handler(handler);

        scheduler.enqueue(key(1));
        scheduler.flush_now();
        assert_eq!(batches.lock().unwrap().len(), 1);
        assert_eq!(scheduler.pending_len(), 0);

        // The armed timer finds an empty queue and does nothing.
        sleep(DEBOUNCE + Duration::from_millis(1)).await;
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_flush() {
        let scheduler = RedrawScheduler::new();
        let flushes = Arc::new(AtomicUsize::new(0));
        let flushes_in_handler = Arc::clone(&flushes);
        scheduler.set_flush_handler(Arc::new(move |_| {
            flushes_in_handler.fetch_add(1, Ordering::SeqCst);
        }));

        scheduler.enqueue(key(1));
        scheduler.shutdown();
        sleep(DEBOUNCE * 2).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_handler_is_silent() {
        let scheduler = RedrawScheduler::new();
        scheduler.enqueue(key(1));
        sleep(DEBOUNCE * 2).await;
        // Nothing to assert beyond not panicking; queue drains lazily on
        // the next flush with a handler installed.
        assert_eq!(scheduler.flush_count(), 0);
    }
}
