//! Asynchronous process-local icon decoding.
//!
//! Icons the server cannot serve — local files, uncacheable content,
//! or anything the shared path answered `NotFound`/`OutOfMemory` for —
//! decode on a worker thread inside the client process. This is the
//! one genuinely concurrent boundary in the system, and the one with a
//! cancellation race worth getting right:
//!
//! - [`cancel`](LocalIconLoader::cancel) before the worker starts the
//!   job: the job never runs.
//! - `cancel` while the job runs: the completion is discarded at the
//!   merge point and its decoded buffer released — the result never
//!   reaches the caller.
//! - Completion before `cancel` is observed: same discard path; no
//!   reference is leaked either way.
//!
//! Results are marshalled back over a channel and merged into the
//! process-local cache on the calling thread by
//! [`drain`](LocalIconLoader::drain). For a key decoded twice
//! concurrently, the first merged result wins and later duplicates are
//! discarded — at most one canonical entry per key.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;

use sable_core::IconKey;

use crate::loader::DecodedIcon;

/// Identifies one submitted decode job for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

struct Job {
    ticket: u64,
    key: IconKey,
    decode: Box<dyn FnOnce() -> Option<DecodedIcon> + Send>,
}

struct Completion {
    ticket: u64,
    key: IconKey,
    result: Option<DecodedIcon>,
}

/// Counters for the local decode path.
#[derive(Clone, Debug, Default)]
pub struct LocalLoaderMetrics {
    /// Jobs submitted.
    pub submitted: u64,
    /// Completions merged into the local cache.
    pub merged: u64,
    /// Completions discarded because the key was already cached.
    pub duplicates_discarded: u64,
    /// Completions discarded because cancellation was observed after
    /// the decode finished; the result was released here. Jobs
    /// cancelled before the worker ran them produce no completion and
    /// no counter.
    pub cancelled_after_complete: u64,
    /// Jobs whose decode returned nothing.
    pub failed: u64,
}

/// Worker-thread decoder with a process-local result cache.
pub struct LocalIconLoader {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Completion>,
    cancelled: Arc<Mutex<HashSet<u64>>>,
    next_ticket: u64,
    cache: IndexMap<IconKey, Arc<DecodedIcon>>,
    metrics: LocalLoaderMetrics,
    worker: Option<JoinHandle<()>>,
}

impl LocalIconLoader {
    /// Start the worker thread.
    pub fn new() -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<Completion>();
        let cancelled: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
        let worker_cancelled = Arc::clone(&cancelled);

        let worker = thread::Builder::new()
            .name("sable-local-decode".to_string())
            .spawn(move || worker_loop(job_rx, done_tx, worker_cancelled))
            .expect("spawn local decode thread");

        Self {
            job_tx: Some(job_tx),
            done_rx,
            cancelled,
            next_ticket: 0,
            cache: IndexMap::new(),
            metrics: LocalLoaderMetrics::default(),
            worker: Some(worker),
        }
    }

    /// Queue a decode job for `key`. The closure runs on the worker
    /// thread; the result surfaces through [`drain`](Self::drain) on
    /// this thread.
    pub fn submit(
        &mut self,
        key: IconKey,
        decode: impl FnOnce() -> Option<DecodedIcon> + Send + 'static,
    ) -> Ticket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.metrics.submitted += 1;
        let send = self
            .job_tx
            .as_ref()
            .expect("job channel lives as long as the loader")
            .send(Job {
                ticket,
                key,
                decode: Box::new(decode),
            });
        send.expect("local decode worker outlives the loader");
        Ticket(ticket)
    }

    /// Prevent `ticket`'s result from ever reaching the cache or the
    /// caller. Safe to race with completion: a decode that finishes
    /// anyway is released at the merge point.
    pub fn cancel(&mut self, ticket: Ticket) {
        self.cancelled
            .lock()
            .expect("cancel set lock poisoned")
            .insert(ticket.0);
    }

    /// Pull finished decodes off the channel and merge them into the
    /// local cache. Returns what was newly merged, in completion
    /// order.
    ///
    /// Cancelled completions are dropped here (releasing their decoded
    /// buffers); for duplicate keys the first merged result stays
    /// canonical and later ones are discarded.
    pub fn drain(&mut self) -> Vec<(IconKey, Arc<DecodedIcon>)> {
        let mut merged = Vec::new();
        while let Ok(completion) = self.done_rx.try_recv() {
            let was_cancelled = self
                .cancelled
                .lock()
                .expect("cancel set lock poisoned")
                .remove(&completion.ticket);
            if was_cancelled {
                self.metrics.cancelled_after_complete += 1;
                continue;
            }
            let Some(decoded) = completion.result else {
                self.metrics.failed += 1;
                continue;
            };
            if self.cache.contains_key(&completion.key) {
                self.metrics.duplicates_discarded += 1;
                continue;
            }
            let decoded = Arc::new(decoded);
            self.cache
                .insert(completion.key.clone(), Arc::clone(&decoded));
            self.metrics.merged += 1;
            merged.push((completion.key, decoded));
        }
        merged
    }

    /// The locally cached frame for `key`, if any.
    pub fn cached(&self, key: &IconKey) -> Option<Arc<DecodedIcon>> {
        self.cache.get(key).cloned()
    }

    /// Drop `key` from the local cache.
    pub fn evict(&mut self, key: &IconKey) -> bool {
        self.cache.shift_remove(key).is_some()
    }

    /// Number of locally cached frames.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &LocalLoaderMetrics {
        &self.metrics
    }
}

impl Default for LocalIconLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalIconLoader {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    job_rx: Receiver<Job>,
    done_tx: Sender<Completion>,
    cancelled: Arc<Mutex<HashSet<u64>>>,
) {
    for job in job_rx.iter() {
        // Cancelled before starting: never run the decode.
        let skip = cancelled
            .lock()
            .expect("cancel set lock poisoned")
            .remove(&job.ticket);
        if skip {
            continue;
        }
        let result = (job.decode)();
        // A cancel may have landed while decoding; the completion is
        // still sent and the drain side discards it, so the "cancelled
        // before run" and "cancelled after complete" paths stay
        // distinguishable.
        let send = done_tx.send(Completion {
            ticket: job.ticket,
            key: job.key,
            result,
        });
        if send.is_err() {
            // Loader gone: drop remaining work.
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use sable_core::IconSize;

    fn key(name: &str) -> IconKey {
        IconKey::new(name, IconSize::new(8, 8))
    }

    fn frame(tag: u8) -> DecodedIcon {
        DecodedIcon {
            size: IconSize::new(1, 1),
            rgba: vec![tag, tag, tag, 0xFF],
        }
    }

    /// Drain until `predicate` or a generous timeout.
    fn drain_until(
        loader: &mut LocalIconLoader,
        mut done: impl FnMut(&LocalIconLoader) -> bool,
    ) -> Vec<(IconKey, Arc<DecodedIcon>)> {
        let mut merged = Vec::new();
        for _ in 0..500 {
            merged.extend(loader.drain());
            if done(loader) {
                return merged;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        panic!("local decode did not settle in time");
    }

    #[test]
    fn submit_decode_drain_merges_result() {
        let mut loader = LocalIconLoader::new();
        let _ticket = loader.submit(key("local"), || Some(frame(7)));
        let merged = drain_until(&mut loader, |l| l.cached_count() == 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].0, key("local"));
        assert_eq!(merged[0].1.rgba, vec![7, 7, 7, 0xFF]);
        assert!(loader.cached(&key("local")).is_some());
        assert_eq!(loader.metrics().merged, 1);
    }

    #[test]
    fn failed_decode_is_counted_not_cached() {
        let mut loader = LocalIconLoader::new();
        let _ticket = loader.submit(key("broken"), || None);
        let merged = drain_until(&mut loader, |l| l.metrics().failed == 1);
        assert!(merged.is_empty());
        assert_eq!(loader.cached_count(), 0);
    }

    #[test]
    fn first_result_for_a_key_wins() {
        let mut loader = LocalIconLoader::new();
        // Two near-simultaneous misses for the same key.
        let _a = loader.submit(key("dup"), || Some(frame(1)));
        let _b = loader.submit(key("dup"), || Some(frame(2)));
        let merged = drain_until(&mut loader, |l| l.metrics().duplicates_discarded == 1);
        assert_eq!(merged.len(), 1);
        // The worker runs jobs in order, so the first submission won
        // and the duplicate's buffer was released.
        assert_eq!(loader.cached(&key("dup")).unwrap().rgba[0], 1);
        assert_eq!(loader.metrics().merged, 1);
    }

    #[test]
    fn cancel_before_run_skips_the_decode() {
        let mut loader = LocalIconLoader::new();
        // Hold the worker inside a first job until we say go, so the
        // second job is still queued when the cancel lands.
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let _hold = loader.submit(key("gate"), move || {
            let _ = gate_rx.recv();
            Some(frame(9))
        });
        let ticket = loader.submit(key("victim"), || Some(frame(1)));
        loader.cancel(ticket);
        gate_tx.send(()).unwrap();

        let _ = drain_until(&mut loader, |l| l.cached(&key("gate")).is_some());
        // The victim never decoded and never surfaced.
        assert!(loader.cached(&key("victim")).is_none());
        assert_eq!(loader.metrics().cancelled_after_complete, 0);
    }

    #[test]
    fn cancel_racing_completion_releases_the_result() {
        let mut loader = LocalIconLoader::new();
        // The job signals when the decode is done, so cancellation is
        // guaranteed to land after completion.
        let (done_tx, done_rx) = bounded::<()>(1);
        let ticket = loader.submit(key("late"), move || {
            let decoded = frame(3);
            let _ = done_tx.send(());
            Some(decoded)
        });
        done_rx.recv().unwrap();
        loader.cancel(ticket);

        let _ = drain_until(&mut loader, |l| l.metrics().cancelled_after_complete == 1);
        // The completed decode was discarded, not merged.
        assert!(loader.cached(&key("late")).is_none());
        assert_eq!(loader.metrics().merged, 0);
    }
}
