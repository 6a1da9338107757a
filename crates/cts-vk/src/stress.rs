//! Multi-queue threaded stress harness: a shared queue free list, a spin
//! barrier and a group of worker threads whose results are merged.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use cts_core::{CtsError, ResultCollector, StatusCode, TestStatus};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::case::panic_message;

// ── Queue free list ─────────────────────────────────────────────────────────

struct Family<T> {
    slots: Vec<T>,
    available: Vec<bool>,
}

/// Queues grouped by family, each either free or leased to one thread.
///
/// `T` is whatever a thread needs to use a queue exclusively, typically the
/// queue handle plus a command pool dedicated to it.
pub struct MultiQueues<T> {
    families: Mutex<BTreeMap<u32, Family<T>>>,
}

/// A queue handed out by [`MultiQueues::get_free_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasedQueue<T> {
    pub family_index: u32,
    pub queue_index: usize,
    pub slot: T,
}

impl<T: Copy> MultiQueues<T> {
    pub fn new() -> Self {
        Self {
            families: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register the queues of one family; all start out free.
    pub fn add_family(&self, family_index: u32, slots: Vec<T>) {
        let available = vec![true; slots.len()];
        self.families
            .lock()
            .insert(family_index, Family { slots, available });
    }

    pub fn family_count(&self) -> usize {
        self.families.lock().len()
    }

    pub fn queue_count(&self) -> usize {
        self.families.lock().values().map(|f| f.slots.len()).sum()
    }

    pub fn family_indices(&self) -> Vec<u32> {
        self.families.lock().keys().copied().collect()
    }

    /// Scan families in index order and lease the first free queue.
    pub fn get_free_queue(&self) -> Option<LeasedQueue<T>> {
        let mut families = self.families.lock();
        for (&family_index, family) in families.iter_mut() {
            if let Some(queue_index) = family.available.iter().position(|&free| free) {
                family.available[queue_index] = false;
                return Some(LeasedQueue {
                    family_index,
                    queue_index,
                    slot: family.slots[queue_index],
                });
            }
        }
        None
    }

    pub fn release_queue(&self, family_index: u32, queue_index: usize) {
        let mut families = self.families.lock();
        if let Some(flag) = families
            .get_mut(&family_index)
            .and_then(|f| f.available.get_mut(queue_index))
        {
            *flag = true;
        }
    }

    /// Poll until a queue is free. The lease is returned when the guard drops.
    pub fn acquire(&self) -> QueueGuard<'_, T> {
        loop {
            if let Some(lease) = self.get_free_queue() {
                return QueueGuard { queues: self, lease };
            }
            thread::yield_now();
        }
    }
}

impl<T: Copy> Default for MultiQueues<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct QueueGuard<'q, T: Copy> {
    queues: &'q MultiQueues<T>,
    lease: LeasedQueue<T>,
}

impl<T: Copy> QueueGuard<'_, T> {
    pub fn lease(&self) -> LeasedQueue<T> {
        self.lease
    }

    pub fn slot(&self) -> T {
        self.lease.slot
    }
}

impl<T: Copy> Drop for QueueGuard<'_, T> {
    fn drop(&mut self) {
        self.queues
            .release_queue(self.lease.family_index, self.lease.queue_index);
    }
}

// ── Spin barrier ────────────────────────────────────────────────────────────

struct BarrierState {
    participants: usize,
    waiting: usize,
}

/// Barrier whose waiters spin (yielding) instead of parking. Threads that
/// finish early leave with [`SpinBarrier::remove_thread`] so the rest do not
/// wait for them.
pub struct SpinBarrier {
    state: Mutex<BarrierState>,
    generation: AtomicUsize,
}

impl SpinBarrier {
    pub fn new(participants: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                participants,
                waiting: 0,
            }),
            generation: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self, participants: usize) {
        let mut state = self.state.lock();
        state.participants = participants;
        state.waiting = 0;
    }

    pub fn participants(&self) -> usize {
        self.state.lock().participants
    }

    pub fn sync(&self) {
        let generation = {
            let mut state = self.state.lock();
            let generation = self.generation.load(Ordering::Acquire);
            state.waiting += 1;
            if state.waiting >= state.participants {
                state.waiting = 0;
                self.generation.fetch_add(1, Ordering::AcqRel);
                return;
            }
            generation
        };
        while self.generation.load(Ordering::Acquire) == generation {
            std::hint::spin_loop();
            thread::yield_now();
        }
    }

    pub fn remove_thread(&self) {
        let mut state = self.state.lock();
        state.participants = state.participants.saturating_sub(1);
        if state.waiting > 0 && state.waiting >= state.participants {
            state.waiting = 0;
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }
}

// ── Thread group ────────────────────────────────────────────────────────────

type Worker<'scope> =
    Box<dyn FnOnce(&SpinBarrier) -> Result<TestStatus, CtsError> + Send + 'scope>;

/// Workers run on scoped threads so they can borrow the device, queues and
/// pipeline cache of the instance that owns the group.
pub struct ThreadGroup<'scope> {
    workers: Vec<Worker<'scope>>,
}

impl<'scope> ThreadGroup<'scope> {
    pub fn new() -> Self {
        Self {
            workers: Vec::new(),
        }
    }

    pub fn add<F>(&mut self, worker: F)
    where
        F: FnOnce(&SpinBarrier) -> Result<TestStatus, CtsError> + Send + 'scope,
    {
        self.workers.push(Box::new(worker));
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start every worker, wait for all of them and merge their verdicts.
    /// A worker that panics is recorded as a failure.
    pub fn run(self) -> TestStatus {
        let barrier = SpinBarrier::new(self.workers.len());
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, TestStatus)>();

        let mut results = thread::scope(|scope| {
            for (index, worker) in self.workers.into_iter().enumerate() {
                let worker_tx = tx.clone();
                let barrier = &barrier;
                let spawned = thread::Builder::new()
                    .name(format!("cts-worker-{}", index))
                    .spawn_scoped(scope, move || {
                        let status = run_worker(worker, barrier);
                        barrier.remove_thread();
                        let _ = worker_tx.send((index, status));
                    });
                if let Err(e) = spawned {
                    barrier.remove_thread();
                    let _ = tx.send((index, TestStatus::fail(format!("failed to spawn thread: {}", e))));
                }
            }
            drop(tx);
            rx.iter().collect::<Vec<_>>()
        });
        results.sort_by_key(|(index, _)| *index);

        let collector = ResultCollector::new();
        for (index, status) in results {
            debug!("worker {} finished: {:?}", index, status.code);
            collector.add_status(status);
        }
        collector.get_result()
    }
}

impl Default for ThreadGroup<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn run_worker(worker: Worker<'_>, barrier: &SpinBarrier) -> TestStatus {
    match panic::catch_unwind(AssertUnwindSafe(|| worker(barrier))) {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => match TestStatus::from(err) {
            s if s.code == StatusCode::InternalError => TestStatus::fail(s.description),
            s => s,
        },
        Err(payload) => {
            warn!("worker panicked: {}", panic_message(payload.as_ref()));
            TestStatus::fail("Exception")
        }
    }
}

/// Worker thread count for a machine with `cores` logical CPUs.
pub fn stress_thread_count(cores: usize) -> usize {
    cores.clamp(4, 32)
}
