//! Per-display-element result ownership
//!
//! A [`Slot`] is the logical identity behind one rendered image: it owns at
//! most one live [`ResultHandle`] at a time and guarantees that the most
//! recently requested locator is the one ultimately rendered. Requesting a
//! new locator aborts the previous in-flight run; if an abandoned run still
//! manages to complete, its handle is released immediately instead of being
//! installed (last-request-wins, not last-completed-wins). Dropping the
//! slot tears everything down.

use crate::handle::ResultHandle;
use crate::pipeline::Pipeline;
use crate::types::ImageLocator;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

#[derive(Default)]
struct SlotState {
    current: Option<ResultHandle>,
    in_flight: Option<InFlight>,
}

/// Owner of one rendering surface's background-removal results
pub struct Slot {
    pipeline: Arc<Pipeline>,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<SlotState>>,
    live: Arc<AtomicUsize>,
}

impl Slot {
    /// Create an empty slot over a shared pipeline
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(SlotState::default())),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Request processing of a locator, superseding any in-flight run
    ///
    /// Returns the join handle of the spawned run; awaiting it is optional
    /// and aborted runs resolve to a `JoinError`. The slot's current handle
    /// is swapped only when the run finishes while still being the newest
    /// request; the handle it replaces is released at that moment.
    pub fn request(&self, locator: ImageLocator) -> JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let pipeline = Arc::clone(&self.pipeline);
        let generation_counter = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let live = Arc::clone(&self.live);

        let task = tokio::spawn(async move {
            let handle = pipeline.process(&locator).await.with_tracker(live);
            install_if_current(&state, &generation_counter, generation, handle);
        });

        // A concurrent request with a later generation may reach the lock
        // before this one does; registration is order-aware so the older
        // run is the one that dies either way
        if !register_in_flight(&self.state, generation, task.abort_handle()) {
            task.abort();
        }
        task
    }

    /// Request a locator and wait for its run to settle
    pub async fn refresh(&self, locator: ImageLocator) {
        // A JoinError here means the run was superseded mid-await; the
        // newer request owns the slot now and there is nothing to do.
        let _ = self.request(locator).await;
    }

    /// Inspect the currently installed handle, if any
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&ResultHandle>) -> R) -> R {
        let guard = self.state.lock().expect("slot state lock poisoned");
        f(guard.current.as_ref())
    }

    /// Number of this slot's handles currently alive; at most 1 outside the
    /// instant a replacement is being installed
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Abort any in-flight run and release the current handle
    pub fn clear(&self) {
        // Invalidate the generation so a run past its last await cannot
        // install after us
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().expect("slot state lock poisoned");
        if let Some(in_flight) = guard.in_flight.take() {
            in_flight.abort.abort();
        }
        if let Some(current) = guard.current.take() {
            current.release();
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Record a spawned run as the slot's in-flight work, aborting the run it
/// displaces
///
/// Returns `false` when a newer generation already registered: the caller's
/// run lost the supersession race before it even started and must be
/// aborted by the caller instead of displacing the newer one.
fn register_in_flight(state: &Mutex<SlotState>, generation: u64, abort: AbortHandle) -> bool {
    let mut guard = state.lock().expect("slot state lock poisoned");
    if let Some(entry) = &guard.in_flight {
        if entry.generation > generation {
            return false;
        }
    }
    if let Some(previous) = guard.in_flight.replace(InFlight { generation, abort }) {
        previous.abort.abort();
    }
    true
}

/// Install a finished run's handle unless a newer request superseded it,
/// releasing whichever handle loses
fn install_if_current(
    state: &Mutex<SlotState>,
    generation_counter: &AtomicU64,
    generation: u64,
    handle: ResultHandle,
) {
    let mut guard = state.lock().expect("slot state lock poisoned");
    if generation_counter.load(Ordering::SeqCst) == generation {
        if let Some(previous) = guard.current.replace(handle) {
            previous.release();
        }
    } else {
        log::debug!("discarding result of superseded run (generation {generation})");
        handle.release();
    }
}
