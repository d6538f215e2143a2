//! Revocable handles to pipeline output
//!
//! A [`ResultHandle`] is the only thing callers ever hold onto after a run:
//! either the encoded processed image or a fallback pointing back at the
//! original locator. Handles release their resource when dropped (RAII), so
//! attaching one to a component's lifetime is enough to guarantee cleanup on
//! every exit path. Live counts, process-wide and per owner, make leaks
//! observable.

use crate::types::ImageLocator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static LIVE_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// What a handle refers to
#[derive(Debug, PartialEq, Eq)]
pub enum HandleContent<'a> {
    /// Encoded PNG bytes with the background removed
    Processed(&'a [u8]),
    /// The untouched original locator; shown when the pipeline failed
    Fallback(&'a ImageLocator),
}

#[derive(Debug)]
enum Payload {
    Processed { bytes: Vec<u8> },
    Fallback { locator: ImageLocator },
}

/// Revocable reference to one pipeline result
///
/// Not clonable: exactly one owner is responsible for the release. Dropping
/// the handle releases it; [`ResultHandle::release`] does the same
/// explicitly.
#[derive(Debug)]
pub struct ResultHandle {
    payload: Payload,
    /// Owner-scoped live counter, attached by whoever hands the handle out
    tracker: Option<Arc<AtomicUsize>>,
}

impl ResultHandle {
    pub(crate) fn processed(bytes: Vec<u8>) -> Self {
        LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
        Self {
            payload: Payload::Processed { bytes },
            tracker: None,
        }
    }

    pub(crate) fn fallback(locator: ImageLocator) -> Self {
        LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
        Self {
            payload: Payload::Fallback { locator },
            tracker: None,
        }
    }

    /// Attach an owner-scoped counter; incremented now, decremented on
    /// release
    pub(crate) fn with_tracker(mut self, tracker: Arc<AtomicUsize>) -> Self {
        tracker.fetch_add(1, Ordering::SeqCst);
        self.tracker = Some(tracker);
        self
    }

    /// Whether this handle carries a processed image rather than the
    /// fallback to the original; the UI layer keys its processing
    /// indicator off this
    #[must_use]
    pub fn is_processed(&self) -> bool {
        matches!(self.payload, Payload::Processed { .. })
    }

    /// Borrow the content for rendering
    #[must_use]
    pub fn content(&self) -> HandleContent<'_> {
        match &self.payload {
            Payload::Processed { bytes } => HandleContent::Processed(bytes),
            Payload::Fallback { locator } => HandleContent::Fallback(locator),
        }
    }

    /// Encoded bytes, if this is a processed result
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Processed { bytes } => Some(bytes),
            Payload::Fallback { .. } => None,
        }
    }

    /// The original locator, if this is a fallback result
    #[must_use]
    pub fn fallback_locator(&self) -> Option<&ImageLocator> {
        match &self.payload {
            Payload::Fallback { locator } => Some(locator),
            Payload::Processed { .. } => None,
        }
    }

    /// Release the handle and its resource now
    ///
    /// Equivalent to dropping it; provided so call sites can make the
    /// release visible.
    pub fn release(self) {
        drop(self);
    }

    /// Number of handles currently alive in this process
    #[must_use]
    pub fn live_count() -> usize {
        LIVE_HANDLES.load(Ordering::SeqCst)
    }
}

impl Drop for ResultHandle {
    fn drop(&mut self) {
        LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
        if let Some(tracker) = &self.tracker {
            tracker.fetch_sub(1, Ordering::SeqCst);
        }
        log::trace!(
            "Released {} result handle",
            if self.is_processed() { "processed" } else { "fallback" }
        );
    }
}
