//! Producer/consumer boundary between a raw input-event reader thread
//! and the main loop.
//!
//! The reader thread enqueues events under a lock and schedules one idle
//! wakeup; the main loop drains in order. Duplicate motion/touch-update
//! events from the same device are coalesced, the most recent wins, so a
//! congested queue never grows with stale positions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

use crate::event::Event;

#[derive(Default)]
struct QueueInner {
    events: VecDeque<Event>,
    /// An idle wakeup is pending; avoids flooding the main loop.
    wakeup_pending: bool,
}

/// Thread-safe event queue with motion coalescing.
#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event; returns true when the caller should schedule a
    /// main-loop wakeup (at most one is outstanding at a time).
    pub fn push(&self, event: Event) -> bool {
        let mut inner = self.inner.lock().expect("event queue poisoned");

        if event.is_coalescable() {
            // replace an already queued update of the same kind from the
            // same device
            if let Some(existing) = inner.events.iter_mut().rev().find(|e| {
                e.event_type == event.event_type
                    && e.source_device_id == event.source_device_id
                    && e.sequence_id == event.sequence_id
            }) {
                *existing = event;
                let schedule = !inner.wakeup_pending;
                inner.wakeup_pending = true;
                return schedule;
            }
        }

        inner.events.push_back(event);
        let schedule = !inner.wakeup_pending;
        inner.wakeup_pending = true;
        schedule
    }

    /// Drain all queued events in arrival order; clears the pending
    /// wakeup.
    pub fn drain(&self) -> Vec<Event> {
        let mut inner = self.inner.lock().expect("event queue poisoned");
        inner.wakeup_pending = false;
        inner.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Blocking reader of raw events, e.g. an XInput2 connection.
pub trait RawEventRead: Send + 'static {
    /// Block until the next event; `None` ends the reader thread.
    fn read_event(&mut self) -> Option<Event>;
}

/// Dedicated reader thread feeding an [`EventQueue`].
///
/// `wakeup` runs on the reader thread after enqueueing; it must do
/// nothing more than schedule a one-shot idle on the main loop.
pub struct EventSource {
    queue: EventQueue,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventSource {
    pub fn start<R: RawEventRead>(
        mut reader: R,
        wakeup: impl Fn() + Send + 'static,
    ) -> EventSource {
        let queue = EventQueue::new();
        let running = Arc::new(AtomicBool::new(true));

        let thread_queue = queue.clone();
        let thread_running = running.clone();
        let thread = std::thread::spawn(move || {
            while thread_running.load(Ordering::Relaxed) {
                let Some(event) = reader.read_event() else {
                    break;
                };
                if thread_queue.push(event) {
                    wakeup();
                }
            }
            debug!("input event source thread ends");
        });

        EventSource {
            queue,
            running,
            thread: Some(thread),
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Ask the thread to stop; it ends after the next event or reader
    /// EOF.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            // the reader unblocks on EOF/shutdown of its fd
            let _ = thread.join();
        }
    }
}
