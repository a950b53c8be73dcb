use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::overlays::OverlayHandle;

use super::event::OverlayEvent;

/// Per-overlay FIFO of events waiting to be polled.
#[derive(Default)]
pub struct EventQueues {
    queues: Mutex<HashMap<OverlayHandle, VecDeque<OverlayEvent>>>,
}

impl EventQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `handle` a target for [`EventQueues::broadcast`].
    pub fn open(&self, handle: OverlayHandle) {
        self.queues.lock().entry(handle).or_default();
    }

    /// Drops the queue and anything still pending in it.
    pub fn close(&self, handle: OverlayHandle) {
        self.queues.lock().remove(&handle);
    }

    pub fn push(&self, handle: OverlayHandle, event: OverlayEvent) {
        self.queues
            .lock()
            .entry(handle)
            .or_default()
            .push_back(event);
    }

    /// Queues `event` on every open overlay.
    pub fn broadcast(&self, event: OverlayEvent) {
        for queue in self.queues.lock().values_mut() {
            queue.push_back(event);
        }
    }

    pub fn pop(&self, handle: OverlayHandle) -> Option<OverlayEvent> {
        self.queues.lock().get_mut(&handle)?.pop_front()
    }

    pub fn pending(&self, handle: OverlayHandle) -> usize {
        self.queues.lock().get(&handle).map_or(0, VecDeque::len)
    }
}
