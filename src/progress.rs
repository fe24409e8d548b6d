//! The progress channel the orchestrator uses to report pipeline state to
//! the UI thread (or, headlessly, to the terminal). A single bounded,
//! non-blocking SPSC channel carries a tagged event enum; a full channel
//! simply drops the oldest-pending send attempt rather than blocking the
//! worker thread, since progress ticks are advisory.

use std::time::Instant;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum Event {
    FindRunning { done: usize, total: usize },
    FindCompleted { records: usize, start: Instant, end: Instant },
    DupRunning { done: usize, total: usize },
    DupCompleted { groups: usize, start: Instant, end: Instant },
}

pub struct Progress {
    sender: crossbeam_channel::Sender<Event>,
}

impl Progress {
    pub fn channel() -> (Progress, crossbeam_channel::Receiver<Event>) {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        (Progress { sender: tx }, rx)
    }

    /// Sends an event, silently dropping it if the channel is full. The
    /// consumer is expected to drain frequently; a dropped tick just means
    /// a slightly staler progress display, never a correctness issue.
    pub fn send(&self, event: Event) {
        let _ = self.sender.try_send(event);
    }

    pub fn send_running_find(&self, done: usize, total: usize) {
        self.send(Event::FindRunning { done, total });
    }

    pub fn send_running_dup(&self, done: usize, total: usize) {
        self.send(Event::DupRunning { done, total });
    }
}
