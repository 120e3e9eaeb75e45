use crate::signal::PendingCounter;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Shared queue of work awaiting expansion.
///
/// Every pushed item stays in flight until a consumer calls
/// [`task_done`](Self::task_done) for it, so `in_flight() == 0` means the
/// queue is empty *and* nobody is still processing (or about to push
/// follow-up work from) a popped item.
#[derive(Debug)]
pub struct Frontier<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    in_flight: Arc<PendingCounter>,
}

impl<T> Clone for Frontier<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<T> Default for Frontier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Frontier<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            in_flight: Arc::new(PendingCounter::new()),
        }
    }

    pub fn push(&self, item: T) -> crate::Result<()> {
        self.in_flight.add(1);
        self.tx.send(item).map_err(|_| {
            self.in_flight.done();
            crate::Error::ChannelClosed("frontier".to_string())
        })
    }

    /// Pop the next item, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Mark one previously popped item as fully processed.
    pub fn task_done(&self) {
        self.in_flight.done();
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.pending()
    }

    /// Monotonic count of completed items.
    pub fn progress(&self) -> u64 {
        self.in_flight.completed()
    }

    /// Block until every pushed item was completed or `timeout` elapses.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        self.in_flight.wait_idle(timeout)
    }
}
