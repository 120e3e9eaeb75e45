//! Broadcast of replica updates plus a collector channel back to the
//! coordinator.
//!
//! Every update published by one party is delivered to the mailbox of every
//! *other* worker. Owners acknowledge each message after applying it, which
//! lets [`ResultBus::wait_results_update`] act as a hard barrier: once it
//! returns, every update sent before the call is visible in every replica.

use crate::signal::PendingCounter;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sender of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The coordinating thread; its updates reach every worker.
    Coordinator,
    /// A worker; its updates reach every worker except itself.
    Worker(usize),
}

/// Item travelling on the collector channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected<C> {
    Item(C),
    /// Terminates the collector loop.
    Poison,
}

#[derive(Debug)]
struct Slot<M> {
    tx: Sender<M>,
    rx: Receiver<M>,
    pending: Arc<PendingCounter>,
}

#[derive(Debug)]
struct BusInner<M, C> {
    slots: Vec<Slot<M>>,
    collector_tx: Sender<Collected<C>>,
    collector_rx: Receiver<Collected<C>>,
    collector_pending: Arc<PendingCounter>,
}

#[derive(Debug)]
pub struct ResultBus<M, C> {
    inner: Arc<BusInner<M, C>>,
}

impl<M, C> Clone for ResultBus<M, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Clone, C> ResultBus<M, C> {
    pub fn new(workers: usize) -> Self {
        let slots = (0..workers)
            .map(|_| {
                let (tx, rx) = unbounded();
                Slot {
                    tx,
                    rx,
                    pending: Arc::new(PendingCounter::new()),
                }
            })
            .collect();
        let (collector_tx, collector_rx) = unbounded();
        Self {
            inner: Arc::new(BusInner {
                slots,
                collector_tx,
                collector_rx,
                collector_pending: Arc::new(PendingCounter::new()),
            }),
        }
    }

    pub fn workers(&self) -> usize {
        self.inner.slots.len()
    }

    /// Deliver `msg` to every mailbox except the sender's own.
    pub fn broadcast(&self, origin: Origin, msg: M) -> crate::Result<()> {
        for (id, slot) in self.inner.slots.iter().enumerate() {
            if origin == Origin::Worker(id) {
                continue;
            }
            slot.pending.add(1);
            if slot.tx.send(msg.clone()).is_err() {
                slot.pending.done();
                return Err(crate::Error::ChannelClosed(format!("mailbox {}", id)));
            }
        }
        Ok(())
    }

    /// Hand an item to the coordinator's collector.
    pub fn collect(&self, item: C) -> crate::Result<()> {
        self.send_collected(Collected::Item(item))
    }

    /// Ask the collector loop to stop after draining what precedes the pill.
    pub fn poison_collector(&self) -> crate::Result<()> {
        self.send_collected(Collected::Poison)
    }

    fn send_collected(&self, item: Collected<C>) -> crate::Result<()> {
        let inner = &self.inner;
        inner.collector_pending.add(1);
        inner.collector_tx.send(item).map_err(|_| {
            inner.collector_pending.done();
            crate::Error::ChannelClosed("collector".to_string())
        })
    }

    /// Receiving end of mailbox `id`, for the worker owning it.
    pub fn mailbox(&self, id: usize) -> crate::Result<Mailbox<M>> {
        let slot = self.inner.slots.get(id).ok_or_else(|| {
            crate::Error::Core(volseg_core::Error::invalid_parameter(format!(
                "no mailbox {} on a bus with {} workers",
                id,
                self.workers()
            )))
        })?;
        Ok(Mailbox {
            id,
            rx: slot.rx.clone(),
            pending: slot.pending.clone(),
        })
    }

    pub fn collector(&self) -> Collector<C> {
        Collector {
            rx: self.inner.collector_rx.clone(),
            pending: self.inner.collector_pending.clone(),
        }
    }

    /// Block until every mailbox was drained and acknowledged by its owner.
    /// Returns `false` if that did not happen within `timeout`.
    pub fn wait_results_update(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.inner.slots.iter().all(|slot| {
            let left = deadline.saturating_duration_since(Instant::now());
            slot.pending.wait_idle(left)
        })
    }

    /// Block until every collected item (and pill) was acknowledged.
    pub fn wait_collected(&self, timeout: Duration) -> bool {
        self.inner.collector_pending.wait_idle(timeout)
    }

    /// Unacknowledged messages summed over all mailboxes.
    pub fn backlog(&self) -> usize {
        self.inner.slots.iter().map(|s| s.pending.pending()).sum()
    }

    /// Monotonic count of acknowledged messages, mailboxes and collector combined.
    pub fn progress(&self) -> u64 {
        self.inner
            .slots
            .iter()
            .map(|s| s.pending.completed())
            .sum::<u64>()
            + self.inner.collector_pending.completed()
    }
}

/// A worker's private inbox of replica updates.
#[derive(Debug)]
pub struct Mailbox<M> {
    id: usize,
    rx: Receiver<M>,
    pending: Arc<PendingCounter>,
}

impl<M> Mailbox<M> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<M> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Confirm that a received message has been applied.
    pub fn ack(&self) {
        self.pending.done();
    }
}

/// The coordinator's end of the collector channel.
#[derive(Debug)]
pub struct Collector<C> {
    rx: Receiver<Collected<C>>,
    pending: Arc<PendingCounter>,
}

impl<C> Collector<C> {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Collected<C>> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn ack(&self) {
        self.pending.done();
    }
}
