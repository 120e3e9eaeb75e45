use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CounterState {
    pending: usize,
    completed: u64,
}

/// Count of outstanding work items with wake-on-zero waiters.
///
/// Producers call [`add`](Self::add) before handing work off and consumers
/// call [`done`](Self::done) once the item is fully processed. Waiters block
/// until the count drops to zero; every transition to zero wakes them.
/// `completed` only grows, so it doubles as a progress generation for stall
/// detection.
#[derive(Debug, Default)]
pub struct PendingCounter {
    state: Mutex<CounterState>,
    zero: Condvar,
}

impl PendingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.state.lock().pending += n;
    }

    pub fn done(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.pending > 0, "done() without matching add()");
        state.pending = state.pending.saturating_sub(1);
        state.completed += 1;
        if state.pending == 0 {
            self.zero.notify_all();
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Block until no work is outstanding or `timeout` elapses.
    /// Returns `true` if the counter reached zero.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pending > 0 {
            if self.zero.wait_until(&mut state, deadline).timed_out() {
                return state.pending == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_idle_when_empty() {
        let c = PendingCounter::new();
        assert!(c.is_idle());
        assert!(c.wait_idle(Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_times_out_while_pending() {
        let c = PendingCounter::new();
        c.add(1);
        assert!(!c.wait_idle(Duration::from_millis(20)));
        c.done();
        assert!(c.wait_idle(Duration::from_millis(1)));
        assert_eq!(c.completed(), 1);
    }

    #[test]
    fn test_waiter_woken_by_other_thread() {
        let c = Arc::new(PendingCounter::new());
        c.add(3);
        let worker = {
            let c = c.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(5));
                    c.done();
                }
            })
        };
        assert!(c.wait_idle(Duration::from_secs(10)));
        worker.join().unwrap();
        assert_eq!(c.pending(), 0);
        assert_eq!(c.completed(), 3);
    }
}
