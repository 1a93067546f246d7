//! Cross-thread dispatch queue.
//!
//! Design principles:
//! - Many producers (native callback threads), exactly one consumer
//! - `enqueue` never blocks and never runs the action inline
//! - One drain per tick, bounded to the batch present when the tick starts
//! - A failing action is reported and the rest of the batch still runs

use crate::error::{BridgeError, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

/// A unit of work posted from a producer thread.
pub type PendingCallback = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is running a drained action.
pub fn on_dispatch_thread() -> bool {
    DRAINING.get()
}

/// Marks the current thread as draining; cleared on drop, also when an
/// action unwinds.
struct DrainGuard;

impl DrainGuard {
    fn enter() -> Self {
        DRAINING.set(true);
        DrainGuard
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.set(false);
    }
}

/// Result of one drain tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions that ran to completion.
    pub ran: usize,
    /// Actions that returned an error or panicked.
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.ran + self.failed
    }
}

/// Multi-producer / single-consumer queue of pending callbacks.
pub struct DispatchQueue {
    tx: Sender<PendingCallback>,
    rx: Receiver<PendingCallback>,
    consumer: OnceLock<ThreadId>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            consumer: OnceLock::new(),
        }
    }

    /// Producer handle for callback threads.
    pub fn producer(&self) -> Producer {
        Producer {
            tx: self.tx.clone(),
        }
    }

    /// Enqueue from any thread.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        // Never fails: the queue holds its own receiver.
        let _ = self.tx.send(Box::new(action));
    }

    /// Actions waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Thread bound as consumer, once the first drain happened.
    pub fn consumer(&self) -> Option<ThreadId> {
        self.consumer.get().copied()
    }

    /// Run every action enqueued before this call, in enqueue order.
    ///
    /// The first thread to drain becomes the designated consumer; draining
    /// from any other thread is refused. Actions enqueued while the batch
    /// runs (including from inside an action) wait for the next tick.
    /// Errors and panics are handed to `on_error` and draining continues.
    pub fn drain_and_run(&self, on_error: &dyn Fn(BridgeError)) -> Result<DrainReport> {
        let current = thread::current().id();
        if *self.consumer.get_or_init(|| current) != current {
            return Err(BridgeError::NotDispatchThread);
        }
        if on_dispatch_thread() {
            return Err(BridgeError::ReentrantDrain);
        }

        // Sends complete before `len` observes them, so the first `batch`
        // messages are exactly the ones enqueued before this point.
        let batch = self.rx.len();
        let mut report = DrainReport::default();
        if batch == 0 {
            return Ok(report);
        }

        let _guard = DrainGuard::enter();
        for _ in 0..batch {
            let Ok(action) = self.rx.try_recv() else {
                break;
            };

            let failure = match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => {
                    Some(BridgeError::HandlerPanicked(panic_message(payload.as_ref())))
                }
            };

            match failure {
                None => report.ran += 1,
                Some(e) => {
                    report.failed += 1;
                    debug!("Drained action failed: {}", e);
                    let reported = panic::catch_unwind(AssertUnwindSafe(|| on_error(e)));
                    if reported.is_err() {
                        error!("Error reporter panicked; continuing drain");
                    }
                }
            }
        }

        Ok(report)
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable enqueue-only handle, safe to move to callback threads.
#[derive(Clone)]
pub struct Producer {
    tx: Sender<PendingCallback>,
}

impl Producer {
    /// Enqueue from any thread. If the queue is gone the action is dropped;
    /// a late callback must not fail its caller.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if self.tx.send(Box::new(action)).is_err() {
            debug!("Dispatch queue closed, dropping callback");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ignore(_: BridgeError) {}

    #[test]
    fn runs_in_order_and_empties() {
        let queue = DispatchQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["A", "B"] {
            let log = log.clone();
            queue.enqueue(move || {
                log.lock().unwrap().push(name);
                Ok(())
            });
        }

        let report = queue.drain_and_run(&ignore).unwrap();
        assert_eq!(report, DrainReport { ran: 2, failed: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn enqueue_during_drain_waits_for_next_tick() {
        let queue = Arc::new(DispatchQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let (q, l) = (queue.clone(), log.clone());
        queue.enqueue(move || {
            l.lock().unwrap().push("A");
            let l2 = l.clone();
            q.enqueue(move || {
                l2.lock().unwrap().push("C");
                Ok(())
            });
            Ok(())
        });

        queue.drain_and_run(&ignore).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A"]);
        assert_eq!(queue.pending(), 1);

        queue.drain_and_run(&ignore).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn failures_are_reported_and_do_not_stop_the_batch() {
        let queue = DispatchQueue::new();
        let ran = Arc::new(Mutex::new(0));
        let errors = Mutex::new(Vec::new());

        queue.enqueue(|| Err(BridgeError::config("boom")));
        queue.enqueue(|| panic!("handler exploded"));
        let r = ran.clone();
        queue.enqueue(move || {
            *r.lock().unwrap() += 1;
            Ok(())
        });

        let report = queue
            .drain_and_run(&|e| errors.lock().unwrap().push(e.to_string()))
            .unwrap();

        assert_eq!(report, DrainReport { ran: 1, failed: 2 });
        assert_eq!(*ran.lock().unwrap(), 1);
        let errors = errors.into_inner().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[1].contains("handler exploded"));
        assert!(!on_dispatch_thread());
    }

    #[test]
    fn per_producer_fifo_across_threads() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = DispatchQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let producer = queue.producer();
                let seen = seen.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let seen = seen.clone();
                        producer.enqueue(move || {
                            seen.lock().unwrap().push((p, i));
                            Ok(())
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let report = queue.drain_and_run(&ignore).unwrap();
        assert_eq!(report.ran, PRODUCERS * PER_PRODUCER);

        let seen = seen.lock().unwrap();
        for p in 0..PRODUCERS {
            let order: Vec<usize> = seen
                .iter()
                .filter(|(q, _)| *q == p)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }

    #[test]
    fn only_the_designated_thread_may_drain() {
        let queue = Arc::new(DispatchQueue::new());
        queue.drain_and_run(&ignore).unwrap();

        let q = queue.clone();
        let result = thread::spawn(move || q.drain_and_run(&ignore)).join().unwrap();
        assert!(matches!(result, Err(BridgeError::NotDispatchThread)));
    }

    #[test]
    fn drain_inside_an_action_is_refused() {
        let queue = Arc::new(DispatchQueue::new());
        let outcome = Arc::new(Mutex::new(None));

        let (q, o) = (queue.clone(), outcome.clone());
        queue.enqueue(move || {
            *o.lock().unwrap() = Some(matches!(
                q.drain_and_run(&ignore),
                Err(BridgeError::ReentrantDrain)
            ));
            Ok(())
        });
        queue.drain_and_run(&ignore).unwrap();
        assert_eq!(*outcome.lock().unwrap(), Some(true));
    }
}
