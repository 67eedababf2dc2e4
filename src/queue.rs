//! Bounded, coalescing notify queues.
//!
//! Both the worker and the render thread block on one of these. A token
//! means "there is work", not "there are N units of work": pushes against a
//! full queue are dropped, so any number of ready frames collapses into at
//! most [`NOTIFY_QUEUE_DEPTH`] pending wake-ups. A distinguished shutdown
//! token (or queue disconnect) terminates the consumer.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::constants::NOTIFY_QUEUE_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Work,
    Shutdown,
}

pub struct NotifyQueue {
    tx: Sender<Token>,
    rx: Receiver<Token>,
}

impl NotifyQueue {
    pub fn new() -> Self {
        let (tx, rx) = bounded(NOTIFY_QUEUE_DEPTH);
        Self { tx, rx }
    }

    /// Signal that work is available. Returns false if the signal coalesced
    /// into an already-full queue.
    pub fn notify(&self) -> bool {
        self.tx.try_send(Token::Work).is_ok()
    }

    /// Wake a blocked consumer for shutdown. If the queue is full the
    /// pending work tokens will wake it instead; the consumer checks its
    /// running flag on every token.
    pub fn shutdown(&self) {
        match self.tx.try_send(Token::Shutdown) {
            Ok(()) | Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Block until a token arrives. A disconnected queue reads as shutdown.
    pub fn wait(&self) -> Token {
        self.rx.recv().unwrap_or(Token::Shutdown)
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for NotifyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_coalesces_at_depth() {
        let q = NotifyQueue::new();
        assert!(q.notify());
        assert!(q.notify());
        assert!(q.notify());
        // Fourth signal coalesces; queue never grows past the bound.
        assert!(!q.notify());
        assert_eq!(q.pending(), NOTIFY_QUEUE_DEPTH);
    }

    #[test]
    fn test_wait_drains_in_order() {
        let q = NotifyQueue::new();
        q.notify();
        q.shutdown();
        assert_eq!(q.wait(), Token::Work);
        assert_eq!(q.wait(), Token::Shutdown);
    }

    #[test]
    fn test_shutdown_against_full_queue_is_noop() {
        let q = NotifyQueue::new();
        for _ in 0..NOTIFY_QUEUE_DEPTH {
            q.notify();
        }
        q.shutdown();
        assert_eq!(q.pending(), NOTIFY_QUEUE_DEPTH);
        for _ in 0..NOTIFY_QUEUE_DEPTH {
            assert_eq!(q.wait(), Token::Work);
        }
    }

    #[test]
    fn test_wait_unblocks_on_shutdown() {
        let q = std::sync::Arc::new(NotifyQueue::new());
        let waiter = {
            let q = q.clone();
            std::thread::spawn(move || q.wait())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.shutdown();
        assert_eq!(waiter.join().unwrap(), Token::Shutdown);
    }
}
