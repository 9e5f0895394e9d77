//! Bounded, lossy hand-off between the decoder and the presentation thread
//!
//! Same contract as the kernel ring buffer upstream of it: enqueue never
//! blocks, a full queue drops the new item, and whatever does get through
//! arrives in order exactly once.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Queue full, item discarded
    Dropped,
    /// Receiver gone, item discarded
    Disconnected,
}

/// Sending half that drops instead of waiting
#[derive(Debug, Clone)]
pub struct LossySender<T> {
    tx: Sender<T>,
    dropped: Arc<AtomicU64>,
}

/// Create a lossy channel holding at most `capacity` items
#[must_use]
pub fn lossy_channel<T>(capacity: usize) -> (LossySender<T>, Receiver<T>) {
    let (tx, rx) = bounded(capacity);
    (LossySender { tx, dropped: Arc::new(AtomicU64::new(0)) }, rx)
}

impl<T> LossySender<T> {
    pub fn send(&self, item: T) -> SendOutcome {
        match self.tx.try_send(item) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SendOutcome::Disconnected,
        }
    }

    /// Items discarded because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_drops_newest() {
        let (tx, rx) = lossy_channel(3);
        let outcomes: Vec<_> = (0..5).map(|i| tx.send(i)).collect();

        assert_eq!(&outcomes[..3], &[SendOutcome::Delivered; 3]);
        assert_eq!(&outcomes[3..], &[SendOutcome::Dropped; 2]);
        assert_eq!(tx.dropped(), 2);

        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_interleaved_drain_is_ordered_subsequence() {
        let (tx, rx) = lossy_channel(4);
        let mut received = Vec::new();
        for i in 0..100u32 {
            tx.send(i);
            // Consumer keeps up only every 7th send
            if i % 7 == 0 {
                received.extend(rx.try_iter());
            }
        }
        let dropped = tx.dropped();
        drop(tx);
        received.extend(rx.iter());

        assert!(received.windows(2).all(|w| w[0] < w[1]), "reordered or duplicated");
        assert_eq!(received.len() as u64 + dropped, 100);
        assert!(dropped > 0);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = lossy_channel(1);
        drop(rx);
        assert_eq!(tx.send(1), SendOutcome::Disconnected);
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn test_concurrent_producers_never_duplicate() {
        let (tx, rx) = lossy_channel(64);
        let handles: Vec<_> = (0..4u32)
            .map(|producer| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for seq in 0..1000u32 {
                        tx.send((producer, seq));
                    }
                })
            })
            .collect();
        drop(tx);

        let consumer = std::thread::spawn(move || rx.iter().collect::<Vec<_>>());
        for handle in handles {
            handle.join().unwrap();
        }
        let received = consumer.join().unwrap();

        for producer in 0..4 {
            let seqs: Vec<u32> =
                received.iter().filter(|(p, _)| *p == producer).map(|(_, s)| *s).collect();
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
