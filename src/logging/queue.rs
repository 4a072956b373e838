//! Multi-producer record queue feeding the dispatch thread.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use super::types::Record;

/// Messages understood by the dispatch thread.
#[derive(Debug)]
pub(crate) enum Command {
    /// Deliver a record to the sinks.
    Record(Record),
    /// Acknowledge once every earlier command has been handled.
    Flush(Sender<()>),
    /// Stop after the commands already queued ahead of this one.
    Shutdown,
}

/// Unbounded FIFO of records shared by every producer thread.
///
/// Sends never block. There is exactly one consumer, handed out once by
/// [`RecordQueue::take_consumer`].
#[derive(Debug)]
pub struct RecordQueue {
    sender: Sender<Command>,
    receiver: Mutex<Option<Receiver<Command>>>,
    pending: Arc<AtomicUsize>,
}

impl Default for RecordQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue a record. Returns `false` if the consumer is gone.
    pub fn push(&self, record: Record) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.send(Command::Record(record)) {
            true
        } else {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    /// Records enqueued but not yet picked up by the consumer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub(crate) fn send(&self, command: Command) -> bool {
        self.sender.send(command).is_ok()
    }

    /// Hand out the consuming end. Only the first call gets it.
    pub(crate) fn take_consumer(&self) -> Option<QueueConsumer> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(QueueConsumer {
            receiver,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Put back a consumer that never reached a dispatch thread, so a later
    /// [`RecordQueue::take_consumer`] can hand it out again.
    pub(crate) fn restore_consumer(&self, consumer: QueueConsumer) {
        *self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(consumer.receiver);
    }
}

/// The single consuming end of a [`RecordQueue`].
#[derive(Debug)]
pub(crate) struct QueueConsumer {
    receiver: Receiver<Command>,
    pending: Arc<AtomicUsize>,
}

impl QueueConsumer {
    /// Block until the next command arrives.
    ///
    /// Never returns `None` while the queue is alive: the queue itself holds
    /// a sender.
    pub(crate) fn recv(&self) -> Option<Command> {
        let command = self.receiver.recv().ok()?;
        if matches!(command, Command::Record(_)) {
            self.pending.fetch_sub(1, Ordering::Relaxed);
        }
        Some(command)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::logging::types::Level;
    use std::thread;

    fn message(command: Command) -> String {
        match command {
            Command::Record(record) => record.message().to_string(),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn consumer_is_handed_out_once() {
        let queue = RecordQueue::new();
        assert!(queue.take_consumer().is_some());
        assert!(queue.take_consumer().is_none());
    }

    #[test]
    fn restored_consumer_can_be_taken_again() {
        let queue = RecordQueue::new();
        queue.push(Record::new(Level::Info, "kept"));
        let consumer = queue.take_consumer().unwrap();
        queue.restore_consumer(consumer);
        assert_eq!(queue.pending(), 1);

        let consumer = queue.take_consumer().unwrap();
        assert_eq!(message(consumer.recv().unwrap()), "kept");
        assert!(queue.take_consumer().is_none());
    }

    #[test]
    fn records_arrive_in_send_order() {
        let queue = RecordQueue::new();
        for i in 0..5 {
            assert!(queue.push(Record::new(Level::Info, format!("m{i}"))));
        }
        let consumer = queue.take_consumer().unwrap();
        let got: Vec<String> = (0..5).map(|_| message(consumer.recv().unwrap())).collect();
        assert_eq!(got, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn pending_tracks_unconsumed_records() {
        let queue = RecordQueue::new();
        queue.push(Record::new(Level::Info, "a"));
        queue.push(Record::new(Level::Info, "b"));
        assert_eq!(queue.pending(), 2);
        let consumer = queue.take_consumer().unwrap();
        consumer.recv().unwrap();
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn push_after_consumer_dropped_is_rejected() {
        let queue = RecordQueue::new();
        drop(queue.take_consumer());
        assert!(!queue.push(Record::new(Level::Error, "nobody listening")));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn concurrent_producers_keep_per_thread_order() {
        let queue = Arc::new(RecordQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(Record::new(Level::Debug, format!("{t}:{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let consumer = queue.take_consumer().unwrap();
        let mut next = [0_usize; 4];
        for _ in 0..400 {
            let msg = message(consumer.recv().unwrap());
            let (t, i) = msg.split_once(':').unwrap();
            let t: usize = t.parse().unwrap();
            assert_eq!(i.parse::<usize>().unwrap(), next[t]);
            next[t] += 1;
        }
        assert_eq!(next, [100; 4]);
        assert_eq!(queue.pending(), 0);
    }
}
