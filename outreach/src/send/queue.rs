//! Work queue of send tasks, filled once per run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};

use crate::contacts::Contact;
use crate::send::identity::SenderIdentity;

/// One contact paired with the identity that will send to it.
#[derive(Debug, Clone)]
pub struct SendTask {
    /// Position in the batch, which also picked the sender
    pub position: usize,
    pub sender: Arc<SenderIdentity>,
    pub recipient: Contact,
}

/// Bounded queue of send tasks with completion tracking.
///
/// Every pulled task must be reported through [`ContactQueue::task_done`];
/// [`ContactQueue::join`] resolves once all enqueued tasks have been.
pub struct ContactQueue {
    receiver: Mutex<mpsc::Receiver<SendTask>>,
    outstanding: watch::Sender<usize>,
    enqueued: usize,
}

impl ContactQueue {
    /// Create a queue holding exactly `tasks`. No more can be added.
    pub fn filled(tasks: Vec<SendTask>) -> Self {
        let enqueued = tasks.len();
        let (tx, rx) = mpsc::channel(enqueued.max(1));
        for task in tasks {
            // Capacity equals the task count, so this cannot fail.
            let _ = tx.try_send(task);
        }

        Self {
            receiver: Mutex::new(rx),
            outstanding: watch::channel(enqueued).0,
            enqueued,
        }
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Claim the next task, waiting at most `wait`.
    ///
    /// `None` means the queue is drained; callers treat it as a normal exit.
    pub async fn pull(&self, wait: Duration) -> Option<SendTask> {
        tokio::time::timeout(wait, async { self.receiver.lock().await.recv().await })
            .await
            .ok()
            .flatten()
    }

    /// Take every unclaimed task without waiting.
    pub async fn drain_unclaimed(&self) -> Vec<SendTask> {
        let mut receiver = self.receiver.lock().await;
        let mut left = Vec::new();
        while let Ok(task) = receiver.try_recv() {
            left.push(task);
        }
        left
    }

    /// Mark one claimed task as finished.
    pub fn task_done(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until every enqueued task has been marked done.
    pub async fn join(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
