//! Completion delivery on a single designated context
//!
//! Fetch work runs on the Tokio worker pool, but callbacks handed to the
//! cache must all run on one consumer (typically the presentation loop).
//! A `CompletionContext` is the sending half that work posts to; the
//! `CompletionQueue` is drained by whoever owns that consumer.

use tokio::sync::mpsc;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for posting completions onto the designated context
#[derive(Debug, Clone)]
pub struct CompletionContext {
    sender: mpsc::UnboundedSender<Job>,
}

/// Receiving half; runs posted completions one at a time, in post order
#[derive(Debug)]
pub struct CompletionQueue {
    receiver: mpsc::UnboundedReceiver<Job>,
}

/// Create a connected context/queue pair
#[must_use]
pub fn completion_context() -> (CompletionContext, CompletionQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (CompletionContext { sender }, CompletionQueue { receiver })
}

impl CompletionContext {
    /// Queue `job` for the consumer. Returns false if the queue is gone,
    /// in which case the job is dropped without running.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            warn!("Completion queue closed; dropping completion");
            return false;
        }
        true
    }
}

impl CompletionQueue {
    /// Wait for the next completion and run it.
    /// Returns false once every context handle has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run everything already queued without waiting; returns how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Run completions until every context handle has been dropped
    pub async fn run(mut self) {
        while self.run_next().await {}
    }
}
