//! Delayed follow-up tasks
//!
//! One pending task per message id. Scheduling again for the same id aborts
//! the older task; cancelling is a no-op for ids without a task. Tasks live in
//! memory only and are lost on restart.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use supportchat_shared::MessageId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Tasks {
    next_generation: u64,
    pending: HashMap<MessageId, Pending>,
}

/// Cancellable delayed jobs keyed by message id
#[derive(Clone)]
pub struct FollowUpScheduler {
    delay: Duration,
    tasks: Arc<Mutex<Tasks>>,
}

impl FollowUpScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            tasks: Arc::new(Mutex::new(Tasks::default())),
        }
    }

    /// Run `job` after the configured delay unless cancelled first
    pub async fn schedule<F>(&self, message_id: MessageId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        tasks.next_generation += 1;
        let generation = tasks.next_generation;

        let delay = self.delay;
        let registry = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;

            // Only forget our own entry; a newer schedule may have replaced it
            let mut tasks = registry.lock().await;
            if tasks
                .pending
                .get(&message_id)
                .is_some_and(|p| p.generation == generation)
            {
                tasks.pending.remove(&message_id);
            }
        });

        if let Some(previous) = tasks
            .pending
            .insert(message_id, Pending { generation, handle })
        {
            previous.handle.abort();
            tracing::debug!(message_id = %message_id, "Replaced pending follow-up");
        } else {
            tracing::debug!(message_id = %message_id, delay_secs = delay.as_secs(), "Follow-up scheduled");
        }
    }

    /// Abort pending tasks for the given ids
    pub async fn cancel(&self, message_ids: &[MessageId]) -> usize {
        let mut tasks = self.tasks.lock().await;
        let mut cancelled = 0;
        for id in message_ids {
            if let Some(pending) = tasks.pending.remove(id) {
                pending.handle.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending follow-ups");
        }
        cancelled
    }

    /// Number of tasks still waiting
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_after_delay() {
        let scheduler = FollowUpScheduler::new(Duration::from_secs(600));
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(MessageId(1), counting_job(&runs)).await;

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_job_never_runs() {
        let scheduler = FollowUpScheduler::new(Duration::from_secs(600));
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(MessageId(1), counting_job(&runs)).await;
        assert_eq!(scheduler.cancel(&[MessageId(1), MessageId(2)]).await, 1);

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous_task() {
        let scheduler = FollowUpScheduler::new(Duration::from_secs(10));
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(MessageId(1), counting_job(&runs)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.schedule(MessageId(1), counting_job(&runs)).await;
        assert_eq!(scheduler.pending().await, 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending().await, 0);
    }
}
