//! Concurrent batch dispatcher.
//!
//! A run enqueues one batch of contacts and starts a fixed pool of tokio
//! workers over it. Each worker claims one task at a time, delivers it with
//! bounded retries and linear backoff, records the outcome, then idles a
//! random interval before its next claim so outbound volume stays throttled.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::contacts::Contacts;
use crate::send::identity::SenderRotation;
use crate::send::links::LinkBuilder;
use crate::send::mailer::Mailer;
use crate::send::queue::{ContactQueue, SendTask};
use crate::send::stats::{DeliveryOutcome, RunStatistics, StatsRecorder};
use crate::send::template::MessageTemplate;
use crate::send::token::TrackingToken;
use crate::shutdown::Shutdown;

/// Timing and retry knobs for a run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Idle range between two sends of one worker (min, max)
    pub send_delay: (Duration, Duration),
    /// Attempts per task, at least one
    pub max_retries: u32,
    /// Backoff after failed attempt `n` is `retry_backoff * n`, saturating
    pub retry_backoff: Duration,
    /// How long a worker waits for a task before exiting
    pub pull_timeout: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            send_delay: config.send_delay(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            pull_timeout: Duration::from_millis(config.queue_pull_timeout_ms),
        }
    }
}

struct DispatchContext<M> {
    mailer: M,
    rotation: SenderRotation,
    template: MessageTemplate,
    links: LinkBuilder,
    settings: DispatchSettings,
    shutdown: Shutdown,
}

/// Sends one templated, tracked message per contact.
pub struct Dispatcher<M> {
    ctx: Arc<DispatchContext<M>>,
}

impl<M: Mailer> Dispatcher<M> {
    pub fn new(
        mailer: M,
        rotation: SenderRotation,
        template: MessageTemplate,
        links: LinkBuilder,
        settings: DispatchSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            ctx: Arc::new(DispatchContext {
                mailer,
                rotation,
                template,
                links,
                settings,
                shutdown,
            }),
        }
    }

    /// Send to the first `batch_size` contacts using `concurrency` workers.
    ///
    /// Returns once every worker has exited and every enqueued task has
    /// reached a terminal outcome.
    pub async fn run(&self, contacts: &Contacts, batch_size: usize, concurrency: usize) -> RunStatistics {
        let tasks: Vec<SendTask> = contacts
            .iter()
            .take(batch_size)
            .enumerate()
            .map(|(position, contact)| SendTask {
                position,
                sender: self.ctx.rotation.identity_for(position),
                recipient: contact.clone(),
            })
            .collect();

        let queue = Arc::new(ContactQueue::filled(tasks));
        let stats = Arc::new(StatsRecorder::new(queue.enqueued() as u64));
        let concurrency = concurrency.max(1);

        info!(
            available = contacts.len(),
            enqueued = queue.enqueued(),
            senders = self.ctx.rotation.len(),
            concurrency = concurrency,
            "batch_enqueued"
        );

        let workers: Vec<_> = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&self.ctx),
                    Arc::clone(&queue),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        for (worker_id, result) in futures::future::join_all(workers).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(worker_id = worker_id, error = %e, "worker_aborted");
            }
        }

        // Only reachable after shutdown: tasks nobody claimed.
        let unclaimed = queue.drain_unclaimed().await;
        if !unclaimed.is_empty() {
            warn!(unclaimed = unclaimed.len(), "batch_tasks_skipped");
        }
        for _ in unclaimed {
            stats.record(DeliveryOutcome::Cancelled { attempts: 0 });
            queue.task_done();
        }

        queue.join().await;

        let result = stats.snapshot();
        info!(
            sent = result.sent,
            failed = result.failed,
            retries = result.retries,
            skipped = result.skipped,
            total = result.total,
            "batch_complete"
        );
        result
    }
}

/// A task a worker has pulled and not yet finished.
///
/// Dropping it always marks the task done, so `join` cannot hang. If delivery
/// panicked before an outcome was recorded, the task is counted as failed.
struct Claimed<'a> {
    queue: &'a ContactQueue,
    stats: &'a StatsRecorder,
    worker_id: usize,
    position: usize,
    recorded: bool,
}

impl<'a> Claimed<'a> {
    fn new(queue: &'a ContactQueue, stats: &'a StatsRecorder, worker_id: usize, position: usize) -> Self {
        Self {
            queue,
            stats,
            worker_id,
            position,
            recorded: false,
        }
    }

    fn finish(mut self, outcome: DeliveryOutcome) {
        self.stats.record(outcome);
        self.recorded = true;
    }
}

impl Drop for Claimed<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            error!(worker_id = self.worker_id, position = self.position, "email_delivery_aborted");
            self.stats.record(DeliveryOutcome::Failed { attempts: 0 });
        }
        self.queue.task_done();
    }
}

/// Backoff after failed attempt `attempt`, saturating instead of overflowing.
fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).unwrap_or(Duration::MAX)
}

async fn worker_loop<M: Mailer>(
    worker_id: usize,
    ctx: Arc<DispatchContext<M>>,
    queue: Arc<ContactQueue>,
    stats: Arc<StatsRecorder>,
) {
    info!(worker_id = worker_id, "worker_started");

    loop {
        if ctx.shutdown.is_triggered() {
            info!(worker_id = worker_id, reason = "shutdown", "worker_stopping");
            break;
        }

        let Some(task) = queue.pull(ctx.settings.pull_timeout).await else {
            info!(worker_id = worker_id, reason = "queue_drained", "worker_stopping");
            break;
        };

        let claimed = Claimed::new(&queue, &stats, worker_id, task.position);
        let outcome = deliver(&ctx, worker_id, &task).await;
        claimed.finish(outcome);

        let delay = {
            let (min, max) = ctx.settings.send_delay;
            if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            }
        };

        tokio::select! {
            _ = ctx.shutdown.triggered() => {}
            _ = sleep(delay) => {}
        }
    }
}

/// Deliver one task, retrying failed attempts with linear backoff.
///
/// One token is minted per task and reused across its attempts.
async fn deliver<M: Mailer>(ctx: &DispatchContext<M>, worker_id: usize, task: &SendTask) -> DeliveryOutcome {
    let max_attempts = ctx.settings.max_retries.max(1);
    let token = TrackingToken::mint();
    let links = ctx.links.links(&token, &task.recipient.email);
    let message = ctx
        .template
        .render(&task.sender, &task.recipient, &links, ctx.links.destination());

    for attempt in 1..=max_attempts {
        if ctx.shutdown.is_triggered() {
            warn!(
                worker_id = worker_id,
                position = task.position,
                recipient = %task.recipient.email,
                attempt = attempt,
                "email_send_cancelled"
            );
            return DeliveryOutcome::Cancelled { attempts: attempt - 1 };
        }

        match ctx.mailer.send(&task.sender, &message).await {
            Ok(()) => {
                info!(
                    worker_id = worker_id,
                    position = task.position,
                    recipient = %task.recipient.email,
                    sender = %task.sender.address(),
                    tracking_id = %token,
                    attempt = attempt,
                    "email_sent"
                );
                return DeliveryOutcome::Delivered { attempts: attempt };
            }
            Err(e) => {
                warn!(
                    worker_id = worker_id,
                    position = task.position,
                    recipient = %task.recipient.email,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "email_send_failed"
                );
            }
        }

        if attempt < max_attempts {
            let backoff = backoff_for(ctx.settings.retry_backoff, attempt);
            tokio::select! {
                _ = ctx.shutdown.triggered() => {
                    warn!(
                        worker_id = worker_id,
                        position = task.position,
                        recipient = %task.recipient.email,
                        attempt = attempt,
                        "email_retry_cancelled"
                    );
                    return DeliveryOutcome::Cancelled { attempts: attempt };
                }
                _ = sleep(backoff) => {}
            }
        }
    }

    error!(
        worker_id = worker_id,
        position = task.position,
        recipient = %task.recipient.email,
        attempts = max_attempts,
        "email_delivery_failed"
    );
    DeliveryOutcome::Failed { attempts: max_attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::sync::Mutex;

    use url::Url;

    use crate::error::SendError;
    use crate::send::identity::SenderIdentity;
    use crate::send::template::OutgoingMessage;

    /// In-memory mailer that fails each recipient a scripted number of times.
    #[derive(Default)]
    struct ScriptedMailer {
        failures: Mutex<HashMap<String, u32>>,
        attempts: Mutex<Vec<(String, String)>>,
        delivered: Mutex<Vec<(String, OutgoingMessage)>>,
        latency: Duration,
        panic_for: Option<String>,
    }

    impl ScriptedMailer {
        fn failing(recipient: &str, times: u32) -> Self {
            let mailer = Self::default();
            mailer.failures.lock().unwrap().insert(recipient.to_string(), times);
            mailer
        }

        fn delivered(&self) -> Vec<(String, OutgoingMessage)> {
            self.delivered.lock().unwrap().clone()
        }

        fn attempts_for(&self, recipient: &str) -> usize {
            self.attempts.lock().unwrap().iter().filter(|(_, to)| to == recipient).count()
        }
    }

    impl Mailer for ScriptedMailer {
        fn send(
            &self,
            sender: &SenderIdentity,
            message: &OutgoingMessage,
        ) -> impl Future<Output = Result<(), SendError>> + Send {
            async move {
                if self.panic_for.as_deref() == Some(message.recipient.as_str()) {
                    panic!("mailer crashed sending to {}", message.recipient);
                }

                self.attempts
                    .lock()
                    .unwrap()
                    .push((sender.address().to_string(), message.recipient.clone()));

                if !self.latency.is_zero() {
                    sleep(self.latency).await;
                }

                let fail = {
                    let mut failures = self.failures.lock().unwrap();
                    match failures.get_mut(&message.recipient) {
                        Some(left) if *left > 0 => {
                            *left -= 1;
                            true
                        }
                        _ => false,
                    }
                };
                if fail {
                    return Err(SendError::Transport("scripted failure".to_string()));
                }

                self.delivered
                    .lock()
                    .unwrap()
                    .push((sender.address().to_string(), message.clone()));
                Ok(())
            }
        }
    }

    fn settings(max_retries: u32, retry_backoff: Duration) -> DispatchSettings {
        DispatchSettings {
            send_delay: (Duration::ZERO, Duration::ZERO),
            max_retries,
            retry_backoff,
            pull_timeout: Duration::from_millis(50),
        }
    }

    fn dispatcher(
        mailer: Arc<ScriptedMailer>,
        senders: &[&str],
        settings: DispatchSettings,
        shutdown: Shutdown,
    ) -> Dispatcher<Arc<ScriptedMailer>> {
        let rotation = SenderRotation::new(
            senders.iter().map(|s| SenderIdentity::new(*s, "pw")).collect(),
        )
        .unwrap();
        Dispatcher::new(
            mailer,
            rotation,
            MessageTemplate::with_default_body("Hello"),
            LinkBuilder::new("http://track.example.com", "https://cv.example.com").unwrap(),
            settings,
            shutdown,
        )
    }

    fn contacts(n: usize) -> Contacts {
        (0..n).map(|i| (format!("user{}@corp.com", i), format!("User {}", i))).collect()
    }

    /// All (url, id, email) query triples of tracking links found in a body.
    fn tracking_urls(body: &str) -> Vec<(String, String, String)> {
        let doc = scraper::Html::parse_document(body);
        let selector = scraper::Selector::parse("img[src], a[href]").unwrap();
        doc.select(&selector)
            .filter_map(|el| el.value().attr("src").or_else(|| el.value().attr("href")))
            .filter_map(|raw| Url::parse(raw).ok())
            .filter(|url| url.host_str() == Some("track.example.com"))
            .map(|url| {
                let param = |key: &str| {
                    url.query_pairs()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.into_owned())
                        .unwrap_or_default()
                };
                (url.path().to_string(), param("id"), param("email"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_succeed_first_attempt() {
        let mailer = Arc::new(ScriptedMailer::default());
        let d = dispatcher(Arc::clone(&mailer), &["me@mail.com"], settings(3, Duration::ZERO), Shutdown::new());

        let stats = d.run(&contacts(3), 50, 2).await;

        assert_eq!(
            stats,
            RunStatistics { sent: 3, failed: 0, retries: 0, skipped: 0, total: 3 }
        );

        let delivered = mailer.delivered();
        assert_eq!(delivered.len(), 3);

        let mut tokens = HashSet::new();
        for (_, message) in &delivered {
            let urls = tracking_urls(&message.html_body);
            assert_eq!(urls.len(), 2, "one pixel and one click url per message");
            let paths: HashSet<&str> = urls.iter().map(|(p, _, _)| p.as_str()).collect();
            assert_eq!(paths, HashSet::from(["/pixel", "/redirect"]));
            assert_eq!(urls[0].1, urls[1].1, "both urls share one token");
            assert!(urls.iter().all(|(_, _, email)| email == &message.recipient));
            tokens.insert(urls[0].1.clone());
        }
        assert_eq!(tokens.len(), 3, "every message carries a distinct token");
    }

    #[tokio::test]
    async fn test_batch_size_caps_enqueue_and_rotation_by_position() {
        let mailer = Arc::new(ScriptedMailer::default());
        let d = dispatcher(
            Arc::clone(&mailer),
            &["a@mail.com", "b@mail.com"],
            settings(1, Duration::ZERO),
            Shutdown::new(),
        );

        let stats = d.run(&contacts(5), 3, 1).await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.sent, 3);

        let pairs: Vec<(String, String)> = mailer
            .delivered()
            .into_iter()
            .map(|(sender, m)| (sender, m.recipient))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a@mail.com".to_string(), "user0@corp.com".to_string()),
                ("b@mail.com".to_string(), "user1@corp.com".to_string()),
                ("a@mail.com".to_string(), "user2@corp.com".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_then_success_counts_retries() {
        let mailer = Arc::new(ScriptedMailer::failing("user0@corp.com", 2));
        let d = dispatcher(Arc::clone(&mailer), &["me@mail.com"], settings(3, Duration::ZERO), Shutdown::new());

        let stats = d.run(&contacts(2), 50, 2).await;

        assert_eq!(
            stats,
            RunStatistics { sent: 2, failed: 0, retries: 2, skipped: 0, total: 2 }
        );
        assert_eq!(mailer.attempts_for("user0@corp.com"), 3);

        // Retries reuse the task's token.
        let delivered = mailer.delivered();
        let (_, message) = delivered.iter().find(|(_, m)| m.recipient == "user0@corp.com").unwrap();
        assert_eq!(tracking_urls(&message.html_body).len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_one_failure() {
        let mailer = Arc::new(ScriptedMailer::failing("user1@corp.com", 10));
        let d = dispatcher(Arc::clone(&mailer), &["me@mail.com"], settings(3, Duration::ZERO), Shutdown::new());

        let stats = d.run(&contacts(3), 50, 2).await;

        assert_eq!(
            stats,
            RunStatistics { sent: 2, failed: 1, retries: 0, skipped: 0, total: 3 }
        );
        assert_eq!(stats.sent + stats.failed, stats.total);
        assert_eq!(mailer.attempts_for("user1@corp.com"), 3);
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_stops_retries_and_pulls() {
        let mailer = Arc::new(ScriptedMailer::failing("user0@corp.com", 10));
        let shutdown = Shutdown::new();
        let d = dispatcher(
            Arc::clone(&mailer),
            &["me@mail.com"],
            settings(5, Duration::from_secs(30)),
            shutdown.clone(),
        );

        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(100)).await;
                shutdown.trigger();
            })
        };

        let stats = tokio::time::timeout(Duration::from_secs(5), d.run(&contacts(3), 50, 1))
            .await
            .expect("run should stop promptly after shutdown");
        trigger.await.unwrap();

        assert_eq!(mailer.attempts_for("user0@corp.com"), 1);
        assert_eq!(mailer.attempts_for("user1@corp.com"), 0);
        assert_eq!(mailer.attempts_for("user2@corp.com"), 0);
        assert_eq!(
            stats,
            RunStatistics { sent: 0, failed: 0, retries: 0, skipped: 3, total: 3 }
        );
    }

    #[tokio::test]
    async fn test_in_flight_send_completes_after_shutdown() {
        let mailer = Arc::new(ScriptedMailer {
            latency: Duration::from_millis(200),
            ..ScriptedMailer::default()
        });
        let shutdown = Shutdown::new();
        let d = dispatcher(Arc::clone(&mailer), &["me@mail.com"], settings(3, Duration::ZERO), shutdown.clone());

        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(50)).await;
                shutdown.trigger();
            })
        };

        let stats = d.run(&contacts(4), 50, 2).await;
        trigger.await.unwrap();

        // Both workers were mid-send when shutdown fired; those sends finish.
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.sent + stats.failed + stats.skipped, stats.total);
        assert_eq!(mailer.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_send_counts_as_failure() {
        let mailer = Arc::new(ScriptedMailer {
            panic_for: Some("user1@corp.com".to_string()),
            ..ScriptedMailer::default()
        });
        let d = dispatcher(Arc::clone(&mailer), &["me@mail.com"], settings(3, Duration::ZERO), Shutdown::new());

        let stats = tokio::time::timeout(Duration::from_secs(5), d.run(&contacts(3), 50, 2))
            .await
            .expect("run should finish even though one worker panicked");

        assert_eq!(
            stats,
            RunStatistics { sent: 2, failed: 1, retries: 0, skipped: 0, total: 3 }
        );
        assert_eq!(stats.sent + stats.failed + stats.skipped, stats.total);
        assert_eq!(mailer.attempts_for("user1@corp.com"), 0);
    }

    #[test]
    fn test_backoff_grows_linearly_and_saturates() {
        assert_eq!(backoff_for(Duration::from_secs(5), 1), Duration::from_secs(5));
        assert_eq!(backoff_for(Duration::from_secs(5), 3), Duration::from_secs(15));
        assert_eq!(backoff_for(Duration::MAX, 2), Duration::MAX);
        assert_eq!(backoff_for(Duration::from_secs(u64::MAX), 4), Duration::MAX);
    }

    #[tokio::test]
    async fn test_huge_backoff_still_cancellable() {
        let mailer = Arc::new(ScriptedMailer::failing("user0@corp.com", 10));
        let shutdown = Shutdown::new();
        let d = dispatcher(
            Arc::clone(&mailer),
            &["me@mail.com"],
            settings(4, Duration::from_secs(u64::MAX)),
            shutdown.clone(),
        );

        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(100)).await;
                shutdown.trigger();
            })
        };

        let stats = tokio::time::timeout(Duration::from_secs(5), d.run(&contacts(1), 50, 1))
            .await
            .expect("run should stop promptly after shutdown");
        trigger.await.unwrap();

        assert_eq!(mailer.attempts_for("user0@corp.com"), 1);
        assert_eq!(stats.skipped, 1);
    }
}
