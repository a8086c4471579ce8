//! Wait-and-deliver workers
//!
//! One worker per accepted request: it waits for the round's random value to
//! appear in the [`RoundResultSource`], then publishes it once on the
//! `"<game>.<walletAddr>"` topic. Workers are spawned onto a [`WorkerPool`]
//! that bounds how many poll the source at once and cancels them all on
//! shutdown. Intake never awaits them.

use crate::{
    config::WorkerConfig,
    errors::{PublishError, WorkerError},
    metrics::BridgeMetrics,
    publisher::Publisher,
    store::RoundResultSource,
};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, Semaphore},
    task::JoinHandle,
    time::{sleep_until, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HEX_DIGITS: &[u8] = b"0123456789abcdef";

/// Length of the diagnostic endpoint's token
pub const TEST_TOKEN_LEN: usize = 8;

/// Everything one worker knows about the request that spawned it
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub box_id: String,
    pub wallet_addr: String,
    pub game: String,
    pub received_at: Instant,
}

impl RequestContext {
    pub fn new(
        game: impl Into<String>,
        box_id: impl Into<String>,
        wallet_addr: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            box_id: box_id.into(),
            wallet_addr: wallet_addr.into(),
            game: game.into(),
            received_at: Instant::now(),
        }
    }

    pub fn topic(&self) -> String {
        delivery_topic(&self.game, &self.wallet_addr)
    }

    fn elapsed_ms(&self) -> u64 {
        self.received_at.elapsed().as_millis() as u64
    }
}

/// Bus topic a game/wallet pair listens on
pub fn delivery_topic(game: &str, wallet_addr: &str) -> String {
    format!("{}.{}", game, wallet_addr)
}

/// Non-cryptographic hex token for connectivity checks
pub fn random_hex_token<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub deadline: Duration,
    pub test_delay: Duration,
    pub max_concurrent_workers: usize,
    pub test_game: String,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            deadline: config.deadline(),
            test_delay: config.test_delay(),
            max_concurrent_workers: config.max_concurrent_workers,
            test_game: config.test_game.clone(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Delivered { topic: String, elapsed: Duration },
    TimedOut { elapsed: Duration },
    PublishFailed { topic: String, error: PublishError },
    Cancelled,
}

/// Wait until `round_id` has a value, the deadline passes, or `cancel` fires.
///
/// The source is re-read on every poll tick and on every insert notification
/// the source offers. One last read happens when the deadline fires.
pub async fn wait_for_round_result(
    source: &dyn RoundResultSource,
    round_id: &str,
    poll_interval: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<String, WorkerError> {
    let started = Instant::now();
    let mut inserted = source.subscribe();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        if let Some(value) = source.get(round_id) {
            return Ok(value);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
            _ = sleep_until(deadline) => {
                return source.get(round_id).ok_or_else(|| WorkerError::RandNumNotFound {
                    box_id: round_id.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            _ = ticker.tick() => {}
            _ = next_insert_of(&mut inserted, round_id) => {}
        }
    }
}

/// Resolves when `round_id` is announced, or when announcements were dropped
/// and the caller should re-read.
async fn next_insert_of(inserted: &mut Option<broadcast::Receiver<String>>, round_id: &str) {
    loop {
        let Some(rx) = inserted.as_mut() else {
            return std::future::pending().await;
        };

        match rx.recv().await {
            Ok(id) if id == round_id => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            // Source went away; polling carries on alone
            Err(broadcast::error::RecvError::Closed) => *inserted = None,
        }
    }
}

/// Bounded, cancellable set of wait-and-deliver workers
#[derive(Clone)]
pub struct WorkerPool {
    source: Arc<dyn RoundResultSource>,
    publisher: Arc<dyn Publisher>,
    settings: WorkerSettings,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    metrics: Arc<BridgeMetrics>,
}

impl WorkerPool {
    pub fn new(
        source: Arc<dyn RoundResultSource>,
        publisher: Arc<dyn Publisher>,
        settings: WorkerSettings,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_workers.max(1)));
        Self {
            source,
            publisher,
            settings,
            permits,
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }

    /// Spawn a worker that delivers the round result for `ctx.box_id`
    pub fn dispatch(&self, ctx: RequestContext) -> JoinHandle<WorkerOutcome> {
        let pool = self.clone();
        tokio::spawn(async move { pool.run_worker(ctx).await })
    }

    /// Spawn the diagnostic worker: a locally generated token is published on
    /// the test game's topic after the fixed test delay, without touching the
    /// round-result source.
    pub fn dispatch_test(&self, mut ctx: RequestContext) -> JoinHandle<WorkerOutcome> {
        ctx.game = self.settings.test_game.clone();
        let pool = self.clone();
        tokio::spawn(async move { pool.run_test_worker(ctx).await })
    }

    /// Cancel every in-flight worker and refuse new ones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn run_worker(self, ctx: RequestContext) -> WorkerOutcome {
        let deadline = ctx.received_at + self.settings.deadline;

        if self.shutdown.is_cancelled() {
            return self.finish(&ctx, WorkerOutcome::Cancelled);
        }
        let mut inserted = self.source.subscribe();
        if let Some(rand_num) = self.source.get(&ctx.box_id) {
            let outcome = self.deliver(&ctx, &rand_num).await;
            return self.finish(&ctx, outcome);
        }

        // Permits bound the workers polling the source. A queued worker only
        // listens for its round and reads once more at the deadline.
        let acquire = self.permits.clone().acquire_owned();
        tokio::pin!(acquire);
        let _permit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return self.finish(&ctx, WorkerOutcome::Cancelled),
                _ = sleep_until(deadline) => {
                    let outcome = match self.source.get(&ctx.box_id) {
                        Some(rand_num) => self.deliver(&ctx, &rand_num).await,
                        None => WorkerOutcome::TimedOut { elapsed: ctx.received_at.elapsed() },
                    };
                    return self.finish(&ctx, outcome);
                }
                permit = &mut acquire => match permit {
                    Ok(permit) => break permit,
                    Err(_) => return self.finish(&ctx, WorkerOutcome::Cancelled),
                },
                _ = next_insert_of(&mut inserted, &ctx.box_id) => {
                    if let Some(rand_num) = self.source.get(&ctx.box_id) {
                        let outcome = self.deliver(&ctx, &rand_num).await;
                        return self.finish(&ctx, outcome);
                    }
                }
            }
        };
        drop(inserted);

        self.metrics.worker_started();
        let outcome = match wait_for_round_result(
            self.source.as_ref(),
            &ctx.box_id,
            self.settings.poll_interval,
            deadline,
            &self.shutdown,
        )
        .await
        {
            Ok(rand_num) => self.deliver(&ctx, &rand_num).await,
            Err(WorkerError::RandNumNotFound { .. }) => WorkerOutcome::TimedOut {
                elapsed: ctx.received_at.elapsed(),
            },
            Err(_) => WorkerOutcome::Cancelled,
        };
        self.metrics.worker_finished();

        self.finish(&ctx, outcome)
    }

    /// Diagnostic workers never queue behind the permit pool
    async fn run_test_worker(self, ctx: RequestContext) -> WorkerOutcome {
        let rand_num = random_hex_token(TEST_TOKEN_LEN, &mut rand::thread_rng());
        let wake_at = ctx.received_at + self.settings.test_delay;

        self.metrics.worker_started();
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => WorkerOutcome::Cancelled,
            _ = sleep_until(wake_at) => self.deliver(&ctx, &rand_num).await,
        };
        self.metrics.worker_finished();

        self.finish(&ctx, outcome)
    }

    /// Publish exactly once. Failures are reported in the outcome, never retried.
    async fn deliver(&self, ctx: &RequestContext, rand_num: &str) -> WorkerOutcome {
        let topic = ctx.topic();
        match self.publisher.publish(&topic, rand_num.as_bytes()).await {
            Ok(()) => {
                info!(
                    duration_ms = ctx.elapsed_ms(),
                    rand_num = %rand_num,
                    box_id = %ctx.box_id,
                    game = %ctx.game,
                    wallet_addr = %ctx.wallet_addr,
                    session_id = %ctx.session_id,
                    "successfully sent random number"
                );
                WorkerOutcome::Delivered {
                    topic,
                    elapsed: ctx.received_at.elapsed(),
                }
            }
            Err(error) => WorkerOutcome::PublishFailed { topic, error },
        }
    }

    fn finish(&self, ctx: &RequestContext, outcome: WorkerOutcome) -> WorkerOutcome {
        match &outcome {
            WorkerOutcome::Delivered { .. } => self.metrics.record_delivery(),
            WorkerOutcome::TimedOut { elapsed } => {
                self.metrics.record_timeout();
                let error = WorkerError::RandNumNotFound {
                    box_id: ctx.box_id.clone(),
                    waited_ms: elapsed.as_millis() as u64,
                };
                info!(
                    error = %error,
                    duration_ms = ctx.elapsed_ms(),
                    box_id = %ctx.box_id,
                    game = %ctx.game,
                    wallet_addr = %ctx.wallet_addr,
                    session_id = %ctx.session_id,
                    "random number request timed out"
                );
            }
            WorkerOutcome::PublishFailed { topic, error } => {
                self.metrics.record_publish_failure();
                warn!(
                    error = %error,
                    topic = %topic,
                    box_id = %ctx.box_id,
                    session_id = %ctx.session_id,
                    "failed to publish random number"
                );
            }
            WorkerOutcome::Cancelled => {
                self.metrics.record_cancelled();
                debug!(box_id = %ctx.box_id, session_id = %ctx.session_id, "worker cancelled");
            }
        }
        outcome
    }
}
