//! Background tasks
//!
//! - Flush scheduler: every tick, takes the groups that have gone idle out of
//!   the aggregator and queues them for processing.
//! - Group worker: processes queued groups one at a time. It runs until the
//!   flush scheduler has exited and every queued group is processed, so a
//!   group taken out of the aggregator is never left behind.
//! - Keep-alive pinger (optional): requests a configured URL periodically so
//!   free-tier hosts do not put the service to sleep.
//!
//! Cancelling the shared `CancellationToken` stops the scheduler and the
//! pinger; the worker follows once the queue is closed and empty.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tally_core::config::KeepaliveConfig;
use tally_core::{BatchAggregator, FlushedGroup, GroupProcessor};

/// Groups waiting between the scheduler and the worker
const QUEUE_CAPACITY: usize = 64;

/// Handles to the running background tasks
pub struct Background {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    /// Spawn the scheduler, the worker and, if configured, the pinger
    pub fn start(
        aggregator: Arc<BatchAggregator>,
        processor: GroupProcessor,
        tick: Duration,
        keepalive: Option<KeepaliveConfig>,
    ) -> Self {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        info!(
            tick_secs = tick.as_secs_f64(),
            idle_secs = aggregator.idle_threshold().as_secs_f64(),
            "Starting flush scheduler"
        );

        let mut tasks = vec![
            tokio::spawn(flush_loop(aggregator, tick, tx, token.clone())),
            tokio::spawn(group_worker(processor, rx)),
        ];

        if let Some(keepalive) = keepalive {
            info!(url = %keepalive.url, every_secs = keepalive.interval.as_secs(), "Starting keep-alive pinger");
            tasks.push(tokio::spawn(keepalive_loop(keepalive, token.clone())));
        }

        Self { token, tasks }
    }

    /// Token that stops every background task
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop scheduling, let the worker drain its queue, and wait for all tasks
    ///
    /// Tasks are joined in start order: the scheduler first, so nothing is
    /// sent after the worker's final drain.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task panicked");
            }
        }
        info!("Background tasks stopped");
    }
}

async fn flush_loop(
    aggregator: Arc<BatchAggregator>,
    tick: Duration,
    tx: mpsc::Sender<FlushedGroup>,
    token: CancellationToken,
) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for group in aggregator.take_idle(std::time::Instant::now()) {
                    debug!(group = %group.group_id, images = group.images.len(), "Group flushed");
                    if tx.send(group).await.is_err() {
                        warn!("Group worker has stopped, flush scheduler exiting");
                        return;
                    }
                }
            }
            _ = token.cancelled() => {
                info!("Flush scheduler shutting down");
                break;
            }
        }
    }
}

async fn group_worker(processor: GroupProcessor, mut rx: mpsc::Receiver<FlushedGroup>) {
    // `recv` yields None only after the scheduler dropped its sender and the
    // queue is empty
    let mut processed = 0;
    while let Some(group) = rx.recv().await {
        process(&processor, group).await;
        processed += 1;
    }
    info!(processed, "Group worker shutting down");
}

async fn process(processor: &GroupProcessor, group: FlushedGroup) {
    let group_id = group.group_id.clone();
    if let Err(e) = processor.process(group).await {
        // Already reported to the sender; nothing else to do here
        debug!(group = %group_id, error = %e, "Group rejected");
    }
}

async fn keepalive_loop(config: KeepaliveConfig, token: CancellationToken) {
    let client = reqwest::Client::new();
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first immediate tick - the service was just started
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.get(&config.url).timeout(Duration::from_secs(30)).send().await {
                    Ok(response) => debug!(status = %response.status(), "Keep-alive ping"),
                    Err(e) => warn!(url = %config.url, error = %e, "Keep-alive ping failed"),
                }
            }
            _ = token.cancelled() => break,
        }
    }
}
