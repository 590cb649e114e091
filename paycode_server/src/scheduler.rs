//! Background maintenance loops.
//!
//! The scheduler runs two independent periodic jobs against the database:
//! * the expiry reclaimer, which closes unpaid orders once their timeout has passed and frees their amount slots, and
//! * the liveness sweep, which marks monitors offline once they stop sending heartbeats.
//!
//! Both loops tick immediately on start and then every [`SchedulerConfig::interval`]. Stopping is cooperative: a pass
//! that is already running completes, and only the next tick is prevented.
use std::time::Instant;

use chrono::Utc;
use log::*;
use paycode_engine::{db_types::Order, events::EventProducers, MonitorApi, OrderFlowApi, SqliteDatabase};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};

use crate::config::SchedulerConfig;

pub struct Scheduler {
    db: SqliteDatabase,
    producers: EventProducers,
    config: SchedulerConfig,
    shutdown: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(db: SqliteDatabase, producers: EventProducers, config: SchedulerConfig) -> Self {
        Self { db, producers, config, shutdown: None, handles: Vec::new() }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawns the reclaim and liveness loops. Calling `start` on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("🕰️ Scheduler is already running");
            return;
        }
        let (tx, _) = broadcast::channel(1);
        let orders = OrderFlowApi::new(self.db.clone(), self.producers.clone())
            .with_default_order_timeout(self.config.order_timeout_minutes);
        let monitors = MonitorApi::new(self.db.clone(), self.producers.clone());
        self.handles.push(start_reclaim_loop(orders, self.config.clone(), tx.subscribe()));
        self.handles.push(start_liveness_loop(monitors, self.config.clone(), tx.subscribe()));
        self.shutdown = Some(tx);
        info!("🕰️ Scheduler started. Running every {}s", self.config.interval.as_secs());
    }

    /// Signals both loops to stop and waits for them to finish their current pass. Does nothing if the scheduler is
    /// not running.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            debug!("🕰️ Scheduler is not running");
            return;
        };
        // An error only means that every loop has already exited
        let _ = tx.send(());
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("🕰️ A scheduler loop did not shut down cleanly. {e}");
            }
        }
        info!("🕰️ Scheduler stopped");
    }
}

fn start_reclaim_loop(
    api: OrderFlowApi<SqliteDatabase>,
    config: SchedulerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Order expiry worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = timer.tick() => {},
            }
            trace!("🕰️ Running order expiry job");
            let started = Instant::now();
            match api.reclaim_all(config.reclaim_batch_limit, Utc::now()).await {
                Ok(summary) => {
                    let elapsed = started.elapsed().as_millis();
                    if summary.closed_count() > 0 || summary.failed > 0 || summary.failed_accounts > 0 {
                        info!(
                            "🕰️ {} order(s) closed across {} account(s) in {elapsed}ms. {} superseded, {} failed, {} \
                             account(s) skipped",
                            summary.closed_count(),
                            summary.accounts,
                            summary.superseded,
                            summary.failed,
                            summary.failed_accounts
                        );
                        debug!("🕰️ Closed orders: {}", order_list(&summary.closed));
                    } else {
                        trace!("🕰️ Nothing to close ({elapsed}ms)");
                    }
                },
                Err(e) => error!("🕰️ Error running order expiry job: {e}"),
            }
        }
        info!("🕰️ Order expiry worker stopped");
    })
}

fn start_liveness_loop(
    api: MonitorApi<SqliteDatabase>,
    config: SchedulerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Monitor liveness worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = timer.tick() => {},
            }
            trace!("🕰️ Running monitor liveness job");
            let started = Instant::now();
            match api.sweep_liveness(Utc::now()).await {
                Ok(summary) => {
                    let elapsed = started.elapsed().as_millis();
                    if summary.marked_offline > 0 || summary.failed > 0 {
                        info!(
                            "🕰️ {} of {} monitor(s) went offline in {elapsed}ms. {} check(s) failed",
                            summary.marked_offline, summary.checked, summary.failed
                        );
                    } else {
                        trace!("🕰️ {} monitor(s) checked in {elapsed}ms", summary.checked);
                    }
                },
                Err(e) => error!("🕰️ Error running monitor liveness job: {e}"),
            }
        }
        info!("🕰️ Monitor liveness worker stopped");
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] account: {} amount: {}", o.order_code, o.account_id, o.actual_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
