//! Clock & Scheduler (spec.md §4.D): fixed-cadence tick loop driving every
//! active strategy, in stable registration order, with a soft per-tick
//! budget so one slow strategy can't starve the others.

use crate::gateway::OrderGateway;
use crate::registry::StrategyRegistry;
use crate::strategy::StrategyHost;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct SchedulerConfig {
    pub tick_cadence: Duration,
    pub tick_soft_budget: Duration,
}

pub struct Scheduler {
    registry: Arc<StrategyRegistry>,
    host: Arc<StrategyHost>,
    gateway: Arc<OrderGateway>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        host: Arc<StrategyHost>,
        gateway: Arc<OrderGateway>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            host,
            gateway,
            config,
        }
    }

    /// Runs the tick loop until `shutdown` is signalled. Each tick: select
    /// the eligible set, drive each eligible strategy's callback under the
    /// soft budget, then run one gateway round.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_cadence);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let eligible = self.registry.eligible_strategies(now);
        let eligible_count = eligible.len();

        for strategy_id in eligible {
            let started = tokio::time::Instant::now();
            let result = tokio::time::timeout(
                self.config.tick_soft_budget,
                self.host.on_tick(strategy_id),
            )
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%strategy_id, error = %e, "strategy tick returned error"),
                Err(_) => {
                    self.registry.record_tick_overrun(strategy_id);
                    warn!(%strategy_id, elapsed_ms = started.elapsed().as_millis(), "tick exceeded soft budget");
                }
            }
        }

        self.gateway.refill_quota();
        debug!(count = eligible_count, "scheduler tick complete");
    }
}
