//! Observability (spec.md §5, §6): periodic heartbeat emission to the
//! configured dashboard/manager endpoint.

use crate::models::{BotHeartbeat, StrategyStatus};
use crate::registry::StrategyRegistry;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

pub struct HeartbeatEmitter {
    registry: Arc<StrategyRegistry>,
    dashboard_url: Option<String>,
    bot_id: String,
    api_port: u16,
    started_at: Instant,
    http: Client,
    total_actions_prev: AtomicU64,
}

impl HeartbeatEmitter {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        dashboard_url: Option<String>,
        bot_id: String,
        api_port: u16,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            dashboard_url,
            bot_id,
            api_port,
            started_at: Instant::now(),
            http: Client::new(),
            total_actions_prev: AtomicU64::new(0),
        })
    }

    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.emit_once(interval).await;
                }
            }
        }
    }

    async fn emit_once(&self, interval: Duration) {
        let heartbeat = self.build_heartbeat(interval);

        let Some(url) = &self.dashboard_url else {
            debug!(bot_id = %heartbeat.id, "no dashboard url configured, heartbeat not sent");
            return;
        };

        if let Err(e) = self.http.post(url).json(&heartbeat).send().await {
            warn!(error = %e, "heartbeat post failed");
        }
    }

    fn build_heartbeat(&self, interval: Duration) -> BotHeartbeat {
        let ids = self.registry.list_ids();
        let active: Vec<_> = ids
            .iter()
            .filter(|id| self.registry.status(**id) == Some(StrategyStatus::Active))
            .copied()
            .collect();

        let total_actions: u64 = ids
            .iter()
            .filter_map(|id| self.registry.with_runtime(*id, |rt| rt.counters.total_actions))
            .sum();
        let prev = self.total_actions_prev.swap(total_actions, Ordering::Relaxed);
        let delta = total_actions.saturating_sub(prev);
        let actions_per_minute = (delta as f64) * (60.0 / interval.as_secs_f64().max(1.0));

        BotHeartbeat {
            id: self.bot_id.clone(),
            name: "hive".to_string(),
            status: if active.is_empty() { "idle" } else { "running" }.to_string(),
            strategies: active,
            uptime: self.started_at.elapsed().as_secs(),
            total_strategies: ids.len() as u32,
            total_actions,
            actions_per_minute,
            memory_usage: 0,
            cpu_usage: 0.0,
            api_port: self.api_port,
            user_main_address: None,
            last_activity: Utc::now(),
        }
    }
}
