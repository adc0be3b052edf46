//! Hosting-bot registry (spec.md §4.G, §8 scenario 6): tracks the most
//! recent heartbeat seen from each bot instance and derives offline status
//! from `now - last_seen` against a configured threshold. Write-through to
//! the same durable store as the strategy registry, read back on every
//! listing rather than cached in memory — the write volume here is one row
//! per heartbeat interval per bot, not per tick.

use crate::error::HiveError;
use crate::models::BotHeartbeat;
use crate::registry::store::Store;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct BotRegistry {
    store: Arc<Store>,
}

/// A bot instance as reported in a `GET /bots` listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BotView {
    pub id: String,
    pub name: String,
    pub status: String,
    pub last_seen: DateTime<Utc>,
    pub offline: bool,
}

impl BotRegistry {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn record_heartbeat(&self, heartbeat: &BotHeartbeat, now: DateTime<Utc>) -> Result<(), HiveError> {
        let heartbeat_json = serde_json::to_string(heartbeat).expect("heartbeat serializes");
        self.store
            .upsert_bot_heartbeat(&heartbeat.id, &heartbeat.name, &heartbeat.status, now, &heartbeat_json)
            .map_err(|e| HiveError::Internal(e.to_string()))
    }

    /// Every bot seen, newest-heartbeat status folded against `offline_after`.
    pub fn list(&self, now: DateTime<Utc>, offline_after: Duration) -> Result<Vec<BotView>, HiveError> {
        let rows = self
            .store
            .list_bot_runs()
            .map_err(|e| HiveError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let offline = now.signed_duration_since(row.last_seen) > offline_after;
                BotView {
                    id: row.id,
                    name: row.name,
                    status: row.status,
                    last_seen: row.last_seen,
                    offline,
                }
            })
            .collect())
    }

    /// Removes a bot's row, as `DELETE /bots/{id}` does for a now-offline
    /// instance. Returns `Ok(true)` if a row existed.
    pub fn remove(&self, id: &str) -> Result<bool, HiveError> {
        self.store
            .delete_bot_run(id)
            .map_err(|e| HiveError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_heartbeat(id: &str) -> BotHeartbeat {
        BotHeartbeat {
            id: id.into(),
            name: id.into(),
            status: "running".into(),
            strategies: Vec::new(),
            uptime: 100,
            total_strategies: 0,
            total_actions: 0,
            actions_per_minute: 0.0,
            memory_usage: 0,
            cpu_usage: 0.0,
            api_port: 8080,
            user_main_address: None,
            last_activity: Utc::now(),
        }
    }

    #[test]
    fn reports_offline_after_threshold() {
        let store = Arc::new(Store::in_memory().unwrap());
        let registry = BotRegistry::new(store);
        let t0 = Utc::now();
        registry.record_heartbeat(&sample_heartbeat("hive-0"), t0).unwrap();

        let fresh = registry.list(t0 + Duration::seconds(30), Duration::minutes(2)).unwrap();
        assert!(!fresh[0].offline);

        let stale = registry.list(t0 + Duration::minutes(3), Duration::minutes(2)).unwrap();
        assert!(stale[0].offline);
    }

    #[test]
    fn remove_reports_whether_row_existed() {
        let store = Arc::new(Store::in_memory().unwrap());
        let registry = BotRegistry::new(store);
        registry.record_heartbeat(&sample_heartbeat("hive-0"), Utc::now()).unwrap();

        assert!(registry.remove("hive-0").unwrap());
        assert!(!registry.remove("hive-0").unwrap());
    }
}
