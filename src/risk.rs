//! Account-health risk gate (spec.md §4.E): margin-floor and leverage
//! checks applied before a strategy's ladder reaches the gateway, plus a
//! drawdown monitor for the portfolio view: peak-tracked equity with a
//! throttle flag that latches on breach and releases on recovery.

use crate::connector::Balances;
use serde::{Deserialize, Serialize};

/// Checked once per tick, ahead of `strategy::apply_risk_gates` (which
/// handles per-order notional clamping): is the account itself healthy
/// enough to place new orders at all.
#[derive(Debug, Clone, Copy)]
pub struct AccountHealthGate {
    pub max_leverage: u32,
    pub min_available_margin: f64,
}

impl AccountHealthGate {
    /// Returns `Ok(())` if new orders may be placed, `Err(reason)` otherwise.
    pub fn check(&self, balances: &Balances, requested_leverage: u32) -> Result<(), String> {
        if requested_leverage > self.max_leverage {
            return Err(format!(
                "requested leverage {requested_leverage}x exceeds cap {}x",
                self.max_leverage
            ));
        }
        if balances.available_margin < self.min_available_margin {
            return Err(format!(
                "available margin {:.2} below floor {:.2}",
                balances.available_margin, self.min_available_margin
            ));
        }
        Ok(())
    }
}

const DRAWDOWN_THROTTLE_TRIGGER: f64 = 0.08;
const DRAWDOWN_THROTTLE_RELEASE: f64 = 0.04;

/// Peak-tracked equity drawdown for the portfolio endpoint. Latches a
/// throttle flag on breach of the trigger threshold, releases it once
/// drawdown recovers below the release threshold (hysteresis avoids
/// flapping at the boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownMonitor {
    equity: f64,
    peak: f64,
    max_drawdown: f64,
    current_drawdown: f64,
    throttle_active: bool,
}

impl DrawdownMonitor {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            equity: initial_equity,
            peak: initial_equity,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
            throttle_active: false,
        }
    }

    pub fn update(&mut self, equity: f64) {
        self.equity = equity;
        if equity > self.peak {
            self.peak = equity;
        }
        self.current_drawdown = if self.peak > 0.0 {
            (self.peak - equity) / self.peak
        } else {
            0.0
        };
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown);

        if self.current_drawdown >= DRAWDOWN_THROTTLE_TRIGGER {
            self.throttle_active = true;
        } else if self.current_drawdown <= DRAWDOWN_THROTTLE_RELEASE {
            self.throttle_active = false;
        }
    }

    pub fn throttle_active(&self) -> bool {
        self.throttle_active
    }

    pub fn snapshot(&self) -> DrawdownSnapshot {
        DrawdownSnapshot {
            equity: self.equity,
            current_drawdown_pct: self.current_drawdown,
            max_drawdown_pct: self.max_drawdown,
            throttle_active: self.throttle_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownSnapshot {
    pub equity: f64,
    pub current_drawdown_pct: f64,
    pub max_drawdown_pct: f64,
    pub throttle_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_gate_rejects_leverage_above_cap() {
        let gate = AccountHealthGate {
            max_leverage: 10,
            min_available_margin: 0.0,
        };
        let balances = Balances {
            available_margin: 1000.0,
            total_equity: 1000.0,
        };
        assert!(gate.check(&balances, 20).is_err());
        assert!(gate.check(&balances, 5).is_ok());
    }

    #[test]
    fn health_gate_rejects_below_margin_floor() {
        let gate = AccountHealthGate {
            max_leverage: 20,
            min_available_margin: 500.0,
        };
        let balances = Balances {
            available_margin: 100.0,
            total_equity: 1000.0,
        };
        assert!(gate.check(&balances, 1).is_err());
    }

    #[test]
    fn drawdown_monitor_latches_and_releases_with_hysteresis() {
        let mut monitor = DrawdownMonitor::new(1000.0);
        monitor.update(1000.0);
        assert!(!monitor.throttle_active());

        monitor.update(900.0); // 10% drawdown, breaches trigger
        assert!(monitor.throttle_active());

        monitor.update(970.0); // 3% drawdown, below release threshold
        assert!(!monitor.throttle_active());
    }
}
