//! Engine wiring: the two scheduled activities and the shutdown path.
//!
//! The entry loop and the management loop run as independent tokio tasks
//! sharing the ledger and the venue client. Shutdown aborts both, then
//! walks the orderly liquidation path before the process exits.

use crate::config::TradingConfig;
use crate::domain::services::entry_controller::EntryController;
use crate::domain::services::position_manager::PositionManager;
use crate::persistence::TradeLedger;
use crate::task_runner::{run_periodic, LoopConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct Engine {
    entries: Arc<EntryController>,
    manager: Arc<PositionManager>,
    ledger: Arc<TradeLedger>,
    symbols: Vec<String>,
    entry_interval: Duration,
    manage_interval: Duration,
}

impl Engine {
    pub fn new(
        entries: Arc<EntryController>,
        manager: Arc<PositionManager>,
        ledger: Arc<TradeLedger>,
        config: &TradingConfig,
    ) -> Self {
        Engine {
            entries,
            manager,
            ledger,
            symbols: config.symbols.clone(),
            entry_interval: Duration::from_secs(config.entry_interval_secs),
            manage_interval: Duration::from_secs(config.manage_interval_secs),
        }
    }

    /// Run both loops until ctrl-c, then liquidate every open position and
    /// log a final performance summary.
    pub async fn run(&self) {
        // Initial cleanup pass before the loops start
        if let Err(e) = self.manager.run_cycle().await {
            error!("Initial management cycle failed: {e}");
        }

        let manager = self.manager.clone();
        let manage_task = tokio::spawn(run_periodic(
            "management",
            LoopConfig {
                interval: self.manage_interval,
                ..LoopConfig::default()
            },
            move || {
                let manager = manager.clone();
                async move { manager.run_cycle().await.map_err(|e| e.to_string()) }
            },
        ));

        let entries = self.entries.clone();
        let symbols = self.symbols.clone();
        let entry_task = tokio::spawn(run_periodic(
            "entry",
            LoopConfig {
                interval: self.entry_interval,
                ..LoopConfig::default()
            },
            move || {
                let entries = entries.clone();
                let symbols = symbols.clone();
                async move {
                    let mut failures = 0usize;
                    for symbol in &symbols {
                        if let Err(e) = entries.check_and_place(symbol).await {
                            error!("Entry check failed for {symbol}: {e}");
                            failures += 1;
                        }
                    }
                    // Individual symbols failing is routine; every symbol
                    // failing points at the venue or the ledger.
                    if !symbols.is_empty() && failures == symbols.len() {
                        Err(format!("all {} entry checks failed", symbols.len()))
                    } else {
                        Ok(())
                    }
                }
            },
        ));

        let mut manage_task = manage_task;
        let mut entry_task = entry_task;
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received shutdown signal, closing all positions..."),
                Err(e) => error!("Cannot listen for shutdown signal: {e}; shutting down"),
            },
            // The loops only return by panicking past their failure
            // threshold; treat that like a shutdown and still liquidate.
            result = &mut manage_task => {
                error!("Management loop terminated: {result:?}; closing all positions...");
            }
            result = &mut entry_task => {
                error!("Entry loop terminated: {result:?}; closing all positions...");
            }
        }

        entry_task.abort();
        manage_task.abort();

        if let Err(e) = self.manager.close_all_positions().await {
            error!("Liquidation pass failed: {e}");
        }

        match self.ledger.calculate_performance(None, None).await {
            Ok(report) => info!(
                "Final performance: win_rate={:?} max_drawdown={:?} profit_factor={:?} sharpe={:?}",
                report.win_rate, report.max_drawdown, report.profit_factor, report.sharpe_ratio
            ),
            Err(e) => error!("Could not compute final performance: {e}"),
        }

        info!("All positions closed. Exiting.");
    }
}
