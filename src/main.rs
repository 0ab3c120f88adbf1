mod config;
mod domain;
mod engine;
mod infrastructure;
mod persistence;
mod task_runner;

use crate::config::TradingConfig;
use crate::domain::services::bracket::BracketOrderExecutor;
use crate::domain::services::entry_controller::EntryController;
use crate::domain::services::position_manager::PositionManager;
use crate::domain::services::reconciliation::Reconciler;
use crate::engine::Engine;
use crate::infrastructure::paper::PaperSession;
use crate::persistence::TradeLedger;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TradingConfig::from_env();
    info!(
        "Starting in paper-trading mode: {} symbol(s), balance {:.2}",
        config.symbols.len(),
        config.paper_initial_balance
    );
    info!("Wire a live venue client behind VenueClient to trade for real");

    let pool = persistence::init_database(&config.database_url).await?;
    let ledger = Arc::new(TradeLedger::new(pool));

    let session = Arc::new(PaperSession::new(
        &config.symbols,
        config.paper_initial_balance,
        config.paper_start_price,
        config.paper_seed,
    ));

    // Drive the simulated feed in the background
    let feed = session.clone();
    tokio::spawn(async move {
        loop {
            feed.step();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });

    let venue = session.venue.clone();
    let entries = Arc::new(EntryController::new(
        venue.clone(),
        session.market.clone(),
        session.signals.clone(),
        ledger.clone(),
        BracketOrderExecutor::new(venue.clone(), config.bracket_policy(), config.retry_policy()),
        config.entry_policy(),
    ));
    let manager = Arc::new(PositionManager::new(
        venue.clone(),
        session.market.clone(),
        ledger.clone(),
        Reconciler::new(venue, config.reconcile_lookback_days),
        config.management_policy(),
    ));

    Engine::new(entries, manager, ledger, &config).run().await;
    Ok(())
}
