use std::sync::{Arc, Mutex};

use poly_maker::book::OrderBookRegistry;
use poly_maker::config::Config;
use poly_maker::engine::{self, EngineContext};
use poly_maker::gateway::exchange::ExchangeClient;
use poly_maker::ingest::{market_data, user_data};
use poly_maker::markets::MarketSet;
use poly_maker::pricing::{Baseline, StrategyKind};
use poly_maker::reconcile;
use poly_maker::risk::RiskJournal;
use poly_maker::scheduler::TaskScheduler;
use poly_maker::state::EngineState;

#[tokio::main]
async fn main() {
    let config = Arc::new(Config::from_env());

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Polymarket Binary-Market Maker");
    eprintln!("║  Dry run: {}", config.dry_run);
    eprintln!("║  Markets file: {}", config.markets_file);
    eprintln!("╚══════════════════════════════════════════════════╝");

    let state = Arc::new(EngineState::new());
    let registry = Arc::new(Mutex::new(OrderBookRegistry::new()));
    let scheduler = Arc::new(TaskScheduler::new());
    let risk = Arc::new(RiskJournal::new(config.risk_journal_dir.clone()));

    let exchange = match ExchangeClient::connect(&config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("[MAIN] failed to connect to exchange: {e}");
            return;
        }
    };

    let mut market_set = MarketSet::load(config.markets_file.clone());
    market_set.register_all_pairs(&registry);
    let market_set = Arc::new(Mutex::new(market_set));

    // Startup reconciliation: clear leftover orders, pull authoritative positions,
    // liquidity, and this agent's own resting orders.
    if let Err(e) = reconcile::startup_reconcile(&exchange, &state, &registry).await {
        eprintln!("[MAIN] startup reconciliation failed: {e}");
    }

    let ctx = Arc::new(EngineContext {
        state: Arc::clone(&state),
        registry: Arc::clone(&registry),
        exchange: Arc::clone(&exchange),
        risk: Arc::clone(&risk),
        config: Arc::clone(&config),
        strategy: StrategyKind::Baseline(Baseline),
    });

    let on_update = {
        let market_set = Arc::clone(&market_set);
        let ctx = Arc::clone(&ctx);
        move |condition_id: String| {
            let market_set = Arc::clone(&market_set);
            let ctx = Arc::clone(&ctx);
            async move {
                let entry = {
                    let set = market_set.lock().unwrap();
                    set.tradable(&ctx.state).into_iter().find(|(m, _)| m.condition_id == condition_id).map(|(m, h)| (m.clone(), h))
                };
                let Some((market, held_but_not_selected)) = entry else {
                    return Ok(());
                };
                let mean_tradable_depth = {
                    let set = market_set.lock().unwrap();
                    mean_depth_across_tradable(&set, &ctx.state, &ctx.registry, &ctx.config)
                };
                engine::perform_trade(&market, &ctx, held_but_not_selected, mean_tradable_depth).await
            }
        }
    };

    let token_to_market = Arc::new(market_set.lock().unwrap().token_to_market_map());
    let all_tokens = market_set.lock().unwrap().all_token_ids();

    let market_feed_handle = {
        let registry = Arc::clone(&registry);
        let scheduler = Arc::clone(&scheduler);
        let state = Arc::clone(&state);
        let token_to_market = Arc::clone(&token_to_market);
        let config = Arc::clone(&config);
        let on_update = on_update.clone();
        tokio::spawn(async move {
            market_data::run(&config.polymarket_clob_ws, &all_tokens, token_to_market, registry, scheduler, state, on_update).await;
        })
    };

    let user_feed_handle = {
        let registry = Arc::clone(&registry);
        let scheduler = Arc::clone(&scheduler);
        let state = Arc::clone(&state);
        let config = Arc::clone(&config);
        let agent_address = config.polymarket_funder_address.clone().unwrap_or_default();
        let on_update = on_update.clone();
        tokio::spawn(async move {
            user_data::run(&config.polymarket_user_ws, &agent_address, registry, state, scheduler, on_update).await;
        })
    };

    let position_reconciler_handle = tokio::spawn(reconcile::run_position_reconciler(
        Arc::clone(&exchange),
        Arc::clone(&state),
        Arc::clone(&config),
    ));
    let performing_pruner_handle = tokio::spawn(reconcile::run_performing_pruner(Arc::clone(&state), Arc::clone(&config)));

    // 30-second market-refresh hook: market-universe selection
    // itself is out of scope, this just re-reads the source file and re-registers any
    // newly-seen pairs.
    let market_refresh_handle = {
        let market_set = Arc::clone(&market_set);
        let registry = Arc::clone(&registry);
        let interval_secs = config.market_update_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let mut set = market_set.lock().unwrap();
                set.refresh();
                set.register_all_pairs(&registry);
            }
        })
    };

    tokio::select! {
        _ = market_feed_handle => eprintln!("[MAIN] market-data feed exited"),
        _ = user_feed_handle => eprintln!("[MAIN] user-data feed exited"),
        _ = position_reconciler_handle => eprintln!("[MAIN] position reconciler exited"),
        _ = performing_pruner_handle => eprintln!("[MAIN] performing pruner exited"),
        _ = market_refresh_handle => eprintln!("[MAIN] market refresh task exited"),
    }
}

/// Mean `(depth_bids + depth_asks)` across the currently tradable set, for the
/// reward-tilt overlay's normalization. Unused by the default
/// `Baseline` strategy wired above, but computed here since it's cheap and any
/// deployment swapping in `StrategyKind::RewardTilt` needs it supplied.
fn mean_depth_across_tradable(
    market_set: &MarketSet,
    state: &EngineState,
    registry: &Mutex<OrderBookRegistry>,
    config: &Config,
) -> f64 {
    let tradable = market_set.tradable(state);
    if tradable.is_empty() {
        return 0.0;
    }
    let reg = registry.lock().unwrap();
    let total: f64 = tradable
        .iter()
        .map(|(m, _)| {
            let (bids, asks) = reg.depth(&m.token1, config.thresholds.market_depth_calc_levels, config.thresholds.market_depth_calc_pct);
            bids + asks
        })
        .sum();
    total / tradable.len() as f64
}
