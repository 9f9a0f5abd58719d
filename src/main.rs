use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stockfighter_mm::config::{Config, SampleSource};
use stockfighter_mm::engine::{
    OrderRegistry, PositionLedger, ReconciliationEngine, StatisticsAggregator, StrategyEngine,
    StrategyParams,
};
use stockfighter_mm::execution::executor::OrderExecutor;
use stockfighter_mm::execution::paper::PaperGateway;
use stockfighter_mm::execution::OrderGateway;
use stockfighter_mm::feed::poll::{OpenOrdersPoller, OrderBookPoller};
use stockfighter_mm::feed::{run_executions, run_market_data};
use stockfighter_mm::runner::run_strategy;
use stockfighter_mm::venue::auth::VenueAuth;
use stockfighter_mm::venue::rest::VenueRest;
use stockfighter_mm::venue::ws::{ExecutionStream, QuoteStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

struct Args {
    paper: bool,
    config: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        paper: false,
        config: PathBuf::from("config.toml"),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--paper" => args.paper = true,
            "--config" => {
                args.config = iter
                    .next()
                    .map(PathBuf::from)
                    .context("--config needs a path")?;
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("stockfighter-mm.log")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stockfighter_mm=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let args = parse_args()?;
    let config = Config::load(&args.config)?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();

    println!();
    println!("  Stockfighter Market Maker v0.1.0");
    println!("  ================================");
    println!();
    println!(
        "  {} on {} as {}",
        config.venue.symbol, config.venue.venue, config.venue.account
    );
    if args.paper {
        println!("  ** PAPER MODE ** (orders never leave this process)");
    }
    println!();

    let api_key = Config::api_key()?;
    let auth = Arc::new(VenueAuth::new(api_key)?);
    let rest = Arc::new(VenueRest::new(
        auth.clone(),
        &config.venue.api_base,
        &config.venue.venue,
        &config.venue.account,
    )?);

    rest.heartbeat().await.context("API heartbeat failed")?;
    rest.venue_heartbeat()
        .await
        .with_context(|| format!("venue {} is not up", config.venue.venue))?;
    println!("  Venue OK. Logging to stockfighter-mm.log");

    let symbol = config.venue.symbol.clone();
    let account = config.venue.account.clone();
    let stats = Arc::new(StatisticsAggregator::new(config.stats.window()));
    let ledger = Arc::new(PositionLedger::new());
    let registry = Arc::new(OrderRegistry::new());
    let recon = Arc::new(ReconciliationEngine::new(ledger.clone(), registry.clone()));

    let gateway: Arc<dyn OrderGateway> = if args.paper {
        Arc::new(PaperGateway::new(
            stats.clone(),
            &account,
            &config.venue.venue,
            config.paper.fill_rate,
        ))
    } else {
        rest.clone()
    };
    let executor = Arc::new(OrderExecutor::new(gateway.clone()));

    // Pick up orders (and their fills) left from an earlier run
    match gateway.fetch_open_orders(&account, &symbol).await {
        Ok(orders) => {
            let count = orders.len();
            for order in orders {
                recon.reconcile(order);
            }
            let pos = ledger.snapshot(&symbol);
            tracing::info!(count, owned = pos.owned, cash = pos.balance, "initial order sync");
        }
        Err(e) => tracing::warn!("initial order sync failed: {:#}", e),
    }

    match rest.quote(&symbol).await {
        Ok(quote) => {
            if let Some(last) = quote.last {
                ledger.mark(&symbol, last);
            }
        }
        Err(e) => tracing::warn!("initial quote failed: {:#}", e),
    }

    let mut feeds: JoinSet<Result<()>> = JoinSet::new();

    match config.stats.source {
        SampleSource::Quotes => {
            let quotes = QuoteStream::connect(
                &auth,
                &config.venue.ws_base,
                &account,
                &config.venue.venue,
                &symbol,
            )
            .await?;
            feeds.spawn(run_market_data(quotes, stats.clone(), ledger.clone(), symbol.clone()));
        }
        SampleSource::OrderBook => {
            let poller = OrderBookPoller::new(
                rest.clone(),
                &symbol,
                Duration::from_millis(config.engine.book_poll_interval_ms),
            );
            feeds.spawn(run_market_data(poller, stats.clone(), ledger.clone(), symbol.clone()));
        }
    }

    if !args.paper {
        let executions = ExecutionStream::connect(
            &auth,
            &config.venue.ws_base,
            &account,
            &config.venue.venue,
            &symbol,
        )
        .await?;
        feeds.spawn(run_executions(executions, recon.clone()));
    }

    let poller = OpenOrdersPoller::new(
        gateway.clone(),
        &account,
        &symbol,
        Duration::from_millis(config.engine.order_poll_interval_ms),
    );
    feeds.spawn(run_executions(poller, recon.clone()));

    let engine = StrategyEngine::new(
        StrategyParams::new(&symbol, &config.strategy),
        stats.clone(),
        recon.clone(),
        executor,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let strategy = tokio::spawn(run_strategy(
        engine,
        Duration::from_millis(config.engine.tick_interval_ms),
        shutdown_rx,
    ));

    println!(
        "  Collecting {} samples before quoting. Ctrl-C to stop.",
        stats.capacity()
    );

    let failure = tokio::select! {
        Some(joined) = feeds.join_next() => {
            let err = match joined {
                Ok(Err(e)) => e,
                Ok(Ok(())) => anyhow::anyhow!("feed stopped unexpectedly"),
                Err(e) => anyhow::anyhow!(e).context("feed task panicked"),
            };
            tracing::error!("{:#}", err);
            Some(err)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            None
        }
    };

    let _ = shutdown_tx.send(true);
    let cancelled = strategy.await.context("strategy task panicked")?;
    feeds.abort_all();

    let pos = ledger.snapshot(&symbol);
    tracing::info!(
        cancelled,
        owned = pos.owned,
        cash = pos.balance,
        nav = ?pos.nav,
        "shutdown complete"
    );
    println!();
    println!(
        "  Stopped. Cancelled {} orders. Owned {}, cash {}, NAV {}",
        cancelled,
        pos.owned,
        pos.balance,
        pos.nav.map_or_else(|| "n/a".to_string(), |n| n.to_string())
    );

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
