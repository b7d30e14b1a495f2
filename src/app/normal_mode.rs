use std::{ sync::{ atomic::{ AtomicBool, Ordering }, Arc }, time::Duration };

use crate::{
    arbitrage::{
        admission::AdmissionControl,
        detector::DetectionLoop,
        executor::{ EligibilityPolicy, ExecutionCoordinator, ExecutionSettings, MinProfitPolicy },
        reporter::StalenessReporter,
        sim_trader::FeeSchedule,
        tracker::{ OpportunityTracker, ProfitBucketing },
    },
    config::Config,
    exchange::{
        balances::BalanceBook,
        binance::BinanceClient,
        book_ticker_stream::BookTickerStream,
        client::{ ExchangeClient, OrderGateway },
        paper::PaperGateway,
    },
    models::{ opportunity::OpportunityReport, order::OrderStatusEvent, ticker::TickerBook },
    monitor::journal::JsonlJournal,
    utils::console::{ print_app_started, print_app_starting, print_config },
    API_TIMEOUT,
};
use anyhow::{ Context, Result };
use tokio::task::JoinHandle;
use tracing::{ error, info, warn };

/// How long stopping tasks get before they are abandoned
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub fn run_normal_mode(config: Config) -> Result<()> {
    // Display startup information
    print_app_starting();
    print_config(&config);

    let binance = Arc::new(
        BinanceClient::new(config.api_key.clone(), config.api_secret.clone(), config.testnet).context(
            "Failed to create Binance client"
        )?
    );
    info!("Using exchange: {}", binance.name());

    let rt = super::build_runtime()?;
    rt.block_on(run(config, binance))?;

    info!("Triangular arbitrage system stopped");
    Ok(())
}

async fn run(config: Config, binance: Arc<BinanceClient>) -> Result<()> {
    let client: Arc<dyn ExchangeClient> = binance.clone();
    let index = super::load_index(&client, &config.excluded_coins).await?;
    let symbols = index.symbols();
    info!(triangles = index.len(), symbols = symbols.len(), "Triangle index ready");

    // Seed prices so the first passes do not wait for the stream
    let book = Arc::new(TickerBook::new());
    match tokio::time::timeout(API_TIMEOUT, client.get_book_tickers()).await {
        Ok(Ok(tickers)) => {
            for (symbol, ticker) in tickers {
                book.update(&symbol, ticker);
            }
            info!("✓ Seeded {} book tickers", book.len());
        }
        Ok(Err(e)) => warn!("Failed to seed book tickers: {:#}", e),
        Err(_) => warn!("Timed out while seeding book tickers"),
    }

    // Create shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc
        ::set_handler(move || {
            info!("Received Ctrl+C, shutting down...");
            shutdown_clone.store(true, Ordering::Relaxed);
        })
        .context("Error setting Ctrl-C handler")?;

    let (reports, reports_writer) = JsonlJournal::<OpportunityReport>::open(
        &config.reports_path
    ).await?;
    let (events, events_writer) = JsonlJournal::<OrderStatusEvent>::open(&config.events_path).await?;
    let reports = Arc::new(reports);
    let events = Arc::new(events);

    let tracker = Arc::new(OpportunityTracker::new(config.report_retention()));
    let fees = FeeSchedule::new(
        config.fee_standard,
        config.fee_discounted,
        config.fee_discount_coin.as_str()
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut coordinator_task: Option<JoinHandle<()>> = None;

    let reporter = Arc::new(
        StalenessReporter::new(
            tracker.clone(),
            reports.clone(),
            config.staleness_threshold(),
            config.sweep_interval(),
            shutdown.clone()
        )
    );
    tasks.push(tokio::spawn(reporter.run()));

    let mut detector = DetectionLoop::new(
        &index,
        book.clone(),
        fees,
        tracker.clone(),
        ProfitBucketing::from_bps(config.profit_bucket_bps),
        shutdown.clone()
    ).with_min_scan_interval(config.min_scan_interval());

    if config.execution_enabled {
        let (tx, rx) = tokio::sync::mpsc::channel(config.dispatch_capacity);
        let policy: Arc<dyn EligibilityPolicy> = Arc::new(MinProfitPolicy {
            min_profit: config.min_profit,
            trade_asset: config.trade_asset.as_str().into(),
        });
        detector = detector.with_dispatch(tx, policy.clone());

        let gateway: Arc<dyn OrderGateway>;
        let mut balances = None;
        if config.paper_trading {
            info!("Paper trading: orders are simulated");
            gateway = Arc::new(
                PaperGateway::new()
                    .with_success_rate(config.paper_success_rate)
                    .with_latency(config.paper_latency())
            );
        } else {
            let book = Arc::new(BalanceBook::new());
            tasks.push(
                tokio::spawn(
                    book.clone().run_refresh(client.clone(), config.balance_refresh(), shutdown.clone())
                )
            );
            balances = Some(book);
            gateway = binance.clone();
        }

        let coordinator = Arc::new(
            ExecutionCoordinator::new(
                tracker.clone(),
                Arc::new(AdmissionControl::new()),
                gateway,
                events.clone(),
                policy,
                ExecutionSettings {
                    trade_asset: config.trade_asset.as_str().into(),
                    trade_amount: config.trade_amount,
                    settlement_delay: config.settlement_delay(),
                    order_timeout: config.order_timeout(),
                    test_mode: config.test_mode,
                },
                balances
            )
        );
        tasks.push(tokio::spawn(coordinator.clone().run_stats_task(shutdown.clone())));
        coordinator_task = Some(tokio::spawn(coordinator.run(rx, shutdown.clone())));
        info!(test_mode = config.test_mode, "Execution enabled");
    } else {
        info!("Execution disabled, opportunities are only reported");
    }

    let stream = Arc::new(BookTickerStream::new(config.testnet, book.clone(), shutdown.clone()));
    tasks.extend(stream.spawn(&symbols));

    let detector = Arc::new(detector);
    tasks.push(tokio::spawn(detector.clone().run_stats_task()));
    tasks.push(tokio::spawn(detector.run()));

    print_app_started();
    info!("\nPress Ctrl+C to exit");

    // Wait for shutdown signal
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Err(e)) => error!("Task ended abnormally: {}", e),
            Err(_) => warn!("Task did not stop in time"),
            Ok(Ok(())) => {}
        }
    }

    // in-flight legs are never cancelled, their outcome still goes to the journal
    if let Some(task) = coordinator_task {
        let grace = config.order_timeout() + config.settlement_delay() + SHUTDOWN_GRACE;
        match tokio::time::timeout(grace, task).await {
            Ok(Err(e)) => error!("Execution coordinator ended abnormally: {}", e),
            Err(_) => warn!("In-flight executions did not finish in time"),
            Ok(Ok(())) => {}
        }
    }

    // Writers drain once the last journal handle is gone
    drop(reports);
    drop(events);
    for writer in [reports_writer, events_writer] {
        if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
            warn!("Journal writer did not finish in time");
        }
    }

    Ok(())
}
