use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cardwatch_detector::config::Config;
use cardwatch_detector::pipeline::MisusePipeline;
use cardwatch_detector::records::loader::{load_cards, load_transactions};
use cardwatch_detector::report::write_report;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for per-card output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("CardWatch misuse detector starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        rules = config.detection.rules.len(),
        routes = config.distance.routes.len(),
        "Configuration loaded from {}",
        config_path
    );

    let pipeline = Arc::new(MisusePipeline::init(&config));

    // Create shutdown signal
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    // One-off batch pass over configured input files
    if let (Some(cards_path), Some(transactions_path)) =
        (&config.input.cards_path, &config.input.transactions_path)
    {
        // Both files are parsed before any evaluation starts
        let cards = load_cards(cards_path)?;
        let transactions = load_transactions(transactions_path)?;

        let (report, _issues) = pipeline
            .run(&cards, &transactions, &pipeline.default_rules, &shutdown)
            .await;

        if report.cancelled {
            tracing::warn!(
                evaluated = report.cards_evaluated,
                "Batch pass interrupted, report is partial"
            );
        }
        write_report(
            &config.report.output_path,
            config.report.format,
            &report.flagged_cards,
        )?;
    }

    if config.api.enabled && !shutdown.is_cancelled() {
        cardwatch_detector::api::serve(
            pipeline.clone(),
            &config.api.host,
            config.api.port,
            Duration::from_millis(config.api.request_timeout_ms),
            shutdown.clone(),
        )
        .await?;
    }

    tracing::info!("CardWatch misuse detector stopped");
    Ok(())
}
