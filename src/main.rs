use gridbot::advisor::Advisor;
use gridbot::config::Settings;
use gridbot::engine::Bot;
use gridbot::exchange::{BinanceClient, Exchange, PaperExchange};
use gridbot::Result;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 GridBot starting");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Pair: {}", settings.pair);
    tracing::info!("  Buy threshold: {:.2}%", settings.buy_pct * 100.0);
    tracing::info!("  Sell threshold: {:.2}%", settings.sell_pct * 100.0);
    tracing::info!("  Trade amount: {} {}", settings.trade_amount, settings.pair.base);
    tracing::info!("  Check interval: {:?}", settings.check_interval);
    match settings.stop_loss_pct {
        Some(pct) => tracing::info!("  Stop-loss: {:.2}%", pct * 100.0),
        None => tracing::info!("  Stop-loss: disabled"),
    }
    match settings.trailing_stop_pct {
        Some(pct) => tracing::info!("  Trailing stop: {:.2}%", pct * 100.0),
        None => tracing::info!("  Trailing stop: disabled"),
    }
    tracing::info!("  Paper mode: {}", settings.paper_mode);

    let exchange = build_exchange(&settings).await?;

    let advisor = if settings.advisor_enabled {
        Advisor::connect(&settings.advisor_url).await
    } else {
        tracing::info!("Advisor disabled, trades auto-approved");
        Advisor::disabled()
    };

    let mut bot = Bot::new(settings, exchange, advisor);
    bot.start()?;

    tracing::info!("Press Ctrl+C to stop...\n");
    tokio::signal::ctrl_c().await?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");

    bot.stop().await?;
    tracing::info!("👋 GridBot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridbot=info".into()),
        )
        .init();
}

async fn build_exchange(settings: &Settings) -> Result<Arc<dyn Exchange>> {
    if settings.paper_mode {
        tracing::info!(
            "📝 Paper mode: simulated fills, starting cash {}",
            settings.paper_starting_cash
        );
        // Live prices still drive decisions when credentials are present.
        let paper = if settings.api_key.is_empty() {
            PaperExchange::new(settings.paper_starting_cash)
        } else {
            let feed = BinanceClient::new(settings.api_key.clone(), settings.api_secret.clone());
            PaperExchange::new(settings.paper_starting_cash).with_live_feed(feed)
        };
        return Ok(Arc::new(paper));
    }

    let client = BinanceClient::new(settings.api_key.clone(), settings.api_secret.clone());
    client.ping().await?;
    tracing::info!("✓ Exchange connection verified");

    let balances = client.get_balances(&settings.pair).await?;
    tracing::info!(
        "  Balances: {} {} / {} {}",
        balances.asset,
        settings.pair.base,
        balances.cash,
        settings.pair.quote
    );

    Ok(Arc::new(client))
}
