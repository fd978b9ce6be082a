use bingx_connector::exchanges::bingx::{build_connector, Interval};
use bingx_connector::ClientConfig;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Public market data needs no credentials
    let config = ClientConfig::read_only();
    let connector = build_connector(config)?;

    let session = connector
        .subscribe_klines(
            "BTC-USDT",
            Interval::Minutes1,
            |kline| {
                info!(
                    symbol = %kline.symbol,
                    close = %kline.close,
                    volume = %kline.volume,
                    end_time = kline.end_time,
                    completed = kline.completed,
                    "kline"
                );
            },
            |e| error!(error = %e, "stream error"),
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    session.stop();
    session.done().await;

    Ok(())
}
