use report_stream_sdk::config::{Config, WebSocketHighAvailability};
use report_stream_sdk::feed::ID;
use report_stream_sdk::stream::Stream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let api_key = "YOUR_API_KEY_GOES_HERE";
    let user_secret = "YOUR_USER_SECRET_GOES_HERE";
    let rest_url = "https://api.testnet-dataengine.chain.link";
    let ws_url = "wss://ws.testnet-dataengine.chain.link,wss://ws.testnet-dataengine.chain.link";

    let eth_usd_feed_id =
        ID::from_hex_str("0x000359843a543ee2fe414dc14c7e7920ef10f4372990b79d6361cdc0dd1ba782")?;
    let btc_usd_feed_id =
        ID::from_hex_str("0x00037da06d56d083fe599397a4769a042d63aa73dc4ef57709d31e9971a5b439")?;

    let feed_ids = vec![eth_usd_feed_id, btc_usd_feed_id];

    let config = Config::new(
        api_key.to_string(),
        user_secret.to_string(),
        rest_url.to_string(),
        ws_url.to_string(),
    )
    .with_ws_ha(WebSocketHighAvailability::Enabled)
    .build()?;

    let mut stream = Stream::new(config, feed_ids).await?;
    stream.listen().await?;

    let mut counter = 0;

    while counter < 10 {
        match stream.read().await {
            Ok(response) => {
                counter += 1;
                let report = response.report;
                println!("feed:      {}", report.feed_id);
                println!("valid-from: {}", report.valid_from_timestamp);
                println!("observed-at: {}", report.observations_timestamp);
            }
            Err(e) => {
                eprintln!("stream error: {e}");
                break;
            }
        }

        if counter == 5 {
            println!("stats: {:#?}", stream.get_stats().await);
        }
    }

    if let Err(e) = stream.close().await {
        eprintln!("stream closed with a pending terminal cause: {e}");
    }
    println!("final stats: {:#?}", stream.get_stats().await);

    Ok(())
}
