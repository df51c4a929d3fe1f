/*
[INPUT]:  Topics on the command line, optional BITMART_API_* env credentials
[OUTPUT]: Classified BitMart WebSocket events printed to stdout
[POS]:    Examples - multiplexed stream handling
[UPDATE]: When WebSocket API changes
*/

use std::time::Duration;

use bitmart_ws_adapter::*;
use tracing_subscriber::EnvFilter;

/// Subscribe to a mix of spot and futures topics over one client.
///
/// `cargo run --example stream_example -- spot/ticker:BTC_USDT futures/ticker`
///
/// Private topics (e.g. `spot/user/order:BTC_USDT`) need `BITMART_API_KEY`,
/// `BITMART_API_SECRET` and `BITMART_API_MEMO`.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut topics: Vec<String> = std::env::args().skip(1).collect();
    if topics.is_empty() {
        topics = vec![
            "spot/ticker:BTC_USDT".to_string(),
            "futures/ticker".to_string(),
        ];
    }

    let mut config = WsClientConfig::default();
    if let Some(credentials) = Credentials::from_env() {
        config = config.with_credentials(credentials);
    }

    let mut ws = BitmartWebSocket::new(config)?;
    let mut events = ws.take_receiver().expect("receiver taken once");
    ws.subscribe_topics(topics)?;

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.event {
                    WsEvent::Update(value) => println!("[{}] update {value}", event.key),
                    WsEvent::Response(value) => println!("[{}] response {value}", event.key),
                    WsEvent::Exception(err) => println!("[{}] exception {}", event.key, err.message),
                }
            }
        }
    }

    for key in ConnectionKey::ALL {
        println!("{key}: {:?} confirmed={:?}", ws.connection_state(key), ws.confirmed_topics(key).await?);
    }
    ws.shutdown_and_wait().await;
    Ok(())
}
