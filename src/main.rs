// src/main.rs
use log::{error, info};
use tokio::sync::broadcast;

use nfc_bridge::ws::{self, WsRadio};
use nfc_bridge::{NfcBridge, ServiceConfig};

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Starting NFC bridge service...");

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    // Channel: NFC thread -> WS clients (radio actions)
    // Tokio broadcast send is sync, so the NFC thread can feed it directly
    let (radio_tx, _) = broadcast::channel(100);
    let radio = WsRadio::new(radio_tx.clone(), config.nfc_available);

    // Spawn NFC Thread (Blocking OS Thread)
    let (bridge, _service) = match NfcBridge::spawn(radio, &config) {
        Ok(spawned) => spawned,
        Err(err) => {
            error!("Failed to start NFC service thread: {}", err);
            std::process::exit(1);
        }
    };

    // Start WebSocket Server
    ws::start_server(bridge, radio_tx, config.bind_addr).await;
}
