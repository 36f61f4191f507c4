// src/ws.rs
use std::future::Future;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use warp::Filter;

use crate::bridge::NfcBridge;
use crate::error::SessionError;
use crate::nfc_service::TagRadio;
use crate::types::{IncomingMessage, OutgoingMessage, RadioAction, RadioEvent};

/// Radio that lives on the other end of the WebSocket: actions are broadcast
/// to every connected client and the platform host answers with radio events.
pub struct WsRadio {
    outgoing: broadcast::Sender<OutgoingMessage>,
    nfc_available: bool,
}

impl WsRadio {
    pub fn new(outgoing: broadcast::Sender<OutgoingMessage>, nfc_available: bool) -> Self {
        Self {
            outgoing,
            nfc_available,
        }
    }
}

impl TagRadio for WsRadio {
    fn has_nfc(&self) -> Result<bool, String> {
        Ok(self.nfc_available)
    }

    fn perform(&mut self, action: RadioAction) {
        if self.outgoing.send(action.into()).is_err() {
            warn!("No radio host connected, action dropped");
        }
    }
}

pub async fn start_server(
    bridge: NfcBridge,
    radio_tx: broadcast::Sender<OutgoingMessage>,
    addr: SocketAddr,
) {
    // Define WS Route (Matches root path "/")
    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let bridge = bridge.clone();
            let radio_tx = radio_tx.clone();

            ws.on_upgrade(move |socket| handle_connection(socket, bridge, radio_tx))
        });

    let routes = ws_route.with(warp::cors().allow_any_origin());

    info!("WebSocket server running on ws://{}", addr);
    warp::serve(routes).run(addr).await;
}

async fn handle_connection(
    ws: warp::ws::WebSocket,
    bridge: NfcBridge,
    radio_tx: broadcast::Sender<OutgoingMessage>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
    let mut radio_rx = radio_tx.subscribe();

    // Replies for this client and radio broadcasts -> Client
    let writer = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(msg) = reply_rx.recv() => msg,
                radio = radio_rx.recv() => match radio {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client lagging, skipped {} radio messages", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    error!("Failed to serialize {:?}: {}", msg, err);
                    continue;
                }
            };
            if client_ws_tx.send(warp::ws::Message::text(json)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages from Client
    while let Some(result) = client_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(err) => {
                warn!("WebSocket error: {}", err);
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.to_str() else {
            continue;
        };

        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(parsed) => dispatch(parsed, &bridge, &reply_tx),
            Err(err) => {
                debug!("Unparseable message {:?}: {}", text, err);
                let _ = reply_tx.send(OutgoingMessage::ProtocolError {
                    error: err.to_string(),
                });
            }
        }
    }

    writer.abort();
}

fn dispatch(
    msg: IncomingMessage,
    bridge: &NfcBridge,
    replies: &mpsc::UnboundedSender<OutgoingMessage>,
) {
    match msg {
        IncomingMessage::HasNfc { request_id } => {
            respond(bridge, replies, request_id, move |bridge| async move {
                let enabled = bridge.has_nfc_support().await?;
                Ok(OutgoingMessage::NfcSupport {
                    request_id,
                    enabled,
                })
            })
        }
        IncomingMessage::BeginSession {
            request_id,
            mode,
            keep_alive_after_read,
            alert_message,
        } => respond(bridge, replies, request_id, move |bridge| async move {
            let tag = bridge
                .begin_session(mode, keep_alive_after_read, alert_message)
                .await?;
            Ok(OutgoingMessage::TagRead { request_id, tag })
        }),
        IncomingMessage::Write {
            request_id,
            records,
            alert_message,
            written_alert_message,
        } => respond(bridge, replies, request_id, move |bridge| async move {
            bridge
                .write(records, alert_message, written_alert_message)
                .await?;
            Ok(OutgoingMessage::Written { request_id })
        }),
        IncomingMessage::EndSession { request_id } => {
            respond(bridge, replies, request_id, move |bridge| async move {
                bridge.end_session().await?;
                Ok(OutgoingMessage::SessionEnded { request_id })
            })
        }
        radio => {
            if let Some(event) = radio_event(radio) {
                bridge.radio_events().post(event);
            }
        }
    }
}

// Each request resolves on its own task so a pending scan never blocks an endSession
fn respond<F, Fut>(
    bridge: &NfcBridge,
    replies: &mpsc::UnboundedSender<OutgoingMessage>,
    request_id: u64,
    call: F,
) where
    F: FnOnce(NfcBridge) -> Fut,
    Fut: Future<Output = Result<OutgoingMessage, SessionError>> + Send + 'static,
{
    let replies = replies.clone();
    let pending = call(bridge.clone());

    tokio::spawn(async move {
        let reply = pending
            .await
            .unwrap_or_else(|err| OutgoingMessage::failed(request_id, &err));
        let _ = replies.send(reply);
    });
}

fn radio_event(msg: IncomingMessage) -> Option<RadioEvent> {
    Some(match msg {
        IncomingMessage::TagDetected {
            session_id,
            tag_id,
            message,
        } => RadioEvent::TagDetected {
            session: session_id,
            uid: tag_id,
            message,
        },
        IncomingMessage::TagWritten { session_id, error } => RadioEvent::WriteCompleted {
            session: session_id,
            result: error.map_or(Ok(()), Err),
        },
        IncomingMessage::UserCanceled { session_id } => RadioEvent::UserCanceled {
            session: session_id,
        },
        IncomingMessage::RadioError { session_id, error } => RadioEvent::RadioError {
            session: session_id,
            error,
        },
        _ => return None,
    })
}
