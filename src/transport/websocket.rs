// src/transport/websocket.rs

//! The streaming connection: one upgraded full-duplex socket carrying one
//! JSON value per frame.

use crate::core::dispatch::RequestPayload;
use crate::core::errors::BayeuxError;
use crate::core::protocol::{Connection, Message, STREAMING_PRIORITY};
use crate::core::state::ServerState;
use axum::extract::ws::{self, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// A frame handed to the writer task.
enum Outbound {
    Text(String),
    Close,
}

/// The streaming connection. Sends are non-blocking: frames are serialised
/// inline and queued to a dedicated writer task, which preserves enqueue
/// order and flips the liveness flag on the first write failure.
pub struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl Connection for WebSocketConnection {
    fn send(&self, batch: Vec<Message>) -> Result<(), BayeuxError> {
        if !self.is_connected() {
            return Err(BayeuxError::ConnectionClosed);
        }
        let frame = serde_json::to_string(&batch)?;
        self.outbound.send(Outbound::Text(frame)).map_err(|_| {
            self.connected.store(false, Ordering::Relaxed);
            BayeuxError::ConnectionClosed
        })
    }

    fn send_jsonp(&self, _batch: Vec<Message>, _callback: &str) -> Result<(), BayeuxError> {
        Err(BayeuxError::JsonpUnsupported)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn is_single_shot(&self) -> bool {
        false
    }

    fn priority(&self) -> u8 {
        STREAMING_PRIORITY
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Serves one upgraded socket until the peer goes away: frames are decoded
/// and dispatched, and an empty array is echoed back as a liveness ping.
pub async fn serve(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(true));

    let conn: Arc<dyn Connection> = Arc::new(WebSocketConnection {
        outbound: outbound_tx,
        connected: Arc::clone(&connected),
    });

    // Writer task: the only holder of the sink half. Client sends enqueue
    // frames; a wire error here marks the connection dead for all of them.
    let writer_connected = Arc::clone(&connected);
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(ws::Message::Text(text.into())).await.is_err() {
                        writer_connected.store(false, Ordering::Relaxed);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(ws::Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(read) = stream.next().await {
        let frame = match read {
            Ok(frame) => frame,
            Err(e) => {
                debug!("While reading from socket: {e}");
                break;
            }
        };

        match frame {
            ws::Message::Text(text) => match serde_json::from_str::<Value>(text.as_str()) {
                Ok(Value::Array(items)) if items.is_empty() => {
                    // Liveness ping: echo the empty batch back.
                    if conn.send(Vec::new()).is_err() {
                        break;
                    }
                }
                Ok(Value::Array(items)) => {
                    state.dispatcher.dispatch(RequestPayload::Batch(items), &conn);
                }
                Ok(value) => {
                    state.dispatcher.dispatch(RequestPayload::Single(value), &conn);
                }
                Err(e) => debug!("Couldn't decode socket frame: {e}"),
            },
            ws::Message::Close(_) => {
                debug!("Close frame received from peer");
                break;
            }
            // Ping/pong are answered by the protocol layer; binary frames
            // carry nothing in Bayeux.
            ws::Message::Ping(_) | ws::Message::Pong(_) | ws::Message::Binary(_) => {}
        }
    }

    connected.store(false, Ordering::Relaxed);
    conn.close();
    let _ = writer.await;
    debug!("Streaming connection closed");
}
