//! WebSocket edge of the broker.
//!
//! One task per connection runs the read loop; a second pumps the broker's
//! outbound events into the socket. Frames are JSON text, one event each.
//! A frame that fails to parse closes that connection only.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use super::Broker;
use crate::error::SocketError;
use crate::protocol::ClientEvent;

/// Accept loop. Runs until the listener fails.
pub async fn serve(broker: Arc<Broker>, listener: TcpListener) -> Result<(), anyhow::Error> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let broker = broker.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_socket(broker, stream, addr).await {
                debug!("connection from {addr} ended: {e}");
            }
        });
    }
}

async fn handle_socket(
    broker: Arc<Broker>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), SocketError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    let (conn, mut events) = broker.connect();
    info!("{conn} established from {addr}");

    let mut write_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to serialize outbound event: {e}");
                    continue;
                }
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut result = Ok(());
    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => broker.handle(conn, event).await,
                        Err(e) => {
                            // Connection-local failure: close this link,
                            // everyone else is untouched.
                            warn!("{conn} sent malformed frame, closing: {e}");
                            result = Err(SocketError::MalformedFrame(e));
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => break,
                // Ping/Pong are answered by the websocket layer; binary
                // frames have no meaning in this protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("{conn} socket error: {e}");
                    break;
                }
                None => break,
            },
            _ = &mut write_task => break,
        }
    }

    // Cleanup runs exactly once no matter which path got us here.
    broker.disconnect(conn).await;
    write_task.abort();
    result
}
