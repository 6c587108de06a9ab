use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use poker_domain::{ClientCommand, ServerEvent, ServiceError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TableHandle;

#[derive(Clone)]
struct ServerState {
    table: TableHandle,
    shutdown: CancellationToken,
}

/// Running WebSocket front of a scripted table.
pub struct TableServer {
    address: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TableServer {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.address)
    }

    /// Closes every open socket, then waits for the server task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "table server task failed");
        }
    }
}

/// Serves the table on `/ws`, one attached connection per socket.
pub async fn serve_ws(listener: TcpListener, table: TableHandle) -> std::io::Result<TableServer> {
    let address = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let app = Router::new()
        .route("/ws", get(upgrade_handler))
        .with_state(ServerState {
            table,
            shutdown: shutdown.clone(),
        });

    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            signal.cancelled().await;
        });
        if let Err(err) = server.await {
            warn!(error = %err, "table server exited with error");
        }
    });
    info!(%address, "scripted table listening");

    Ok(TableServer {
        address,
        shutdown,
        task,
    })
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> axum::response::Response {
    ws.on_upgrade(|socket| client_loop(socket, state))
}

async fn client_loop(mut socket: WebSocket, state: ServerState) {
    let (commands, mut events) = state.table.attach("ws");

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break,
            frame = events.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let Ok(text) = serde_json::to_string(&frame) else {
                    warn!(event = %frame.event, "failed to serialise frame");
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(command) => {
                            if commands.send(command).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "invalid command payload");
                            let reply = ServerEvent::Error(ServiceError {
                                message: format!("invalid command: {err}"),
                            });
                            if let Ok(frame) = reply.to_frame() {
                                if let Ok(text) = serde_json::to_string(&frame) {
                                    let _ = socket.send(Message::Text(text)).await;
                                }
                            }
                        }
                    },
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) | Message::Pong(_) => {}
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
    debug!("table socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TableSettings, spawn_table};
    use futures_util::{SinkExt, StreamExt};
    use poker_domain::{DeviceId, RawFrame};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    #[tokio::test]
    async fn registers_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server = serve_ws(listener, spawn_table(TableSettings::default()))
            .await
            .expect("serve");
        let (mut socket, _response) = connect_async(server.endpoint()).await.expect("connect");

        let command = ClientCommand::RegisterDevice {
            device_id: DeviceId::from("dev-ws"),
        };
        socket
            .send(WsMessage::Text(serde_json::to_string(&command).expect("encode")))
            .await
            .expect("send");
        let reply = loop {
            match socket.next().await.expect("frame").expect("message") {
                WsMessage::Text(text) => break text,
                _ => continue,
            }
        };
        let frame: RawFrame = serde_json::from_str(&reply).expect("frame json");
        assert_eq!(frame.event, "deviceRegistered");
        assert_eq!(frame.data["deviceId"], "dev-ws");

        socket
            .send(WsMessage::Text("{\"event\":\"dance\"}".to_string()))
            .await
            .expect("send");
        let reply = loop {
            match socket.next().await.expect("frame").expect("message") {
                WsMessage::Text(text) => break text,
                _ => continue,
            }
        };
        let frame: RawFrame = serde_json::from_str(&reply).expect("frame json");
        assert_eq!(frame.event, "error");

        drop(socket);
        server.shutdown().await;
    }
}
