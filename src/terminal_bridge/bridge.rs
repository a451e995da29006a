use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use warp::ws::{Message, WebSocket};

use super::backend::{LiveContainerStream, TerminalBackend};
use super::simulated::SimulatedStream;
use crate::container_management::container_manager::ContainerManager;
use crate::container_runtime::types::ContainerStatus;
use crate::session_management::session_registry::SessionRegistry;

/// Connection-establishment parameters presented by the client.
#[derive(Debug, Deserialize)]
pub struct TerminalParams {
    pub session_id: i64,
    pub token: String,
}

/// Close code sent when session validation fails. Distinct from normal
/// closure so clients can tell an auth problem from a hangup.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

fn banner(color: &str, text: &str) -> Message {
    Message::text(format!("\r\n\x1b[1;{}m{}\x1b[0m\r\n", color, text))
}

fn banner_ok(text: &str) -> Message {
    banner("32", text)
}

fn banner_error(text: &str) -> Message {
    banner("31", text)
}

fn banner_notice(text: &str) -> Message {
    banner("33", text)
}

enum PumpEvent {
    FromContainer(Option<Vec<u8>>),
    FromClient(Option<Result<Message, warp::Error>>),
}

/// Serves one terminal WebSocket connection end to end.
///
/// Authentication failures close the socket immediately with a policy
/// code and no further I/O. After that the backend is selected once:
/// live when the bound container is running and attachable, simulated
/// otherwise. A live backend that errors or EOFs mid-stream degrades to
/// the simulated shell instead of dropping the connection.
pub async fn handle_connection(
    ws: WebSocket,
    params: TerminalParams,
    sessions: Arc<SessionRegistry>,
    containers: Arc<ContainerManager>,
) {
    let (mut tx, mut rx) = ws.split();

    let session = match sessions.validate(params.session_id, &params.token).await {
        Ok(session) => session,
        Err(_) => {
            debug!(
                "Rejected terminal connection for session {}: invalid credentials",
                params.session_id
            );
            let _ = tx
                .send(Message::close_with(CLOSE_POLICY_VIOLATION, "Invalid session"))
                .await;
            return;
        }
    };
    sessions.touch(session.id).await;
    info!("Terminal connected for session {}", session.id);

    // Backend selection happens exactly once per connection.
    let mut live = false;
    let mut backend: Box<dyn TerminalBackend> = if !session.has_container() {
        let _ = tx
            .send(banner_notice(
                "Using the simulated terminal (no container assigned)",
            ))
            .await;
        Box::new(SimulatedStream::new())
    } else {
        match containers.check_status(&session.container_id).await {
            ContainerStatus::Running => match containers.attach(&session.container_id).await {
                Ok(io) => {
                    let _ = tx.send(banner_ok("Connected to sandbox container")).await;
                    live = true;
                    Box::new(LiveContainerStream::new(io))
                }
                Err(e) => {
                    warn!(
                        "Attach failed for container {}: {}",
                        session.container_id, e
                    );
                    let _ = tx.send(banner_error("Could not attach to the container")).await;
                    let _ = tx
                        .send(banner_notice("Falling back to the simulated terminal"))
                        .await;
                    Box::new(SimulatedStream::new())
                }
            },
            status => {
                debug!(
                    "Container {} not attachable (status: {}), using simulated terminal",
                    session.container_id, status
                );
                let _ = tx
                    .send(banner_notice(
                        "Container is not running; using the simulated terminal",
                    ))
                    .await;
                Box::new(SimulatedStream::new())
            }
        }
    };

    loop {
        let event = tokio::select! {
            chunk = backend.read_output() => PumpEvent::FromContainer(chunk),
            message = rx.next() => PumpEvent::FromClient(message),
        };

        match event {
            PumpEvent::FromContainer(Some(bytes)) => {
                if tx.send(Message::binary(bytes)).await.is_err() {
                    debug!("Client side closed while forwarding output");
                    break;
                }
            }
            PumpEvent::FromContainer(None) => {
                if live {
                    // The engine side died; keep the session alive on the
                    // simulated shell.
                    let _ = tx
                        .send(banner_notice(
                            "Connection to the container ended; switching to the simulated terminal",
                        ))
                        .await;
                    backend = Box::new(SimulatedStream::new());
                    live = false;
                } else {
                    break;
                }
            }
            PumpEvent::FromClient(Some(Ok(message))) => {
                if message.is_close() {
                    debug!("Client closed terminal for session {}", session.id);
                    break;
                }
                if message.is_ping() || message.is_pong() {
                    continue;
                }

                // Every inbound write counts as activity; a session the
                // sweep closed mid-stream fails here and ends the
                // connection.
                if !sessions.touch(session.id).await {
                    let _ = tx.send(banner_error("Session expired or closed")).await;
                    break;
                }

                if let Err(e) = backend.write_input(message.as_bytes()).await {
                    if live {
                        warn!(
                            "Error sending input to container for session {}: {}",
                            session.id, e
                        );
                        let _ = tx
                            .send(banner_error(
                                "Error sending data to the container; switching to the simulated terminal",
                            ))
                            .await;
                        backend = Box::new(SimulatedStream::new());
                        live = false;
                    } else {
                        break;
                    }
                }
            }
            PumpEvent::FromClient(Some(Err(e))) => {
                debug!("WebSocket error for session {}: {}", session.id, e);
                break;
            }
            PumpEvent::FromClient(None) => {
                debug!("Client disconnected from session {}", session.id);
                break;
            }
        }
    }

    // The local stream handle is released here; the container and the
    // session stay alive so the client can reconnect. Explicit teardown
    // happens through the close endpoint or the expiry sweep.
    info!("Terminal disconnected for session {}", session.id);
}
