//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::arena::{ArenaEvent, ArenaService, TankEntry};
use crate::game::{MatchEvent, MatchHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ClientRole, ServerMsg, TankInfo};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub role: ClientRole,
    /// Display name for tank connections
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let connection_id = Uuid::new_v4();
    let arena = state.arena.clone();
    info!(connection_id = %connection_id, role = ?query.role, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before announcing anything so no lobby event is missed
    let lobby_rx = arena.subscribe();

    let welcome = ServerMsg::Welcome {
        connection_id,
        server_time: unix_millis(),
        available_tanks: arena
            .available_tanks()
            .into_iter()
            .map(|t| TankInfo {
                tank_id: t.id,
                name: t.name,
            })
            .collect(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(connection_id = %connection_id, error = %e, "Failed to send welcome");
        return;
    }

    let tank = match query.role {
        ClientRole::Tank => {
            let name = query.name.as_deref().unwrap_or_default();
            let entry = arena.register_tank(connection_id, name);
            let registered = ServerMsg::Registered {
                tank_id: entry.id,
                name: entry.name.clone(),
            };
            if let Err(e) = send_msg(&mut ws_sink, &registered).await {
                error!(connection_id = %connection_id, error = %e, "Failed to send registration");
                arena.disconnect(connection_id);
                return;
            }
            Some(entry)
        }
        ClientRole::Spectator => None,
    };

    run_session(connection_id, tank, &arena, ws_sink, ws_stream, lobby_rx).await;

    arena.disconnect(connection_id);
    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: Uuid,
    tank: Option<TankEntry>,
    arena: &ArenaService,
    ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    lobby_rx: broadcast::Receiver<ArenaEvent>,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let (reply_tx, reply_rx) = mpsc::channel::<ServerMsg>(32);

    let writer = Writer {
        connection_id,
        tank_id: tank.as_ref().map(|t| t.id),
        arena: arena.clone(),
        ws_sink,
    };
    let writer_handle = tokio::spawn(writer.run(lobby_rx, reply_rx));

    // Reader loop: WebSocket -> arena
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(connection_id = %connection_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if let Some(reply) = handle_client_msg(connection_id, arena, client_msg) {
                            if reply_tx.send(reply).await.is_err() {
                                debug!(connection_id = %connection_id, "Writer gone");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            connection_id = %connection_id,
                            error = %e,
                            "Failed to parse client message"
                        );
                        let _ = reply_tx
                            .send(ServerMsg::error("bad_message", e.to_string()))
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Apply one client message; returns a direct reply if there is one
fn handle_client_msg(
    connection_id: Uuid,
    arena: &ArenaService,
    msg: ClientMsg,
) -> Option<ServerMsg> {
    match msg {
        ClientMsg::Command { .. } => {
            let command = msg.tank_command()?;
            arena
                .command_from(connection_id, &command)
                .map(ServerMsg::FireResult)
        }
        ClientMsg::StartMatch { tank_a, tank_b } => {
            match arena.start_match(connection_id, tank_a, tank_b) {
                Ok(_) => None,
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Match start rejected");
                    Some(ServerMsg::error(e.code(), e.to_string()))
                }
            }
        }
        ClientMsg::EndMatch { match_id } => {
            if arena.stop_match(match_id).is_err() {
                debug!(connection_id = %connection_id, match_id = %match_id, "Match already ended");
            }
            None
        }
        ClientMsg::Ping { t } => Some(ServerMsg::Pong {
            t,
            server_t: unix_millis(),
        }),
    }
}

/// Outbound side of a connection: lobby events, direct replies and the
/// stream of whichever match this connection follows
struct Writer {
    connection_id: Uuid,
    tank_id: Option<Uuid>,
    arena: ArenaService,
    ws_sink: SplitSink<WebSocket, Message>,
}

impl Writer {
    async fn run(
        mut self,
        mut lobby_rx: broadcast::Receiver<ArenaEvent>,
        mut reply_rx: mpsc::Receiver<ServerMsg>,
    ) {
        let mut match_rx: Option<(Uuid, broadcast::Receiver<MatchEvent>)> = None;

        'session: loop {
            let outgoing: Vec<ServerMsg> = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => vec![msg],
                    None => break,
                },
                event = lobby_rx.recv() => match event {
                    Ok(ArenaEvent::MatchStarted { match_id, requester, tank_ids }) => {
                        if !self.follows(requester, &tank_ids) {
                            continue;
                        }
                        let Some(handle) = self.arena.get_match(match_id) else {
                            continue;
                        };
                        let mut out: Vec<ServerMsg> =
                            take_round_end(&mut match_rx).into_iter().collect();
                        match_rx = Some((match_id, handle.subscribe()));
                        out.push(match_started(&handle));
                        out
                    }
                    Ok(event) => ServerMsg::from_lobby(&event).into_iter().collect(),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            connection_id = %self.connection_id,
                            lagged = n,
                            "Lobby receiver lagged"
                        );
                        Vec::new()
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = recv_match(&mut match_rx) => match event {
                    Ok(event) => self.match_msg(event, &mut match_rx).into_iter().collect(),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            connection_id = %self.connection_id,
                            lagged = n,
                            "Client lagged, skipping snapshots"
                        );
                        Vec::new()
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        match_rx = None;
                        Vec::new()
                    }
                },
            };

            for msg in outgoing {
                if let Err(e) = send_msg(&mut self.ws_sink, &msg).await {
                    debug!(
                        connection_id = %self.connection_id,
                        error = %e,
                        "WebSocket send failed"
                    );
                    break 'session;
                }
            }
        }
    }

    /// Tanks follow their own matches; other connections follow the ones they requested
    fn follows(&self, requester: Uuid, tank_ids: &[Uuid; 2]) -> bool {
        match self.tank_id {
            Some(id) => tank_ids.contains(&id),
            None => requester == self.connection_id,
        }
    }

    fn match_msg(
        &self,
        event: MatchEvent,
        match_rx: &mut Option<(Uuid, broadcast::Receiver<MatchEvent>)>,
    ) -> Option<ServerMsg> {
        match event {
            MatchEvent::State(snapshot) => match self.tank_id {
                Some(tank_id) => {
                    let tank = snapshot.tank(tank_id)?.clone();
                    Some(ServerMsg::TankState {
                        match_id: snapshot.match_id,
                        tick: snapshot.tick,
                        tank,
                    })
                }
                None => Some(ServerMsg::GameState { snapshot }),
            },
            MatchEvent::RoundEnded { match_id, reason } => {
                *match_rx = None;
                Some(ServerMsg::RoundEnded { match_id, reason })
            }
        }
    }
}

fn match_started(handle: &MatchHandle) -> ServerMsg {
    ServerMsg::MatchStarted {
        match_id: handle.id,
        tank_ids: handle.tank_ids,
        layout: (*handle.layout).clone(),
    }
}

/// Stop following the current match, keeping its round end if still unread
fn take_round_end(
    match_rx: &mut Option<(Uuid, broadcast::Receiver<MatchEvent>)>,
) -> Option<ServerMsg> {
    let (_, mut rx) = match_rx.take()?;
    loop {
        match rx.try_recv() {
            Ok(MatchEvent::RoundEnded { match_id, reason }) => {
                return Some(ServerMsg::RoundEnded { match_id, reason });
            }
            Ok(MatchEvent::State(_)) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return None,
        }
    }
}

/// Next event of the followed match; pending forever when following none
async fn recv_match(
    match_rx: &mut Option<(Uuid, broadcast::Receiver<MatchEvent>)>,
) -> Result<MatchEvent, broadcast::error::RecvError> {
    match match_rx {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
