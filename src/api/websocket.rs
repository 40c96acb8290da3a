//! WebSocket handler for live scan updates.

use crate::filters::RawFilterConfig;
use crate::rate_limiter::Priority;
use crate::scanner::{ScanResult, SpreadCandidate, SpreadStrategy};
use crate::state::AppState;
use crate::streaming::{StreamEvent, StreamProfile};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// WebSocket message types sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// Connection established.
    #[serde(rename = "connected")]
    Connected {
        /// Welcome message.
        message: String,
        /// Heartbeat period in seconds.
        heartbeat_secs: u64,
    },
    /// Subscription acknowledged.
    #[serde(rename = "subscribed")]
    Subscribed {
        /// Normalised symbols now streamed to this session.
        symbols: Vec<String>,
        /// Inputs that are not valid symbols.
        rejected: Vec<String>,
        /// Session filters, or none when following the defaults.
        filters: Option<Vec<RawFilterConfig>>,
    },
    /// Unsubscription acknowledged.
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        /// Symbols no longer streamed to this session.
        symbols: Vec<String>,
    },
    /// Session filters replaced.
    #[serde(rename = "filters_updated")]
    FiltersUpdated {
        /// Session filters, or none when following the defaults.
        filters: Option<Vec<RawFilterConfig>>,
    },
    /// Spread set of a subscribed symbol changed.
    #[serde(rename = "scan_update")]
    ScanUpdate {
        /// Symbol.
        symbol: String,
        /// When the chain was fetched.
        scan_time: DateTime<Utc>,
        /// Spreads in the current result.
        result_count: usize,
        /// Spreads new since the previous update.
        added: Vec<SpreadCandidate>,
        /// Ids of spreads gone since the previous update.
        removed: Vec<String>,
    },
    /// Reply to an on-demand scan.
    #[serde(rename = "scan_result")]
    ScanResult {
        /// Full scan result.
        result: ScanResult,
    },
    /// A rescan or on-demand scan failed.
    #[serde(rename = "scan_error")]
    ScanError {
        /// Symbol.
        symbol: String,
        /// Error message.
        error: String,
    },
    /// Heartbeat/ping.
    #[serde(rename = "heartbeat")]
    Heartbeat {
        /// Timestamp in milliseconds.
        timestamp: u64,
    },
    /// Reply to a client ping.
    #[serde(rename = "pong")]
    Pong {
        /// Timestamp in milliseconds.
        timestamp: u64,
    },
    /// Malformed client message or rejected command.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
    },
}

impl From<StreamEvent> for WsMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::ScanUpdate {
                symbol,
                scan_time,
                result_count,
                added,
                removed,
                ..
            } => WsMessage::ScanUpdate {
                symbol,
                scan_time,
                result_count,
                added,
                removed,
            },
            StreamEvent::ScanError { symbol, error, .. } => WsMessage::ScanError { symbol, error },
        }
    }
}

/// Commands accepted from clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    Subscribe {
        symbols: Vec<String>,
        #[serde(default)]
        filters: Option<Vec<RawFilterConfig>>,
    },
    Unsubscribe {
        symbols: Vec<String>,
    },
    /// `null` or absent filters go back to the defaults.
    UpdateFilters {
        #[serde(default)]
        filters: Option<Vec<RawFilterConfig>>,
    },
    Scan {
        symbol: String,
        #[serde(default)]
        filters: Option<Vec<RawFilterConfig>>,
        #[serde(default)]
        strategy: Option<SpreadStrategy>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Ping,
}

/// Symbols and filter profile of one connection.
#[derive(Debug, Default)]
struct SessionState {
    symbols: HashSet<String>,
    profile: StreamProfile,
}

impl SessionState {
    fn sorted_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols.iter().cloned().collect();
        symbols.sort();
        symbols
    }
}

type Session = Arc<Mutex<SessionState>>;

/// WebSocket upgrade handler.
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "WebSocket connection established")
    ),
    tag = "WebSocket"
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.streamer.subscribe_events();
    let heartbeat = state.streamer.config().heartbeat();

    let connected_msg = WsMessage::Connected {
        message: "Connected to Option Chain Scanner".to_string(),
        heartbeat_secs: heartbeat.as_secs(),
    };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    info!("WebSocket client connected");

    // Streamer registrations are changed under this lock, never across an
    // await, so aborting either task leaves it consistent with the streamer.
    let session: Session = Arc::new(Mutex::new(SessionState::default()));

    // Replies and the session's view after each command travel to the send
    // side over this channel, in command order.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<SessionUpdate>();

    let state_clone = Arc::clone(&state);
    let session_clone = Arc::clone(&session);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("Received WebSocket message: {}", text);
                    if !handle_client_message(&text, &state_clone, &session_clone, &reply_tx).await
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        let mut symbols: HashSet<String> = HashSet::new();
        let mut profile = StreamProfile::default().key().to_string();
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
        loop {
            let msg = tokio::select! {
                update = reply_rx.recv() => match update {
                    Some(update) => {
                        symbols = update.symbols;
                        profile = update.profile;
                        update.reply
                    }
                    None => break,
                },
                event = event_rx.recv() => match event {
                    Ok(event) if event.profile() == profile && symbols.contains(event.symbol()) => {
                        WsMessage::from(event)
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WebSocket lagged {} messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp_millis() as u64,
                },
            };

            if let Ok(json) = serde_json::to_string(&msg)
                && sender.send(Message::Text(json.into())).await.is_err()
            {
                break;
            }
        }
    });

    // Whichever side ends first takes the other down; a half-open peer must
    // not keep its subscriptions alive.
    tokio::select! {
        _ = &mut recv_task => {
            send_task.abort();
            let _ = send_task.await;
        }
        _ = &mut send_task => {
            recv_task.abort();
            let _ = recv_task.await;
        }
    }

    let (profile, symbols) = {
        let mut session = session.lock();
        let symbols = session.sorted_symbols();
        session.symbols.clear();
        (session.profile.clone(), symbols)
    };
    state.streamer.unsubscribe(&profile, &symbols);
    info!("WebSocket connection closed");
}

/// Outgoing reply plus the session's view after the command.
#[derive(Debug)]
struct SessionUpdate {
    symbols: HashSet<String>,
    profile: String,
    reply: WsMessage,
}

/// Queues `reply` along with the session's current view. Returns false
/// once the send side is gone.
fn send_reply(
    reply_tx: &mpsc::UnboundedSender<SessionUpdate>,
    session: &Session,
    reply: WsMessage,
) -> bool {
    let (symbols, profile) = {
        let session = session.lock();
        (session.symbols.clone(), session.profile.key().to_string())
    };
    reply_tx
        .send(SessionUpdate {
            symbols,
            profile,
            reply,
        })
        .is_ok()
}

/// Moves every symbol of the session to `profile`. Returns the moved symbols.
fn switch_profile(state: &AppState, session: &mut SessionState, profile: StreamProfile) -> Vec<String> {
    if session.profile.key() == profile.key() {
        session.profile = profile;
        return Vec::new();
    }
    let symbols = session.sorted_symbols();
    state.streamer.unsubscribe(&session.profile, &symbols);
    state.streamer.subscribe(&profile, &symbols);
    session.profile = profile;
    symbols
}

/// Sends a full snapshot of each symbol under the session's profile.
async fn send_snapshots(
    symbols: Vec<String>,
    state: &Arc<AppState>,
    session: &Session,
    reply_tx: &mpsc::UnboundedSender<SessionUpdate>,
) -> bool {
    for symbol in symbols {
        let profile = session.lock().profile.clone();
        let snapshot = state.streamer.snapshot(&profile, &symbol).await;
        if !send_reply(reply_tx, session, WsMessage::from(snapshot)) {
            return false;
        }
    }
    true
}

/// Handles one client message. Returns false once the send side is gone.
async fn handle_client_message(
    text: &str,
    state: &Arc<AppState>,
    session: &Session,
    reply_tx: &mpsc::UnboundedSender<SessionUpdate>,
) -> bool {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("Unparseable client command: {}", e);
            return send_reply(
                reply_tx,
                session,
                WsMessage::Error {
                    message: format!("invalid command: {}", e),
                },
            );
        }
    };

    match command {
        ClientCommand::Subscribe {
            symbols: requested,
            filters,
        } => {
            let profile = match filters.map(|f| StreamProfile::new(Some(f))).transpose() {
                Ok(profile) => profile,
                Err(e) => {
                    return send_reply(
                        reply_tx,
                        session,
                        WsMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            };

            let (mut snapshots, accepted, reply) = {
                let mut guard = session.lock();
                let moved = match profile {
                    Some(profile) => switch_profile(state, &mut guard, profile),
                    None => Vec::new(),
                };
                let fresh: Vec<String> = requested
                    .into_iter()
                    .filter(|s| !guard.symbols.contains(&s.trim().to_ascii_uppercase()))
                    .collect();
                let (accepted, rejected) = state.streamer.subscribe(&guard.profile, &fresh);
                guard.symbols.extend(accepted.iter().cloned());

                let reply = WsMessage::Subscribed {
                    symbols: guard.sorted_symbols(),
                    rejected,
                    filters: guard.profile.filters().map(<[_]>::to_vec),
                };
                (moved, accepted, reply)
            };
            snapshots.extend(accepted);

            if !send_reply(reply_tx, session, reply) {
                return false;
            }
            send_snapshots(snapshots, state, session, reply_tx).await
        }
        ClientCommand::Unsubscribe { symbols: requested } => {
            let removed = {
                let mut guard = session.lock();
                let owned: Vec<String> = requested
                    .into_iter()
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| guard.symbols.remove(s))
                    .collect();
                state.streamer.unsubscribe(&guard.profile, &owned)
            };
            send_reply(reply_tx, session, WsMessage::Unsubscribed { symbols: removed })
        }
        ClientCommand::UpdateFilters { filters } => {
            let profile = match StreamProfile::new(filters) {
                Ok(profile) => profile,
                Err(e) => {
                    return send_reply(
                        reply_tx,
                        session,
                        WsMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            };

            let (moved, filters) = {
                let mut guard = session.lock();
                let moved = switch_profile(state, &mut guard, profile);
                (moved, guard.profile.filters().map(<[_]>::to_vec))
            };
            debug!("Session filters updated, {} symbols moved", moved.len());

            if !send_reply(reply_tx, session, WsMessage::FiltersUpdated { filters }) {
                return false;
            }
            send_snapshots(moved, state, session, reply_tx).await
        }
        ClientCommand::Scan {
            symbol,
            filters,
            strategy,
            limit,
        } => {
            let filters = filters
                .or_else(|| session.lock().profile.filters().map(<[_]>::to_vec))
                .unwrap_or_else(|| state.default_filters());
            let strategy = strategy.or(state.config.scanner.default_strategy);

            let reply = match state.coordinator.plan(&filters, strategy, limit) {
                Ok(plan) => match state
                    .coordinator
                    .scan_symbol(&symbol, &plan, Priority::High)
                    .await
                {
                    Ok(result) => WsMessage::ScanResult {
                        result: result.as_ref().clone(),
                    },
                    Err(e) => WsMessage::ScanError {
                        symbol,
                        error: e.to_string(),
                    },
                },
                Err(e) => WsMessage::Error {
                    message: e.to_string(),
                },
            };
            send_reply(reply_tx, session, reply)
        }
        ClientCommand::Ping => send_reply(
            reply_tx,
            session,
            WsMessage::Pong {
                timestamp: Utc::now().timestamp_millis() as u64,
            },
        ),
    }
}
