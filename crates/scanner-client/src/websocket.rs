//! WebSocket client for live scan updates.

use crate::error::Error;
use crate::types::{FilterConfig, ScanResult, SpreadCandidate, SpreadStrategy};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// WebSocket message types received from the server.
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
    /// Subscription confirmation.
    #[serde(rename = "subscribed")]
    Subscribed {
        /// Symbols now streamed to this session.
        symbols: Vec<String>,
        /// Inputs that are not valid symbols.
        rejected: Vec<String>,
        /// Session filters, or none when following the defaults.
        #[serde(default)]
        filters: Option<Vec<FilterConfig>>,
    },
    /// Unsubscription confirmation.
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        /// Symbols no longer streamed.
        symbols: Vec<String>,
    },
    /// Session filters replaced.
    #[serde(rename = "filters_updated")]
    FiltersUpdated {
        /// Session filters, or none when following the defaults.
        #[serde(default)]
        filters: Option<Vec<FilterConfig>>,
    },
    /// Spread set of a subscribed symbol changed.
    #[serde(rename = "scan_update")]
    ScanUpdate {
        /// Symbol.
        symbol: String,
        /// When the chain was fetched (RFC 3339).
        scan_time: String,
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
    /// Reply to a ping.
    #[serde(rename = "pong")]
    Pong {
        /// Timestamp in milliseconds.
        timestamp: u64,
    },
    /// Error message.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
    },
}

/// Commands that can be sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Start streaming updates for symbols, optionally switching the
    /// session's filters.
    Subscribe {
        /// Symbols.
        symbols: Vec<String>,
        /// Session filters. Absent keeps the current ones.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<Vec<FilterConfig>>,
    },
    /// Stop streaming updates for symbols.
    Unsubscribe {
        /// Symbols.
        symbols: Vec<String>,
    },
    /// Replace the session's filters. `None` goes back to the defaults.
    UpdateFilters {
        /// Session filters.
        filters: Option<Vec<FilterConfig>>,
    },
    /// Scan one symbol now and reply with the full result.
    Scan {
        /// Symbol.
        symbol: String,
        /// Filters. Absent uses the session's.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<Vec<FilterConfig>>,
        /// Spread strategy.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategy: Option<SpreadStrategy>,
        /// Result limit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    /// Liveness check, answered with a pong.
    Ping,
}

/// WebSocket client for receiving live scan updates.
pub struct WsClient {
    rx: mpsc::Receiver<WsMessage>,
    tx: mpsc::Sender<ClientCommand>,
}

impl WsClient {
    /// Connects to the WebSocket server.
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:8080/ws")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (ws_stream, _) = connect_async(url).await.map_err(Box::new)?;
        let (mut write, mut read) = ws_stream.split();

        // Channel for receiving messages
        let (msg_tx, msg_rx) = mpsc::channel::<WsMessage>(100);

        // Channel for sending commands
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCommand>(100);

        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Ok(ws_msg) = serde_json::from_str::<WsMessage>(&text)
                            && msg_tx.send(ws_msg).await.is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(_) => break,
                    _ => {}
                }
            }
        });

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if let Ok(json) = serde_json::to_string(&cmd)
                    && write.send(Message::Text(json.into())).await.is_err()
                {
                    break;
                }
            }
        });

        Ok(Self {
            rx: msg_rx,
            tx: cmd_tx,
        })
    }

    /// Connects to the `/ws` endpoint of an HTTP base URL.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect_to_base(base_url: &str) -> Result<Self, Error> {
        Self::connect(ws_url(base_url)?.as_str()).await
    }

    /// Receives the next message from the server.
    ///
    /// Returns `None` if the connection is closed.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.rx.recv().await
    }

    /// Sends a command to the server.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn send(&self, cmd: ClientCommand) -> Result<(), Error> {
        self.tx.send(cmd).await.map_err(|_| Error::ConnectionClosed)
    }

    /// Subscribes to updates for symbols.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn subscribe(&self, symbols: &[&str]) -> Result<(), Error> {
        self.send(ClientCommand::Subscribe {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            filters: None,
        })
        .await
    }

    /// Subscribes to updates for symbols under session filters.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn subscribe_with_filters(
        &self,
        symbols: &[&str],
        filters: Vec<FilterConfig>,
    ) -> Result<(), Error> {
        self.send(ClientCommand::Subscribe {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            filters: Some(filters),
        })
        .await
    }

    /// Replaces the session filters; `None` reverts to the defaults.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn update_filters(&self, filters: Option<Vec<FilterConfig>>) -> Result<(), Error> {
        self.send(ClientCommand::UpdateFilters { filters }).await
    }

    /// Requests an immediate scan of one symbol.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn scan(
        &self,
        symbol: &str,
        strategy: Option<SpreadStrategy>,
        limit: Option<usize>,
    ) -> Result<(), Error> {
        self.send(ClientCommand::Scan {
            symbol: symbol.to_string(),
            filters: None,
            strategy,
            limit,
        })
        .await
    }

    /// Sends a ping.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn ping(&self) -> Result<(), Error> {
        self.send(ClientCommand::Ping).await
    }

    /// Unsubscribes from updates for symbols.
    ///
    /// # Errors
    /// Returns error if the send fails.
    pub async fn unsubscribe(&self, symbols: &[&str]) -> Result<(), Error> {
        self.send(ClientCommand::Unsubscribe {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        })
        .await
    }
}

/// Maps `http(s)://host/prefix` to `ws(s)://host/prefix/ws`.
fn ws_url(base_url: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // Switching between special schemes is always accepted.
    let _ = url.set_scheme(scheme);
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_base() {
        assert_eq!(
            ws_url("http://127.0.0.1:8080").unwrap().as_str(),
            "ws://127.0.0.1:8080/ws"
        );
        assert_eq!(
            ws_url("https://scanner.example.com/api/").unwrap().as_str(),
            "wss://scanner.example.com/api/ws"
        );
        assert!(ws_url("not a url").is_err());
    }

    #[test]
    fn test_command_serialization() {
        let json = serde_json::to_string(&ClientCommand::Subscribe {
            symbols: vec!["SPY".to_string()],
            filters: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"subscribe","symbols":["SPY"]}"#);

        let json = serde_json::to_string(&ClientCommand::UpdateFilters { filters: None }).unwrap();
        assert_eq!(json, r#"{"action":"update_filters","filters":null}"#);
        let json = serde_json::to_string(&ClientCommand::Ping).unwrap();
        assert_eq!(json, r#"{"action":"ping"}"#);
    }

    #[test]
    fn test_scan_update_deserialization() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"type":"scan_update","data":{"symbol":"SPY","scan_time":"2025-01-02T15:00:00Z",
                "result_count":0,"added":[],"removed":["SPY-20250131-P-480.00-485.00-credit"]}}"#,
        )
        .unwrap();
        match msg {
            WsMessage::ScanUpdate { symbol, removed, .. } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(removed.len(), 1);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
