//! Networking for the krist node: url negotiation, the websocket session and
//! the submission hand-off between mining threads and the session thread.

pub mod broker;
pub mod client;
mod http;
mod ws;

use crate::krist::address::Address;
use crate::krist::block::Block;
use crate::miner::Solution;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use structopt::StructOpt;
use url::Url;

#[derive(Debug, Clone, StructOpt)]
pub struct NetConfig {
    /// The krist node to connect to
    #[structopt(
        short,
        long,
        default_value = "https://krist.ceriat.net/ws/start"
    )]
    pub node: Url,

    /// Exit instead of reconnecting when the connection drops
    #[structopt(long)]
    pub no_reconnect: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] isahc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("node refused websocket negotiation: {0}")]
    Negotiation(String),

    #[error("connection closed by the node")]
    ConnectionClosed,
}

#[derive(Debug, Clone, Copy)]
pub struct KeepAliveType;

impl<'de> Deserialize<'de> for KeepAliveType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match <&str>::deserialize(deserializer)? {
            "keepalive" => Ok(KeepAliveType),
            _ => Err(D::Error::custom("message type is not keepalive")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitBlockType;

impl Serialize for SubmitBlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("submit_block")
    }
}

/// Messages received from the node.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// The reply to a submission, correlated by id.
    Reply {
        id: u64,

        ok: bool,

        #[serde(default)]
        error: Option<String>,

        #[serde(default)]
        block: Option<Block>,

        #[serde(default)]
        work: Option<u64>,
    },

    /// Any message carrying a mining target: `hello` on connect, `block`
    /// events afterwards.
    Target {
        #[serde(alias = "type")]
        msg_type: String,

        #[serde(default)]
        event: Option<String>,

        #[serde(alias = "last_block")]
        block: Block,

        #[serde(alias = "new_work")]
        work: u64,
    },

    KeepAlive {
        #[serde(alias = "type")]
        msg_type: KeepAliveType,
    },

    Unknown {
        #[serde(alias = "type")]
        msg_type: Option<String>,

        #[serde(flatten)]
        fields: HashMap<String, serde_json::Value>,
    },
}

/// Messages sent to the node.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    SubmitBlock {
        #[serde(rename = "type")]
        msg_type: SubmitBlockType,
        id: u64,
        address: Address,
        nonce: String,
    },
}

impl ClientMessage {
    /// Build a submission tagged with the given correlation id.
    pub fn submit_block(id: u64, solution: &Solution) -> Self {
        ClientMessage::SubmitBlock {
            msg_type: SubmitBlockType,
            id,
            address: solution.address,
            nonce: solution.nonce_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};
    use std::str::FromStr;

    #[test]
    fn parse_hello() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{
                "ok": true,
                "type": "hello",
                "server_time": "2020-01-01T00:00:00.000Z",
                "work": 100000,
                "last_block": {"short_hash": "000000000cad", "height": 5, "value": 25}
            }"#,
        )
        .unwrap();

        match msg {
            ServerMessage::Target {
                msg_type,
                event,
                block,
                work,
            } => {
                assert_eq!(msg_type, "hello");
                assert_eq!(event, None);
                assert_eq!(block.short_hash.into_hex(), "000000000cad");
                assert_eq!(work, 100000);
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn parse_block_event() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{
                "type": "event",
                "event": "block",
                "block": {"short_hash": "abcdef012345", "height": 6},
                "new_work": 90000
            }"#,
        )
        .unwrap();

        match msg {
            ServerMessage::Target {
                msg_type,
                event,
                block,
                work,
            } => {
                assert_eq!(msg_type, "event");
                assert_eq!(event.as_deref(), Some("block"));
                assert_eq!(block.short_hash.into_hex(), "abcdef012345");
                assert_eq!(work, 90000);
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn parse_accepted_reply() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{
                "ok": true,
                "type": "response",
                "id": 1,
                "success": true,
                "work": 50000,
                "block": {"short_hash": "abcdef012345", "height": 7}
            }"#,
        )
        .unwrap();

        match msg {
            ServerMessage::Reply {
                id,
                ok,
                error,
                block,
                work,
            } => {
                assert_eq!(id, 1);
                assert!(ok);
                assert_eq!(error, None);
                assert_eq!(block.unwrap().short_hash.into_hex(), "abcdef012345");
                assert_eq!(work, Some(50000));
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn parse_rejected_reply() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"ok": false, "type": "response", "id": 1, "error": "solution_duplicate"}"#,
        )
        .unwrap();

        match msg {
            ServerMessage::Reply {
                id,
                ok,
                error,
                block,
                work,
            } => {
                assert_eq!(id, 1);
                assert!(!ok);
                assert_eq!(error.as_deref(), Some("solution_duplicate"));
                assert_eq!(block, None);
                assert_eq!(work, None);
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn parse_keepalive() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type": "keepalive", "server_time": "2020-01-01T00:00:00.000Z"}"#,
        )
        .unwrap();

        assert!(matches!(msg, ServerMessage::KeepAlive { .. }));
    }

    #[test]
    fn parse_unknown() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type": "motd", "motd": "hello"}"#).unwrap();

        match msg {
            ServerMessage::Unknown { msg_type, .. } => {
                assert_eq!(msg_type.as_deref(), Some("motd"))
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn submit_block_serialization() {
        let solution = Solution {
            address: Address::from_str("k5ztameslf").unwrap(),
            nonce: *b"aa0123456789",
        };

        let expected = json!({
            "type": "submit_block",
            "id": 5,
            "address": "k5ztameslf",
            "nonce": "aa0123456789"
        });

        assert_eq!(
            expected,
            to_value(ClientMessage::submit_block(5, &solution)).unwrap()
        );
    }
}
