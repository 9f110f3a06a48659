//! Wire codec for gateway frames.
//!
//! Every frame is one flat JSON object sent as a WebSocket text message.
//!
//! Outbound frames carry the request fields plus the reserved `action` and
//! `nonce` keys. The nonce is the request's sequence number in string form.
//!
//! Inbound frames carry `ok` and `nonce` when they answer a request, a `type`
//! discriminator when they carry an event, or both. [`decode`] splits a frame
//! into its reply part and its event part so the engine can run both paths.

use serde::Deserialize;
use serde_json::Value;

use craft_core::{ActionData, ActionType, Block, BlockUpdateCause, CraftError, Location, Player, Result};

use crate::events::BlockUpdateEvent;

/// Outbound action name key.
pub const ACTION_FIELD: &str = "action";
/// Request identifier key, both directions.
pub const NONCE_FIELD: &str = "nonce";
/// Inbound success flag key.
pub const OK_FIELD: &str = "ok";
/// Inbound event discriminator key.
pub const TYPE_FIELD: &str = "type";

/// `type` of a block update event.
pub const BLOCK_UPDATE_TYPE: &str = "block update";
/// `type` of a transaction event.
pub const TRANSACTION_TYPE: &str = "transact";

/// Serialize one request frame.
///
/// The reserved `action` and `nonce` keys always win over payload fields of
/// the same name.
pub fn encode_request(action: ActionType, nonce: u64, mut payload: ActionData) -> String {
    let _ = payload.insert(ACTION_FIELD.into(), Value::from(action.as_str()));
    let _ = payload.insert(NONCE_FIELD.into(), Value::from(nonce.to_string()));
    Value::Object(payload).to_string()
}

/// The reply half of an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    /// Identifier of the request this answers.
    pub nonce: u64,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Remaining fields after `ok` and `nonce` are stripped.
    pub data: ActionData,
}

/// A transaction a player started with `/transact`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionRequest {
    /// Identifier to answer the transaction with.
    pub query_nonce: u64,
    /// Amount the player deposited.
    pub amount: f64,
    /// The paying player.
    pub player: Player,
    /// Free text after `/transact <amount>`.
    pub query: String,
}

/// The event half of an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A watched or polled block changed.
    BlockUpdate(BlockUpdateEvent),
    /// A player started a transaction.
    Transaction(TransactionRequest),
    /// An event type this client does not handle.
    Unknown {
        /// The `type` discriminator.
        kind: String,
        /// Remaining fields.
        data: ActionData,
    },
}

/// A decoded inbound frame. At least one half is present.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundFrame {
    /// Present when the frame carries a usable `nonce`.
    pub reply: Option<Reply>,
    /// Present when the frame carries a `type`. An event that fails to
    /// decode does not stop the reply half from being delivered.
    pub event: Option<Result<ServerEvent>>,
}

/// Decode one inbound text frame.
///
/// A frame with neither a usable nonce nor an event type is a decode error.
/// A malformed nonce is only tolerated when the frame also carries an event,
/// in which case the event is still delivered. A malformed event is only
/// returned inside the frame when a reply comes with it; on its own it is a
/// decode error.
pub fn decode(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text).map_err(|e| CraftError::Decode(e.to_string()))?;
    let Value::Object(mut data) = value else {
        return Err(CraftError::Decode("frame is not a JSON object".into()));
    };

    let ok = match data.remove(OK_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(ok)) => ok,
        Some(other) => return Err(CraftError::Decode(format!("'ok' is not a boolean: {other}"))),
    };
    let nonce = data.remove(NONCE_FIELD).map(parse_nonce);

    let event = match data.get(TYPE_FIELD) {
        None => None,
        Some(Value::String(kind)) => Some(decode_event(kind, &data)),
        Some(other) => Some(Err(CraftError::Decode(format!("'type' is not a string: {other}")))),
    };

    let reply = match nonce {
        Some(Ok(nonce)) => Some(Reply { nonce, ok, data }),
        Some(Err(raw)) if event.is_none() => {
            return Err(CraftError::Decode(format!("malformed nonce: {raw}")));
        }
        Some(Err(_)) | None if event.is_some() => None,
        _ => return Err(CraftError::Decode("frame carries neither nonce nor type".into())),
    };

    match (reply, event) {
        (None, Some(Err(error))) => Err(error),
        (reply, event) => Ok(InboundFrame { reply, event }),
    }
}

/// Nonces are strings on the wire; bare numbers are accepted too.
fn parse_nonce(value: Value) -> std::result::Result<u64, Value> {
    match &value {
        Value::String(s) => s.trim().parse().map_err(|_| value),
        Value::Number(n) => n.as_u64().ok_or(value),
        _ => Err(value),
    }
}

#[derive(Deserialize)]
struct BlockUpdateData {
    old_block: Block,
    block: Block,
    cause: BlockUpdateCause,
    x: i32,
    y: i32,
    z: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionData {
    query_nonce: u64,
    amount: f64,
    player: String,
    #[serde(default, rename = "player_uuid")]
    player_uuid: Option<String>,
    #[serde(default)]
    query: String,
}

fn decode_event(kind: &str, data: &ActionData) -> Result<ServerEvent> {
    let fields = || Value::Object(data.clone());
    match kind {
        BLOCK_UPDATE_TYPE => {
            let raw: BlockUpdateData = serde_json::from_value(fields())
                .map_err(|e| CraftError::Decode(format!("block update: {e}")))?;
            Ok(ServerEvent::BlockUpdate(BlockUpdateEvent {
                location: Location::new(raw.x, raw.y, raw.z),
                cause: raw.cause,
                old: raw.old_block,
                block: raw.block,
            }))
        }
        TRANSACTION_TYPE => {
            let raw: TransactionData = serde_json::from_value(fields())
                .map_err(|e| CraftError::Decode(format!("transaction: {e}")))?;
            let player = Player::new(Some(raw.player), raw.player_uuid)?;
            Ok(ServerEvent::Transaction(TransactionRequest {
                query_nonce: raw.query_nonce,
                amount: raw.amount,
                player,
                query: raw.query,
            }))
        }
        other => {
            let mut data = data.clone();
            let _ = data.remove(TYPE_FIELD);
            Ok(ServerEvent::Unknown {
                kind: other.to_string(),
                data,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn object(value: Value) -> ActionData {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn encode_merges_reserved_fields() {
        let text = encode_request(ActionType::GetBlock, 3, object(json!({"x": 1, "y": 2, "z": 3})));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"action": "get_block", "nonce": "3", "x": 1, "y": 2, "z": 3})
        );
    }

    #[test]
    fn encode_reserved_fields_win() {
        let text = encode_request(
            ActionType::Tell,
            9,
            object(json!({"action": "spoof", "nonce": "1", "message": "hi"})),
        );
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["action"], "tell");
        assert_eq!(value["nonce"], "9");
    }

    #[test]
    fn decode_success_reply() {
        let frame = decode(r#"{"ok":true,"nonce":"1","x":5,"y":10,"z":5}"#).unwrap();
        let reply = frame.reply.unwrap();
        assert_eq!(reply.nonce, 1);
        assert!(reply.ok);
        assert_eq!(Value::Object(reply.data), json!({"x": 5, "y": 10, "z": 5}));
        assert!(frame.event.is_none());
    }

    #[test]
    fn decode_failure_reply() {
        let frame = decode(r#"{"ok":false,"nonce":"1","message":"no structure"}"#).unwrap();
        let reply = frame.reply.unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.data["message"], "no structure");
    }

    #[test]
    fn missing_ok_means_failure() {
        let frame = decode(r#"{"nonce":"4"}"#).unwrap();
        assert!(!frame.reply.unwrap().ok);
    }

    #[test]
    fn numeric_nonce_accepted() {
        let frame = decode(r#"{"ok":true,"nonce":12}"#).unwrap();
        assert_eq!(frame.reply.unwrap().nonce, 12);
    }

    #[test]
    fn transaction_event_without_nonce() {
        let frame = decode(
            r#"{"type":"transact","queryNonce":7,"amount":50,"player":"alice","player_uuid":"u-1","query":"buy sword"}"#,
        )
        .unwrap();
        assert!(frame.reply.is_none());
        let Some(Ok(ServerEvent::Transaction(tx))) = frame.event else {
            panic!("expected transaction event");
        };
        assert_eq!(tx.query_nonce, 7);
        assert!((tx.amount - 50.0).abs() < f64::EPSILON);
        assert_eq!(tx.player.name(), Some("alice"));
        assert_eq!(tx.player.uuid(), Some("u-1"));
        assert_eq!(tx.query, "buy sword");
    }

    #[test]
    fn block_update_event() {
        let frame = decode(
            r#"{"type":"block update","old_block":"minecraft:stone","block":"minecraft:air","cause":"break","x":1,"y":2,"z":3}"#,
        )
        .unwrap();
        let Some(Ok(ServerEvent::BlockUpdate(update))) = frame.event else {
            panic!("expected block update");
        };
        assert_eq!(update.location, Location::new(1, 2, 3));
        assert_eq!(update.cause, BlockUpdateCause::Break);
        assert_eq!(update.old.to_string(), "minecraft:stone");
        assert_eq!(update.block, Block::air());
    }

    #[test]
    fn frame_can_be_reply_and_event() {
        let frame = decode(
            r#"{"ok":true,"nonce":"2","type":"block update","old_block":"minecraft:stone","block":"minecraft:air","cause":"poll","x":0,"y":0,"z":0}"#,
        )
        .unwrap();
        let reply = frame.reply.unwrap();
        assert_eq!(reply.nonce, 2);
        assert_eq!(reply.data["type"], "block update");
        assert_matches!(frame.event, Some(Ok(ServerEvent::BlockUpdate(_))));
    }

    #[test]
    fn unknown_event_type_kept() {
        let frame = decode(r#"{"type":"weather","rain":true}"#).unwrap();
        assert_matches!(
            frame.event,
            Some(Ok(ServerEvent::Unknown { kind, data })) if kind == "weather" && data["rain"] == true
        );
    }

    #[test]
    fn malformed_nonce_with_event_still_delivers_event() {
        let frame = decode(r#"{"nonce":"abc","type":"weather"}"#).unwrap();
        assert!(frame.reply.is_none());
        assert_matches!(frame.event, Some(Ok(_)));
    }

    #[test]
    fn malformed_nonce_without_event_is_error() {
        assert_matches!(decode(r#"{"ok":true,"nonce":"abc"}"#), Err(CraftError::Decode(_)));
        assert_matches!(decode(r#"{"ok":true,"nonce":-1}"#), Err(CraftError::Decode(_)));
    }

    #[test]
    fn neither_nonce_nor_type_is_error() {
        assert_matches!(decode(r#"{"ok":true}"#), Err(CraftError::Decode(_)));
    }

    #[test]
    fn invalid_json_is_error() {
        assert_matches!(decode("{not json"), Err(CraftError::Decode(_)));
        assert_matches!(decode("[1,2]"), Err(CraftError::Decode(_)));
    }

    #[test]
    fn malformed_event_payload_is_error() {
        assert_matches!(
            decode(r#"{"type":"block update","block":"minecraft:air"}"#),
            Err(CraftError::Decode(_))
        );
        assert_matches!(
            decode(r#"{"type":"transact","amount":"lots"}"#),
            Err(CraftError::Decode(_))
        );
    }

    #[test]
    fn malformed_event_keeps_reply() {
        let frame = decode(r#"{"ok":true,"nonce":"2","x":1,"type":"block update"}"#).unwrap();
        let reply = frame.reply.unwrap();
        assert_eq!(reply.nonce, 2);
        assert!(reply.ok);
        assert_matches!(frame.event, Some(Err(CraftError::Decode(_))));

        let frame = decode(r#"{"ok":true,"nonce":"3","type":7}"#).unwrap();
        assert_eq!(frame.reply.unwrap().nonce, 3);
        assert_matches!(frame.event, Some(Err(CraftError::Decode(_))));
    }

    #[test]
    fn non_string_type_without_nonce_is_error() {
        assert_matches!(decode(r#"{"type":7}"#), Err(CraftError::Decode(_)));
    }
}
