//! Structure tokens.
//!
//! A token is a signed `header.payload.signature` string whose first two
//! segments are base64-encoded JSON. The payload names the server host, the
//! sign block that anchors the structure, its owner and permission level.
//! The raw string is sent verbatim when authenticating; the client never
//! verifies the signature.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::errors::{CraftError, Result};
use crate::world::{Location, Player, WorldLocation};

/// Who may control the structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPermission {
    /// Owned by a specific player.
    Player,
    /// Operators only.
    Admin,
    /// Anyone.
    Public,
    /// Not known to this client.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    host: String,
    world: String,
    x: i32,
    y: i32,
    z: i32,
    uuid: String,
    username: String,
    #[serde(default)]
    permission: TokenPermission,
}

/// A parsed structure token.
#[derive(Clone)]
pub struct Token {
    raw: String,
    host: String,
    location: WorldLocation,
    owner: Player,
    permission: TokenPermission,
}

impl Token {
    /// Parse a raw token string.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut segments = raw.split('.');
        let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
            return Err(CraftError::InvalidToken("expected at least two segments".into()));
        };

        let bytes = decode_segment(payload)?;
        let payload: TokenPayload = serde_json::from_slice(&bytes)
            .map_err(|e| CraftError::InvalidToken(format!("payload: {e}")))?;

        // Usernames starting with `@` are placeholders, not player names.
        let name = (!payload.username.starts_with('@')).then_some(payload.username);
        let owner = Player::new(name, Some(payload.uuid))?;

        Ok(Self {
            raw: raw.to_string(),
            host: payload.host,
            location: WorldLocation {
                world: payload.world,
                location: Location::new(payload.x, payload.y, payload.z),
            },
            owner,
            permission: payload.permission,
        })
    }

    /// The token exactly as supplied (trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `host[:port]` of the server that issued the token.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Location of the sign that anchors the structure.
    pub fn location(&self) -> &WorldLocation {
        &self.location
    }

    /// Owner of the structure.
    pub fn owner(&self) -> &Player {
        &self.owner
    }

    /// Permission level of the structure.
    pub fn permission(&self) -> TokenPermission {
        self.permission
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("host", &self.host)
            .field("location", &self.location)
            .field("owner", &self.owner)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

impl std::str::FromStr for Token {
    type Err = CraftError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Accept both URL-safe unpadded segments (JWT) and standard base64.
fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(segment))
        .map_err(|e| CraftError::InvalidToken(format!("base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn encode(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    fn make_token(username: &str) -> String {
        let header = encode(&json!({"alg": "HS256", "typ": "JWT"}));
        let payload = encode(&json!({
            "host": "craft.example.net:28080",
            "world": "world",
            "x": 12, "y": 70, "z": -4,
            "uuid": "52e75143-a651-4755-b216-0497683f53bc",
            "username": username,
            "permission": "player"
        }));
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn parses_payload() {
        let token = Token::parse(&make_token("f1nniboy")).unwrap();
        assert_eq!(token.host(), "craft.example.net:28080");
        assert_eq!(token.location().to_string(), "world;12,70,-4");
        assert_eq!(token.owner().name(), Some("f1nniboy"));
        assert_eq!(token.permission(), TokenPermission::Player);
    }

    #[test]
    fn raw_is_preserved() {
        let raw = make_token("f1nniboy");
        let token = Token::parse(&format!("  {raw}\n")).unwrap();
        assert_eq!(token.raw(), raw);
    }

    #[test]
    fn at_prefixed_username_is_not_a_name() {
        let token = Token::parse(&make_token("@structure")).unwrap();
        assert_eq!(token.owner().name(), None);
        assert_eq!(token.owner().uuid(), Some("52e75143-a651-4755-b216-0497683f53bc"));
    }

    #[test]
    fn standard_base64_accepted() {
        let payload = STANDARD.encode(
            json!({"host": "h:1", "world": "w", "x": 0, "y": 0, "z": 0,
                   "uuid": "u", "username": "n"})
            .to_string(),
        );
        let token = Token::parse(&format!("e30=.{payload}.sig")).unwrap();
        assert_eq!(token.host(), "h:1");
        assert_eq!(token.permission(), TokenPermission::Unknown);
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(Token::parse("not-a-token"), Err(CraftError::InvalidToken(_)));
        assert_matches!(Token::parse("a.!!!.c"), Err(CraftError::InvalidToken(_)));
    }

    #[test]
    fn debug_omits_raw() {
        let raw = make_token("f1nniboy");
        let token = Token::parse(&raw).unwrap();
        assert!(!format!("{token:?}").contains(&raw));
    }
}
