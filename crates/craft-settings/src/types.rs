//! Client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// WebSocket URL scheme used to reach the gateway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain WebSocket.
    #[default]
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Scheme {
    /// URL scheme string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Connection and logging settings for the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Interval between keepalive heartbeats, in milliseconds.
    pub keepalive_interval_ms: u64,
    /// Path of the WebSocket gateway on the server.
    pub gateway_path: String,
    /// URL scheme.
    pub scheme: Scheme,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 15_000,
            gateway_path: "/gateway".to_string(),
            scheme: Scheme::Ws,
            log_level: "warn".to_string(),
        }
    }
}

impl ClientSettings {
    /// Keepalive interval as a [`Duration`].
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Gateway URL for a `host[:port]` taken from a token.
    pub fn gateway_url(&self, host: &str) -> String {
        let path = self.gateway_path.trim_start_matches('/');
        format!("{}://{host}/{path}", self.scheme.as_str())
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "keepaliveIntervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ClientSettings::default();
        assert_eq!(settings.keepalive_interval(), Duration::from_secs(15));
        assert_eq!(settings.gateway_path, "/gateway");
        assert_eq!(settings.scheme, Scheme::Ws);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn gateway_url_joins_host_and_path() {
        let settings = ClientSettings::default();
        assert_eq!(
            settings.gateway_url("craft.example.net:28080"),
            "ws://craft.example.net:28080/gateway"
        );

        let tls = ClientSettings {
            scheme: Scheme::Wss,
            gateway_path: "api/ws".into(),
            ..ClientSettings::default()
        };
        assert_eq!(tls.gateway_url("h"), "wss://h/api/ws");
    }

    #[test]
    fn zero_keepalive_rejected() {
        let settings = ClientSettings {
            keepalive_interval_ms: 0,
            ..ClientSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_serde() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert_eq!(json["keepaliveIntervalMs"], 15_000);
        assert_eq!(json["scheme"], "ws");

        let partial: ClientSettings =
            serde_json::from_str(r#"{"keepaliveIntervalMs": 500}"#).unwrap();
        assert_eq!(partial.keepalive_interval_ms, 500);
        assert_eq!(partial.gateway_path, "/gateway");
    }
}
