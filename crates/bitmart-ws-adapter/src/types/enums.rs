/*
[INPUT]:  Protocol vocabulary and serde requirements
[OUTPUT]: Closed enums for markets, privacy and connection keys
[POS]:    Data layer - type definitions for WebSocket routing
[UPDATE]: When a new market or connection is introduced
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exchange market a topic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spot,
    Futures,
}

impl Market {
    pub fn as_str(self) -> &'static str {
        match self {
            Market::Spot => "spot",
            Market::Futures => "futures",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
}

/// One of the four physical connections (market x privacy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionKey {
    SpotPublic,
    SpotPrivate,
    FuturesPublic,
    FuturesPrivate,
}

impl ConnectionKey {
    pub const ALL: [ConnectionKey; 4] = [
        ConnectionKey::SpotPublic,
        ConnectionKey::SpotPrivate,
        ConnectionKey::FuturesPublic,
        ConnectionKey::FuturesPrivate,
    ];

    pub fn market(self) -> Market {
        match self {
            ConnectionKey::SpotPublic | ConnectionKey::SpotPrivate => Market::Spot,
            ConnectionKey::FuturesPublic | ConnectionKey::FuturesPrivate => Market::Futures,
        }
    }

    pub fn privacy(self) -> Privacy {
        match self {
            ConnectionKey::SpotPublic | ConnectionKey::FuturesPublic => Privacy::Public,
            ConnectionKey::SpotPrivate | ConnectionKey::FuturesPrivate => Privacy::Private,
        }
    }

    /// Private keys authenticate on connect when credentials are configured
    pub fn is_private(self) -> bool {
        self.privacy() == Privacy::Private
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKey::SpotPublic => "spotPublic",
            ConnectionKey::SpotPrivate => "spotPrivate",
            ConnectionKey::FuturesPublic => "futuresPublic",
            ConnectionKey::FuturesPrivate => "futuresPrivate",
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription operation carried by an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsOperation {
    Subscribe,
    Unsubscribe,
}

impl WsOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            WsOperation::Subscribe => "subscribe",
            WsOperation::Unsubscribe => "unsubscribe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_key_serde_names() {
        let json = serde_json::to_string(&ConnectionKey::FuturesPrivate).unwrap();
        assert_eq!(json, "\"futuresPrivate\"");

        let key: ConnectionKey = serde_json::from_str("\"spotPublic\"").unwrap();
        assert_eq!(key, ConnectionKey::SpotPublic);
    }

    #[test]
    fn test_connection_key_axes() {
        assert_eq!(ConnectionKey::SpotPrivate.market(), Market::Spot);
        assert_eq!(ConnectionKey::FuturesPublic.market(), Market::Futures);
        assert!(ConnectionKey::FuturesPrivate.is_private());
        assert!(!ConnectionKey::SpotPublic.is_private());
    }
}
