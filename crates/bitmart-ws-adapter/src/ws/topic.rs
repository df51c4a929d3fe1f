/*
[INPUT]:  Topic strings such as "spot/depth5:BTC_USDT"
[OUTPUT]: Market, privacy and ConnectionKey routing decisions
[POS]:    WebSocket layer - stateless topic routing
[UPDATE]: When the exchange adds markets or private channel prefixes
*/

use std::collections::BTreeMap;

use crate::error::{BitmartError, Result};
use crate::types::{ConnectionKey, Market};

/// Second path segment prefixes that mark a private channel
const PRIVATE_CHANNEL_PREFIXES: [&str; 4] = ["user", "asset", "position", "order"];

/// Resolve the market from the topic prefix.
///
/// Matches on the raw string prefix, not a whole path segment, so `spotify/x` is spot.
pub fn classify_market(topic: &str) -> Result<Market> {
    if topic.starts_with("futures") {
        return Ok(Market::Futures);
    }
    if topic.starts_with("spot") {
        return Ok(Market::Spot);
    }

    Err(BitmartError::UnresolvableMarket {
        topic: topic.to_string(),
    })
}

/// Missing or unknown second segment means public.
pub fn is_private_channel(topic: &str) -> bool {
    let lowered = topic.to_lowercase();
    let Some(channel) = lowered.split('/').nth(1) else {
        return false;
    };

    PRIVATE_CHANNEL_PREFIXES
        .iter()
        .any(|prefix| channel.starts_with(prefix))
}

pub fn resolve_key(market: Market, is_private: bool) -> ConnectionKey {
    match (market, is_private) {
        (Market::Spot, false) => ConnectionKey::SpotPublic,
        (Market::Spot, true) => ConnectionKey::SpotPrivate,
        (Market::Futures, false) => ConnectionKey::FuturesPublic,
        (Market::Futures, true) => ConnectionKey::FuturesPrivate,
    }
}

pub fn key_for_topic(topic: &str) -> Result<ConnectionKey> {
    let market = classify_market(topic)?;
    Ok(resolve_key(market, is_private_channel(topic)))
}

/// Topics split per connection, plus the ones that could not be routed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicGroups {
    pub by_key: BTreeMap<ConnectionKey, Vec<String>>,
    pub rejected: Vec<String>,
}

impl TopicGroups {
    pub fn into_rejection(self) -> Option<BitmartError> {
        if self.rejected.is_empty() {
            None
        } else {
            Some(BitmartError::RejectedTopics {
                topics: self.rejected,
            })
        }
    }
}

/// Group topics by connection, keeping caller order and dropping duplicates.
pub fn group_topics_by_key<I, S>(topics: I) -> TopicGroups
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut groups = TopicGroups::default();

    for topic in topics {
        let topic = topic.into();
        match key_for_topic(&topic) {
            Ok(key) => {
                let group = groups.by_key.entry(key).or_default();
                if !group.contains(&topic) {
                    group.push(topic);
                }
            }
            Err(_) => {
                if !groups.rejected.contains(&topic) {
                    groups.rejected.push(topic);
                }
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("futures/position:BTC_USDT", true)]
    #[case("spot/ticker:BTC_USDT", false)]
    #[case("spot/user/order:BTC_USDT", true)]
    #[case("futures/asset:USDT", true)]
    #[case("futures/order", true)]
    #[case("Spot/User/Balance:BALANCE_UPDATE", true)]
    #[case("futures/depth20:BTCUSDT", false)]
    #[case("spot", false)]
    #[case("", false)]
    fn test_is_private_channel(#[case] topic: &str, #[case] expected: bool) {
        assert_eq!(is_private_channel(topic), expected);
    }

    #[rstest]
    #[case("spot/depth", Market::Spot)]
    #[case("spot/kline1m:BTC_USDT", Market::Spot)]
    #[case("futures/klineBin1m:BTCUSDT", Market::Futures)]
    #[case("spotify/x", Market::Spot)]
    #[case("futuresX", Market::Futures)]
    fn test_classify_market(#[case] topic: &str, #[case] expected: Market) {
        assert_eq!(classify_market(topic).unwrap(), expected);
    }

    #[test]
    fn test_classify_market_rejects_unknown_prefix() {
        let err = classify_market("unknown/x").unwrap_err();
        assert!(matches!(err, BitmartError::UnresolvableMarket { topic } if topic == "unknown/x"));
    }

    #[test]
    fn test_resolve_key_is_total() {
        let mut keys = Vec::new();
        for market in [Market::Spot, Market::Futures] {
            for private in [false, true] {
                let key = resolve_key(market, private);
                assert_eq!(key.market(), market);
                assert_eq!(key.is_private(), private);
                keys.push(key);
            }
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ConnectionKey::ALL.len());
    }

    #[test]
    fn test_group_topics_splits_spot_public_and_futures_private() {
        let groups = group_topics_by_key(["spot/depth:BTC_USDT", "futures/position:BTC_USDT"]);

        assert_eq!(groups.by_key.len(), 2);
        assert_eq!(
            groups.by_key[&ConnectionKey::SpotPublic],
            vec!["spot/depth:BTC_USDT".to_string()]
        );
        assert_eq!(
            groups.by_key[&ConnectionKey::FuturesPrivate],
            vec!["futures/position:BTC_USDT".to_string()]
        );
        assert!(groups.rejected.is_empty());
    }

    #[test]
    fn test_group_topics_dedups_and_rejects() {
        let groups = group_topics_by_key([
            "spot/ticker:BTC_USDT",
            "margin/ticker",
            "spot/ticker:BTC_USDT",
            "spot/ticker:ETH_USDT",
        ]);

        assert_eq!(
            groups.by_key[&ConnectionKey::SpotPublic],
            vec![
                "spot/ticker:BTC_USDT".to_string(),
                "spot/ticker:ETH_USDT".to_string()
            ]
        );
        assert_eq!(groups.rejected, vec!["margin/ticker".to_string()]);
        assert!(groups.into_rejection().unwrap().is_classification_error());
    }
}
