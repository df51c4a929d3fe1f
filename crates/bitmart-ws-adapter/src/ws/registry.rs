/*
[INPUT]:  Caller subscribe/unsubscribe batches and exchange acknowledgements
[OUTPUT]: Desired/confirmed topic sets and batched request frames
[POS]:    WebSocket layer - per-connection subscription bookkeeping
[UPDATE]: When changing resubscribe policy or request batching
*/

use std::collections::HashSet;

use crate::error::Result;
use crate::types::{Market, WsOperation};

use super::message::WsRequest;

/// Desired and confirmed topics of one connection.
///
/// Owned by a single connection worker; never shared across keys.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    // insertion order is the order requests are rebuilt in
    desired: Vec<String>,
    confirmed: HashSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union into the desired set, returning only topics that were not already desired.
    pub fn add_desired(&mut self, topics: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for topic in topics {
            if !self.desired.contains(topic) {
                self.desired.push(topic.clone());
                added.push(topic.clone());
            }
        }
        added
    }

    /// Remove from the desired set, returning the topics that were actually desired.
    ///
    /// Removed topics lose their confirmation too, so a late ack cannot revive them.
    pub fn remove_desired(&mut self, topics: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for topic in topics {
            if let Some(pos) = self.desired.iter().position(|t| t == topic) {
                removed.push(self.desired.remove(pos));
                self.confirmed.remove(topic);
            }
        }
        removed
    }

    /// Invalidate confirmations and return every desired topic for a full resend.
    pub fn resubscribe_snapshot(&mut self) -> Vec<String> {
        self.confirmed.clear();
        self.desired.clone()
    }

    /// Record acknowledged topics. Topics no longer desired are ignored.
    pub fn mark_confirmed<'a, I>(&mut self, topics: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut confirmed = 0;
        for topic in topics {
            if self.is_desired(topic) && self.confirmed.insert(topic.to_string()) {
                confirmed += 1;
            }
        }
        confirmed
    }

    pub fn mark_unconfirmed<'a, I>(&mut self, topics: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for topic in topics {
            self.confirmed.remove(topic);
        }
    }

    pub fn reset_confirmed(&mut self) {
        self.confirmed.clear();
    }

    pub fn is_desired(&self, topic: &str) -> bool {
        self.desired.iter().any(|t| t == topic)
    }

    pub fn desired(&self) -> &[String] {
        &self.desired
    }

    /// Confirmed topics in desired order
    pub fn confirmed(&self) -> Vec<String> {
        self.desired
            .iter()
            .filter(|t| self.confirmed.contains(*t))
            .cloned()
            .collect()
    }

    /// Desired topics still waiting for an acknowledgement
    pub fn pending(&self) -> Vec<String> {
        self.desired
            .iter()
            .filter(|t| !self.confirmed.contains(*t))
            .cloned()
            .collect()
    }
}

/// Chunk topics in original order. `None` keeps them in one group.
pub fn batch_topics(topics: &[String], max_per_message: Option<usize>) -> Vec<Vec<String>> {
    if topics.is_empty() {
        return Vec::new();
    }

    match max_per_message {
        Some(max) if max > 0 && topics.len() > max => {
            topics.chunks(max).map(<[String]>::to_vec).collect()
        }
        _ => vec![topics.to_vec()],
    }
}

/// Serialized request frames for a batch of topics
pub fn build_requests(
    market: Market,
    operation: WsOperation,
    topics: &[String],
    max_per_message: Option<usize>,
) -> Result<Vec<String>> {
    batch_topics(topics, max_per_message)
        .into_iter()
        .map(|batch| WsRequest::new(market, operation, batch).to_json())
        .collect()
}
