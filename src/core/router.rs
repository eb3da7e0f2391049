//! Channel router: the bidirectional subscription index
//!
//! ```text
//!   forward:  channel ──▶ {connection, ...}
//!   reverse:  connection ──▶ {channel, ...}
//! ```
//!
//! A connection appears under a channel in `forward` iff that channel appears
//! in the connection's entry in `reverse`. Channels exist only as index keys;
//! the last subscriber leaving removes the key.
//!
//! The router itself is not synchronized. It lives inside the
//! [`ConnectionRegistry`](super::registry::ConnectionRegistry) lock so that all
//! structural mutations go through one writer.

use super::envelope::ChannelId;
use indexmap::IndexSet;
use std::collections::HashMap;

/// Unique connection identifier
pub type ConnectionId = String;

#[derive(Debug, Default)]
pub struct ChannelRouter {
    forward: HashMap<ChannelId, IndexSet<ConnectionId>>,
    reverse: HashMap<ConnectionId, IndexSet<ChannelId>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribers of a channel; empty for an unknown channel
    pub fn subscribers_of(&self, channel: &str) -> IndexSet<ConnectionId> {
        self.forward.get(channel).cloned().unwrap_or_default()
    }

    /// Borrowing variant of [`subscribers_of`](Self::subscribers_of)
    pub fn subscribers_iter<'a>(&'a self, channel: &str) -> impl Iterator<Item = &'a ConnectionId> {
        self.forward.get(channel).into_iter().flatten()
    }

    /// Channels a connection belongs to
    pub fn channels_of(&self, connection_id: &str) -> IndexSet<ChannelId> {
        self.reverse.get(connection_id).cloned().unwrap_or_default()
    }

    /// Add a membership in both directions
    ///
    /// Returns `false` if it already existed.
    pub fn add_subscription(&mut self, connection_id: &str, channel: &str) -> bool {
        let added = self
            .forward
            .entry(channel.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.reverse
            .entry(connection_id.to_string())
            .or_default()
            .insert(channel.to_string());
        added
    }

    /// Remove a membership in both directions
    ///
    /// Returns `true` if it existed.
    pub fn remove_subscription(&mut self, connection_id: &str, channel: &str) -> bool {
        let removed = match self.forward.get_mut(channel) {
            Some(subscribers) => {
                let removed = subscribers.shift_remove(connection_id);
                if subscribers.is_empty() {
                    self.forward.remove(channel);
                }
                removed
            }
            None => false,
        };

        if let Some(channels) = self.reverse.get_mut(connection_id) {
            channels.shift_remove(channel);
            if channels.is_empty() {
                self.reverse.remove(connection_id);
            }
        }

        removed
    }

    /// Drop every membership of a connection in one pass over its own channels
    ///
    /// Returns the channels it was removed from.
    pub fn remove_connection(&mut self, connection_id: &str) -> IndexSet<ChannelId> {
        let Some(channels) = self.reverse.remove(connection_id) else {
            return IndexSet::new();
        };

        for channel in &channels {
            if let Some(subscribers) = self.forward.get_mut(channel) {
                subscribers.shift_remove(connection_id);
                if subscribers.is_empty() {
                    self.forward.remove(channel);
                }
            }
        }

        channels
    }

    /// Number of channels with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.forward.len()
    }

    /// Number of subscribers of a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.forward.get(channel).map_or(0, IndexSet::len)
    }

    /// Iterate `(channel, subscriber count)` pairs
    pub fn channels(&self) -> impl Iterator<Item = (&ChannelId, usize)> {
        self.forward.iter().map(|(id, subs)| (id, subs.len()))
    }

    /// Check that both directions agree (used by tests)
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.forward.iter().all(|(channel, subs)| {
            !subs.is_empty()
                && subs
                    .iter()
                    .all(|conn| self.reverse.get(conn).is_some_and(|c| c.contains(channel)))
        });
        let reverse_ok = self.reverse.iter().all(|(conn, channels)| {
            !channels.is_empty()
                && channels
                    .iter()
                    .all(|ch| self.forward.get(ch).is_some_and(|s| s.contains(conn)))
        });
        forward_ok && reverse_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_channel_is_empty() {
        let router = ChannelRouter::new();
        assert!(router.subscribers_of("nope").is_empty());
        assert_eq!(router.subscriber_count("nope"), 0);
    }

    #[test]
    fn test_add_and_remove_subscription() {
        let mut router = ChannelRouter::new();

        assert!(router.add_subscription("conn_1", "a"));
        assert!(!router.add_subscription("conn_1", "a"));
        assert!(router.add_subscription("conn_2", "a"));
        assert_eq!(router.subscriber_count("a"), 2);
        assert!(router.is_consistent());

        assert!(router.remove_subscription("conn_1", "a"));
        assert!(!router.remove_subscription("conn_1", "a"));
        assert_eq!(router.subscriber_count("a"), 1);
        assert!(router.channels_of("conn_1").is_empty());
        assert!(router.is_consistent());
    }

    #[test]
    fn test_last_subscriber_removes_channel_key() {
        let mut router = ChannelRouter::new();
        router.add_subscription("conn_1", "a");
        router.remove_subscription("conn_1", "a");

        assert_eq!(router.channel_count(), 0);
        assert!(router.is_consistent());
    }

    #[test]
    fn test_remove_connection_clears_all_memberships() {
        let mut router = ChannelRouter::new();
        router.add_subscription("conn_1", "a");
        router.add_subscription("conn_1", "b");
        router.add_subscription("conn_2", "b");

        let removed = router.remove_connection("conn_1");
        assert_eq!(removed.len(), 2);
        assert!(router.subscribers_of("a").is_empty());
        assert_eq!(
            router.subscribers_of("b").into_iter().collect::<Vec<_>>(),
            vec!["conn_2".to_string()]
        );
        assert!(router.is_consistent());

        // Idempotent
        assert!(router.remove_connection("conn_1").is_empty());
    }

    #[test]
    fn test_subscribers_keep_join_order() {
        let mut router = ChannelRouter::new();
        for i in 0..5 {
            router.add_subscription(&format!("conn_{}", i), "room");
        }
        let order: Vec<String> = router.subscribers_iter("room").cloned().collect();
        assert_eq!(order, vec!["conn_0", "conn_1", "conn_2", "conn_3", "conn_4"]);
    }
}
