//! Per-connection subscription manager.
//!
//! Tracks which view event types a WebSocket client receives. A new
//! connection receives every type.

use std::collections::BTreeSet;

/// Event types pushed to clients.
pub const EVENT_TYPES: [&str; 2] = ["updated", "undo_tick"];

/// Manages the set of event-type subscriptions for a single WebSocket
/// connection.
#[derive(Debug)]
pub struct SubscriptionManager {
    event_types: BTreeSet<&'static str>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self {
            event_types: EVENT_TYPES.into_iter().collect(),
        }
    }
}

impl SubscriptionManager {
    /// Creates a manager subscribed to every event type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds event types. `"*"` adds all of them. Returns the names that
    /// were not recognized.
    pub fn subscribe(&mut self, names: &[String]) -> Vec<String> {
        self.apply(names, true)
    }

    /// Removes event types. `"*"` removes all of them. Returns the names
    /// that were not recognized.
    pub fn unsubscribe(&mut self, names: &[String]) -> Vec<String> {
        self.apply(names, false)
    }

    fn apply(&mut self, names: &[String], on: bool) -> Vec<String> {
        let mut unknown = Vec::new();
        for name in names {
            let matched: Vec<&'static str> = if name == "*" {
                EVENT_TYPES.to_vec()
            } else {
                EVENT_TYPES.into_iter().filter(|t| *t == name.as_str()).collect()
            };
            if matched.is_empty() {
                unknown.push(name.clone());
            }
            for t in matched {
                if on {
                    self.event_types.insert(t);
                } else {
                    self.event_types.remove(t);
                }
            }
        }
        unknown
    }

    /// Returns `true` if events of `event_type` should be forwarded.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }

    /// Currently subscribed event types.
    #[must_use]
    pub fn active(&self) -> Vec<&'static str> {
        self.event_types.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn new_connection_receives_everything() {
        let mgr = SubscriptionManager::new();
        assert!(mgr.matches("updated"));
        assert!(mgr.matches("undo_tick"));
    }

    #[test]
    fn unsubscribe_one_type() {
        let mut mgr = SubscriptionManager::new();
        let unknown = mgr.unsubscribe(&names(&["undo_tick"]));
        assert!(unknown.is_empty());
        assert!(mgr.matches("updated"));
        assert!(!mgr.matches("undo_tick"));
    }

    #[test]
    fn wildcard_toggles_all() {
        let mut mgr = SubscriptionManager::new();
        mgr.unsubscribe(&names(&["*"]));
        assert!(mgr.active().is_empty());
        mgr.subscribe(&names(&["*"]));
        assert_eq!(mgr.active(), vec!["undo_tick", "updated"]);
    }

    #[test]
    fn unknown_types_are_reported() {
        let mut mgr = SubscriptionManager::new();
        let unknown = mgr.subscribe(&names(&["fed", "updated"]));
        assert_eq!(unknown, names(&["fed"]));
    }
}
