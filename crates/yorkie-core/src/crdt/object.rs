//! JSON object container.
//!
//! Keys map to element handles through an election: among the live entries
//! for a key, the one with the greatest creation ticket is displayed.
//! Displaced entries stay behind as tombstones until garbage collection.

use crate::time::Ticket;

#[derive(Debug, Clone)]
struct ObjectEntry {
    key: String,
    elem: Ticket,
    removed_at: Option<Ticket>,
}

impl ObjectEntry {
    fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    created_at: Ticket,
    entries: Vec<ObjectEntry>,
}

impl Object {
    pub fn new(created_at: Ticket) -> Self {
        Object {
            created_at,
            entries: Vec::new(),
        }
    }

    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    /// Records `elem` under `key` and re-runs the election for that key.
    /// Returns the handles of entries newly tombstoned by the election, so
    /// the caller can register them for garbage collection.
    pub(crate) fn set(&mut self, key: &str, elem: Ticket, executed_at: Ticket) -> Vec<Ticket> {
        if self.entries.iter().any(|e| e.elem == elem) {
            // Duplicate delivery of the same set.
            return Vec::new();
        }
        self.entries.push(ObjectEntry {
            key: key.to_string(),
            elem,
            removed_at: None,
        });

        let winner = self
            .entries
            .iter()
            .filter(|e| e.key == key && !e.is_removed())
            .map(|e| e.elem)
            .max();
        let mut displaced = Vec::new();
        for entry in &mut self.entries {
            if entry.key == key && !entry.is_removed() && Some(entry.elem) != winner {
                entry.removed_at = Some(executed_at);
                displaced.push(entry.elem);
            }
        }
        displaced
    }

    /// Tombstones the entry holding `target`. A remove with a ticket not
    /// newer than the recorded one is a no-op; the greatest ticket is kept.
    pub(crate) fn remove(&mut self, target: Ticket, executed_at: Ticket) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.elem == target)?;
        let applies = match entry.removed_at {
            None => true,
            Some(removed_at) => executed_at.after(removed_at),
        };
        if applies {
            entry.removed_at = Some(executed_at);
        }
        Some(applies)
    }

    /// Handle of the displayed element for `key`, if any entry is live.
    pub fn get(&self, key: &str) -> Option<Ticket> {
        self.entries
            .iter()
            .filter(|e| e.key == key && !e.is_removed())
            .map(|e| e.elem)
            .max()
    }

    /// Displayed `(key, handle)` pairs in insertion order, tombstones
    /// excluded. Insertion order is the winning element's creation ticket,
    /// which every replica agrees on regardless of delivery order.
    pub fn live_members(&self) -> Vec<(&str, Ticket)> {
        let mut winners: Vec<(&str, Ticket)> = Vec::new();
        for entry in &self.entries {
            if entry.is_removed() {
                continue;
            }
            match winners.iter_mut().find(|(key, _)| *key == entry.key) {
                Some((_, elem)) => *elem = (*elem).max(entry.elem),
                None => winners.push((entry.key.as_str(), entry.elem)),
            }
        }
        winners.sort_by_key(|(_, elem)| *elem);
        winners
    }

    /// Every handle held by this object, live or tombstoned.
    pub(crate) fn child_handles(&self) -> Vec<Ticket> {
        self.entries.iter().map(|e| e.elem).collect()
    }

    pub(crate) fn removed_at_of(&self, target: Ticket) -> Option<Ticket> {
        self.entries
            .iter()
            .find(|e| e.elem == target)
            .and_then(|e| e.removed_at)
    }

    /// Structurally drops the entry holding `target`. GC only.
    pub(crate) fn purge(&mut self, target: Ticket) {
        self.entries.retain(|e| e.elem != target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ActorID, INITIAL_TICKET};

    fn tick(lamport: u64) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([1; 12]))
    }

    #[test]
    fn greatest_created_at_wins_the_key() {
        let mut obj = Object::new(INITIAL_TICKET);
        assert!(obj.set("k", tick(1), tick(1)).is_empty());
        let displaced = obj.set("k", tick(4), tick(4));
        assert_eq!(displaced, vec![tick(1)]);
        assert_eq!(obj.get("k"), Some(tick(4)));

        // A concurrent stale set loses the election immediately.
        let displaced = obj.set("k", tick(2), tick(2));
        assert_eq!(displaced, vec![tick(2)]);
        assert_eq!(obj.get("k"), Some(tick(4)));
    }

    #[test]
    fn remove_keeps_greatest_ticket() {
        let mut obj = Object::new(INITIAL_TICKET);
        obj.set("k", tick(1), tick(1));
        assert_eq!(obj.remove(tick(1), tick(5)), Some(true));
        assert_eq!(obj.remove(tick(1), tick(3)), Some(false));
        assert_eq!(obj.removed_at_of(tick(1)), Some(tick(5)));
        assert_eq!(obj.get("k"), None);
    }

    #[test]
    fn live_members_follow_winner_creation_order() {
        let mut obj = Object::new(INITIAL_TICKET);
        obj.set("z", tick(1), tick(1));
        obj.set("a", tick(2), tick(2));
        assert_eq!(
            obj.live_members(),
            vec![("z", tick(1)), ("a", tick(2))]
        );

        // Overwriting a key re-anchors it at the new element's ticket.
        obj.set("z", tick(3), tick(3));
        assert_eq!(
            obj.live_members(),
            vec![("a", tick(2)), ("z", tick(3))]
        );
    }

    #[test]
    fn duplicate_set_is_ignored() {
        let mut obj = Object::new(INITIAL_TICKET);
        obj.set("k", tick(2), tick(2));
        assert!(obj.set("k", tick(2), tick(2)).is_empty());
        assert_eq!(obj.child_handles(), vec![tick(2)]);
    }
}
