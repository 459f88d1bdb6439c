//! Replicated growable list backing JSON arrays.
//!
//! The linear order lives in a plain `Vec` scanned end to end. This trades
//! the O(log n) index structures of a production sequence for simplicity;
//! the ordering rules are identical. Concurrent inserts after the same
//! predecessor land in descending ticket order, which makes the final order
//! a pure function of the applied operations rather than of arrival order.

use crate::crdt::CrdtError;
use crate::time::{Ticket, INITIAL_TICKET};

/// One slot of the list: the handle of the element it holds plus the slot's
/// reorder/removal bookkeeping.
#[derive(Debug, Clone)]
pub struct ListNode {
    created_at: Ticket,
    moved_at: Option<Ticket>,
    removed_at: Option<Ticket>,
}

impl ListNode {
    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    pub fn removed_at(&self) -> Option<Ticket> {
        self.removed_at
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// The ticket this node currently sorts by: its last move, or creation.
    fn positioned_at(&self) -> Ticket {
        self.moved_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RGATreeList {
    nodes: Vec<ListNode>,
}

impl RGATreeList {
    pub fn new() -> Self {
        RGATreeList::default()
    }

    pub fn contains(&self, created_at: Ticket) -> bool {
        self.index_of(created_at).is_some()
    }

    fn index_of(&self, created_at: Ticket) -> Option<usize> {
        self.nodes.iter().position(|n| n.created_at == created_at)
    }

    /// Where a node executed at `executed_at` lands after `prev`.
    /// `INITIAL_TICKET` addresses the virtual head. Concurrent placements
    /// after the same predecessor are skipped while they sort greater, which
    /// yields descending ticket order among siblings.
    fn find_insert_index(&self, prev: Ticket, executed_at: Ticket) -> Result<usize, CrdtError> {
        let mut pos = if prev == INITIAL_TICKET {
            0
        } else {
            self.index_of(prev).ok_or(CrdtError::InvalidPosition)? + 1
        };
        while pos < self.nodes.len() && self.nodes[pos].positioned_at().after(executed_at) {
            pos += 1;
        }
        Ok(pos)
    }

    /// Inserts the element created at `created_at` after `prev`, which may
    /// be live or tombstoned. Re-delivery of the same insert is a no-op.
    pub fn insert_after(&mut self, prev: Ticket, created_at: Ticket) -> Result<(), CrdtError> {
        if self.contains(created_at) {
            return Ok(());
        }
        let pos = self.find_insert_index(prev, created_at)?;
        self.nodes.insert(
            pos,
            ListNode {
                created_at,
                moved_at: None,
                removed_at: None,
            },
        );
        Ok(())
    }

    /// Reorders `target` to sit after `prev` when `executed_at` is newer
    /// than the target's last move.
    pub fn move_after(
        &mut self,
        prev: Ticket,
        target: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        if prev == target {
            return Ok(());
        }
        let idx = self.index_of(target).ok_or(CrdtError::InvalidPosition)?;
        let applies = match self.nodes[idx].moved_at {
            None => true,
            Some(moved_at) => executed_at.after(moved_at),
        };
        if !applies {
            return Ok(());
        }
        let mut node = self.nodes.remove(idx);
        node.moved_at = Some(executed_at);
        let pos = self.find_insert_index(prev, executed_at)?;
        self.nodes.insert(pos, node);
        Ok(())
    }

    /// Tombstones `target`; the greatest removal ticket is kept. Does not
    /// unlink the node. Returns whether the removal applied.
    pub fn remove(&mut self, target: Ticket, executed_at: Ticket) -> Result<bool, CrdtError> {
        let idx = self.index_of(target).ok_or(CrdtError::InvalidPosition)?;
        let node = &mut self.nodes[idx];
        let applies = match node.removed_at {
            None => true,
            Some(removed_at) => executed_at.after(removed_at),
        };
        if applies {
            node.removed_at = Some(executed_at);
        }
        Ok(applies)
    }

    /// Handle of the `index`-th live element.
    pub fn get(&self, index: usize) -> Result<Ticket, CrdtError> {
        self.nodes
            .iter()
            .filter(|n| !n.is_removed())
            .nth(index)
            .map(|n| n.created_at)
            .ok_or(CrdtError::OutOfBounds(index))
    }

    /// Live element count.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_removed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle of the physically last node, tombstoned or not; the head
    /// sentinel when the list is empty. Appends anchor here.
    pub fn last_created_at(&self) -> Ticket {
        self.nodes
            .last()
            .map(|n| n.created_at)
            .unwrap_or(INITIAL_TICKET)
    }

    /// Live handles in linear order.
    pub fn live_handles(&self) -> Vec<Ticket> {
        self.nodes
            .iter()
            .filter(|n| !n.is_removed())
            .map(|n| n.created_at)
            .collect()
    }

    /// Every handle, live or tombstoned.
    pub(crate) fn handles(&self) -> Vec<Ticket> {
        self.nodes.iter().map(|n| n.created_at).collect()
    }

    pub(crate) fn removed_at_of(&self, target: Ticket) -> Option<Ticket> {
        self.nodes
            .iter()
            .find(|n| n.created_at == target)
            .and_then(|n| n.removed_at)
    }

    /// Structurally unlinks `target`. GC only.
    pub(crate) fn purge(&mut self, target: Ticket) {
        self.nodes.retain(|n| n.created_at != target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ActorID;

    fn tick(lamport: u64, actor: u8) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([actor; 12]))
    }

    #[test]
    fn concurrent_inserts_order_descending_by_ticket() {
        // Replica A inserts at lamport 2, replica B concurrently at the same
        // lamport with a greater actor; both target the head.
        let a = tick(2, 1);
        let b = tick(2, 2);

        let mut left = RGATreeList::new();
        left.insert_after(INITIAL_TICKET, a).unwrap();
        left.insert_after(INITIAL_TICKET, b).unwrap();

        let mut right = RGATreeList::new();
        right.insert_after(INITIAL_TICKET, b).unwrap();
        right.insert_after(INITIAL_TICKET, a).unwrap();

        assert_eq!(left.live_handles(), vec![b, a]);
        assert_eq!(right.live_handles(), vec![b, a]);
    }

    #[test]
    fn get_skips_tombstones() {
        let mut list = RGATreeList::new();
        let (a, b, c) = (tick(1, 1), tick(2, 1), tick(3, 1));
        list.insert_after(INITIAL_TICKET, a).unwrap();
        list.insert_after(a, b).unwrap();
        list.insert_after(b, c).unwrap();

        assert!(list.remove(b, tick(4, 1)).unwrap());
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap(), c);
        assert_eq!(list.get(2), Err(CrdtError::OutOfBounds(2)));
    }

    #[test]
    fn remove_is_idempotent_and_keeps_max() {
        let mut list = RGATreeList::new();
        let a = tick(1, 1);
        list.insert_after(INITIAL_TICKET, a).unwrap();
        assert!(list.remove(a, tick(5, 1)).unwrap());
        assert!(!list.remove(a, tick(5, 1)).unwrap());
        assert!(!list.remove(a, tick(3, 1)).unwrap());
        assert_eq!(list.removed_at_of(a), Some(tick(5, 1)));
    }

    #[test]
    fn move_after_applies_only_newer_moves() {
        let mut list = RGATreeList::new();
        let (a, b) = (tick(1, 1), tick(2, 1));
        list.insert_after(INITIAL_TICKET, a).unwrap();
        list.insert_after(a, b).unwrap();

        list.move_after(INITIAL_TICKET, b, tick(7, 1)).unwrap();
        assert_eq!(list.live_handles(), vec![b, a]);

        // A stale concurrent move loses against the recorded one.
        list.move_after(a, b, tick(6, 1)).unwrap();
        assert_eq!(list.live_handles(), vec![b, a]);
    }

    #[test]
    fn insert_after_tombstoned_predecessor() {
        let mut list = RGATreeList::new();
        let (a, b) = (tick(1, 1), tick(3, 1));
        list.insert_after(INITIAL_TICKET, a).unwrap();
        list.remove(a, tick(2, 1)).unwrap();
        list.insert_after(a, b).unwrap();
        assert_eq!(list.live_handles(), vec![b]);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut list = RGATreeList::new();
        let a = tick(1, 1);
        list.insert_after(INITIAL_TICKET, a).unwrap();
        list.insert_after(INITIAL_TICKET, a).unwrap();
        assert_eq!(list.handles(), vec![a]);
    }

    #[test]
    fn unknown_predecessor_is_rejected() {
        let mut list = RGATreeList::new();
        assert_eq!(
            list.insert_after(tick(9, 9), tick(1, 1)),
            Err(CrdtError::InvalidPosition)
        );
    }
}
