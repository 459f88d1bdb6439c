//! JSON array container: identity plus an [`RGATreeList`] of handles.

use crate::crdt::{CrdtError, RGATreeList};
use crate::time::Ticket;

#[derive(Debug, Clone)]
pub struct Array {
    created_at: Ticket,
    list: RGATreeList,
}

impl Array {
    pub fn new(created_at: Ticket) -> Self {
        Array {
            created_at,
            list: RGATreeList::new(),
        }
    }

    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Ticket, CrdtError> {
        self.list.get(index)
    }

    pub fn last_created_at(&self) -> Ticket {
        self.list.last_created_at()
    }

    pub fn live_handles(&self) -> Vec<Ticket> {
        self.list.live_handles()
    }

    pub fn contains(&self, created_at: Ticket) -> bool {
        self.list.contains(created_at)
    }

    pub(crate) fn insert_after(&mut self, prev: Ticket, created_at: Ticket) -> Result<(), CrdtError> {
        self.list.insert_after(prev, created_at)
    }

    pub(crate) fn move_after(
        &mut self,
        prev: Ticket,
        target: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        self.list.move_after(prev, target, executed_at)
    }

    pub(crate) fn remove(&mut self, target: Ticket, executed_at: Ticket) -> Result<bool, CrdtError> {
        self.list.remove(target, executed_at)
    }

    pub(crate) fn child_handles(&self) -> Vec<Ticket> {
        self.list.handles()
    }

    pub(crate) fn removed_at_of(&self, target: Ticket) -> Option<Ticket> {
        self.list.removed_at_of(target)
    }

    pub(crate) fn purge(&mut self, target: Ticket) {
        self.list.purge(target)
    }
}
