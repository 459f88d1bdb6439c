//! Plain text container over [`RGATreeSplit`].

use std::collections::HashMap;

use crate::crdt::{CrdtError, RGATreeSplit, SplitNode, SplitNodePos};
use crate::time::{ActorID, Ticket};

/// One actor's remembered cursor range, last-writer-wins by ticket.
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    pub(crate) from: SplitNodePos,
    pub(crate) to: SplitNodePos,
    pub(crate) updated_at: Ticket,
}

#[derive(Debug, Clone)]
pub struct Text {
    created_at: Ticket,
    rga: RGATreeSplit<String>,
    selections: HashMap<ActorID, Selection>,
}

impl Text {
    pub fn new(created_at: Ticket) -> Self {
        Text {
            created_at,
            rga: RGATreeSplit::new(),
            selections: HashMap::new(),
        }
    }

    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    pub fn create_range(
        &self,
        from: usize,
        to: usize,
    ) -> Result<(SplitNodePos, SplitNodePos), CrdtError> {
        self.rga.create_range(from, to)
    }

    pub(crate) fn edit(
        &mut self,
        from: &SplitNodePos,
        to: &SplitNodePos,
        latest_created_at_by_actor: Option<&HashMap<ActorID, Ticket>>,
        content: &str,
        executed_at: Ticket,
    ) -> Result<HashMap<ActorID, Ticket>, CrdtError> {
        let value = (!content.is_empty()).then(|| content.to_string());
        self.rga
            .edit(from, to, latest_created_at_by_actor, value, executed_at)
    }

    pub(crate) fn select(
        &mut self,
        from: SplitNodePos,
        to: SplitNodePos,
        executed_at: Ticket,
    ) {
        let actor = executed_at.actor();
        let applies = match self.selections.get(&actor) {
            None => true,
            Some(existing) => executed_at.after(existing.updated_at),
        };
        if applies {
            self.selections.insert(
                actor,
                Selection {
                    from,
                    to,
                    updated_at: executed_at,
                },
            );
        }
    }

    /// The remembered cursor range of `actor`, if it ever selected.
    pub fn selection(&self, actor: ActorID) -> Option<(SplitNodePos, SplitNodePos)> {
        self.selections.get(&actor).map(|s| (s.from, s.to))
    }

    /// Live content length in characters.
    pub fn len(&self) -> usize {
        self.rga.live_values().map(|v| v.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node count excluding the head sentinel, tombstones included.
    pub fn node_count(&self) -> usize {
        self.rga.node_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SplitNode<String>> {
        self.rga.nodes()
    }

    pub(crate) fn tombstone_count(&self) -> usize {
        self.rga.tombstone_count()
    }

    pub(crate) fn purge_removed(&mut self, max: Ticket) -> usize {
        self.rga.purge_removed(max)
    }

    /// JSON string of the concatenated live spans.
    pub fn marshal(&self) -> String {
        let content: String = self.rga.live_values().map(|v| v.as_str()).collect();
        serde_json::Value::String(content).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ActorID;

    fn tick(lamport: u64) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([1; 12]))
    }

    fn edit(text: &mut Text, from: usize, to: usize, content: &str, at: Ticket) {
        let (from_pos, to_pos) = text.create_range(from, to).unwrap();
        text.edit(&from_pos, &to_pos, None, content, at).unwrap();
    }

    #[test]
    fn marshal_is_escaped_json_string() {
        let mut text = Text::new(tick(1));
        edit(&mut text, 0, 0, "a \"b\"", tick(2));
        assert_eq!(text.marshal(), r#""a \"b\"""#);
        assert_eq!(text.len(), 5);
    }

    #[test]
    fn selection_is_last_writer_wins() {
        let mut text = Text::new(tick(1));
        edit(&mut text, 0, 0, "hello", tick(2));
        let range = text.create_range(0, 3).unwrap();
        text.select(range.0, range.1, tick(5));
        let stale = text.create_range(1, 2).unwrap();
        text.select(stale.0, stale.1, tick(4));
        assert_eq!(text.selection(tick(5).actor()), Some(range));
    }
}
