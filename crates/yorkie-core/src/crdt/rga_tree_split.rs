//! Splittable-node sequence backing text containers.
//!
//! A node holds a run of content inserted by a single operation. Node
//! identity is `(createdAt, offset)`: splitting a node keeps `createdAt`
//! and advances the right half's `offset`, so a position taken before a
//! split still resolves after it. Tombstoned nodes stay in the linear order
//! (and keep their content for offset arithmetic) until purged by GC.
//!
//! The linear order is a plain `Vec` walked end to end, the simple-but-
//! correct shape rather than the index trees a large-document build would
//! want. Index 0 is a permanent head sentinel carrying the initial ticket.

use std::collections::HashMap;

use crate::crdt::CrdtError;
use crate::time::{ActorID, Ticket, INITIAL_TICKET, MAX_TICKET};

/// Identity of a split node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SplitNodeId {
    pub created_at: Ticket,
    pub offset: u32,
}

/// A stable position inside the sequence: a node identity plus an offset
/// relative to that node at the time the position was taken. Stability
/// comes from addressing by ticket, not by linear index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitNodePos {
    pub id: SplitNodeId,
    pub relative_offset: u32,
}

impl SplitNodePos {
    /// Offset from the start of the originating insert, invariant under
    /// later splits of the addressed node.
    pub fn absolute_offset(&self) -> u32 {
        self.id.offset + self.relative_offset
    }
}

/// Content payload of a split node.
pub trait SplitValue: Clone + Default {
    /// Logical length in editable units.
    fn len(&self) -> usize;

    /// Keep `[0, at)` in place and return `[at, len)`.
    fn split_at(&mut self, at: usize) -> Self;
}

impl SplitValue for String {
    fn len(&self) -> usize {
        self.chars().count()
    }

    fn split_at(&mut self, at: usize) -> Self {
        let byte_pos = self
            .char_indices()
            .nth(at)
            .map(|(i, _)| i)
            .unwrap_or(self.len());
        self.split_off(byte_pos)
    }
}

#[derive(Debug, Clone)]
pub struct SplitNode<V> {
    id: SplitNodeId,
    value: V,
    removed_at: Option<Ticket>,
}

impl<V: SplitValue> SplitNode<V> {
    pub fn id(&self) -> SplitNodeId {
        self.id
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn removed_at(&self) -> Option<Ticket> {
        self.removed_at
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Structural length, counting tombstoned content.
    fn span(&self) -> u32 {
        self.value.len() as u32
    }

    fn live_len(&self) -> usize {
        if self.is_removed() {
            0
        } else {
            self.value.len()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RGATreeSplit<V> {
    nodes: Vec<SplitNode<V>>,
}

impl<V: SplitValue> RGATreeSplit<V> {
    pub fn new() -> Self {
        RGATreeSplit {
            nodes: vec![SplitNode {
                id: SplitNodeId {
                    created_at: INITIAL_TICKET,
                    offset: 0,
                },
                value: V::default(),
                removed_at: None,
            }],
        }
    }

    /// Nodes in linear order, excluding the head sentinel.
    pub fn nodes(&self) -> impl Iterator<Item = &SplitNode<V>> {
        self.nodes.iter().skip(1)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Live payloads in linear order.
    pub fn live_values(&self) -> impl Iterator<Item = &V> {
        self.nodes().filter(|n| !n.is_removed()).map(|n| n.value())
    }

    pub(crate) fn tombstone_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_removed()).count()
    }

    /// Resolves a user-facing index over live content into a position.
    /// Boundary indices anchor to the end of the node on their left, so a
    /// concurrent insert at the boundary cannot shift the position.
    pub fn find_node_pos(&self, index: usize) -> Result<SplitNodePos, CrdtError> {
        let mut remaining = index;
        for node in &self.nodes {
            let len = node.live_len();
            if remaining <= len {
                return Ok(SplitNodePos {
                    id: node.id,
                    relative_offset: remaining as u32,
                });
            }
            remaining -= len;
        }
        Err(CrdtError::OutOfBounds(index))
    }

    /// Resolves an index range into a pair of positions. The addressed
    /// nodes are not split yet; the positions merely record identities.
    pub fn create_range(
        &self,
        from: usize,
        to: usize,
    ) -> Result<(SplitNodePos, SplitNodePos), CrdtError> {
        Ok((self.find_node_pos(from)?, self.find_node_pos(to)?))
    }

    fn index_of_id(&self, id: SplitNodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Index of the node covering `abs` for `created_at`, preferring the
    /// node that ends exactly at `abs` over the one starting there. Split
    /// siblings keep ascending offsets in linear order, so the first match
    /// wins.
    fn find_floor_index(&self, created_at: Ticket, abs: u32) -> Result<usize, CrdtError> {
        let mut start_match = None;
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.id.created_at != created_at {
                continue;
            }
            let begin = node.id.offset;
            if begin < abs && abs <= begin + node.span() {
                return Ok(idx);
            }
            if begin == abs && start_match.is_none() {
                start_match = Some(idx);
            }
        }
        start_match.ok_or(CrdtError::InvalidPosition)
    }

    fn split_node_at(&mut self, idx: usize, rel: u32) {
        let span = self.nodes[idx].span();
        if rel == 0 || rel >= span {
            return;
        }
        let node = &mut self.nodes[idx];
        let right_value = node.value.split_at(rel as usize);
        let right = SplitNode {
            id: SplitNodeId {
                created_at: node.id.created_at,
                offset: node.id.offset + rel,
            },
            value: right_value,
            removed_at: node.removed_at,
        };
        self.nodes.insert(idx + 1, right);
    }

    /// Materializes `pos` as a node boundary, splitting if it falls inside
    /// a node, then skips right over nodes created after `executed_at`
    /// (the same descending-ticket placement rule the list uses). Returns
    /// the boundary's left node and its linear successor.
    fn find_with_split(
        &mut self,
        pos: &SplitNodePos,
        executed_at: Ticket,
    ) -> Result<(SplitNodeId, Option<SplitNodeId>), CrdtError> {
        let abs = pos.absolute_offset();
        let idx = self.find_floor_index(pos.id.created_at, abs)?;
        let rel = abs - self.nodes[idx].id.offset;
        self.split_node_at(idx, rel);

        let mut idx = idx;
        while idx + 1 < self.nodes.len()
            && self.nodes[idx + 1].id.created_at.after(executed_at)
        {
            idx += 1;
        }
        Ok((self.nodes[idx].id, self.nodes.get(idx + 1).map(|n| n.id)))
    }

    /// Node identities from `from` (inclusive) up to `to` (exclusive) in
    /// linear order. `from == None` means the empty range; `to == None`
    /// runs to the end of the sequence.
    fn ids_between(
        &self,
        from: Option<SplitNodeId>,
        to: Option<SplitNodeId>,
    ) -> Vec<SplitNodeId> {
        let Some(from) = from else {
            return Vec::new();
        };
        let Some(start) = self.index_of_id(from) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for node in &self.nodes[start..] {
            if Some(node.id) == to {
                break;
            }
            out.push(node.id);
        }
        out
    }

    /// Tombstones `candidates` under the concurrent-edit guard: a node may
    /// only be removed when its creation ticket is covered by the issuer's
    /// per-actor high-water mark (`None` means a local edit, which covers
    /// everything; an actor missing from the map covers nothing). Returns
    /// the per-actor maximum creation ticket among the nodes it removed.
    fn delete_nodes(
        &mut self,
        candidates: &[SplitNodeId],
        latest_created_at_by_actor: Option<&HashMap<ActorID, Ticket>>,
        executed_at: Ticket,
    ) -> HashMap<ActorID, Ticket> {
        let mut max_by_actor: HashMap<ActorID, Ticket> = HashMap::new();
        for id in candidates {
            let Some(idx) = self.index_of_id(*id) else {
                continue;
            };
            let created_at = self.nodes[idx].id.created_at;
            let latest = match latest_created_at_by_actor {
                None => MAX_TICKET,
                Some(map) => map
                    .get(&created_at.actor())
                    .copied()
                    .unwrap_or(INITIAL_TICKET),
            };
            if created_at.after(latest) {
                continue;
            }
            let node = &mut self.nodes[idx];
            let applies = match node.removed_at {
                None => true,
                Some(removed_at) => executed_at.after(removed_at),
            };
            if applies {
                node.removed_at = Some(executed_at);
                max_by_actor
                    .entry(created_at.actor())
                    .and_modify(|t| *t = (*t).max(created_at))
                    .or_insert(created_at);
            }
        }
        max_by_actor
    }

    /// Inserts `node` immediately after the node identified by `left`.
    /// Re-delivery of a content insert is recognized by its creation ticket
    /// and ignored.
    pub(crate) fn insert_after(
        &mut self,
        left: SplitNodeId,
        node: SplitNode<V>,
    ) -> Result<(), CrdtError> {
        if self
            .nodes
            .iter()
            .any(|n| n.id.created_at == node.id.created_at)
        {
            return Ok(());
        }
        let idx = self.index_of_id(left).ok_or(CrdtError::InvalidPosition)?;
        self.nodes.insert(idx + 1, node);
        Ok(())
    }

    /// The range edit at the heart of text editing: split the endpoints,
    /// tombstone everything in between (guarded), insert the new content
    /// after the left endpoint. Returns the per-actor creation high-water
    /// mark of the removed nodes, which the issuing replica embeds in the
    /// operation for remote replay.
    pub(crate) fn edit(
        &mut self,
        from: &SplitNodePos,
        to: &SplitNodePos,
        latest_created_at_by_actor: Option<&HashMap<ActorID, Ticket>>,
        content: Option<V>,
        executed_at: Ticket,
    ) -> Result<HashMap<ActorID, Ticket>, CrdtError> {
        let (_, to_right) = self.find_with_split(to, executed_at)?;
        let (from_left, from_right) = self.find_with_split(from, executed_at)?;

        let candidates = self.ids_between(from_right, to_right);
        let max_by_actor =
            self.delete_nodes(&candidates, latest_created_at_by_actor, executed_at);

        if let Some(value) = content {
            if value.len() > 0 {
                self.insert_after(
                    from_left,
                    SplitNode {
                        id: SplitNodeId {
                            created_at: executed_at,
                            offset: 0,
                        },
                        value,
                        removed_at: None,
                    },
                )?;
            }
        }
        Ok(max_by_actor)
    }

    /// Splits the endpoints of a range and returns the node identities it
    /// covers, tombstoned nodes included. Used by attribute styling.
    pub(crate) fn split_range(
        &mut self,
        from: &SplitNodePos,
        to: &SplitNodePos,
        executed_at: Ticket,
    ) -> Result<Vec<SplitNodeId>, CrdtError> {
        let (_, to_right) = self.find_with_split(to, executed_at)?;
        let (_, from_right) = self.find_with_split(from, executed_at)?;
        Ok(self.ids_between(from_right, to_right))
    }

    pub(crate) fn node_mut(&mut self, id: SplitNodeId) -> Option<&mut SplitNode<V>> {
        let idx = self.index_of_id(id)?;
        Some(&mut self.nodes[idx])
    }

    /// Unlinks every tombstoned node whose removal ticket is covered by
    /// `max`. Returns the number of nodes freed.
    pub(crate) fn purge_removed(&mut self, max: Ticket) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| match n.removed_at {
            Some(removed_at) => removed_at.after(max),
            None => true,
        });
        before - self.nodes.len()
    }
}

impl<V: SplitValue> Default for RGATreeSplit<V> {
    fn default() -> Self {
        RGATreeSplit::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ActorID;

    fn tick(lamport: u64) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([1; 12]))
    }

    fn contents(rga: &RGATreeSplit<String>) -> String {
        rga.live_values().map(|v| v.as_str()).collect()
    }

    fn edit(
        rga: &mut RGATreeSplit<String>,
        from: usize,
        to: usize,
        content: &str,
        at: Ticket,
    ) {
        let (from_pos, to_pos) = rga.create_range(from, to).unwrap();
        let value = (!content.is_empty()).then(|| content.to_string());
        rga.edit(&from_pos, &to_pos, None, value, at).unwrap();
    }

    #[test]
    fn insert_then_read() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "hello", tick(1));
        assert_eq!(contents(&rga), "hello");
        assert_eq!(rga.node_count(), 1);
    }

    #[test]
    fn replace_middle_splits_and_tombstones() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "Hello World", tick(1));
        edit(&mut rga, 5, 10, "Yorkie", tick(2));
        assert_eq!(contents(&rga), "HelloYorkied");
        // "Hello" + "Yorkie" + tombstoned " Worl" + "d"
        assert_eq!(rga.node_count(), 4);
        assert_eq!(rga.tombstone_count(), 1);
    }

    #[test]
    fn delete_prefix_and_single_char() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "Hello World", tick(1));
        edit(&mut rga, 5, 10, "Yorkie", tick(2));
        edit(&mut rga, 0, 5, "", tick(3));
        assert_eq!(contents(&rga), "Yorkied");
        edit(&mut rga, 6, 7, "", tick(4));
        assert_eq!(contents(&rga), "Yorkie");
        assert_eq!(rga.tombstone_count(), 3);
    }

    #[test]
    fn purge_frees_only_covered_tombstones() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "abcd", tick(1));
        edit(&mut rga, 0, 2, "", tick(3));
        edit(&mut rga, 1, 2, "", tick(5));
        assert_eq!(contents(&rga), "c");

        assert_eq!(rga.purge_removed(tick(3)), 1);
        assert_eq!(rga.tombstone_count(), 1);
        assert_eq!(rga.purge_removed(MAX_TICKET), 1);
        assert_eq!(rga.tombstone_count(), 0);
        assert_eq!(contents(&rga), "c");
    }

    #[test]
    fn positions_survive_splits() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "abcdef", tick(1));
        // Take a position, then split the node underneath it.
        let pos = rga.find_node_pos(5).unwrap();
        edit(&mut rga, 2, 2, "XY", tick(2));
        assert_eq!(contents(&rga), "abXYcdef");
        // The recorded position still addresses the original item.
        assert_eq!(pos.absolute_offset(), 5);
        let idx = rga.find_floor_index(pos.id.created_at, pos.absolute_offset());
        assert!(idx.is_ok());
    }

    #[test]
    fn guard_spares_unseen_actors() {
        let other = Ticket::new(2, 0, ActorID::from_bytes([9; 12]));
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "keep", tick(1));
        // Concurrent content from an actor the issuer never observed.
        let end = rga.find_node_pos(4).unwrap();
        let (left, _) = rga.find_with_split(&end, other).unwrap();
        rga.insert_after(
            left,
            SplitNode {
                id: SplitNodeId {
                    created_at: other,
                    offset: 0,
                },
                value: "hidden".to_string(),
                removed_at: None,
            },
        )
        .unwrap();
        assert_eq!(contents(&rga), "keephidden");

        // A remote delete of the full range whose map only covers actor 1.
        let map: HashMap<ActorID, Ticket> =
            [(tick(1).actor(), tick(1))].into_iter().collect();
        let (from_pos, to_pos) = rga.create_range(0, 10).unwrap();
        rga.edit(&from_pos, &to_pos, Some(&map), None, tick(3)).unwrap();
        assert_eq!(contents(&rga), "hidden");
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "once", tick(1));
        let head = SplitNodeId {
            created_at: INITIAL_TICKET,
            offset: 0,
        };
        rga.insert_after(
            head,
            SplitNode {
                id: SplitNodeId {
                    created_at: tick(1),
                    offset: 0,
                },
                value: "once".to_string(),
                removed_at: None,
            },
        )
        .unwrap();
        assert_eq!(contents(&rga), "once");
        assert_eq!(rga.node_count(), 1);
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let mut rga = RGATreeSplit::<String>::new();
        edit(&mut rga, 0, 0, "ab", tick(1));
        assert_eq!(rga.find_node_pos(3), Err(CrdtError::OutOfBounds(3)));
    }
}
