//! The element arena, garbage registries and the GC sweep.
//!
//! Every element lives in a flat map keyed by its creation ticket; parents
//! hold ticket handles. Removal never unlinks anything by itself: removed
//! elements are recorded as `(parent, child)` pairs and text containers
//! with tombstoned split nodes are recorded in a side set, both reclaimed
//! only once a sweep proves the removal ticket is covered by every replica.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::crdt::{CrdtError, Element, ElementContent, Object, SplitNodePos};
use crate::time::{ActorID, Ticket, INITIAL_TICKET};

#[derive(Debug, Clone)]
pub struct Root {
    elements: HashMap<Ticket, Element>,
    /// child createdAt -> parent createdAt, pending reclamation.
    removed_pairs: BTreeMap<Ticket, Ticket>,
    /// Text containers currently holding tombstoned split nodes.
    text_garbage: BTreeSet<Ticket>,
}

impl Root {
    /// A fresh root: an empty object registered under the initial ticket.
    pub fn new() -> Self {
        let mut elements = HashMap::new();
        elements.insert(
            INITIAL_TICKET,
            Element::Object(Object::new(INITIAL_TICKET)),
        );
        Root {
            elements,
            removed_pairs: BTreeMap::new(),
            text_garbage: BTreeSet::new(),
        }
    }

    pub fn element(&self, created_at: Ticket) -> Option<&Element> {
        self.elements.get(&created_at)
    }

    /// Records a removed `(parent, child)` pair for a later sweep. The child
    /// stays addressable until then, since late-arriving operations may
    /// still reference it.
    pub fn register_removed_element_pair(&mut self, parent: Ticket, child: Ticket) {
        self.removed_pairs.insert(child, parent);
    }

    /// Records that a text container holds purgeable split nodes.
    pub fn register_text_with_garbage(&mut self, created_at: Ticket) {
        self.text_garbage.insert(created_at);
    }

    /// Pending garbage: removed element pairs plus tombstoned split nodes
    /// across all registered text containers.
    pub fn garbage_len(&self) -> usize {
        let text_nodes: usize = self
            .text_garbage
            .iter()
            .filter_map(|t| self.elements.get(t))
            .map(|elem| match elem {
                Element::Text(text) => text.tombstone_count(),
                Element::RichText(rich) => rich.tombstone_count(),
                _ => 0,
            })
            .sum();
        self.removed_pairs.len() + text_nodes
    }

    /// Reclaims everything removed at or before `max`: removed elements are
    /// structurally unlinked from their parents and dropped from the arena
    /// together with their descendants, and covered split-node tombstones
    /// are purged from registered text containers. Returns the number of
    /// elements and nodes freed. Never fails; an uncovered removal simply
    /// stays for a later sweep.
    pub fn garbage_collect(&mut self, max: Ticket) -> usize {
        let mut count = 0;

        let eligible: Vec<(Ticket, Ticket)> = self
            .removed_pairs
            .iter()
            .map(|(child, parent)| (*child, *parent))
            .filter(|(child, parent)| {
                self.slot_removed_at(*parent, *child)
                    .is_some_and(|removed_at| !removed_at.after(max))
            })
            .collect();
        for (child, parent) in eligible {
            // Already reaped as a descendant of an earlier pair.
            if !self.removed_pairs.contains_key(&child) {
                continue;
            }
            if let Some(elem) = self.elements.get_mut(&parent) {
                match elem {
                    Element::Object(obj) => obj.purge(child),
                    Element::Array(arr) => arr.purge(child),
                    _ => {}
                }
            }
            count += self.deregister_subtree(child);
        }

        let registered: Vec<Ticket> = self.text_garbage.iter().copied().collect();
        for created_at in registered {
            let remaining = match self.elements.get_mut(&created_at) {
                Some(Element::Text(text)) => {
                    count += text.purge_removed(max);
                    text.tombstone_count()
                }
                Some(Element::RichText(rich)) => {
                    count += rich.purge_removed(max);
                    rich.tombstone_count()
                }
                _ => 0,
            };
            if remaining == 0 {
                self.text_garbage.remove(&created_at);
            }
        }

        count
    }

    /// Drops `created_at` and every descendant from the arena and the
    /// registries. Iterative worklist: nesting depth must not bound GC.
    fn deregister_subtree(&mut self, created_at: Ticket) -> usize {
        let mut count = 0;
        let mut worklist = vec![created_at];
        while let Some(id) = worklist.pop() {
            let Some(elem) = self.elements.remove(&id) else {
                continue;
            };
            count += 1;
            self.removed_pairs.remove(&id);
            self.text_garbage.remove(&id);
            match elem {
                Element::Object(obj) => worklist.extend(obj.child_handles()),
                Element::Array(arr) => worklist.extend(arr.child_handles()),
                _ => {}
            }
        }
        count
    }

    fn slot_removed_at(&self, parent: Ticket, child: Ticket) -> Option<Ticket> {
        match self.elements.get(&parent)? {
            Element::Object(obj) => obj.removed_at_of(child),
            Element::Array(arr) => arr.removed_at_of(child),
            _ => None,
        }
    }

    // ── Operation primitives ─────────────────────────────────────────────
    //
    // Local facades and remote operation dispatch both land here, so the
    // concurrency rules live in exactly one place.

    /// Sets `key` on the object `parent` to a fresh element created at
    /// `executed_at`.
    pub fn set(
        &mut self,
        parent: Ticket,
        key: &str,
        content: &ElementContent,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get(&parent) {
            Some(Element::Object(_)) => {}
            Some(_) => return Err(CrdtError::TypeMismatch),
            None => return Err(CrdtError::UnknownParent),
        }
        if self.elements.contains_key(&executed_at) {
            // Duplicate delivery.
            return Ok(());
        }
        self.elements
            .insert(executed_at, Element::from_content(content, executed_at));
        let displaced = match self.elements.get_mut(&parent) {
            Some(Element::Object(obj)) => obj.set(key, executed_at, executed_at),
            _ => return Err(CrdtError::UnknownParent),
        };
        for loser in displaced {
            self.removed_pairs.insert(loser, parent);
        }
        Ok(())
    }

    /// Inserts a fresh element created at `executed_at` into the array
    /// `parent`, after the live-or-tombstoned node `prev`.
    pub fn add(
        &mut self,
        parent: Ticket,
        prev: Ticket,
        content: &ElementContent,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get(&parent) {
            Some(Element::Array(arr)) => {
                if prev != INITIAL_TICKET && !arr.contains(prev) {
                    return Err(CrdtError::InvalidPosition);
                }
            }
            Some(_) => return Err(CrdtError::TypeMismatch),
            None => return Err(CrdtError::UnknownParent),
        }
        if self.elements.contains_key(&executed_at) {
            return Ok(());
        }
        self.elements
            .insert(executed_at, Element::from_content(content, executed_at));
        match self.elements.get_mut(&parent) {
            Some(Element::Array(arr)) => arr.insert_after(prev, executed_at)?,
            _ => return Err(CrdtError::UnknownParent),
        }
        Ok(())
    }

    /// Reorders `target` to sit after `prev` inside the array `parent`.
    pub fn move_after(
        &mut self,
        parent: Ticket,
        prev: Ticket,
        target: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get_mut(&parent) {
            Some(Element::Array(arr)) => arr.move_after(prev, target, executed_at),
            Some(_) => Err(CrdtError::TypeMismatch),
            None => Err(CrdtError::UnknownParent),
        }
    }

    /// Tombstones `target` inside `parent` (object or array) and registers
    /// the pair for reclamation.
    pub fn remove(
        &mut self,
        parent: Ticket,
        target: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get_mut(&parent) {
            Some(Element::Object(obj)) => {
                obj.remove(target, executed_at)
                    .ok_or(CrdtError::InvalidPosition)?;
            }
            Some(Element::Array(arr)) => {
                arr.remove(target, executed_at)?;
            }
            Some(_) => return Err(CrdtError::TypeMismatch),
            None => return Err(CrdtError::UnknownParent),
        }
        self.removed_pairs.insert(target, parent);
        Ok(())
    }

    /// Range edit on a text or rich text container. Returns the per-actor
    /// creation high-water mark of the removed nodes. A non-collapsed range
    /// registers the container as holding garbage.
    #[allow(clippy::too_many_arguments)]
    pub fn edit_text(
        &mut self,
        parent: Ticket,
        from: &SplitNodePos,
        to: &SplitNodePos,
        latest_created_at_by_actor: Option<&HashMap<ActorID, Ticket>>,
        content: &str,
        attributes: Option<&BTreeMap<String, String>>,
        executed_at: Ticket,
    ) -> Result<HashMap<ActorID, Ticket>, CrdtError> {
        let max_by_actor = match self.elements.get_mut(&parent) {
            Some(Element::Text(text)) => {
                text.edit(from, to, latest_created_at_by_actor, content, executed_at)?
            }
            Some(Element::RichText(rich)) => rich.edit(
                from,
                to,
                latest_created_at_by_actor,
                content,
                attributes,
                executed_at,
            )?,
            Some(_) => return Err(CrdtError::TypeMismatch),
            None => return Err(CrdtError::UnknownParent),
        };
        if from != to {
            self.text_garbage.insert(parent);
        }
        Ok(max_by_actor)
    }

    /// Applies styling attributes over a range of a rich text container.
    pub fn style(
        &mut self,
        parent: Ticket,
        from: &SplitNodePos,
        to: &SplitNodePos,
        attributes: &BTreeMap<String, String>,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get_mut(&parent) {
            Some(Element::RichText(rich)) => rich.style(from, to, attributes, executed_at),
            Some(_) => Err(CrdtError::TypeMismatch),
            None => Err(CrdtError::UnknownParent),
        }
    }

    /// Remembers the issuing actor's cursor range on a text container.
    pub fn select(
        &mut self,
        parent: Ticket,
        from: SplitNodePos,
        to: SplitNodePos,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        match self.elements.get_mut(&parent) {
            Some(Element::Text(text)) => {
                text.select(from, to, executed_at);
                Ok(())
            }
            Some(Element::RichText(rich)) => {
                rich.select(from, to, executed_at);
                Ok(())
            }
            Some(_) => Err(CrdtError::TypeMismatch),
            None => Err(CrdtError::UnknownParent),
        }
    }

    // ── Marshalling ──────────────────────────────────────────────────────

    /// Canonical JSON rendering of the whole document.
    pub fn marshal(&self) -> String {
        self.marshal_element(INITIAL_TICKET)
    }

    /// Canonical JSON rendering of the element at `created_at`.
    pub fn marshal_element(&self, created_at: Ticket) -> String {
        match self.elements.get(&created_at) {
            None => "null".to_string(),
            Some(Element::Primitive(p)) => p.marshal(),
            Some(Element::Object(obj)) => {
                let members: Vec<String> = obj
                    .live_members()
                    .into_iter()
                    .map(|(key, handle)| {
                        format!(
                            "{}:{}",
                            serde_json::Value::String(key.to_string()),
                            self.marshal_element(handle)
                        )
                    })
                    .collect();
                format!("{{{}}}", members.join(","))
            }
            Some(Element::Array(arr)) => {
                let members: Vec<String> = arr
                    .live_handles()
                    .into_iter()
                    .map(|handle| self.marshal_element(handle))
                    .collect();
                format!("[{}]", members.join(","))
            }
            Some(Element::Text(text)) => text.marshal(),
            Some(Element::RichText(rich)) => rich.marshal(),
        }
    }
}

impl Default for Root {
    fn default() -> Self {
        Root::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::PrimitiveValue;
    use crate::time::{ActorID, MAX_TICKET};

    struct Clock {
        lamport: u64,
    }

    impl Clock {
        fn new() -> Self {
            Clock { lamport: 0 }
        }

        fn tick(&mut self) -> Ticket {
            self.lamport += 1;
            Ticket::new(self.lamport, 0, ActorID::from_bytes([1; 12]))
        }
    }

    fn int(v: i32) -> ElementContent {
        ElementContent::Primitive(PrimitiveValue::Integer(v))
    }

    #[test]
    fn array_garbage_collection() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let array = clock.tick();
        root.set(INITIAL_TICKET, "list", &ElementContent::Array, array)
            .unwrap();
        let e0 = clock.tick();
        root.add(array, INITIAL_TICKET, &int(0), e0).unwrap();
        let e1 = clock.tick();
        root.add(array, e0, &int(1), e1).unwrap();
        let e2 = clock.tick();
        root.add(array, e1, &int(2), e2).unwrap();
        assert_eq!(root.marshal_element(array), "[0,1,2]");
        assert_eq!(root.garbage_len(), 0);

        root.remove(array, e1, clock.tick()).unwrap();
        assert_eq!(root.marshal_element(array), "[0,2]");
        assert_eq!(root.garbage_len(), 1);

        assert_eq!(root.garbage_collect(MAX_TICKET), 1);
        assert_eq!(root.garbage_len(), 0);
        assert!(root.element(e1).is_none());
    }

    #[test]
    fn text_garbage_collection() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let text = clock.tick();
        root.set(INITIAL_TICKET, "text", &ElementContent::Text, text)
            .unwrap();

        let mut edit = |root: &mut Root, from: usize, to: usize, content: &str, at: Ticket| {
            let (from_pos, to_pos) = match root.element(text) {
                Some(Element::Text(t)) => t.create_range(from, to).unwrap(),
                _ => panic!("not a text"),
            };
            root.edit_text(text, &from_pos, &to_pos, None, content, None, at)
                .unwrap();
        };

        edit(&mut root, 0, 0, "Hello World", clock.tick());
        assert_eq!(root.marshal_element(text), "\"Hello World\"");
        assert_eq!(root.garbage_len(), 0);

        edit(&mut root, 5, 10, "Yorkie", clock.tick());
        assert_eq!(root.marshal_element(text), "\"HelloYorkied\"");
        assert_eq!(root.garbage_len(), 1);

        edit(&mut root, 0, 5, "", clock.tick());
        assert_eq!(root.marshal_element(text), "\"Yorkied\"");
        assert_eq!(root.garbage_len(), 2);

        edit(&mut root, 6, 7, "", clock.tick());
        assert_eq!(root.marshal_element(text), "\"Yorkie\"");
        assert_eq!(root.garbage_len(), 3);

        let node_count = match root.element(text) {
            Some(Element::Text(t)) => t.node_count(),
            _ => unreachable!(),
        };
        assert_eq!(node_count, 4);

        assert_eq!(root.garbage_collect(MAX_TICKET), 3);
        assert_eq!(root.garbage_len(), 0);
        let node_count = match root.element(text) {
            Some(Element::Text(t)) => t.node_count(),
            _ => unreachable!(),
        };
        assert_eq!(node_count, 1);
    }

    #[test]
    fn rich_text_garbage_collection() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let rich = clock.tick();
        root.set(INITIAL_TICKET, "rich", &ElementContent::RichText, rich)
            .unwrap();

        let mut edit = |root: &mut Root, from: usize, to: usize, content: &str, at: Ticket| {
            let (from_pos, to_pos) = match root.element(rich) {
                Some(Element::RichText(r)) => r.create_range(from, to).unwrap(),
                _ => panic!("not a rich text"),
            };
            root.edit_text(rich, &from_pos, &to_pos, None, content, None, at)
                .unwrap();
        };

        edit(&mut root, 0, 0, "Hello World", clock.tick());
        assert_eq!(
            root.marshal_element(rich),
            r#"[{"attrs":{},"val":"Hello World"}]"#
        );
        assert_eq!(root.garbage_len(), 0);

        edit(&mut root, 6, 11, "Yorkie", clock.tick());
        assert_eq!(
            root.marshal_element(rich),
            r#"[{"attrs":{},"val":"Hello "},{"attrs":{},"val":"Yorkie"}]"#
        );
        assert_eq!(root.garbage_len(), 1);

        edit(&mut root, 0, 6, "", clock.tick());
        assert_eq!(root.marshal_element(rich), r#"[{"attrs":{},"val":"Yorkie"}]"#);
        assert_eq!(root.garbage_len(), 2);

        let node_count = match root.element(rich) {
            Some(Element::RichText(r)) => r.node_count(),
            _ => unreachable!(),
        };
        assert_eq!(node_count, 3);

        assert_eq!(root.garbage_collect(MAX_TICKET), 2);
        assert_eq!(root.garbage_len(), 0);
        let node_count = match root.element(rich) {
            Some(Element::RichText(r)) => r.node_count(),
            _ => unreachable!(),
        };
        assert_eq!(node_count, 1);
    }

    #[test]
    fn gc_respects_the_sync_bound() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let text = clock.tick();
        root.set(INITIAL_TICKET, "text", &ElementContent::Text, text)
            .unwrap();
        let before_remove = clock.tick();
        {
            let (from_pos, to_pos) = match root.element(text) {
                Some(Element::Text(t)) => t.create_range(0, 0).unwrap(),
                _ => unreachable!(),
            };
            root.edit_text(text, &from_pos, &to_pos, None, "Hello World", None, before_remove)
                .unwrap();
        }
        {
            let (from_pos, to_pos) = match root.element(text) {
                Some(Element::Text(t)) => t.create_range(5, 10).unwrap(),
                _ => unreachable!(),
            };
            root.edit_text(text, &from_pos, &to_pos, None, "Yorkie", None, clock.tick())
                .unwrap();
        }
        assert_eq!(root.garbage_len(), 1);

        // The bound precedes the removal ticket: nothing may be reclaimed.
        assert_eq!(root.garbage_collect(before_remove), 0);
        assert_eq!(root.garbage_len(), 1);

        assert_eq!(root.garbage_collect(MAX_TICKET), 1);
        assert_eq!(root.garbage_len(), 0);
    }

    #[test]
    fn nested_containers_are_reaped_iteratively() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        // list: [ [ [ 7 ] ] ] then remove the outer element.
        let outer = clock.tick();
        root.set(INITIAL_TICKET, "list", &ElementContent::Array, outer)
            .unwrap();
        let mid = clock.tick();
        root.add(outer, INITIAL_TICKET, &ElementContent::Array, mid)
            .unwrap();
        let inner = clock.tick();
        root.add(mid, INITIAL_TICKET, &ElementContent::Array, inner)
            .unwrap();
        let leaf = clock.tick();
        root.add(inner, INITIAL_TICKET, &int(7), leaf).unwrap();
        assert_eq!(root.marshal(), r#"{"list":[[[7]]]}"#);

        root.remove(outer, mid, clock.tick()).unwrap();
        assert_eq!(root.garbage_len(), 1);
        // mid + inner + leaf
        assert_eq!(root.garbage_collect(MAX_TICKET), 3);
        assert!(root.element(mid).is_none());
        assert!(root.element(inner).is_none());
        assert!(root.element(leaf).is_none());
        assert_eq!(root.marshal(), r#"{"list":[]}"#);
    }

    #[test]
    fn displaced_object_values_are_collectable() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let first = clock.tick();
        root.set(INITIAL_TICKET, "k", &int(1), first).unwrap();
        let second = clock.tick();
        root.set(INITIAL_TICKET, "k", &int(2), second).unwrap();
        assert_eq!(root.marshal(), r#"{"k":2}"#);
        assert_eq!(root.garbage_len(), 1);

        assert_eq!(root.garbage_collect(MAX_TICKET), 1);
        assert!(root.element(first).is_none());
        assert_eq!(root.marshal(), r#"{"k":2}"#);
    }

    #[test]
    fn unknown_parent_and_type_mismatch_are_rejected() {
        let mut root = Root::new();
        let mut clock = Clock::new();

        let ghost = Ticket::new(99, 0, ActorID::from_bytes([9; 12]));
        assert_eq!(
            root.add(ghost, INITIAL_TICKET, &int(1), clock.tick()),
            Err(CrdtError::UnknownParent)
        );
        assert_eq!(
            root.set(ghost, "k", &int(1), clock.tick()),
            Err(CrdtError::UnknownParent)
        );

        let text = clock.tick();
        root.set(INITIAL_TICKET, "text", &ElementContent::Text, text)
            .unwrap();
        assert_eq!(
            root.add(text, INITIAL_TICKET, &int(1), clock.tick()),
            Err(CrdtError::TypeMismatch)
        );
    }
}
