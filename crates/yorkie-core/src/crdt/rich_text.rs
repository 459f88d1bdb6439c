//! Rich text container: text whose nodes carry a styling attribute table.

use std::collections::{BTreeMap, HashMap};

use crate::crdt::text::Selection;
use crate::crdt::{CrdtError, RGATreeSplit, Rht, SplitNode, SplitNodePos, SplitValue};
use crate::time::{ActorID, Ticket};

/// Payload of a rich text node: a content run plus its attribute table.
/// Splitting a run copies the attributes to both halves.
#[derive(Debug, Clone, Default)]
pub struct RichTextValue {
    content: String,
    attrs: Rht,
}

impl RichTextValue {
    pub fn new(content: String, attrs: Rht) -> Self {
        RichTextValue { content, attrs }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attrs(&self) -> &Rht {
        &self.attrs
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut Rht {
        &mut self.attrs
    }
}

impl SplitValue for RichTextValue {
    fn len(&self) -> usize {
        self.content.chars().count()
    }

    fn split_at(&mut self, at: usize) -> Self {
        let byte_pos = self
            .content
            .char_indices()
            .nth(at)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        RichTextValue {
            content: self.content.split_off(byte_pos),
            attrs: self.attrs.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RichText {
    created_at: Ticket,
    rga: RGATreeSplit<RichTextValue>,
    selections: HashMap<ActorID, Selection>,
}

impl RichText {
    pub fn new(created_at: Ticket) -> Self {
        RichText {
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
        attributes: Option<&BTreeMap<String, String>>,
        executed_at: Ticket,
    ) -> Result<HashMap<ActorID, Ticket>, CrdtError> {
        let value = (!content.is_empty()).then(|| {
            let mut attrs = Rht::new();
            if let Some(attributes) = attributes {
                for (name, value) in attributes {
                    attrs.set(name, value, executed_at);
                }
            }
            RichTextValue::new(content.to_string(), attrs)
        });
        self.rga
            .edit(from, to, latest_created_at_by_actor, value, executed_at)
    }

    /// Applies `attributes` to every node in the range, tombstoned nodes
    /// included, so a node resurfacing later keeps its styling. Each
    /// attribute lands only when `executed_at` is newer than its entry.
    pub(crate) fn style(
        &mut self,
        from: &SplitNodePos,
        to: &SplitNodePos,
        attributes: &BTreeMap<String, String>,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        let covered = self.rga.split_range(from, to, executed_at)?;
        for id in covered {
            if let Some(node) = self.rga.node_mut(id) {
                let attrs = node.value_mut().attrs_mut();
                for (name, value) in attributes {
                    attrs.set(name, value, executed_at);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn select(&mut self, from: SplitNodePos, to: SplitNodePos, executed_at: Ticket) {
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

    pub fn selection(&self, actor: ActorID) -> Option<(SplitNodePos, SplitNodePos)> {
        self.selections.get(&actor).map(|s| (s.from, s.to))
    }

    pub fn len(&self) -> usize {
        self.rga.live_values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_count(&self) -> usize {
        self.rga.node_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SplitNode<RichTextValue>> {
        self.rga.nodes()
    }

    pub(crate) fn tombstone_count(&self) -> usize {
        self.rga.tombstone_count()
    }

    pub(crate) fn purge_removed(&mut self, max: Ticket) -> usize {
        self.rga.purge_removed(max)
    }

    /// JSON array of `{"attrs":…,"val":…}` runs, one per live node.
    pub fn marshal(&self) -> String {
        let runs: Vec<serde_json::Value> = self
            .rga
            .live_values()
            .map(|v| {
                let mut run = serde_json::Map::new();
                run.insert("attrs".to_string(), v.attrs().to_json());
                run.insert(
                    "val".to_string(),
                    serde_json::Value::String(v.content().to_string()),
                );
                serde_json::Value::Object(run)
            })
            .collect();
        serde_json::Value::Array(runs).to_string()
    }
}
