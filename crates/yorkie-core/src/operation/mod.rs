//! The serializable operation records and their dispatch.
//!
//! Every operation names its parent by creation ticket and carries the
//! ticket it executed at; applying one locates the parent in the element
//! arena and delegates to the container's concurrency rules. Operations
//! are idempotent under those rules, so duplicate delivery is harmless.

use std::collections::{BTreeMap, HashMap};

use crate::crdt::{CrdtError, ElementContent, Root, SplitNodePos};
use crate::time::{ActorID, Ticket};

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Sets `key` of an object to a fresh element.
    Set {
        parent_created_at: Ticket,
        key: String,
        value: ElementContent,
        executed_at: Ticket,
    },
    /// Inserts a fresh element into an array after `prev_created_at`.
    Add {
        parent_created_at: Ticket,
        prev_created_at: Ticket,
        value: ElementContent,
        executed_at: Ticket,
    },
    /// Reorders an array element to sit after `prev_created_at`.
    Move {
        parent_created_at: Ticket,
        prev_created_at: Ticket,
        created_at: Ticket,
        executed_at: Ticket,
    },
    /// Tombstones an element of an object or array.
    Remove {
        parent_created_at: Ticket,
        created_at: Ticket,
        executed_at: Ticket,
    },
    /// Range edit on a text or rich text container.
    Edit {
        parent_created_at: Ticket,
        from: SplitNodePos,
        to: SplitNodePos,
        content: String,
        attributes: Option<BTreeMap<String, String>>,
        max_created_at_by_actor: HashMap<ActorID, Ticket>,
        executed_at: Ticket,
    },
    /// Applies styling attributes over a rich text range.
    Style {
        parent_created_at: Ticket,
        from: SplitNodePos,
        to: SplitNodePos,
        attributes: BTreeMap<String, String>,
        executed_at: Ticket,
    },
    /// Publishes the issuing actor's cursor range on a text container.
    Select {
        parent_created_at: Ticket,
        from: SplitNodePos,
        to: SplitNodePos,
        executed_at: Ticket,
    },
}

impl Operation {
    pub fn executed_at(&self) -> Ticket {
        match self {
            Operation::Set { executed_at, .. }
            | Operation::Add { executed_at, .. }
            | Operation::Move { executed_at, .. }
            | Operation::Remove { executed_at, .. }
            | Operation::Edit { executed_at, .. }
            | Operation::Style { executed_at, .. }
            | Operation::Select { executed_at, .. } => *executed_at,
        }
    }

    pub fn parent_created_at(&self) -> Ticket {
        match self {
            Operation::Set {
                parent_created_at, ..
            }
            | Operation::Add {
                parent_created_at, ..
            }
            | Operation::Move {
                parent_created_at, ..
            }
            | Operation::Remove {
                parent_created_at, ..
            }
            | Operation::Edit {
                parent_created_at, ..
            }
            | Operation::Style {
                parent_created_at, ..
            }
            | Operation::Select {
                parent_created_at, ..
            } => *parent_created_at,
        }
    }

    /// Applies this operation against `root`.
    pub fn execute(&self, root: &mut Root) -> Result<(), CrdtError> {
        match self {
            Operation::Set {
                parent_created_at,
                key,
                value,
                executed_at,
            } => root.set(*parent_created_at, key, value, *executed_at),
            Operation::Add {
                parent_created_at,
                prev_created_at,
                value,
                executed_at,
            } => root.add(*parent_created_at, *prev_created_at, value, *executed_at),
            Operation::Move {
                parent_created_at,
                prev_created_at,
                created_at,
                executed_at,
            } => root.move_after(
                *parent_created_at,
                *prev_created_at,
                *created_at,
                *executed_at,
            ),
            Operation::Remove {
                parent_created_at,
                created_at,
                executed_at,
            } => root.remove(*parent_created_at, *created_at, *executed_at),
            Operation::Edit {
                parent_created_at,
                from,
                to,
                content,
                attributes,
                max_created_at_by_actor,
                executed_at,
            } => root
                .edit_text(
                    *parent_created_at,
                    from,
                    to,
                    Some(max_created_at_by_actor),
                    content,
                    attributes.as_ref(),
                    *executed_at,
                )
                .map(|_| ()),
            Operation::Style {
                parent_created_at,
                from,
                to,
                attributes,
                executed_at,
            } => root.style(*parent_created_at, from, to, attributes, *executed_at),
            Operation::Select {
                parent_created_at,
                from,
                to,
                executed_at,
            } => root.select(*parent_created_at, *from, *to, *executed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::PrimitiveValue;
    use crate::time::{ActorID, INITIAL_TICKET};

    fn tick(lamport: u64) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([1; 12]))
    }

    #[test]
    fn set_executes_against_the_root_object() {
        let mut root = Root::new();
        let op = Operation::Set {
            parent_created_at: INITIAL_TICKET,
            key: "k".to_string(),
            value: ElementContent::Primitive(PrimitiveValue::Integer(1)),
            executed_at: tick(1),
        };
        op.execute(&mut root).unwrap();
        assert_eq!(root.marshal(), r#"{"k":1}"#);

        // Duplicate delivery leaves the document unchanged.
        op.execute(&mut root).unwrap();
        assert_eq!(root.marshal(), r#"{"k":1}"#);
    }

    #[test]
    fn unknown_parent_is_surfaced() {
        let mut root = Root::new();
        let op = Operation::Remove {
            parent_created_at: tick(42),
            created_at: tick(43),
            executed_at: tick(44),
        };
        assert_eq!(op.execute(&mut root), Err(CrdtError::UnknownParent));
    }
}
