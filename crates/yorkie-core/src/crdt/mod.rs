//! CRDT element types composing the document tree.
//!
//! Every element lives in the [`Root`] arena keyed by its creation ticket;
//! containers hold ticket handles rather than owning their children. The
//! slot bookkeeping (`removedAt`, `movedAt`) lives on the container side, so
//! each backing structure resolves its own concurrency rules without
//! reaching back into the arena.

mod array;
mod object;
mod primitive;
mod rga_tree_list;
mod rga_tree_split;
mod rht;
mod rich_text;
mod root;
mod text;

pub use array::Array;
pub use object::Object;
pub use primitive::{Primitive, PrimitiveValue};
pub use rga_tree_list::RGATreeList;
pub use rga_tree_split::{RGATreeSplit, SplitNode, SplitNodeId, SplitNodePos, SplitValue};
pub use rht::Rht;
pub use rich_text::{RichText, RichTextValue};
pub use root::Root;
pub use text::Text;

use crate::time::Ticket;
use thiserror::Error;

/// Failures surfaced while mutating or traversing the document tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdtError {
    /// A position or operation target references a creation ticket that is
    /// not present in the addressed container.
    #[error("position references an unknown node")]
    InvalidPosition,
    /// An operation's parent ticket is not registered in the element arena.
    #[error("unknown parent element")]
    UnknownParent,
    /// An operation addressed a container of the wrong kind.
    #[error("element type mismatch")]
    TypeMismatch,
    #[error("index {0} out of bounds")]
    OutOfBounds(usize),
    #[error("no such key: {0}")]
    UnknownKey(String),
}

/// One node of the document tree.
#[derive(Debug, Clone)]
pub enum Element {
    Primitive(Primitive),
    Object(Object),
    Array(Array),
    Text(Text),
    RichText(RichText),
}

impl Element {
    pub fn created_at(&self) -> Ticket {
        match self {
            Element::Primitive(p) => p.created_at(),
            Element::Object(o) => o.created_at(),
            Element::Array(a) => a.created_at(),
            Element::Text(t) => t.created_at(),
            Element::RichText(r) => r.created_at(),
        }
    }

    pub(crate) fn from_content(content: &ElementContent, created_at: Ticket) -> Element {
        match content {
            ElementContent::Primitive(value) => {
                Element::Primitive(Primitive::new(value.clone(), created_at))
            }
            ElementContent::Object => Element::Object(Object::new(created_at)),
            ElementContent::Array => Element::Array(Array::new(created_at)),
            ElementContent::Text => Element::Text(Text::new(created_at)),
            ElementContent::RichText => Element::RichText(RichText::new(created_at)),
        }
    }
}

/// Serializable description of a newly created element, carried by the
/// `Set` and `Add` operations. Containers start out empty; their members
/// arrive as separate operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementContent {
    Primitive(PrimitiveValue),
    Object,
    Array,
    Text,
    RichText,
}
