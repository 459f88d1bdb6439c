//! Binary wire codec for changes and change packs.
//!
//! Records are tag-prefixed. Tickets travel as their fixed 24-byte
//! big-endian form; positions as `(createdAt, absolute offset u32)`;
//! variable-length content is u32-length-prefixed; attribute maps ride as
//! embedded CBOR blobs.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::change::{Change, ChangeID, ChangePack, Checkpoint};
use crate::crdt::{ElementContent, PrimitiveValue, SplitNodeId, SplitNodePos};
use crate::operation::Operation;
use crate::time::{ActorID, Ticket, ACTOR_ID_SIZE, TICKET_SIZE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A ticket field was truncated or otherwise malformed.
    #[error("invalid ticket encoding")]
    InvalidTicket,
    #[error("unknown wire tag: {0}")]
    UnknownTag(u8),
    #[error("invalid utf-8 in wire string")]
    InvalidUtf8,
    #[error("invalid cbor attribute map")]
    InvalidCbor,
    #[error("trailing bytes after record")]
    TrailingBytes,
}

const OP_SET: u8 = 1;
const OP_ADD: u8 = 2;
const OP_MOVE: u8 = 3;
const OP_REMOVE: u8 = 4;
const OP_EDIT: u8 = 5;
const OP_STYLE: u8 = 6;
const OP_SELECT: u8 = 7;

const CONTENT_PRIMITIVE: u8 = 0;
const CONTENT_OBJECT: u8 = 1;
const CONTENT_ARRAY: u8 = 2;
const CONTENT_TEXT: u8 = 3;
const CONTENT_RICH_TEXT: u8 = 4;

const VALUE_NULL: u8 = 0;
const VALUE_BOOLEAN: u8 = 1;
const VALUE_INTEGER: u8 = 2;
const VALUE_LONG: u8 = 3;
const VALUE_DOUBLE: u8 = 4;
const VALUE_STRING: u8 = 5;
const VALUE_BYTES: u8 = 6;
const VALUE_DATE: u8 = 7;

/// Encodes a single change.
pub fn encode_change(change: &Change) -> Vec<u8> {
    let mut w = Writer::new();
    w.change(change);
    w.bytes
}

/// Decodes a single change, rejecting trailing bytes.
pub fn decode_change(data: &[u8]) -> Result<Change, WireError> {
    let mut r = Reader::new(data);
    let change = r.change()?;
    if !r.is_eof() {
        return Err(WireError::TrailingBytes);
    }
    Ok(change)
}

/// Encodes a change pack.
pub fn encode_change_pack(pack: &ChangePack) -> Vec<u8> {
    let mut w = Writer::new();
    w.str(pack.document_key());
    w.u64(pack.checkpoint().server_seq());
    w.u32(pack.checkpoint().client_seq());
    match pack.min_synced_ticket() {
        Some(ticket) => {
            w.u8(1);
            w.ticket(ticket);
        }
        None => w.u8(0),
    }
    w.u32(pack.changes().len() as u32);
    for change in pack.changes() {
        w.change(change);
    }
    w.bytes
}

/// Decodes a change pack, rejecting trailing bytes.
pub fn decode_change_pack(data: &[u8]) -> Result<ChangePack, WireError> {
    let mut r = Reader::new(data);
    let document_key = r.str()?;
    let server_seq = r.u64()?;
    let client_seq = r.u32()?;
    let min_synced_ticket = match r.u8()? {
        0 => None,
        1 => Some(r.ticket()?),
        tag => return Err(WireError::UnknownTag(tag)),
    };
    let count = r.u32()? as usize;
    let mut changes = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        changes.push(r.change()?);
    }
    if !r.is_eof() {
        return Err(WireError::TrailingBytes);
    }
    Ok(ChangePack::new(
        document_key,
        Checkpoint::new(server_seq, client_seq),
        changes,
        min_synced_ticket,
    ))
}

struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer {
            bytes: Vec::with_capacity(128),
        }
    }

    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn blob(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.bytes.extend_from_slice(b);
    }

    fn actor(&mut self, actor: ActorID) {
        self.bytes.extend_from_slice(actor.as_bytes());
    }

    fn ticket(&mut self, ticket: Ticket) {
        self.bytes.extend_from_slice(&ticket.to_bytes());
    }

    fn pos(&mut self, pos: &SplitNodePos) {
        self.ticket(pos.id.created_at);
        self.u32(pos.absolute_offset());
    }

    fn cbor_map(&mut self, map: &BTreeMap<String, String>) {
        let mut blob = Vec::new();
        ciborium::ser::into_writer(map, &mut blob).expect("CBOR encode must succeed");
        self.blob(&blob);
    }

    fn value(&mut self, value: &PrimitiveValue) {
        match value {
            PrimitiveValue::Null => self.u8(VALUE_NULL),
            PrimitiveValue::Boolean(v) => {
                self.u8(VALUE_BOOLEAN);
                self.u8(u8::from(*v));
            }
            PrimitiveValue::Integer(v) => {
                self.u8(VALUE_INTEGER);
                self.u32(*v as u32);
            }
            PrimitiveValue::Long(v) => {
                self.u8(VALUE_LONG);
                self.u64(*v as u64);
            }
            PrimitiveValue::Double(v) => {
                self.u8(VALUE_DOUBLE);
                self.u64(v.to_bits());
            }
            PrimitiveValue::String(v) => {
                self.u8(VALUE_STRING);
                self.str(v);
            }
            PrimitiveValue::Bytes(v) => {
                self.u8(VALUE_BYTES);
                self.blob(v);
            }
            PrimitiveValue::Date(v) => {
                self.u8(VALUE_DATE);
                self.u64(*v as u64);
            }
        }
    }

    fn content(&mut self, content: &ElementContent) {
        match content {
            ElementContent::Primitive(value) => {
                self.u8(CONTENT_PRIMITIVE);
                self.value(value);
            }
            ElementContent::Object => self.u8(CONTENT_OBJECT),
            ElementContent::Array => self.u8(CONTENT_ARRAY),
            ElementContent::Text => self.u8(CONTENT_TEXT),
            ElementContent::RichText => self.u8(CONTENT_RICH_TEXT),
        }
    }

    fn max_map(&mut self, map: &HashMap<ActorID, Ticket>) {
        // Sorted for deterministic bytes.
        let mut entries: Vec<(&ActorID, &Ticket)> = map.iter().collect();
        entries.sort_by_key(|(actor, _)| **actor);
        self.u32(entries.len() as u32);
        for (actor, ticket) in entries {
            self.actor(*actor);
            self.ticket(*ticket);
        }
    }

    fn op(&mut self, op: &Operation) {
        match op {
            Operation::Set {
                parent_created_at,
                key,
                value,
                executed_at,
            } => {
                self.u8(OP_SET);
                self.ticket(*parent_created_at);
                self.str(key);
                self.content(value);
                self.ticket(*executed_at);
            }
            Operation::Add {
                parent_created_at,
                prev_created_at,
                value,
                executed_at,
            } => {
                self.u8(OP_ADD);
                self.ticket(*parent_created_at);
                self.ticket(*prev_created_at);
                self.content(value);
                self.ticket(*executed_at);
            }
            Operation::Move {
                parent_created_at,
                prev_created_at,
                created_at,
                executed_at,
            } => {
                self.u8(OP_MOVE);
                self.ticket(*parent_created_at);
                self.ticket(*prev_created_at);
                self.ticket(*created_at);
                self.ticket(*executed_at);
            }
            Operation::Remove {
                parent_created_at,
                created_at,
                executed_at,
            } => {
                self.u8(OP_REMOVE);
                self.ticket(*parent_created_at);
                self.ticket(*created_at);
                self.ticket(*executed_at);
            }
            Operation::Edit {
                parent_created_at,
                from,
                to,
                content,
                attributes,
                max_created_at_by_actor,
                executed_at,
            } => {
                self.u8(OP_EDIT);
                self.ticket(*parent_created_at);
                self.pos(from);
                self.pos(to);
                self.str(content);
                match attributes {
                    Some(attrs) => {
                        self.u8(1);
                        self.cbor_map(attrs);
                    }
                    None => self.u8(0),
                }
                self.max_map(max_created_at_by_actor);
                self.ticket(*executed_at);
            }
            Operation::Style {
                parent_created_at,
                from,
                to,
                attributes,
                executed_at,
            } => {
                self.u8(OP_STYLE);
                self.ticket(*parent_created_at);
                self.pos(from);
                self.pos(to);
                self.cbor_map(attributes);
                self.ticket(*executed_at);
            }
            Operation::Select {
                parent_created_at,
                from,
                to,
                executed_at,
            } => {
                self.u8(OP_SELECT);
                self.ticket(*parent_created_at);
                self.pos(from);
                self.pos(to);
                self.ticket(*executed_at);
            }
        }
    }

    fn change(&mut self, change: &Change) {
        self.actor(change.id().actor());
        self.u64(change.id().lamport());
        self.u32(change.id().client_seq());
        self.str(change.message());
        self.u32(change.operations().len() as u32);
        for op in change.operations() {
            self.op(op);
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.pos + n > self.data.len() {
            return Err(WireError::UnexpectedEof);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn str(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn blob(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn actor(&mut self) -> Result<ActorID, WireError> {
        let bytes = self.take(ACTOR_ID_SIZE)?;
        Ok(ActorID::from_bytes(
            bytes.try_into().expect("actor-sized slice"),
        ))
    }

    fn ticket(&mut self) -> Result<Ticket, WireError> {
        let bytes = self.take(TICKET_SIZE).map_err(|_| WireError::InvalidTicket)?;
        Ok(Ticket::from_bytes(
            bytes.try_into().expect("ticket-sized slice"),
        ))
    }

    fn pos(&mut self) -> Result<SplitNodePos, WireError> {
        let created_at = self.ticket()?;
        let offset = self.u32()?;
        Ok(SplitNodePos {
            id: SplitNodeId { created_at, offset },
            relative_offset: 0,
        })
    }

    fn cbor_map(&mut self) -> Result<BTreeMap<String, String>, WireError> {
        let blob = self.blob()?;
        ciborium::de::from_reader(blob.as_slice()).map_err(|_| WireError::InvalidCbor)
    }

    fn value(&mut self) -> Result<PrimitiveValue, WireError> {
        match self.u8()? {
            VALUE_NULL => Ok(PrimitiveValue::Null),
            VALUE_BOOLEAN => Ok(PrimitiveValue::Boolean(self.u8()? != 0)),
            VALUE_INTEGER => Ok(PrimitiveValue::Integer(self.u32()? as i32)),
            VALUE_LONG => Ok(PrimitiveValue::Long(self.u64()? as i64)),
            VALUE_DOUBLE => Ok(PrimitiveValue::Double(f64::from_bits(self.u64()?))),
            VALUE_STRING => Ok(PrimitiveValue::String(self.str()?)),
            VALUE_BYTES => Ok(PrimitiveValue::Bytes(self.blob()?)),
            VALUE_DATE => Ok(PrimitiveValue::Date(self.u64()? as i64)),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }

    fn content(&mut self) -> Result<ElementContent, WireError> {
        match self.u8()? {
            CONTENT_PRIMITIVE => Ok(ElementContent::Primitive(self.value()?)),
            CONTENT_OBJECT => Ok(ElementContent::Object),
            CONTENT_ARRAY => Ok(ElementContent::Array),
            CONTENT_TEXT => Ok(ElementContent::Text),
            CONTENT_RICH_TEXT => Ok(ElementContent::RichText),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }

    fn max_map(&mut self) -> Result<HashMap<ActorID, Ticket>, WireError> {
        let count = self.u32()? as usize;
        let mut map = HashMap::with_capacity(count.min(4096));
        for _ in 0..count {
            let actor = self.actor()?;
            let ticket = self.ticket()?;
            map.insert(actor, ticket);
        }
        Ok(map)
    }

    fn op(&mut self) -> Result<Operation, WireError> {
        match self.u8()? {
            OP_SET => Ok(Operation::Set {
                parent_created_at: self.ticket()?,
                key: self.str()?,
                value: self.content()?,
                executed_at: self.ticket()?,
            }),
            OP_ADD => Ok(Operation::Add {
                parent_created_at: self.ticket()?,
                prev_created_at: self.ticket()?,
                value: self.content()?,
                executed_at: self.ticket()?,
            }),
            OP_MOVE => Ok(Operation::Move {
                parent_created_at: self.ticket()?,
                prev_created_at: self.ticket()?,
                created_at: self.ticket()?,
                executed_at: self.ticket()?,
            }),
            OP_REMOVE => Ok(Operation::Remove {
                parent_created_at: self.ticket()?,
                created_at: self.ticket()?,
                executed_at: self.ticket()?,
            }),
            OP_EDIT => {
                let parent_created_at = self.ticket()?;
                let from = self.pos()?;
                let to = self.pos()?;
                let content = self.str()?;
                let attributes = match self.u8()? {
                    0 => None,
                    1 => Some(self.cbor_map()?),
                    tag => return Err(WireError::UnknownTag(tag)),
                };
                let max_created_at_by_actor = self.max_map()?;
                let executed_at = self.ticket()?;
                Ok(Operation::Edit {
                    parent_created_at,
                    from,
                    to,
                    content,
                    attributes,
                    max_created_at_by_actor,
                    executed_at,
                })
            }
            OP_STYLE => Ok(Operation::Style {
                parent_created_at: self.ticket()?,
                from: self.pos()?,
                to: self.pos()?,
                attributes: self.cbor_map()?,
                executed_at: self.ticket()?,
            }),
            OP_SELECT => Ok(Operation::Select {
                parent_created_at: self.ticket()?,
                from: self.pos()?,
                to: self.pos()?,
                executed_at: self.ticket()?,
            }),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }

    fn change(&mut self) -> Result<Change, WireError> {
        let actor = self.actor()?;
        let lamport = self.u64()?;
        let client_seq = self.u32()?;
        let message = self.str()?;
        let count = self.u32()? as usize;
        let mut operations = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            operations.push(self.op()?);
        }
        Ok(Change::new(
            ChangeID::new(client_seq, lamport, actor),
            message,
            operations,
        ))
    }
}
