//! Mutation facades handed to [`crate::Document::update`] callbacks.
//!
//! A facade wraps one container: every mutator issues a ticket from the
//! change context, applies the matching operation to the root, and pushes
//! the operation so it ships with the sealed change. Reads are pure.

use std::collections::BTreeMap;

use crate::change::ChangeContext;
use crate::crdt::{CrdtError, Element, ElementContent, PrimitiveValue, Root};
use crate::document::DocumentError;
use crate::operation::Operation;
use crate::time::Ticket;

/// Facade over a JSON object element.
pub struct JsonObject<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Facade over a JSON array element.
pub struct JsonArray<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Facade over a plain text element.
pub struct JsonText<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Facade over a rich text element.
pub struct JsonRichText<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

impl<'a> JsonObject<'a> {
    pub(crate) fn new(root: &'a mut Root, ctx: &'a mut ChangeContext, target: Ticket) -> Self {
        JsonObject { root, ctx, target }
    }

    fn container(&self) -> Result<&crate::crdt::Object, DocumentError> {
        match self.root.element(self.target) {
            Some(Element::Object(obj)) => Ok(obj),
            _ => Err(CrdtError::UnknownParent.into()),
        }
    }

    fn set_content(&mut self, key: &str, content: ElementContent) -> Result<Ticket, DocumentError> {
        let executed_at = self.ctx.issue_ticket();
        self.root.set(self.target, key, &content, executed_at)?;
        self.ctx.push(Operation::Set {
            parent_created_at: self.target,
            key: key.to_string(),
            value: content,
            executed_at,
        });
        Ok(executed_at)
    }

    pub fn set_null(&mut self, key: &str) -> Result<(), DocumentError> {
        self.set_content(key, ElementContent::Primitive(PrimitiveValue::Null))
            .map(|_| ())
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> Result<(), DocumentError> {
        self.set_content(key, ElementContent::Primitive(PrimitiveValue::Boolean(value)))
            .map(|_| ())
    }

    pub fn set_integer(&mut self, key: &str, value: i32) -> Result<(), DocumentError> {
        self.set_content(key, ElementContent::Primitive(PrimitiveValue::Integer(value)))
            .map(|_| ())
    }

    pub fn set_long(&mut self, key: &str, value: i64) -> Result<(), DocumentError> {
        self.set_content(key, ElementContent::Primitive(PrimitiveValue::Long(value)))
            .map(|_| ())
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> Result<(), DocumentError> {
        self.set_content(key, ElementContent::Primitive(PrimitiveValue::Double(value)))
            .map(|_| ())
    }

    pub fn set_string(&mut self, key: &str, value: &str) -> Result<(), DocumentError> {
        self.set_content(
            key,
            ElementContent::Primitive(PrimitiveValue::String(value.to_string())),
        )
        .map(|_| ())
    }

    pub fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<(), DocumentError> {
        self.set_content(
            key,
            ElementContent::Primitive(PrimitiveValue::Bytes(value.to_vec())),
        )
        .map(|_| ())
    }

    /// Sets a date value as epoch milliseconds.
    pub fn set_date(&mut self, key: &str, epoch_millis: i64) -> Result<(), DocumentError> {
        self.set_content(
            key,
            ElementContent::Primitive(PrimitiveValue::Date(epoch_millis)),
        )
        .map(|_| ())
    }

    pub fn set_new_object(&mut self, key: &str) -> Result<JsonObject<'_>, DocumentError> {
        let target = self.set_content(key, ElementContent::Object)?;
        Ok(JsonObject {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn set_new_array(&mut self, key: &str) -> Result<JsonArray<'_>, DocumentError> {
        let target = self.set_content(key, ElementContent::Array)?;
        Ok(JsonArray {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn set_new_text(&mut self, key: &str) -> Result<JsonText<'_>, DocumentError> {
        let target = self.set_content(key, ElementContent::Text)?;
        Ok(JsonText {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn set_new_rich_text(&mut self, key: &str) -> Result<JsonRichText<'_>, DocumentError> {
        let target = self.set_content(key, ElementContent::RichText)?;
        Ok(JsonRichText {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    /// Removes the displayed element under `key`.
    pub fn remove(&mut self, key: &str) -> Result<(), DocumentError> {
        let target = self
            .container()?
            .get(key)
            .ok_or_else(|| CrdtError::UnknownKey(key.to_string()))?;
        let executed_at = self.ctx.issue_ticket();
        self.root.remove(self.target, target, executed_at)?;
        self.ctx.push(Operation::Remove {
            parent_created_at: self.target,
            created_at: target,
            executed_at,
        });
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.container().map_or(false, |obj| obj.get(key).is_some())
    }

    fn child(&self, key: &str) -> Result<Ticket, DocumentError> {
        self.container()?
            .get(key)
            .ok_or_else(|| CrdtError::UnknownKey(key.to_string()).into())
    }

    pub fn get_object(&mut self, key: &str) -> Result<JsonObject<'_>, DocumentError> {
        let target = self.child(key)?;
        if !matches!(self.root.element(target), Some(Element::Object(_))) {
            return Err(CrdtError::TypeMismatch.into());
        }
        Ok(JsonObject {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn get_array(&mut self, key: &str) -> Result<JsonArray<'_>, DocumentError> {
        let target = self.child(key)?;
        if !matches!(self.root.element(target), Some(Element::Array(_))) {
            return Err(CrdtError::TypeMismatch.into());
        }
        Ok(JsonArray {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn get_text(&mut self, key: &str) -> Result<JsonText<'_>, DocumentError> {
        let target = self.child(key)?;
        if !matches!(self.root.element(target), Some(Element::Text(_))) {
            return Err(CrdtError::TypeMismatch.into());
        }
        Ok(JsonText {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn get_rich_text(&mut self, key: &str) -> Result<JsonRichText<'_>, DocumentError> {
        let target = self.child(key)?;
        if !matches!(self.root.element(target), Some(Element::RichText(_))) {
            return Err(CrdtError::TypeMismatch.into());
        }
        Ok(JsonRichText {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn marshal(&self) -> String {
        self.root.marshal_element(self.target)
    }
}

impl<'a> JsonArray<'a> {
    fn container(&self) -> Result<&crate::crdt::Array, DocumentError> {
        match self.root.element(self.target) {
            Some(Element::Array(arr)) => Ok(arr),
            _ => Err(CrdtError::UnknownParent.into()),
        }
    }

    fn add_content(&mut self, content: ElementContent) -> Result<Ticket, DocumentError> {
        let prev = self.container()?.last_created_at();
        let executed_at = self.ctx.issue_ticket();
        self.root.add(self.target, prev, &content, executed_at)?;
        self.ctx.push(Operation::Add {
            parent_created_at: self.target,
            prev_created_at: prev,
            value: content,
            executed_at,
        });
        Ok(executed_at)
    }

    pub fn add_null(&mut self) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Null))
            .map(|_| ())
    }

    pub fn add_bool(&mut self, value: bool) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Boolean(value)))
            .map(|_| ())
    }

    pub fn add_integer(&mut self, value: i32) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Integer(value)))
            .map(|_| ())
    }

    pub fn add_long(&mut self, value: i64) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Long(value)))
            .map(|_| ())
    }

    pub fn add_double(&mut self, value: f64) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Double(value)))
            .map(|_| ())
    }

    pub fn add_string(&mut self, value: &str) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::String(
            value.to_string(),
        )))
        .map(|_| ())
    }

    pub fn add_bytes(&mut self, value: &[u8]) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Bytes(
            value.to_vec(),
        )))
        .map(|_| ())
    }

    /// Adds a date value as epoch milliseconds.
    pub fn add_date(&mut self, epoch_millis: i64) -> Result<(), DocumentError> {
        self.add_content(ElementContent::Primitive(PrimitiveValue::Date(epoch_millis)))
            .map(|_| ())
    }

    pub fn add_new_object(&mut self) -> Result<JsonObject<'_>, DocumentError> {
        let target = self.add_content(ElementContent::Object)?;
        Ok(JsonObject {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    pub fn add_new_array(&mut self) -> Result<JsonArray<'_>, DocumentError> {
        let target = self.add_content(ElementContent::Array)?;
        Ok(JsonArray {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target,
        })
    }

    /// Live element count.
    pub fn len(&self) -> usize {
        self.container().map_or(0, |arr| arr.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the `index`-th live element.
    pub fn delete(&mut self, index: usize) -> Result<(), DocumentError> {
        let target = self.container()?.get(index)?;
        let executed_at = self.ctx.issue_ticket();
        self.root.remove(self.target, target, executed_at)?;
        self.ctx.push(Operation::Remove {
            parent_created_at: self.target,
            created_at: target,
            executed_at,
        });
        Ok(())
    }

    /// Reorders the `target_index`-th live element to sit right after the
    /// `prev_index`-th one, or at the front when `prev_index` is `None`.
    pub fn move_after_index(
        &mut self,
        target_index: usize,
        prev_index: Option<usize>,
    ) -> Result<(), DocumentError> {
        let container = self.container()?;
        let target = container.get(target_index)?;
        let prev = match prev_index {
            Some(index) => container.get(index)?,
            None => crate::time::INITIAL_TICKET,
        };
        let executed_at = self.ctx.issue_ticket();
        self.root.move_after(self.target, prev, target, executed_at)?;
        self.ctx.push(Operation::Move {
            parent_created_at: self.target,
            prev_created_at: prev,
            created_at: target,
            executed_at,
        });
        Ok(())
    }

    pub fn marshal(&self) -> String {
        self.root.marshal_element(self.target)
    }
}

impl<'a> JsonText<'a> {
    fn container(&self) -> Result<&crate::crdt::Text, DocumentError> {
        match self.root.element(self.target) {
            Some(Element::Text(text)) => Ok(text),
            _ => Err(CrdtError::UnknownParent.into()),
        }
    }

    /// Replaces the character range `[from, to)` with `content`.
    pub fn edit(&mut self, from: usize, to: usize, content: &str) -> Result<(), DocumentError> {
        let (from_pos, to_pos) = self.container()?.create_range(from, to)?;
        let executed_at = self.ctx.issue_ticket();
        let max_created_at_by_actor = self.root.edit_text(
            self.target,
            &from_pos,
            &to_pos,
            None,
            content,
            None,
            executed_at,
        )?;
        self.ctx.push(Operation::Edit {
            parent_created_at: self.target,
            from: from_pos,
            to: to_pos,
            content: content.to_string(),
            attributes: None,
            max_created_at_by_actor,
            executed_at,
        });
        Ok(())
    }

    /// Publishes this actor's cursor range.
    pub fn select(&mut self, from: usize, to: usize) -> Result<(), DocumentError> {
        let (from_pos, to_pos) = self.container()?.create_range(from, to)?;
        let executed_at = self.ctx.issue_ticket();
        self.root.select(self.target, from_pos, to_pos, executed_at)?;
        self.ctx.push(Operation::Select {
            parent_created_at: self.target,
            from: from_pos,
            to: to_pos,
            executed_at,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.container().map_or(0, |text| text.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn marshal(&self) -> String {
        self.root.marshal_element(self.target)
    }
}

impl<'a> JsonRichText<'a> {
    fn container(&self) -> Result<&crate::crdt::RichText, DocumentError> {
        match self.root.element(self.target) {
            Some(Element::RichText(rich)) => Ok(rich),
            _ => Err(CrdtError::UnknownParent.into()),
        }
    }

    /// Replaces the character range `[from, to)` with `content`, optionally
    /// styling the inserted run.
    pub fn edit(
        &mut self,
        from: usize,
        to: usize,
        content: &str,
        attributes: Option<&BTreeMap<String, String>>,
    ) -> Result<(), DocumentError> {
        let (from_pos, to_pos) = self.container()?.create_range(from, to)?;
        let executed_at = self.ctx.issue_ticket();
        let max_created_at_by_actor = self.root.edit_text(
            self.target,
            &from_pos,
            &to_pos,
            None,
            content,
            attributes,
            executed_at,
        )?;
        self.ctx.push(Operation::Edit {
            parent_created_at: self.target,
            from: from_pos,
            to: to_pos,
            content: content.to_string(),
            attributes: attributes.cloned(),
            max_created_at_by_actor,
            executed_at,
        });
        Ok(())
    }

    /// Applies styling attributes over the character range `[from, to)`.
    pub fn set_style(
        &mut self,
        from: usize,
        to: usize,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), DocumentError> {
        let (from_pos, to_pos) = self.container()?.create_range(from, to)?;
        let executed_at = self.ctx.issue_ticket();
        self.root
            .style(self.target, &from_pos, &to_pos, attributes, executed_at)?;
        self.ctx.push(Operation::Style {
            parent_created_at: self.target,
            from: from_pos,
            to: to_pos,
            attributes: attributes.clone(),
            executed_at,
        });
        Ok(())
    }

    pub fn select(&mut self, from: usize, to: usize) -> Result<(), DocumentError> {
        let (from_pos, to_pos) = self.container()?.create_range(from, to)?;
        let executed_at = self.ctx.issue_ticket();
        self.root.select(self.target, from_pos, to_pos, executed_at)?;
        self.ctx.push(Operation::Select {
            parent_created_at: self.target,
            from: from_pos,
            to: to_pos,
            executed_at,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.container().map_or(0, |rich| rich.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn marshal(&self) -> String {
        self.root.marshal_element(self.target)
    }
}
