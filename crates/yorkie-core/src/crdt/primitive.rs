//! Immutable scalar values tagged with their creation ticket.

use crate::time::Ticket;

/// The scalar kinds a document can hold. `Date` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(i64),
}

impl PrimitiveValue {
    /// Canonical JSON rendering of the scalar.
    pub fn marshal(&self) -> String {
        match self {
            PrimitiveValue::Null => "null".to_string(),
            PrimitiveValue::Boolean(v) => v.to_string(),
            PrimitiveValue::Integer(v) => v.to_string(),
            PrimitiveValue::Long(v) => v.to_string(),
            PrimitiveValue::Double(v) => match serde_json::Number::from_f64(*v) {
                Some(n) => n.to_string(),
                // NaN and infinities have no JSON literal.
                None => "null".to_string(),
            },
            PrimitiveValue::String(v) => serde_json::Value::String(v.clone()).to_string(),
            PrimitiveValue::Bytes(v) => {
                serde_json::Value::String(String::from_utf8_lossy(v).into_owned()).to_string()
            }
            PrimitiveValue::Date(millis) => millis.to_string(),
        }
    }
}

/// A scalar element. Primitives are leaves: they are never parents.
#[derive(Debug, Clone)]
pub struct Primitive {
    value: PrimitiveValue,
    created_at: Ticket,
}

impl Primitive {
    pub fn new(value: PrimitiveValue, created_at: Ticket) -> Self {
        Primitive { value, created_at }
    }

    pub fn value(&self) -> &PrimitiveValue {
        &self.value
    }

    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    pub fn marshal(&self) -> String {
        self.value.marshal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_marshal_to_canonical_json() {
        assert_eq!(PrimitiveValue::Null.marshal(), "null");
        assert_eq!(PrimitiveValue::Boolean(true).marshal(), "true");
        assert_eq!(PrimitiveValue::Integer(-7).marshal(), "-7");
        assert_eq!(PrimitiveValue::Long(1 << 40).marshal(), "1099511627776");
        assert_eq!(PrimitiveValue::Double(2.5).marshal(), "2.5");
        assert_eq!(PrimitiveValue::Date(1_577_836_800_000).marshal(), "1577836800000");
    }

    #[test]
    fn strings_are_json_escaped() {
        let v = PrimitiveValue::String("say \"hi\"\n".to_string());
        assert_eq!(v.marshal(), r#""say \"hi\"\n""#);
    }

    #[test]
    fn bytes_marshal_as_lossy_string() {
        let v = PrimitiveValue::Bytes(b"abc".to_vec());
        assert_eq!(v.marshal(), "\"abc\"");
    }
}
