//! Last-writer-wins string table used for rich text attributes.

use std::collections::BTreeMap;

use crate::time::Ticket;

#[derive(Debug, Clone)]
struct RhtEntry {
    value: String,
    updated_at: Ticket,
}

/// Attribute map `name -> (value, updatedAt)`. A write lands only when its
/// ticket is newer than the entry it replaces.
#[derive(Debug, Clone, Default)]
pub struct Rht {
    entries: BTreeMap<String, RhtEntry>,
}

impl Rht {
    pub fn new() -> Self {
        Rht::default()
    }

    pub fn set(&mut self, key: &str, value: &str, updated_at: Ticket) {
        let stale = self
            .entries
            .get(key)
            .map_or(false, |entry| !updated_at.after(entry.updated_at));
        if stale {
            return;
        }
        self.entries.insert(
            key.to_string(),
            RhtEntry {
                value: value.to_string(),
                updated_at,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the table as a JSON object value, keys sorted.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, e) in &self.entries {
            map.insert(k.clone(), serde_json::Value::String(e.value.clone()));
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ActorID, Ticket};

    fn tick(lamport: u64) -> Ticket {
        Ticket::new(lamport, 0, ActorID::from_bytes([1; 12]))
    }

    #[test]
    fn newer_write_wins() {
        let mut rht = Rht::new();
        rht.set("bold", "true", tick(2));
        rht.set("bold", "false", tick(1));
        assert_eq!(rht.get("bold"), Some("true"));

        rht.set("bold", "false", tick(3));
        assert_eq!(rht.get("bold"), Some("false"));
    }

    #[test]
    fn equal_ticket_does_not_overwrite() {
        let mut rht = Rht::new();
        rht.set("size", "12", tick(5));
        rht.set("size", "14", tick(5));
        assert_eq!(rht.get("size"), Some("12"));
    }

    #[test]
    fn renders_sorted_json() {
        let mut rht = Rht::new();
        rht.set("b", "2", tick(1));
        rht.set("a", "1", tick(1));
        assert_eq!(rht.to_json().to_string(), r#"{"a":"1","b":"2"}"#);
    }
}
