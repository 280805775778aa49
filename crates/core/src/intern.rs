//! Name interning for document construction.
//!
//! Encoders create the same field name many times (schema entries, field
//! references, output names). The interner hands out one shared allocation
//! per distinct name. It is an ordinary value owned by whoever builds the
//! document; there is no process-wide table.

use crate::document::Name;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct NameInterner {
    names: HashSet<Name>,
}

impl NameInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the existing name if it was seen before.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(existing) = self.names.get(s) {
            return existing.clone();
        }
        let name = Name::new(s);
        self.names.insert(name.clone());
        name
    }

    pub fn contains(&self, s: &str) -> bool {
        self.names.contains(s)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
