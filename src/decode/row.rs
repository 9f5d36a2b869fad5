use std::collections::HashMap;

use super::FieldValue;

/// Reusable destination for decoded records. Callers allocate one row and
/// feed it through repeated decode calls.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordRow {
    values: HashMap<String, FieldValue>,
}

impl RecordRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, field: &str, value: FieldValue) {
        self.values.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
