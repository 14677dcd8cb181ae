//! Examples: ordered field maps with a marked set of input fields.
//!
//! Used for gold-set entries, few-shot demonstrations, and step outputs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Named string fields, ordered by name.
pub type FieldMap = BTreeMap<String, String>;

/// A field map where some fields are inputs and the rest are labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    fields: FieldMap,
    #[serde(default)]
    input_keys: BTreeSet<String>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a field map, marking `inputs` as input fields.
    pub fn from_fields(fields: FieldMap, inputs: &[&str]) -> Self {
        Self {
            fields,
            input_keys: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builder: add or replace a field.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder: mark fields as inputs. Unknown names are allowed and simply never match.
    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.input_keys = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.input_keys.contains(name)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.input_keys.iter().map(|s| s.as_str())
    }

    /// Only the input fields.
    pub fn inputs(&self) -> FieldMap {
        self.fields
            .iter()
            .filter(|(k, _)| self.input_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Only the label (non-input) fields.
    pub fn labels(&self) -> FieldMap {
        self.fields
            .iter()
            .filter(|(k, _)| !self.input_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold() -> Example {
        Example::new()
            .with("research_goal", "Explain knowledge distillation.")
            .with("reference_insight", "Transferring knowledge from teacher to student...")
            .with_inputs(&["research_goal"])
    }

    #[test]
    fn test_inputs_and_labels_partition() {
        let ex = gold();
        assert_eq!(ex.inputs().len(), 1);
        assert_eq!(ex.labels().len(), 1);
        assert!(ex.is_input("research_goal"));
        assert!(!ex.is_input("reference_insight"));
    }

    #[test]
    fn test_get_missing_field() {
        assert_eq!(gold().get("answer"), None);
    }

    #[test]
    fn test_json_roundtrip_preserves_inputs() {
        let ex = gold();
        let json = serde_json::to_string(&ex).unwrap();
        let back: Example = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ex);
    }
}
