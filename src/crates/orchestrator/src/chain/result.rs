//! Accumulated outputs of a chain run

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Named step outputs, kept in the order they were produced
///
/// Writing a name that already exists replaces its output in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainResult {
    outputs: Vec<(String, String)>,
}

impl ChainResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output recorded for `step`
    pub fn get(&self, step: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, output)| output.as_str())
    }

    pub fn contains(&self, step: &str) -> bool {
        self.get(step).is_some()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// `(step, output)` pairs in production order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outputs
            .iter()
            .map(|(name, output)| (name.as_str(), output.as_str()))
    }

    /// Step names in production order
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(name, _)| name.as_str())
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.outputs.into_iter().collect()
    }

    pub(crate) fn insert(&mut self, step: impl Into<String>, output: impl Into<String>) {
        let step = step.into();
        let output = output.into();
        match self.outputs.iter_mut().find(|(name, _)| *name == step) {
            Some(slot) => slot.1 = output,
            None => self.outputs.push((step, output)),
        }
    }
}

impl Serialize for ChainResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outputs.len()))?;
        for (name, output) in &self.outputs {
            map.serialize_entry(name, output)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_writer_wins_in_place() {
        let mut result = ChainResult::new();
        result.insert("a", "1");
        result.insert("b", "2");
        result.insert("a", "3");

        assert_eq!(result.get("a"), Some("3"));
        assert_eq!(result.len(), 2);
        assert_eq!(result.steps().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let mut result = ChainResult::new();
        result.insert("summary", "short");
        result.insert("title", "T");

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"summary":"short","title":"T"}"#);
    }
}
