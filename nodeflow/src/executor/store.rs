//! Append-only variable store for one run.

use crate::core::VariableValue;
use crate::errors::ExecutionError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Variable bindings of a single run.
///
/// A name can be bound once; rebinding is an error. Iteration follows
/// binding order.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    entries: Vec<(String, VariableValue)>,
    positions: HashMap<String, usize>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding externally supplied initial values, bound in
    /// name order.
    ///
    /// # Errors
    ///
    /// Never fails in practice: map keys are unique.
    pub fn with_initial(
        initial: impl IntoIterator<Item = (String, VariableValue)>,
    ) -> Result<Self, ExecutionError> {
        let sorted: BTreeMap<String, VariableValue> = initial.into_iter().collect();
        let mut store = Self::new();
        for (name, value) in sorted {
            store.bind(name, value)?;
        }
        Ok(store)
    }

    /// Binds a name.
    ///
    /// # Errors
    ///
    /// Returns `VariableConflict` if the name is already bound.
    pub fn bind(&mut self, name: impl Into<String>, value: VariableValue) -> Result<(), ExecutionError> {
        let name = name.into();
        if self.positions.contains_key(&name) {
            return Err(ExecutionError::VariableConflict { name });
        }
        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    /// Returns the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.positions.get(name).map(|&i| &self.entries[i].1)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates bindings in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns bound names in binding order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Consumes the store into a name-sorted map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, VariableValue> {
        self.entries.into_iter().collect()
    }
}

impl Serialize for VariableStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_get() {
        let mut store = VariableStore::new();
        store.bind("gen", VariableValue::text("hello")).unwrap();

        assert!(store.contains("gen"));
        assert_eq!(store.get("gen"), Some(&VariableValue::text("hello")));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_rebinding_is_rejected() {
        let mut store = VariableStore::new();
        store.bind("gen", VariableValue::text("a")).unwrap();
        let err = store.bind("gen", VariableValue::text("b")).unwrap_err();

        assert_eq!(err.code(), "VARIABLE_CONFLICT");
        assert_eq!(store.get("gen"), Some(&VariableValue::text("a")));
    }

    #[test]
    fn test_initial_values_sorted_then_binding_order() {
        let initial = HashMap::from([
            ("zeta".to_string(), VariableValue::text("z")),
            ("alpha".to_string(), VariableValue::text("a")),
        ]);
        let mut store = VariableStore::with_initial(initial).unwrap();
        store.bind("middle", VariableValue::text("m")).unwrap();

        assert_eq!(store.names(), vec!["alpha", "zeta", "middle"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_serializes_as_map() {
        let mut store = VariableStore::new();
        store.bind("caption", VariableValue::text("a fox")).unwrap();
        let json = serde_json::to_value(&store).unwrap();

        assert_eq!(json["caption"]["type"], "data");
        assert_eq!(json["caption"]["value"]["text"], "a fox");
    }
}
