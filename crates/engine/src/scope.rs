//! Variable scopes used for template expansion and expression evaluation.

use indexmap::IndexMap;
use loaddata_types::SampleRow;
use serde_json::Value;

/// Ordered variable bindings for one generation context.
///
/// Insertion order matters: the template expander substitutes variables in the order they were
/// bound. Rebinding a variable keeps its original position and replaces the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScope {
    variables: IndexMap<String, Value>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope for one sample row: `base_path`, the row fields, and the derived
    /// `acquisition_folder` and `filename`.
    pub fn for_sample(sample: &SampleRow, base_path: &str) -> Self {
        let mut scope = Self::new();
        scope.insert("base_path", base_path);
        for (name, value) in sample.fields() {
            scope.insert(name, value);
        }
        scope.insert("acquisition_folder", sample.acquisition_folder());
        scope.insert("filename", sample.filename());
        scope
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Returns a copy of the scope extended with one binding.
    pub fn with(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut extended = self.clone();
        extended.insert(name, value);
        extended
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for VariableScope {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut scope = Self::new();
        for (name, value) in iter {
            scope.insert(name, value);
        }
        scope
    }
}
