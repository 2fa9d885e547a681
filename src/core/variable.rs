//! Discrete random variables.

/// A named discrete variable together with its ordered list of value labels.
///
/// A `Variable` is never compared against a bare name through ad hoc
/// cross-type equality: maps that need to look a variable up by name key
/// explicitly on `String`, and a `Variable` handle is always dereferenced
/// from the owning [`crate::core::Network`] rather than carried around and
/// compared on its own. Equality here is only used to decide whether two
/// `Variable`s describe the very same axis when assembling a
/// [`crate::core::Factor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    values: Vec<String>,
}

impl Variable {
    /// Builds a variable with the given name and ordered value labels.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// The variable's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered value labels.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The number of values this variable can take.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    /// The axis index of a given label, if it belongs to this variable.
    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.values.iter().position(|v| v == label)
    }

    /// Replaces the value list in place.
    pub(crate) fn set_values(&mut self, values: Vec<String>) {
        self.values = values;
    }

    /// Renames the variable in place.
    pub(crate) fn rename(&mut self, new_name: &str) {
        self.name = new_name.to_string();
    }
}
