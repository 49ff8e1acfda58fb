//! Component definitions and validator predicates.
//!
//! Components are schema-less: a [`ComponentDefinition`] pairs a
//! registry-scoped name with an opaque predicate over proposed
//! `serde_json::Value` payloads. The store never inspects payloads beyond
//! running the predicate, so a consumer can plug in anything from "accept
//! everything" to a full structural check.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Predicate deciding whether a proposed payload is acceptable for a
/// component type.
pub type Validator = Rc<dyn Fn(&Value) -> bool>;

/// An immutable descriptor for one component type: a unique name and the
/// validator applied to every insert/replace.
///
/// Defined once per registry; a name cannot be redefined.
#[derive(Clone)]
pub struct ComponentDefinition {
    name: String,
    validator: Validator,
}

impl ComponentDefinition {
    /// Create a definition with an explicit validator.
    pub fn new(name: impl Into<String>, validator: Validator) -> Self {
        Self {
            name: name.into(),
            validator,
        }
    }

    /// Create a definition that accepts any payload.
    pub fn accepting_any(name: impl Into<String>) -> Self {
        Self::new(name, validators::any())
    }

    /// The registry-scoped component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the validator against a proposed payload.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        (self.validator)(value)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Stock validator constructors for common payload shapes.
pub mod validators {
    use std::rc::Rc;

    use serde_json::Value;

    use super::Validator;

    /// Accepts every payload.
    #[must_use]
    pub fn any() -> Validator {
        Rc::new(|_| true)
    }

    /// Accepts JSON booleans.
    #[must_use]
    pub fn boolean() -> Validator {
        Rc::new(Value::is_boolean)
    }

    /// Accepts JSON numbers.
    #[must_use]
    pub fn number() -> Validator {
        Rc::new(Value::is_number)
    }

    /// Accepts JSON strings.
    #[must_use]
    pub fn string() -> Validator {
        Rc::new(Value::is_string)
    }

    /// Accepts JSON objects.
    #[must_use]
    pub fn object() -> Validator {
        Rc::new(Value::is_object)
    }

    /// Accepts JSON arrays.
    #[must_use]
    pub fn array() -> Validator {
        Rc::new(Value::is_array)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_definition_name() {
        let def = ComponentDefinition::accepting_any("Health");
        assert_eq!(def.name(), "Health");
    }

    #[test]
    fn test_any_accepts_everything() {
        let def = ComponentDefinition::accepting_any("Tag");
        assert!(def.accepts(&Value::Null));
        assert!(def.accepts(&json!({"x": 1})));
        assert!(def.accepts(&json!("text")));
    }

    #[test]
    fn test_number_validator() {
        let def = ComponentDefinition::new("Health", validators::number());
        assert!(def.accepts(&json!(10)));
        assert!(def.accepts(&json!(1.5)));
        assert!(!def.accepts(&json!("10")));
        assert!(!def.accepts(&Value::Null));
    }

    #[test]
    fn test_object_validator() {
        let def = ComponentDefinition::new("Position", validators::object());
        assert!(def.accepts(&json!({"x": 0.0, "y": 0.0})));
        assert!(!def.accepts(&json!([0.0, 0.0])));
    }

    #[test]
    fn test_custom_validator() {
        let def = ComponentDefinition::new(
            "Health",
            Rc::new(|value: &Value| value.as_f64().is_some_and(|n| n >= 0.0)),
        );
        assert!(def.accepts(&json!(5)));
        assert!(!def.accepts(&json!(-1)));
    }
}
