//! Action records.
//!
//! An action is a plain key-value record describing a state transition
//! intent. The only shape requirement is a `type` field that is present and
//! not `null`; any other fields are left to the application.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved action types dispatched by the store itself.
///
/// Reducers must not handle these explicitly; they fall through to the
/// reducer's default branch, which is exactly what establishes (or
/// re-derives) the initial state. Every type starting with
/// [`RESERVED_PREFIX`](Self::RESERVED_PREFIX) belongs to the store;
/// application actions must not use it.
pub struct ActionType;

impl ActionType {
    /// Prefix of every store-internal action type.
    pub const RESERVED_PREFIX: &'static str = "@@conduit/";

    /// Dispatched once when a store is created.
    pub const INIT: &'static str = "@@conduit/INIT";

    /// Dispatched after the reducer has been replaced.
    pub const REPLACE: &'static str = "@@conduit/REPLACE";
}

/// A validated action record.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    fields: Map<String, Value>,
}

impl Action {
    /// Create an action with the given `type` and no other fields.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.into()));
        Self { fields }
    }

    /// Add a field, replacing any previous value under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Validate a raw value as an action record.
    ///
    /// A `type` of `null` is rejected like a missing one, with
    /// [`Error::MissingActionType`].
    pub fn from_value(value: Value) -> Result<Self> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(Error::InvalidActionShape {
                    kind: kind_of(&other),
                })
            }
        };

        match fields.get("type") {
            None | Some(Value::Null) => Err(Error::MissingActionType),
            Some(_) => Ok(Self { fields }),
        }
    }

    /// The `type` field.
    pub fn kind(&self) -> &Value {
        // Validated on construction.
        self.fields.get("type").unwrap_or(&Value::Null)
    }

    /// The `type` field if it is a string.
    pub fn kind_str(&self) -> Option<&str> {
        self.kind().as_str()
    }

    /// Returns true if the `type` field is the string `kind`.
    pub fn is(&self, kind: &str) -> bool {
        self.kind_str() == Some(kind)
    }

    /// Returns true for the store's internal init and replace actions.
    pub fn is_internal(&self) -> bool {
        self.is(ActionType::INIT) || self.is(ActionType::REPLACE)
    }

    /// Returns true if the `type` uses the store's reserved prefix.
    pub fn is_reserved(&self) -> bool {
        self.kind_str()
            .is_some_and(|kind| kind.starts_with(ActionType::RESERVED_PREFIX))
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `payload` field, by convention the action's argument.
    pub fn payload(&self) -> Option<&Value> {
        self.get("payload")
    }

    /// All fields, including `type`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert back into a raw record.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        action.into_value()
    }
}

/// Short name for the kind of a JSON value, used in error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
